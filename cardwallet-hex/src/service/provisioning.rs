//! Card provisioning.
//!
//! Validating → FeeCalculated → BalanceChecked → ProviderCallInFlight → Provisioned →
//! WalletDebited, or CompensationNeeded when the debit fails after the issuer created the card.

use chrono::Utc;
use tracing::{error, info, warn};

use cardwallet_types::domain::quote;
use cardwallet_types::ports::{IssueCardRequest, IssuedCard};
use cardwallet_types::{
    AppError, Card, CardProviderClient, CardType, CreateCardRequest, CreateCardResponse,
    Currency, FeeOperation, LedgerRepository, Money, ProviderError, RepoError, UserId,
    WalletEntry, WalletTransactionType,
};

use super::{CardWalletService, ensure_covers, parse_currency};

const NAME_MIN_LEN: usize = 2;
const NAME_MAX_LEN: usize = 40;

impl<R: LedgerRepository, P: CardProviderClient> CardWalletService<R, P> {
    /// Issues a card and charges the wallet for its principal plus fees.
    #[tracing::instrument(
        skip(self, req),
        fields(currency = %req.currency, amount = %req.amount)
    )]
    pub async fn create_card(
        &self,
        user_id: UserId,
        req: CreateCardRequest,
    ) -> Result<CreateCardResponse, AppError> {
        // Validating
        let currency = parse_currency(&req.currency)?;
        let name_on_card = validate_name_on_card(&req.name_on_card)?;
        let customer_email = validate_email(&req.customer_email)?;
        let card_type: CardType = req.card_type.parse()?;

        // FeeCalculated
        let schedule = self.fee_schedule().await?;
        let breakdown = quote(FeeOperation::CardCreation, req.amount, currency, &schedule)?;
        let total = breakdown.total()?;

        // BalanceChecked
        let wallet = self.wallet_for(user_id, currency).await?;
        ensure_covers(&wallet, total).inspect_err(|_| {
            warn!(wallet_id = %wallet.id, required = %total, "card creation refused: wallet too low");
        })?;

        let issued_cards = self.repo.count_cards(user_id).await?;
        if issued_cards >= self.policy.max_cards_per_user {
            warn!(issued_cards, "card creation refused: limit reached");
            return Err(AppError::CardLimitReached {
                limit: self.policy.max_cards_per_user,
            });
        }

        // ProviderCallInFlight: nothing local has changed up to here.
        let request = IssueCardRequest {
            name_on_card,
            card_type,
            amount: breakdown.base()?,
            customer_email,
        };
        let issued = self
            .call_provider("create_card", self.provider.create_card(request))
            .await
            .inspect_err(|e| warn!(error = %e, "card issuer did not create the card"))?;
        if issued.card_id.is_blank() {
            return Err(ProviderError::InvalidResponse(
                "card issuer response carries no card id".into(),
            )
            .into());
        }

        // Provisioned
        let card = card_from_issued(user_id, currency, issued);
        let debit = WalletEntry::debit(
            wallet.id,
            total,
            WalletTransactionType::CardCreation,
            format!("Card creation: {}", breakdown.describe()),
            card.card_id.as_str(),
        );

        match self.repo.commit_card_creation(card.clone(), debit).await {
            Ok(change) => {
                info!(
                    card_id = %card.card_id,
                    wallet_id = %wallet.id,
                    charged = %total,
                    new_balance = %change.new_balance,
                    "card provisioned"
                );
                Ok(CreateCardResponse {
                    card: card.into(),
                    wallet_balance: change.new_balance,
                    fees: breakdown,
                    wallet_transaction_id: change.transaction_id,
                })
            }
            Err(cause) => Err(self.record_unbilled_card(card, total, cause).await),
        }
    }

    /// The issuer created a card the wallet was never charged for. Keep the card on file,
    /// flagged, and surface the inconsistency.
    async fn record_unbilled_card(&self, mut card: Card, total: Money, cause: RepoError) -> AppError {
        let note = format!("wallet debit of {} failed after issuance: {}", total, cause);
        error!(
            card_id = %card.card_id,
            user_id = %card.user_id,
            %total,
            %cause,
            "card issued but wallet not charged, manual reconciliation required"
        );

        card.needs_reconciliation = true;
        card.reconciliation_note = Some(note.clone());
        let card_id = card.card_id.clone();
        let stored = match self.repo.insert_card(card).await {
            Err(RepoError::Conflict(_)) => {
                self.repo.flag_card_for_reconciliation(&card_id, &note).await
            }
            other => other,
        };
        if let Err(e) = stored {
            error!(%card_id, error = %e, "unbilled card could not be recorded locally");
        }

        AppError::CompensationNeeded(format!(
            "Card {} was issued but the wallet could not be charged {}",
            card_id, total
        ))
    }
}

fn validate_name_on_card(raw: &str) -> Result<String, AppError> {
    let name = raw.trim();
    let len = name.chars().count();
    if !(NAME_MIN_LEN..=NAME_MAX_LEN).contains(&len) {
        return Err(AppError::Validation(format!(
            "Name on card must be {} to {} characters, got {}",
            NAME_MIN_LEN, NAME_MAX_LEN, len
        )));
    }
    Ok(name.to_string())
}

fn validate_email(raw: &str) -> Result<String, AppError> {
    let email = raw.trim();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if !valid {
        return Err(AppError::Validation(format!(
            "Invalid customer email: '{}'",
            email
        )));
    }
    Ok(email.to_string())
}

/// Local record for an issuer-confirmed card. The wallet currency paid for it, so that is
/// the card currency.
fn card_from_issued(user_id: UserId, currency: Currency, issued: IssuedCard) -> Card {
    if issued.currency != currency {
        warn!(
            card_id = %issued.card_id,
            requested = %currency,
            reported = %issued.currency,
            "issuer reported a different card currency"
        );
    }
    let balance = Money::new(issued.balance, currency).unwrap_or_else(|_| {
        warn!(card_id = %issued.card_id, reported = %issued.balance, "issuer reported a negative balance");
        Money::zero(currency)
    });

    let now = Utc::now();
    Card {
        card_id: issued.card_id,
        user_id,
        customer_id: issued.customer_id,
        balance,
        status: issued.status,
        card_type: issued.card_type,
        name_on_card: issued.name_on_card,
        masked_number: issued.last4.as_deref().map(Card::mask_last4),
        expiry: issued.expiry,
        raw_provider_response: issued.raw,
        needs_reconciliation: false,
        reconciliation_note: None,
        version: 0,
        created_at: now,
        updated_at: now,
    }
}
