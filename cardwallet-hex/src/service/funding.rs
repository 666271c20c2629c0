//! Card funding.
//!
//! Each submission is keyed by an idempotency key recorded before the issuer is called. A key
//! that already has an attempt on file is never sent to the issuer again.

use tracing::{error, info, warn};
use uuid::Uuid;

use cardwallet_types::domain::quote;
use cardwallet_types::ports::CardFunded;
use cardwallet_types::{
    AppError, Card, CardId, CardProviderClient, CardTransaction, CardTransactionType,
    FeeBreakdown, FeeOperation, FundCardRequest, FundCardResponse, FundingAttempt,
    FundingAttemptStatus, FundingCommit, LedgerRepository, Money, RepoError, UserId, Wallet,
    WalletEntry, WalletTransactionType,
};

use super::{CardWalletService, ensure_covers};

impl<R: LedgerRepository, P: CardProviderClient> CardWalletService<R, P> {
    /// Loads `amount` onto a card, charging the wallet for the amount plus reload fees.
    #[tracing::instrument(skip(self, req), fields(%card_id, amount = %req.amount))]
    pub async fn fund_card(
        &self,
        user_id: UserId,
        card_id: &CardId,
        req: FundCardRequest,
    ) -> Result<FundCardResponse, AppError> {
        let card = self.owned_card(user_id, card_id).await?;
        let currency = card.currency();

        let wallet = self.wallet_for(user_id, currency).await?;
        let schedule = self.fee_schedule().await?;
        let breakdown = quote(FeeOperation::CardReload, req.amount, currency, &schedule)?;
        let total = breakdown.total()?;
        let amount = breakdown.base()?;

        ensure_covers(&wallet, total).inspect_err(|_| {
            warn!(wallet_id = %wallet.id, required = %total, "card funding refused: wallet too low");
        })?;

        let key = idempotency_key(req.idempotency_key.as_deref())?;
        self.claim_funding_key(&key, user_id, card_id, amount).await?;

        let funded = match self
            .call_provider("fund_card", self.provider.fund_card(card_id, amount))
            .await
        {
            Ok(funded) => funded,
            Err(e) => {
                // A timeout may still have loaded the card, so it stays open for reconciliation.
                let status = if e.is_timeout() {
                    FundingAttemptStatus::NeedsReconciliation
                } else {
                    FundingAttemptStatus::Failed
                };
                warn!(idempotency_key = %key, error = %e, %status, "card issuer did not fund the card");
                if let Err(store_err) = self
                    .repo
                    .finish_funding_attempt(user_id, &key, status, Some(e.to_string()))
                    .await
                {
                    error!(idempotency_key = %key, error = %store_err, "funding attempt outcome not recorded");
                }
                if e.is_timeout() {
                    self.flag_card(card_id, &format!("funding {} timed out at the issuer", key))
                        .await;
                }
                return Err(e.into());
            }
        };

        let provider_transaction_id = funded.transaction_id.clone();
        let commit = funding_commit(&key, &card, &wallet, &breakdown, total, amount, funded);
        match self.repo.commit_card_funding(commit).await {
            Ok(balances) => {
                info!(
                    idempotency_key = %key,
                    card_balance = %balances.card_balance,
                    wallet_balance = %balances.wallet_balance,
                    "card funded"
                );
                Ok(FundCardResponse {
                    card_id: card_id.clone(),
                    currency,
                    card_balance: balances.card_balance.amount(),
                    wallet_balance: balances.wallet_balance.amount(),
                    fees: breakdown,
                    idempotency_key: key,
                    provider_transaction_id,
                })
            }
            Err(cause) => Err(self
                .record_unbilled_funding(user_id, &key, card_id, total, cause)
                .await),
        }
    }

    /// Records the attempt as pending. A key the user sent before is refused with its recorded status.
    async fn claim_funding_key(
        &self,
        key: &str,
        user_id: UserId,
        card_id: &CardId,
        amount: Money,
    ) -> Result<(), AppError> {
        let attempt = FundingAttempt::pending(key, user_id, card_id.clone(), amount);
        match self.repo.begin_funding_attempt(attempt).await {
            Ok(()) => Ok(()),
            Err(RepoError::Conflict(_)) => {
                let status = self
                    .repo
                    .get_funding_attempt(user_id, key)
                    .await?
                    .map(|a| a.status.to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                warn!(idempotency_key = %key, %status, "funding attempt resubmitted");
                Err(AppError::DuplicateFundingAttempt {
                    key: key.to_string(),
                    status,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// The issuer loaded the card but the local ledger did not follow.
    async fn record_unbilled_funding(
        &self,
        user_id: UserId,
        key: &str,
        card_id: &CardId,
        total: Money,
        cause: RepoError,
    ) -> AppError {
        let note = format!("funding {} not booked after issuer load: {}", key, cause);
        error!(
            idempotency_key = %key,
            %card_id,
            %total,
            %cause,
            "card funded at issuer but wallet not charged, manual reconciliation required"
        );

        if let Err(e) = self
            .repo
            .finish_funding_attempt(
                user_id,
                key,
                FundingAttemptStatus::NeedsReconciliation,
                Some(note.clone()),
            )
            .await
        {
            error!(idempotency_key = %key, error = %e, "funding attempt outcome not recorded");
        }
        self.flag_card(card_id, &note).await;

        AppError::CompensationNeeded(format!(
            "Card {} was funded at the issuer but the wallet could not be charged {}",
            card_id, total
        ))
    }

    pub(super) async fn flag_card(&self, card_id: &CardId, note: &str) {
        if let Err(e) = self.repo.flag_card_for_reconciliation(card_id, note).await {
            error!(%card_id, error = %e, "card could not be flagged for reconciliation");
        }
    }
}

fn idempotency_key(requested: Option<&str>) -> Result<String, AppError> {
    match requested.map(str::trim) {
        Some("") => Err(AppError::Validation(
            "Idempotency key cannot be blank".into(),
        )),
        Some(key) if key.len() > 128 => Err(AppError::Validation(
            "Idempotency key is longer than 128 characters".into(),
        )),
        Some(key) => Ok(key.to_string()),
        None => Ok(format!("fund-{}", Uuid::new_v4())),
    }
}

/// Card balance is the issuer's figure when reported, otherwise the local balance plus the load.
fn funding_commit(
    key: &str,
    card: &Card,
    wallet: &Wallet,
    breakdown: &FeeBreakdown,
    total: Money,
    amount: Money,
    funded: CardFunded,
) -> FundingCommit {
    let currency = card.currency();
    let card_balance = funded
        .balance_after
        .and_then(|balance| Money::new(balance, currency).ok())
        .or_else(|| card.balance.checked_add(amount).ok())
        .unwrap_or(card.balance);

    FundingCommit {
        user_id: card.user_id,
        idempotency_key: key.to_string(),
        wallet_debit: WalletEntry::debit(
            wallet.id,
            total,
            WalletTransactionType::CardFunding,
            format!("Card funding: {}", breakdown.describe()),
            card.card_id.as_str(),
        ),
        card_id: card.card_id.clone(),
        card_balance,
        card_transaction: CardTransaction::new(
            card.card_id.clone(),
            card.user_id,
            amount,
            CardTransactionType::Fund,
            "success",
        )
        .with_provider_reference(funded.transaction_id)
        .with_raw(funded.raw),
    }
}
