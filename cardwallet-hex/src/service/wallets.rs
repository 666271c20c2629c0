//! Wallet management and confirmed deposit crediting.

use rust_decimal::Decimal;
use tracing::{info, warn};

use cardwallet_types::{
    AppError, CardProviderClient, CreditDepositRequest, DepositResponse, LedgerRepository, Money,
    OpenWalletRequest, RepoError, UserId, Wallet, WalletEntry, WalletId, WalletTransaction,
    WalletTransactionType,
};

use super::{CardWalletService, parse_currency};

impl<R: LedgerRepository, P: CardProviderClient> CardWalletService<R, P> {
    // ─────────────────────────────────────────────────────────────────────────────
    // Wallet Operations
    // ─────────────────────────────────────────────────────────────────────────────

    /// Opens the caller's wallet for a currency, or returns the one that already exists.
    #[tracing::instrument(skip(self), fields(currency = %req.currency))]
    pub async fn open_wallet(
        &self,
        user_id: UserId,
        req: OpenWalletRequest,
    ) -> Result<Wallet, AppError> {
        let currency = parse_currency(&req.currency)?;
        self.repo
            .open_wallet(user_id, currency)
            .await
            .map_err(Into::into)
    }

    pub async fn list_wallets(&self, user_id: UserId) -> Result<Vec<Wallet>, AppError> {
        self.repo.list_wallets(user_id).await.map_err(Into::into)
    }

    /// Trail of one wallet, newest first. Only the owner may read it.
    pub async fn wallet_history(
        &self,
        user_id: UserId,
        wallet_id: WalletId,
    ) -> Result<Vec<WalletTransaction>, AppError> {
        match self.repo.get_wallet(wallet_id).await? {
            Some(wallet) if wallet.user_id == user_id => {}
            _ => {
                return Err(AppError::NotFoundOrUnauthorized(format!(
                    "Wallet {}",
                    wallet_id
                )));
            }
        }

        self.repo
            .list_wallet_transactions(wallet_id)
            .await
            .map_err(Into::into)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Deposits
    // ─────────────────────────────────────────────────────────────────────────────

    /// Credits a payment-in confirmation. A reference already posted is reported as a duplicate.
    #[tracing::instrument(
        skip(self, req),
        fields(user_id = %req.user_id, provider = %req.provider, amount = %req.amount)
    )]
    pub async fn credit_deposit(
        &self,
        req: CreditDepositRequest,
    ) -> Result<DepositResponse, AppError> {
        let currency = parse_currency(&req.currency)?;
        if req.amount <= Decimal::ZERO {
            return Err(AppError::InvalidAmount(format!(
                "Deposit amount must be greater than zero, got {}",
                req.amount
            )));
        }
        if req.reference.trim().is_empty() {
            return Err(AppError::Validation("Deposit reference is required".into()));
        }
        let amount = Money::new(req.amount, currency)?;
        let reference = format!("{}:{}", req.provider, req.reference.trim());

        let wallet = self.repo.open_wallet(req.user_id, currency).await?;
        if let Some(existing) = self
            .repo
            .find_wallet_transaction_by_reference(wallet.id, &reference)
            .await?
        {
            return Ok(duplicate_deposit(&wallet, existing));
        }

        let entry = WalletEntry::credit(
            wallet.id,
            amount,
            WalletTransactionType::Deposit,
            format!("Deposit of {} via {}", amount, req.provider),
            reference.as_str(),
        )
        .with_unique_reference();

        match self.repo.post_wallet_entry(entry).await {
            Ok(change) => {
                info!(wallet_id = %wallet.id, new_balance = %change.new_balance, "deposit credited");
                Ok(DepositResponse {
                    wallet_id: change.wallet_id,
                    currency: change.currency,
                    old_balance: change.old_balance,
                    new_balance: change.new_balance,
                    transaction_id: change.transaction_id,
                    duplicate: false,
                })
            }
            // Lost a race with a concurrent confirmation of the same payment.
            Err(RepoError::Conflict(_)) => {
                warn!(%reference, "deposit confirmed twice concurrently");
                let wallet = self
                    .repo
                    .get_wallet(wallet.id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("Wallet {}", wallet.id)))?;
                let existing = self
                    .repo
                    .find_wallet_transaction_by_reference(wallet.id, &reference)
                    .await?
                    .ok_or_else(|| AppError::Conflict(format!("Deposit {}", reference)))?;
                Ok(duplicate_deposit(&wallet, existing))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// A repeated confirmation changes nothing, so both balances are the current one.
fn duplicate_deposit(wallet: &Wallet, existing: WalletTransaction) -> DepositResponse {
    DepositResponse {
        wallet_id: wallet.id,
        currency: wallet.currency(),
        old_balance: wallet.balance.amount(),
        new_balance: wallet.balance.amount(),
        transaction_id: Some(existing.id),
        duplicate: true,
    }
}
