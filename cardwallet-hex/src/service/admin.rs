//! Administrative wallet adjustments.

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{error, info};

use cardwallet_types::{
    AdjustedWallet, AdjustmentAction, AppError, CardProviderClient, EntryDirection,
    LedgerRepository, ManageWalletRequest, ManageWalletResponse, Money, UserId, WalletEntry,
    WalletTransactionType,
};

use super::CardWalletService;

impl<R: LedgerRepository, P: CardProviderClient> CardWalletService<R, P> {
    /// Adds to or subtracts from a user's wallet.
    ///
    /// The balance change and its trail line are written separately. When the trail line
    /// fails the balance change stands and the response says `transaction_recorded: false`.
    #[tracing::instrument(
        skip(self, req),
        fields(%admin_id, user_id = %req.user_id, wallet_id = %req.wallet_id, action = %req.action)
    )]
    pub async fn manage_wallet(
        &self,
        admin_id: UserId,
        req: ManageWalletRequest,
    ) -> Result<ManageWalletResponse, AppError> {
        if req.amount <= Decimal::ZERO {
            return Err(AppError::InvalidAmount(format!(
                "Adjustment amount must be greater than zero, got {}",
                req.amount
            )));
        }

        let wallet = self
            .repo
            .get_wallet(req.wallet_id)
            .await?
            .filter(|w| w.user_id == req.user_id)
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "Wallet {} for user {}",
                    req.wallet_id, req.user_id
                ))
            })?;
        let amount = Money::new(req.amount, wallet.currency())?;

        let direction = match req.action {
            AdjustmentAction::Add => EntryDirection::Credit,
            AdjustmentAction::Subtract => EntryDirection::Debit,
        };
        let change = self
            .repo
            .change_wallet_balance(wallet.id, direction, amount)
            .await?;
        info!(
            old_balance = %change.old_balance,
            new_balance = %change.new_balance,
            "wallet adjusted by admin"
        );

        let reference = format!("admin-{}-{}", req.action, Utc::now().timestamp_millis());
        let description = req
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("Admin {} of {} by {}", req.action, amount, admin_id));
        let entry = match direction {
            EntryDirection::Credit => WalletEntry::credit(
                wallet.id,
                amount,
                WalletTransactionType::AdminAdjustment,
                description,
                reference,
            ),
            EntryDirection::Debit => WalletEntry::debit(
                wallet.id,
                amount,
                WalletTransactionType::AdminAdjustment,
                description,
                reference,
            ),
        };

        let transaction_recorded = match self
            .repo
            .append_wallet_transaction(entry.to_transaction())
            .await
        {
            Ok(()) => true,
            Err(e) => {
                error!(
                    error = %e,
                    amount_changed = %change.amount_changed(),
                    "wallet adjusted but its trail line is missing"
                );
                false
            }
        };

        Ok(ManageWalletResponse {
            success: true,
            wallet: AdjustedWallet::from(&change),
            transaction_recorded,
        })
    }
}
