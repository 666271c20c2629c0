//! Card queries and status management.

use tracing::{error, info, warn};

use cardwallet_types::{
    AppError, Card, CardEffect, CardId, CardProviderClient, CardStatus, CardTransaction,
    CardTransactionType, LedgerRepository, Money, UserId,
};

use super::CardWalletService;

impl<R: LedgerRepository, P: CardProviderClient> CardWalletService<R, P> {
    pub async fn list_cards(&self, user_id: UserId) -> Result<Vec<Card>, AppError> {
        self.repo.list_cards(user_id).await.map_err(Into::into)
    }

    pub async fn get_card(&self, user_id: UserId, card_id: &CardId) -> Result<Card, AppError> {
        self.owned_card(user_id, card_id).await
    }

    pub async fn card_history(
        &self,
        user_id: UserId,
        card_id: &CardId,
    ) -> Result<Vec<CardTransaction>, AppError> {
        self.owned_card(user_id, card_id).await?;
        self.repo
            .list_card_transactions(card_id)
            .await
            .map_err(Into::into)
    }

    /// Freezes the card at the issuer, then locally.
    #[tracing::instrument(skip(self))]
    pub async fn block_card(
        &self,
        user_id: UserId,
        card_id: &CardId,
        reason: Option<&str>,
    ) -> Result<Card, AppError> {
        let card = self.owned_card(user_id, card_id).await?;
        let changed = self
            .call_provider("block_card", self.provider.block_card(card_id, reason))
            .await?;

        self.store_status(
            card,
            CardStatus::Blocked,
            changed.status,
            CardTransactionType::Block,
            changed.raw,
        )
        .await
    }

    /// Unfreezes the card at the issuer, then locally.
    #[tracing::instrument(skip(self))]
    pub async fn unblock_card(&self, user_id: UserId, card_id: &CardId) -> Result<Card, AppError> {
        let card = self.owned_card(user_id, card_id).await?;
        let changed = self
            .call_provider("unblock_card", self.provider.unblock_card(card_id))
            .await?;

        self.store_status(
            card,
            CardStatus::Active,
            changed.status,
            CardTransactionType::Unblock,
            changed.raw,
        )
        .await
    }

    /// Refreshes balance, status, last four digits and expiry from the issuer.
    #[tracing::instrument(skip(self))]
    pub async fn sync_card(&self, user_id: UserId, card_id: &CardId) -> Result<Card, AppError> {
        let card = self.owned_card(user_id, card_id).await?;
        let detail = self
            .call_provider("fetch_card_detail", self.provider.fetch_card_detail(card_id))
            .await?;

        let effect = CardEffect::Sync {
            balance: Money::new(detail.balance, card.currency())?,
            status: detail.status,
            masked_number: detail.last4.as_deref().map(Card::mask_last4),
            expiry: detail.expiry,
        };
        let synced = self.repo.apply_card_effect(card_id, effect, None).await?;
        info!(balance = %synced.balance, status = %synced.status, "card synced from issuer");
        Ok(synced)
    }

    async fn store_status(
        &self,
        card: Card,
        requested: CardStatus,
        reported: CardStatus,
        kind: CardTransactionType,
        raw: serde_json::Value,
    ) -> Result<Card, AppError> {
        if reported != requested {
            warn!(
                card_id = %card.card_id,
                %requested,
                %reported,
                "issuer reported an unexpected status"
            );
        }

        let line = CardTransaction::new(
            card.card_id.clone(),
            card.user_id,
            Money::zero(card.currency()),
            kind,
            "success",
        )
        .with_raw(raw);
        let effect = CardEffect::SetStatus {
            status: reported,
            transaction: Some(line),
        };

        match self.repo.apply_card_effect(&card.card_id, effect, None).await {
            Ok(updated) => {
                info!(card_id = %updated.card_id, status = %updated.status, "card status changed");
                Ok(updated)
            }
            Err(cause) => {
                error!(
                    card_id = %card.card_id,
                    %cause,
                    "issuer changed card status but local record did not follow"
                );
                let note = format!("status {} at issuer not stored locally: {}", reported, cause);
                self.flag_card(&card.card_id, &note).await;
                Err(AppError::CompensationNeeded(format!(
                    "Card {} is {} at the issuer but the local record could not be updated",
                    card.card_id, reported
                )))
            }
        }
    }
}
