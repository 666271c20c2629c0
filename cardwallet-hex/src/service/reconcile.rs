//! Webhook reconciliation.
//!
//! An event is recorded before its effect is applied, and flagged processed in the same
//! database unit as the effect. A recorded but unprocessed event is a retry candidate.

use rust_decimal::Decimal;
use serde_json::Value;
use tracing::{error, info, warn};

use cardwallet_types::{
    AppError, ApplyOutcome, Card, CardEffect, CardProviderClient, CardStatus, CardTransaction,
    CardTransactionType, EventReceipt, LedgerRepository, Money, RetryWebhooksResponse,
    WebhookEvent, WebhookEventKind,
};

use super::CardWalletService;

const DEFAULT_RETRY_LIMIT: u32 = 50;

impl<R: LedgerRepository, P: CardProviderClient> CardWalletService<R, P> {
    /// Applies an issuer event once. A second delivery of the same `event_id` is a no-op.
    #[tracing::instrument(
        skip(self, event),
        fields(event_id = %event.event_id, event_type = %event.event_type)
    )]
    pub async fn apply_webhook(&self, mut event: WebhookEvent) -> Result<ApplyOutcome, AppError> {
        if !event.signature_valid {
            warn!("webhook refused: signature did not verify");
            return Err(AppError::Reconcile(
                "Webhook signature is not valid".into(),
            ));
        }
        if event.event_id.trim().is_empty() {
            return Err(AppError::Reconcile("Webhook carries no event id".into()));
        }

        let card = match &event.card_id {
            Some(card_id) => self.repo.get_card(card_id).await?,
            None => None,
        };
        event.user_id = card.as_ref().map(|c| c.user_id);

        if !self.repo.record_webhook_event(event.clone()).await? {
            info!("webhook already recorded");
            return Ok(ApplyOutcome::Duplicate);
        }

        self.process_event(&event, card).await
    }

    /// Re-applies recorded events that never reached `processed`. Never re-records them.
    #[tracing::instrument(skip(self))]
    pub async fn retry_pending_events(
        &self,
        limit: Option<u32>,
    ) -> Result<RetryWebhooksResponse, AppError> {
        let pending = self
            .repo
            .list_unprocessed_webhook_events(limit.unwrap_or(DEFAULT_RETRY_LIMIT))
            .await?;

        let mut summary = RetryWebhooksResponse {
            attempted: pending.len(),
            ..Default::default()
        };
        for event in pending {
            let card = match &event.card_id {
                Some(card_id) => self.repo.get_card(card_id).await?,
                None => None,
            };
            match self.process_event(&event, card).await {
                Ok(_) => summary.applied += 1,
                Err(e) => {
                    warn!(event_id = %event.event_id, error = %e, "webhook retry failed");
                    summary.failed += 1;
                }
            }
        }

        info!(
            attempted = summary.attempted,
            applied = summary.applied,
            failed = summary.failed,
            "webhook retry pass finished"
        );
        Ok(summary)
    }

    async fn process_event(
        &self,
        event: &WebhookEvent,
        card: Option<Card>,
    ) -> Result<ApplyOutcome, AppError> {
        let kind = WebhookEventKind::parse(&event.event_type);
        if kind == WebhookEventKind::Unknown {
            self.repo.mark_webhook_processed(&event.event_id).await?;
            info!(event_type = %event.event_type, "webhook type carries no ledger effect");
            return Ok(ApplyOutcome::Ignored);
        }

        let Some(card) = card else {
            let reason = match &event.card_id {
                Some(card_id) => format!("Card {} is not on file", card_id),
                None => format!("{} event carries no card id", event.event_type),
            };
            return Err(self.fail_event(&event.event_id, reason).await);
        };

        let effect = match event_effect(kind, event, &card) {
            Ok(effect) => effect,
            Err(reason) => return Err(self.fail_event(&event.event_id, reason).await),
        };

        let receipt = EventReceipt {
            event_id: event.event_id.clone(),
        };
        match self
            .repo
            .apply_card_effect(&card.card_id, effect, Some(receipt))
            .await
        {
            Ok(updated) => {
                info!(
                    card_id = %updated.card_id,
                    balance = %updated.balance,
                    status = %updated.status,
                    "webhook applied"
                );
                Ok(ApplyOutcome::Applied)
            }
            Err(e) => Err(self.fail_event(&event.event_id, e.to_string()).await),
        }
    }

    /// Leaves the event unprocessed with the failure noted.
    async fn fail_event(&self, event_id: &str, reason: String) -> AppError {
        if let Err(e) = self.repo.mark_webhook_failed(event_id, &reason).await {
            error!(%event_id, error = %e, "webhook failure could not be recorded");
        }
        warn!(%event_id, %reason, "webhook left for retry");
        AppError::Reconcile(reason)
    }
}

/// Issuer payloads nest fields under `data` or put them at the top level.
fn event_data(payload: &Value) -> &Value {
    match payload.get("data") {
        Some(data) if data.is_object() => data,
        _ => payload,
    }
}

fn decimal_field(data: &Value, names: &[&str]) -> Option<Decimal> {
    names.iter().find_map(|name| match data.get(*name)? {
        Value::String(s) => s.trim().parse().ok(),
        Value::Number(n) => n.to_string().parse().ok(),
        _ => None,
    })
}

fn string_field(data: &Value, names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| match data.get(*name)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn card_money(card: &Card, amount: Decimal) -> Result<Money, String> {
    Money::new(amount, card.currency()).map_err(|e| e.to_string())
}

/// Maps an event onto the local change it implies.
fn event_effect(
    kind: WebhookEventKind,
    event: &WebhookEvent,
    card: &Card,
) -> Result<CardEffect, String> {
    let data = event_data(&event.payload);
    let new_balance = decimal_field(data, &["newBalance", "new_balance", "balance"]);

    match kind {
        WebhookEventKind::Transaction => {
            let amount = decimal_field(data, &["amount"])
                .ok_or_else(|| "transaction event carries no amount".to_string())?;
            let tx_kind = string_field(data, &["type", "transaction_type"])
                .and_then(|t| t.parse::<CardTransactionType>().ok())
                .unwrap_or(CardTransactionType::Charge);
            let status =
                string_field(data, &["status"]).unwrap_or_else(|| "success".to_string());

            let transaction = CardTransaction::new(
                card.card_id.clone(),
                card.user_id,
                card_money(card, amount.abs())?,
                tx_kind,
                status,
            )
            .with_provider_reference(string_field(
                data,
                &["transaction_id", "transactionId", "reference"],
            ))
            .with_raw(event.payload.clone());

            Ok(CardEffect::RecordTransaction {
                transaction,
                new_balance: new_balance.map(|b| card_money(card, b)).transpose()?,
            })
        }
        WebhookEventKind::StatusChanged => {
            let raw = string_field(data, &["status", "card_status"])
                .ok_or_else(|| "status event carries no status".to_string())?;
            let status = CardStatus::from_provider(&raw)
                .ok_or_else(|| format!("unknown card status '{}'", raw))?;
            Ok(CardEffect::SetStatus {
                status,
                transaction: None,
            })
        }
        WebhookEventKind::Blocked => Ok(CardEffect::SetStatus {
            status: CardStatus::Blocked,
            transaction: None,
        }),
        WebhookEventKind::Unblocked => Ok(CardEffect::SetStatus {
            status: CardStatus::Active,
            transaction: None,
        }),
        WebhookEventKind::Funded | WebhookEventKind::BalanceChanged => {
            let balance =
                new_balance.ok_or_else(|| format!("{} event carries no balance", event.event_type))?;
            Ok(CardEffect::SetBalance(card_money(card, balance)?))
        }
        WebhookEventKind::Unknown => Err(format!("unhandled event type '{}'", event.event_type)),
    }
}
