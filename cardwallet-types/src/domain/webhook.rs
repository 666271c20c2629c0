//! Inbound issuer events and the effects they have on card records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::card::{Card, CardId, CardStatus};
use super::money::Money;
use super::transaction::CardTransaction;
use super::wallet::UserId;
use crate::error::DomainError;

/// A verified issuer event. `event_id` is the deduplication key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub event_id: String,
    pub event_type: String,
    pub card_id: Option<CardId>,
    /// Resolved from the card when the event is recorded.
    pub user_id: Option<UserId>,
    pub payload: serde_json::Value,
    pub signature_valid: bool,
    pub processed: bool,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub received_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl WebhookEvent {
    pub fn new(
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        card_id: Option<CardId>,
        payload: serde_json::Value,
        signature_valid: bool,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            event_type: event_type.into(),
            card_id,
            user_id: None,
            payload,
            signature_valid,
            processed: false,
            attempts: 0,
            last_error: None,
            received_at: Utc::now(),
            processed_at: None,
        }
    }
}

/// The event types the reconciler understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookEventKind {
    Transaction,
    StatusChanged,
    Blocked,
    Unblocked,
    Funded,
    BalanceChanged,
    Unknown,
}

impl WebhookEventKind {
    pub fn parse(event_type: &str) -> Self {
        match event_type.trim().to_ascii_lowercase().replace('.', "_").as_str() {
            "transaction" | "card_transaction" => Self::Transaction,
            "status_changed" | "card_status_changed" => Self::StatusChanged,
            "blocked" | "card_blocked" | "frozen" => Self::Blocked,
            "unblocked" | "card_unblocked" | "unfrozen" => Self::Unblocked,
            "funded" | "card_funded" => Self::Funded,
            "balance_changed" | "card_balance_changed" => Self::BalanceChanged,
            _ => Self::Unknown,
        }
    }
}

/// Local mutation derived from an event, applied atomically by the repository.
#[derive(Debug, Clone)]
pub enum CardEffect {
    /// Append a card trail line, optionally overwriting the balance.
    RecordTransaction {
        transaction: CardTransaction,
        new_balance: Option<Money>,
    },
    /// Overwrite the status, optionally with a trail line.
    SetStatus {
        status: CardStatus,
        transaction: Option<CardTransaction>,
    },
    SetBalance(Money),
    /// Refresh from an issuer read.
    Sync {
        balance: Money,
        status: CardStatus,
        masked_number: Option<String>,
        expiry: Option<String>,
    },
}

impl CardEffect {
    /// Applies the effect to `card` and returns the trail line to append, if any.
    pub fn apply_to(self, card: &mut Card) -> Result<Option<CardTransaction>, DomainError> {
        match self {
            CardEffect::RecordTransaction {
                transaction,
                new_balance,
            } => {
                if let Some(balance) = new_balance {
                    card.overwrite_balance(balance)?;
                }
                Ok(Some(transaction))
            }
            CardEffect::SetStatus {
                status,
                transaction,
            } => {
                card.set_status(status);
                Ok(transaction)
            }
            CardEffect::SetBalance(balance) => {
                card.overwrite_balance(balance)?;
                Ok(None)
            }
            CardEffect::Sync {
                balance,
                status,
                masked_number,
                expiry,
            } => {
                card.overwrite_balance(balance)?;
                card.set_status(status);
                if masked_number.is_some() {
                    card.masked_number = masked_number;
                }
                if expiry.is_some() {
                    card.expiry = expiry;
                }
                Ok(None)
            }
        }
    }
}

/// Marks which recorded event an effect belongs to, so the repository can flag it processed
/// in the same unit.
#[derive(Debug, Clone)]
pub struct EventReceipt {
    pub event_id: String,
}

/// Result of applying an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyOutcome {
    Applied,
    Duplicate,
    /// Recorded and acknowledged, but the type carries no ledger effect.
    Ignored,
}
