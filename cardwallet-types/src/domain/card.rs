//! Virtual card domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ledger::LedgerAccount;
use super::money::{Currency, Money};
use super::wallet::UserId;
use crate::error::DomainError;

/// Issuer-assigned card identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CardId(String);

impl CardId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Display for CardId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle status of a card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardStatus {
    Active,
    Blocked,
    Inactive,
}

impl CardStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CardStatus::Active => "active",
            CardStatus::Blocked => "blocked",
            CardStatus::Inactive => "inactive",
        }
    }

    /// Maps the issuer's status vocabulary onto ours.
    pub fn from_provider(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "active" | "activated" | "unfrozen" | "unfreeze" | "unblocked" => {
                Some(CardStatus::Active)
            }
            "blocked" | "frozen" | "freeze" | "suspended" => Some(CardStatus::Blocked),
            "inactive" | "terminated" | "cancelled" | "canceled" | "expired" => {
                Some(CardStatus::Inactive)
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for CardStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CardStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CardStatus::from_provider(s)
            .ok_or_else(|| DomainError::ValidationError(format!("Unknown card status: {}", s)))
    }
}

/// Card network requested at issuance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardType {
    Visa,
    Mastercard,
}

impl CardType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CardType::Visa => "visa",
            CardType::Mastercard => "mastercard",
        }
    }
}

impl std::fmt::Display for CardType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CardType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "visa" => Ok(CardType::Visa),
            "mastercard" => Ok(CardType::Mastercard),
            other => Err(DomainError::ValidationError(format!(
                "Unsupported card type: {}",
                other
            ))),
        }
    }
}

/// A virtual card issued by the external provider.
///
/// The balance mirrors what the provider reports but is authoritative locally between syncs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Card {
    pub card_id: CardId,
    pub user_id: UserId,
    pub customer_id: String,
    pub balance: Money,
    pub status: CardStatus,
    pub card_type: CardType,
    pub name_on_card: String,
    pub masked_number: Option<String>,
    pub expiry: Option<String>,
    pub raw_provider_response: serde_json::Value,
    /// Set when money moved at the provider but the local ledger could not follow.
    pub needs_reconciliation: bool,
    pub reconciliation_note: Option<String>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Card {
    pub fn currency(&self) -> Currency {
        self.balance.currency()
    }

    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.user_id == user_id
    }

    /// Renders the last four digits the way the UI shows them.
    pub fn mask_last4(last4: &str) -> String {
        format!("**** **** **** {}", last4)
    }

    /// Replaces the balance with an issuer-reported figure.
    pub fn overwrite_balance(&mut self, balance: Money) -> Result<(), DomainError> {
        if balance.currency() != self.currency() {
            return Err(DomainError::CurrencyMismatch {
                expected: self.currency(),
                got: balance.currency(),
            });
        }
        self.store_balance(balance);
        Ok(())
    }

    pub fn set_status(&mut self, status: CardStatus) {
        self.status = status;
        self.version += 1;
        self.updated_at = Utc::now();
    }
}

impl LedgerAccount for Card {
    fn balance(&self) -> Money {
        self.balance
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn store_balance(&mut self, balance: Money) {
        self.balance = balance;
        self.version += 1;
        self.updated_at = Utc::now();
    }
}
