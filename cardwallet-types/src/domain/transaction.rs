//! Ledger trail: wallet and card transaction records.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::card::CardId;
use super::money::{Currency, Money};
use super::wallet::{UserId, WalletId};
use crate::error::DomainError;

/// Unique identifier for a ledger record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(Uuid);

impl TransactionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    pub fn into_uuid(self) -> Uuid {
        self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TransactionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// What caused a wallet balance to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletTransactionType {
    CardCreation,
    CardFunding,
    AdminAdjustment,
    Deposit,
}

impl WalletTransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CardCreation => "card_creation",
            Self::CardFunding => "card_funding",
            Self::AdminAdjustment => "admin_adjustment",
            Self::Deposit => "deposit",
        }
    }
}

impl std::fmt::Display for WalletTransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WalletTransactionType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "card_creation" => Ok(Self::CardCreation),
            "card_funding" => Ok(Self::CardFunding),
            "admin_adjustment" => Ok(Self::AdminAdjustment),
            "deposit" => Ok(Self::Deposit),
            other => Err(DomainError::ValidationError(format!(
                "Unknown wallet transaction type: {}",
                other
            ))),
        }
    }
}

/// Immutable wallet trail entry. `amount` is signed: negative for debits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletTransaction {
    pub id: TransactionId,
    pub wallet_id: WalletId,
    pub amount: Decimal,
    pub currency: Currency,
    pub kind: WalletTransactionType,
    pub description: String,
    pub reference: String,
    pub created_at: DateTime<Utc>,
}

/// Direction of a wallet posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryDirection {
    Debit,
    Credit,
}

/// A balance movement on a wallet together with the trail line describing it.
///
/// Adapters apply the movement and append the matching [`WalletTransaction`] in one unit.
#[derive(Debug, Clone)]
pub struct WalletEntry {
    pub wallet_id: WalletId,
    pub direction: EntryDirection,
    pub amount: Money,
    pub kind: WalletTransactionType,
    pub description: String,
    pub reference: String,
    /// When set, a second entry with the same reference is refused as a conflict.
    pub unique_reference: bool,
}

impl WalletEntry {
    pub fn debit(
        wallet_id: WalletId,
        amount: Money,
        kind: WalletTransactionType,
        description: impl Into<String>,
        reference: impl Into<String>,
    ) -> Self {
        Self {
            wallet_id,
            direction: EntryDirection::Debit,
            amount,
            kind,
            description: description.into(),
            reference: reference.into(),
            unique_reference: false,
        }
    }

    pub fn credit(
        wallet_id: WalletId,
        amount: Money,
        kind: WalletTransactionType,
        description: impl Into<String>,
        reference: impl Into<String>,
    ) -> Self {
        Self {
            wallet_id,
            direction: EntryDirection::Credit,
            amount,
            kind,
            description: description.into(),
            reference: reference.into(),
            unique_reference: false,
        }
    }

    pub fn with_unique_reference(mut self) -> Self {
        self.unique_reference = true;
        self
    }

    /// Signed amount as it lands in the trail.
    pub fn signed_amount(&self) -> Decimal {
        match self.direction {
            EntryDirection::Debit => -self.amount.amount(),
            EntryDirection::Credit => self.amount.amount(),
        }
    }

    /// Builds the trail record for this entry.
    pub fn to_transaction(&self) -> WalletTransaction {
        WalletTransaction {
            id: TransactionId::new(),
            wallet_id: self.wallet_id,
            amount: self.signed_amount(),
            currency: self.amount.currency(),
            kind: self.kind,
            description: self.description.clone(),
            reference: self.reference.clone(),
            created_at: Utc::now(),
        }
    }
}

/// Result of a committed wallet posting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceChange {
    pub wallet_id: WalletId,
    pub currency: Currency,
    pub old_balance: Decimal,
    pub new_balance: Decimal,
    /// Absent when the balance moved but its trail line could not be written.
    pub transaction_id: Option<TransactionId>,
}

impl BalanceChange {
    pub fn amount_changed(&self) -> Decimal {
        self.new_balance - self.old_balance
    }
}

/// Card activity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardTransactionType {
    Fund,
    Charge,
    Block,
    Unblock,
}

impl CardTransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fund => "fund",
            Self::Charge => "charge",
            Self::Block => "block",
            Self::Unblock => "unblock",
        }
    }
}

impl std::fmt::Display for CardTransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CardTransactionType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fund" | "funding" | "credit" | "topup" => Ok(Self::Fund),
            "charge" | "debit" | "purchase" | "payment" => Ok(Self::Charge),
            "block" | "freeze" => Ok(Self::Block),
            "unblock" | "unfreeze" => Ok(Self::Unblock),
            other => Err(DomainError::ValidationError(format!(
                "Unknown card transaction type: {}",
                other
            ))),
        }
    }
}

/// Immutable card trail entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardTransaction {
    pub id: TransactionId,
    pub card_id: CardId,
    pub user_id: UserId,
    pub amount: Money,
    pub kind: CardTransactionType,
    pub status: String,
    /// Issuer-side transaction id when one was reported.
    pub provider_transaction_id: Option<String>,
    pub raw_data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl CardTransaction {
    pub fn new(
        card_id: CardId,
        user_id: UserId,
        amount: Money,
        kind: CardTransactionType,
        status: impl Into<String>,
    ) -> Self {
        Self {
            id: TransactionId::new(),
            card_id,
            user_id,
            amount,
            kind,
            status: status.into(),
            provider_transaction_id: None,
            raw_data: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }

    pub fn with_provider_reference(mut self, transaction_id: Option<String>) -> Self {
        self.provider_transaction_id = transaction_id;
        self
    }

    pub fn with_raw(mut self, raw: serde_json::Value) -> Self {
        self.raw_data = raw;
        self
    }
}
