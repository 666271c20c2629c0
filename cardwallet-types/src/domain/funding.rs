//! Card funding attempts and the atomic funding commit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::card::CardId;
use super::money::Money;
use super::transaction::{CardTransaction, WalletEntry};
use super::wallet::UserId;
use crate::error::DomainError;

/// Outcome recorded against a funding idempotency key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FundingAttemptStatus {
    Pending,
    Succeeded,
    Failed,
    NeedsReconciliation,
}

impl FundingAttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::NeedsReconciliation => "needs_reconciliation",
        }
    }
}

impl std::fmt::Display for FundingAttemptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FundingAttemptStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            "needs_reconciliation" => Ok(Self::NeedsReconciliation),
            other => Err(DomainError::ValidationError(format!(
                "Unknown funding attempt status: {}",
                other
            ))),
        }
    }
}

/// Durable record of one funding submission, keyed by the client idempotency key.
///
/// It is written before the issuer is called so a retried request with the same key is
/// recognised even when the first one timed out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundingAttempt {
    pub idempotency_key: String,
    pub user_id: UserId,
    pub card_id: CardId,
    pub amount: Money,
    pub status: FundingAttemptStatus,
    pub detail: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FundingAttempt {
    pub fn pending(
        idempotency_key: impl Into<String>,
        user_id: UserId,
        card_id: CardId,
        amount: Money,
    ) -> Self {
        let now = Utc::now();
        Self {
            idempotency_key: idempotency_key.into(),
            user_id,
            card_id,
            amount,
            status: FundingAttemptStatus::Pending,
            detail: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Everything a successful funding writes, applied as one unit:
/// wallet debit + wallet trail line, card balance + card trail line, attempt marked succeeded.
#[derive(Debug, Clone)]
pub struct FundingCommit {
    pub user_id: UserId,
    pub idempotency_key: String,
    pub wallet_debit: WalletEntry,
    pub card_id: CardId,
    pub card_balance: Money,
    pub card_transaction: CardTransaction,
}

/// Balances after a committed funding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingBalances {
    pub wallet_balance: Money,
    pub card_balance: Money,
}
