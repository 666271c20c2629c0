//! Domain models for the card wallet ledger.

pub mod card;
pub mod fee;
pub mod funding;
pub mod ledger;
pub mod money;
pub mod transaction;
pub mod wallet;
pub mod webhook;

pub use card::{Card, CardId, CardStatus, CardType};
pub use fee::{
    FeeBreakdown, FeeOperation, FeeSchedule, FeeSetting, compute_fees, minimum_amount, quote,
};
pub use funding::{FundingAttempt, FundingAttemptStatus, FundingBalances, FundingCommit};
pub use ledger::LedgerAccount;
pub use money::{Currency, Money};
pub use transaction::{
    BalanceChange, CardTransaction, CardTransactionType, EntryDirection, TransactionId,
    WalletEntry, WalletTransaction, WalletTransactionType,
};
pub use wallet::{UserId, Wallet, WalletId};
pub use webhook::{ApplyOutcome, CardEffect, EventReceipt, WebhookEvent, WebhookEventKind};
