//! # Card Wallet Types
//!
//! Domain types and port traits for the card wallet ledger. No I/O lives here: only data
//! structures, fee and balance rules, and trait definitions.
//!
//! - `domain/` - Money, wallets, cards, trails, fee schedule and calculator
//! - `ports/` - Traits the persistence and card issuer adapters implement
//! - `dto/` - Request and response shapes for the API boundary
//! - `error/` - Domain, repository and application errors

pub mod domain;
pub mod dto;
pub mod error;
pub mod ports;

pub use domain::{
    ApplyOutcome, BalanceChange, Card, CardEffect, CardId, CardStatus, CardTransaction,
    CardTransactionType, CardType, Currency, EntryDirection, EventReceipt, FeeBreakdown,
    FeeOperation, FeeSchedule, FeeSetting, FundingAttempt, FundingAttemptStatus,
    FundingBalances, FundingCommit, LedgerAccount, Money, TransactionId, UserId, Wallet,
    WalletEntry, WalletId, WalletTransaction, WalletTransactionType, WebhookEvent,
    WebhookEventKind,
};
pub use dto::*;
pub use error::{AppError, DomainError, RepoError};
pub use ports::{CardProviderClient, LedgerRepository, ProviderError};
