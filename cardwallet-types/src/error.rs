//! Error types for the card wallet ledger.

use serde_json::json;

use crate::domain::{Currency, Money};
use crate::ports::ProviderError;

/// Domain-level errors (business rule violations).
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("Amount cannot be negative")]
    NegativeAmount,

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Currency mismatch: expected {expected}, got {got}")]
    CurrencyMismatch { expected: Currency, got: Currency },

    #[error("Insufficient funds: available {available}, requested {requested}")]
    InsufficientFunds { available: Money, requested: Money },

    #[error("Amount {amount} is below the minimum of {minimum}")]
    BelowMinimum { amount: Money, minimum: Money },

    #[error("Unsupported currency: {0}")]
    UnsupportedCurrency(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Repository-level errors (data access failures).
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Entity not found")]
    NotFound,

    #[error("Conflict: {0}")]
    Conflict(String),
}

/// Workflow-facing errors. Each carries a stable code and, where amounts are involved,
/// machine-readable details.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Amount {amount} is below the minimum of {minimum}")]
    BelowMinimum { amount: Money, minimum: Money },

    #[error("Insufficient funds: available {available}, required {required}, short by {shortfall}")]
    InsufficientFunds {
        available: Money,
        required: Money,
        shortfall: Money,
    },

    #[error("Currency mismatch: expected {expected}, got {got}")]
    CurrencyMismatch { expected: Currency, got: Currency },

    #[error("No {0} wallet found for this user")]
    WalletNotFound(Currency),

    #[error("Card limit reached: at most {limit} cards per user")]
    CardLimitReached { limit: u32 },

    #[error("Not found or not owned by caller: {0}")]
    NotFoundOrUnauthorized(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Funding attempt '{key}' was already submitted ({status})")]
    DuplicateFundingAttempt { key: String, status: String },

    #[error("Reconcile error: {0}")]
    Reconcile(String),

    /// Money moved at the issuer but the local ledger could not follow.
    #[error("Compensation needed: {0}")]
    CompensationNeeded(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::InvalidAmount(_) => "INVALID_AMOUNT",
            AppError::BelowMinimum { .. } => "BELOW_MINIMUM",
            AppError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            AppError::CurrencyMismatch { .. } => "CURRENCY_MISMATCH",
            AppError::WalletNotFound(_) => "WALLET_NOT_FOUND",
            AppError::CardLimitReached { .. } => "CARD_LIMIT_REACHED",
            AppError::NotFoundOrUnauthorized(_) => "NOT_FOUND_OR_UNAUTHORIZED",
            AppError::Provider(ProviderError::Rejected { .. }) => "PROVIDER_REJECTED",
            AppError::Provider(ProviderError::Timeout(_)) => "PROVIDER_TIMEOUT",
            AppError::Provider(_) => "PROVIDER_FAILURE",
            AppError::DuplicateFundingAttempt { .. } => "DUPLICATE_FUNDING_ATTEMPT",
            AppError::Reconcile(_) => "RECONCILE_ERROR",
            AppError::CompensationNeeded(_) => "COMPENSATION_NEEDED",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Amounts and currencies involved, for rendering a user-facing message.
    pub fn details(&self) -> serde_json::Value {
        match self {
            AppError::BelowMinimum { amount, minimum } => json!({
                "amount": amount.amount(),
                "minimum": minimum.amount(),
                "currency": minimum.currency(),
            }),
            AppError::InsufficientFunds {
                available,
                required,
                shortfall,
            } => json!({
                "available": available.amount(),
                "required": required.amount(),
                "shortfall": shortfall.amount(),
                "currency": required.currency(),
            }),
            AppError::CurrencyMismatch { expected, got } => json!({
                "expected": expected,
                "got": got,
            }),
            AppError::WalletNotFound(currency) => json!({ "currency": currency }),
            AppError::CardLimitReached { limit } => json!({ "limit": limit }),
            AppError::Provider(err) => json!({
                "provider_status": err.status(),
                "message": err.to_string(),
            }),
            AppError::DuplicateFundingAttempt { key, status } => json!({
                "idempotency_key": key,
                "status": status,
            }),
            _ => serde_json::Value::Null,
        }
    }
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::InsufficientFunds {
                available,
                requested,
            } => AppError::InsufficientFunds {
                shortfall: available.shortfall_to(&requested),
                available,
                required: requested,
            },
            DomainError::BelowMinimum { amount, minimum } => {
                AppError::BelowMinimum { amount, minimum }
            }
            DomainError::CurrencyMismatch { expected, got } => {
                AppError::CurrencyMismatch { expected, got }
            }
            DomainError::NegativeAmount => {
                AppError::InvalidAmount("Amount cannot be negative".into())
            }
            DomainError::InvalidAmount(msg) => AppError::InvalidAmount(msg),
            DomainError::UnsupportedCurrency(code) => {
                AppError::Validation(format!("Unsupported currency: {}", code))
            }
            DomainError::ValidationError(msg) => AppError::Validation(msg),
        }
    }
}

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::Domain(e) => e.into(),
            RepoError::NotFound => AppError::NotFound("Resource not found".into()),
            RepoError::Database(e) => AppError::Internal(e),
            RepoError::Transaction(e) => AppError::Internal(e),
            RepoError::Conflict(e) => AppError::Conflict(e),
        }
    }
}
