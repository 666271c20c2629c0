//! Database row types and their conversion to domain models.
//!
//! SQLite stores ids, decimals and timestamps as TEXT, PostgreSQL uses native types, so each
//! backend has its own row structs.

use std::fmt::Display;
use std::str::FromStr;

use cardwallet_types::{Currency, Money, RepoError};
use rust_decimal::Decimal;

// ─────────────────────────────────────────────────────────────────────────────
// Column lists (shared by both backends)
// ─────────────────────────────────────────────────────────────────────────────

pub const FEE_COLUMNS: &str = "key, value, currency, updated_at";

pub const WALLET_COLUMNS: &str = "id, user_id, currency, balance, version, created_at, updated_at";

pub const WALLET_TX_COLUMNS: &str =
    "id, wallet_id, amount, currency, kind, description, reference, created_at";

pub const CARD_COLUMNS: &str = "card_id, user_id, customer_id, currency, balance, status, \
     card_type, name_on_card, masked_number, expiry, raw_provider_response, \
     needs_reconciliation, reconciliation_note, version, created_at, updated_at";

pub const CARD_TX_COLUMNS: &str = "id, card_id, user_id, amount, currency, kind, status, \
     provider_transaction_id, raw_data, created_at";

pub const FUNDING_COLUMNS: &str =
    "idempotency_key, user_id, card_id, amount, currency, status, detail, created_at, updated_at";

pub const WEBHOOK_COLUMNS: &str = "event_id, event_type, card_id, user_id, payload, \
     signature_valid, processed, attempts, last_error, received_at, processed_at";

// ─────────────────────────────────────────────────────────────────────────────
// Parsing helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Parses a stored column value, reporting corrupt data as a database error.
pub fn parse_field<T>(raw: &str) -> Result<T, RepoError>
where
    T: FromStr,
    T::Err: Display,
{
    raw.parse::<T>()
        .map_err(|e| RepoError::Database(format!("Corrupt column value '{}': {}", raw, e)))
}

pub fn money(amount: Decimal, currency: &str) -> Result<Money, RepoError> {
    let currency: Currency = parse_field(currency)?;
    Money::new(amount, currency).map_err(RepoError::Domain)
}

// ─────────────────────────────────────────────────────────────────────────────
// SQLite rows
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(feature = "sqlite")]
pub mod lite {
    use chrono::{DateTime, SecondsFormat, Utc};
    use rust_decimal::Decimal;
    use sqlx::FromRow;
    use uuid::Uuid;

    use cardwallet_types::{
        Card, CardId, CardTransaction, FeeSetting, FundingAttempt, RepoError, TransactionId,
        UserId, Wallet, WalletId, WalletTransaction, WebhookEvent,
    };

    use super::{money, parse_field};

    /// Fixed-width RFC 3339 so TEXT ordering matches time ordering.
    pub fn ts(dt: DateTime<Utc>) -> String {
        dt.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    pub fn parse_ts(raw: &str) -> Result<DateTime<Utc>, RepoError> {
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| RepoError::Database(e.to_string()))
    }

    fn parse_json(raw: &str) -> Result<serde_json::Value, RepoError> {
        serde_json::from_str(raw).map_err(|e| RepoError::Database(e.to_string()))
    }

    #[derive(FromRow)]
    pub struct FeeRow {
        pub key: String,
        pub value: String,
        pub currency: Option<String>,
        pub updated_at: String,
    }

    impl FeeRow {
        pub fn into_domain(self) -> Result<FeeSetting, RepoError> {
            Ok(FeeSetting {
                value: parse_field::<Decimal>(&self.value)?,
                currency: self.currency.as_deref().map(parse_field).transpose()?,
                updated_at: parse_ts(&self.updated_at)?,
                key: self.key,
            })
        }
    }

    #[derive(FromRow)]
    pub struct WalletRow {
        pub id: String,
        pub user_id: String,
        pub currency: String,
        pub balance: String,
        pub version: i64,
        pub created_at: String,
        pub updated_at: String,
    }

    impl WalletRow {
        pub fn into_domain(self) -> Result<Wallet, RepoError> {
            Ok(Wallet {
                id: WalletId::from_uuid(parse_field::<Uuid>(&self.id)?),
                user_id: UserId::from_uuid(parse_field::<Uuid>(&self.user_id)?),
                balance: money(parse_field(&self.balance)?, &self.currency)?,
                version: self.version,
                created_at: parse_ts(&self.created_at)?,
                updated_at: parse_ts(&self.updated_at)?,
            })
        }
    }

    #[derive(FromRow)]
    pub struct WalletTxRow {
        pub id: String,
        pub wallet_id: String,
        pub amount: String,
        pub currency: String,
        pub kind: String,
        pub description: String,
        pub reference: String,
        pub created_at: String,
    }

    impl WalletTxRow {
        pub fn into_domain(self) -> Result<WalletTransaction, RepoError> {
            Ok(WalletTransaction {
                id: TransactionId::from_uuid(parse_field::<Uuid>(&self.id)?),
                wallet_id: WalletId::from_uuid(parse_field::<Uuid>(&self.wallet_id)?),
                amount: parse_field(&self.amount)?,
                currency: parse_field(&self.currency)?,
                kind: parse_field(&self.kind)?,
                description: self.description,
                reference: self.reference,
                created_at: parse_ts(&self.created_at)?,
            })
        }
    }

    #[derive(FromRow)]
    pub struct CardRow {
        pub card_id: String,
        pub user_id: String,
        pub customer_id: String,
        pub currency: String,
        pub balance: String,
        pub status: String,
        pub card_type: String,
        pub name_on_card: String,
        pub masked_number: Option<String>,
        pub expiry: Option<String>,
        pub raw_provider_response: String,
        pub needs_reconciliation: i64,
        pub reconciliation_note: Option<String>,
        pub version: i64,
        pub created_at: String,
        pub updated_at: String,
    }

    impl CardRow {
        pub fn into_domain(self) -> Result<Card, RepoError> {
            Ok(Card {
                card_id: CardId::new(self.card_id),
                user_id: UserId::from_uuid(parse_field::<Uuid>(&self.user_id)?),
                customer_id: self.customer_id,
                balance: money(parse_field(&self.balance)?, &self.currency)?,
                status: parse_field(&self.status)?,
                card_type: parse_field(&self.card_type)?,
                name_on_card: self.name_on_card,
                masked_number: self.masked_number,
                expiry: self.expiry,
                raw_provider_response: parse_json(&self.raw_provider_response)?,
                needs_reconciliation: self.needs_reconciliation != 0,
                reconciliation_note: self.reconciliation_note,
                version: self.version,
                created_at: parse_ts(&self.created_at)?,
                updated_at: parse_ts(&self.updated_at)?,
            })
        }
    }

    #[derive(FromRow)]
    pub struct CardTxRow {
        pub id: String,
        pub card_id: String,
        pub user_id: String,
        pub amount: String,
        pub currency: String,
        pub kind: String,
        pub status: String,
        pub provider_transaction_id: Option<String>,
        pub raw_data: String,
        pub created_at: String,
    }

    impl CardTxRow {
        pub fn into_domain(self) -> Result<CardTransaction, RepoError> {
            Ok(CardTransaction {
                id: TransactionId::from_uuid(parse_field::<Uuid>(&self.id)?),
                card_id: CardId::new(self.card_id),
                user_id: UserId::from_uuid(parse_field::<Uuid>(&self.user_id)?),
                amount: money(parse_field(&self.amount)?, &self.currency)?,
                kind: parse_field(&self.kind)?,
                status: self.status,
                provider_transaction_id: self.provider_transaction_id,
                raw_data: parse_json(&self.raw_data)?,
                created_at: parse_ts(&self.created_at)?,
            })
        }
    }

    #[derive(FromRow)]
    pub struct FundingRow {
        pub idempotency_key: String,
        pub user_id: String,
        pub card_id: String,
        pub amount: String,
        pub currency: String,
        pub status: String,
        pub detail: Option<String>,
        pub created_at: String,
        pub updated_at: String,
    }

    impl FundingRow {
        pub fn into_domain(self) -> Result<FundingAttempt, RepoError> {
            Ok(FundingAttempt {
                idempotency_key: self.idempotency_key,
                user_id: UserId::from_uuid(parse_field::<Uuid>(&self.user_id)?),
                card_id: CardId::new(self.card_id),
                amount: money(parse_field(&self.amount)?, &self.currency)?,
                status: parse_field(&self.status)?,
                detail: self.detail,
                created_at: parse_ts(&self.created_at)?,
                updated_at: parse_ts(&self.updated_at)?,
            })
        }
    }

    #[derive(FromRow)]
    pub struct WebhookRow {
        pub event_id: String,
        pub event_type: String,
        pub card_id: Option<String>,
        pub user_id: Option<String>,
        pub payload: String,
        pub signature_valid: i64,
        pub processed: i64,
        pub attempts: i32,
        pub last_error: Option<String>,
        pub received_at: String,
        pub processed_at: Option<String>,
    }

    impl WebhookRow {
        pub fn into_domain(self) -> Result<WebhookEvent, RepoError> {
            Ok(WebhookEvent {
                event_id: self.event_id,
                event_type: self.event_type,
                card_id: self.card_id.map(CardId::new),
                user_id: self
                    .user_id
                    .as_deref()
                    .map(parse_field::<Uuid>)
                    .transpose()?
                    .map(UserId::from_uuid),
                payload: parse_json(&self.payload)?,
                signature_valid: self.signature_valid != 0,
                processed: self.processed != 0,
                attempts: self.attempts,
                last_error: self.last_error,
                received_at: parse_ts(&self.received_at)?,
                processed_at: self.processed_at.as_deref().map(parse_ts).transpose()?,
            })
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// PostgreSQL rows
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(feature = "postgres")]
pub mod pg {
    use chrono::{DateTime, Utc};
    use rust_decimal::Decimal;
    use sqlx::FromRow;
    use uuid::Uuid;

    use cardwallet_types::{
        Card, CardId, CardTransaction, FeeSetting, FundingAttempt, RepoError, TransactionId,
        UserId, Wallet, WalletId, WalletTransaction, WebhookEvent,
    };

    use super::{money, parse_field};

    #[derive(FromRow)]
    pub struct FeeRow {
        pub key: String,
        pub value: Decimal,
        pub currency: Option<String>,
        pub updated_at: DateTime<Utc>,
    }

    impl FeeRow {
        pub fn into_domain(self) -> Result<FeeSetting, RepoError> {
            Ok(FeeSetting {
                key: self.key,
                value: self.value,
                currency: self.currency.as_deref().map(parse_field).transpose()?,
                updated_at: self.updated_at,
            })
        }
    }

    #[derive(FromRow)]
    pub struct WalletRow {
        pub id: Uuid,
        pub user_id: Uuid,
        pub currency: String,
        pub balance: Decimal,
        pub version: i64,
        pub created_at: DateTime<Utc>,
        pub updated_at: DateTime<Utc>,
    }

    impl WalletRow {
        pub fn into_domain(self) -> Result<Wallet, RepoError> {
            Ok(Wallet {
                id: WalletId::from_uuid(self.id),
                user_id: UserId::from_uuid(self.user_id),
                balance: money(self.balance, &self.currency)?,
                version: self.version,
                created_at: self.created_at,
                updated_at: self.updated_at,
            })
        }
    }

    #[derive(FromRow)]
    pub struct WalletTxRow {
        pub id: Uuid,
        pub wallet_id: Uuid,
        pub amount: Decimal,
        pub currency: String,
        pub kind: String,
        pub description: String,
        pub reference: String,
        pub created_at: DateTime<Utc>,
    }

    impl WalletTxRow {
        pub fn into_domain(self) -> Result<WalletTransaction, RepoError> {
            Ok(WalletTransaction {
                id: TransactionId::from_uuid(self.id),
                wallet_id: WalletId::from_uuid(self.wallet_id),
                amount: self.amount,
                currency: parse_field(&self.currency)?,
                kind: parse_field(&self.kind)?,
                description: self.description,
                reference: self.reference,
                created_at: self.created_at,
            })
        }
    }

    #[derive(FromRow)]
    pub struct CardRow {
        pub card_id: String,
        pub user_id: Uuid,
        pub customer_id: String,
        pub currency: String,
        pub balance: Decimal,
        pub status: String,
        pub card_type: String,
        pub name_on_card: String,
        pub masked_number: Option<String>,
        pub expiry: Option<String>,
        pub raw_provider_response: serde_json::Value,
        pub needs_reconciliation: bool,
        pub reconciliation_note: Option<String>,
        pub version: i64,
        pub created_at: DateTime<Utc>,
        pub updated_at: DateTime<Utc>,
    }

    impl CardRow {
        pub fn into_domain(self) -> Result<Card, RepoError> {
            Ok(Card {
                card_id: CardId::new(self.card_id),
                user_id: UserId::from_uuid(self.user_id),
                customer_id: self.customer_id,
                balance: money(self.balance, &self.currency)?,
                status: parse_field(&self.status)?,
                card_type: parse_field(&self.card_type)?,
                name_on_card: self.name_on_card,
                masked_number: self.masked_number,
                expiry: self.expiry,
                raw_provider_response: self.raw_provider_response,
                needs_reconciliation: self.needs_reconciliation,
                reconciliation_note: self.reconciliation_note,
                version: self.version,
                created_at: self.created_at,
                updated_at: self.updated_at,
            })
        }
    }

    #[derive(FromRow)]
    pub struct CardTxRow {
        pub id: Uuid,
        pub card_id: String,
        pub user_id: Uuid,
        pub amount: Decimal,
        pub currency: String,
        pub kind: String,
        pub status: String,
        pub provider_transaction_id: Option<String>,
        pub raw_data: serde_json::Value,
        pub created_at: DateTime<Utc>,
    }

    impl CardTxRow {
        pub fn into_domain(self) -> Result<CardTransaction, RepoError> {
            Ok(CardTransaction {
                id: TransactionId::from_uuid(self.id),
                card_id: CardId::new(self.card_id),
                user_id: UserId::from_uuid(self.user_id),
                amount: money(self.amount, &self.currency)?,
                kind: parse_field(&self.kind)?,
                status: self.status,
                provider_transaction_id: self.provider_transaction_id,
                raw_data: self.raw_data,
                created_at: self.created_at,
            })
        }
    }

    #[derive(FromRow)]
    pub struct FundingRow {
        pub idempotency_key: String,
        pub user_id: Uuid,
        pub card_id: String,
        pub amount: Decimal,
        pub currency: String,
        pub status: String,
        pub detail: Option<String>,
        pub created_at: DateTime<Utc>,
        pub updated_at: DateTime<Utc>,
    }

    impl FundingRow {
        pub fn into_domain(self) -> Result<FundingAttempt, RepoError> {
            Ok(FundingAttempt {
                idempotency_key: self.idempotency_key,
                user_id: UserId::from_uuid(self.user_id),
                card_id: CardId::new(self.card_id),
                amount: money(self.amount, &self.currency)?,
                status: parse_field(&self.status)?,
                detail: self.detail,
                created_at: self.created_at,
                updated_at: self.updated_at,
            })
        }
    }

    #[derive(FromRow)]
    pub struct WebhookRow {
        pub event_id: String,
        pub event_type: String,
        pub card_id: Option<String>,
        pub user_id: Option<Uuid>,
        pub payload: serde_json::Value,
        pub signature_valid: bool,
        pub processed: bool,
        pub attempts: i32,
        pub last_error: Option<String>,
        pub received_at: DateTime<Utc>,
        pub processed_at: Option<DateTime<Utc>>,
    }

    impl WebhookRow {
        pub fn into_domain(self) -> Result<WebhookEvent, RepoError> {
            Ok(WebhookEvent {
                event_id: self.event_id,
                event_type: self.event_type,
                card_id: self.card_id.map(CardId::new),
                user_id: self.user_id.map(UserId::from_uuid),
                payload: self.payload,
                signature_valid: self.signature_valid,
                processed: self.processed,
                attempts: self.attempts,
                last_error: self.last_error,
                received_at: self.received_at,
                processed_at: self.processed_at,
            })
        }
    }
}
