//! Card issuer port.
//!
//! Implementations talk to the external card-issuing API. Workflows only see this trait,
//! never how many endpoints sit behind it.

use rust_decimal::Decimal;

use crate::domain::{CardId, CardStatus, CardType, Currency, Money};

/// Error type for card issuer calls.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    /// The issuer refused the request (4xx or an explicit failure envelope).
    #[error("Card provider rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The issuer failed on its side (5xx).
    #[error("Card provider failure ({status}): {message}")]
    RemoteFailure { status: u16, message: String },

    /// No answer in time. The outcome on the issuer side is unknown.
    #[error("Card provider timed out: {0}")]
    Timeout(String),

    #[error("Card provider unreachable: {0}")]
    Transport(String),

    #[error("Card provider returned an unusable response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Upstream HTTP status when one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Rejected { status, .. } | Self::RemoteFailure { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Payload for issuing a new card.
#[derive(Debug, Clone)]
pub struct IssueCardRequest {
    pub name_on_card: String,
    pub card_type: CardType,
    /// Principal loaded onto the card, fees excluded.
    pub amount: Money,
    pub customer_email: String,
}

/// A card the issuer confirmed.
#[derive(Debug, Clone)]
pub struct IssuedCard {
    pub card_id: CardId,
    pub customer_id: String,
    pub name_on_card: String,
    pub card_type: CardType,
    pub balance: Decimal,
    pub currency: Currency,
    pub status: CardStatus,
    pub last4: Option<String>,
    pub expiry: Option<String>,
    pub raw: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct CardFunded {
    /// Balance reported after the load; absent when the issuer omits it.
    pub balance_after: Option<Decimal>,
    pub transaction_id: Option<String>,
    pub raw: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct CardStatusChanged {
    pub status: CardStatus,
    pub raw: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct CardDetail {
    pub balance: Decimal,
    pub status: CardStatus,
    pub last4: Option<String>,
    pub expiry: Option<String>,
    pub raw: serde_json::Value,
}

/// Port trait for the card issuer.
#[async_trait::async_trait]
pub trait CardProviderClient: Send + Sync + 'static {
    async fn create_card(&self, request: IssueCardRequest) -> Result<IssuedCard, ProviderError>;

    async fn fund_card(&self, card_id: &CardId, amount: Money) -> Result<CardFunded, ProviderError>;

    async fn block_card(
        &self,
        card_id: &CardId,
        reason: Option<&str>,
    ) -> Result<CardStatusChanged, ProviderError>;

    async fn unblock_card(&self, card_id: &CardId) -> Result<CardStatusChanged, ProviderError>;

    /// Idempotent read. Implementations may retry it.
    async fn fetch_card_detail(&self, card_id: &CardId) -> Result<CardDetail, ProviderError>;
}
