//! Data Transfer Objects (DTOs) for requests and responses.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{
    ApplyOutcome, BalanceChange, Card, CardId, CardStatus, CardType, Currency, FeeBreakdown,
    FeeOperation, TransactionId, UserId, Wallet, WalletId,
};

// ─────────────────────────────────────────────────────────────────────────────
// Fee DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Query for a fee quote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeQuoteQuery {
    pub operation: FeeOperation,
    pub amount: Decimal,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeQuoteResponse {
    #[serde(flatten)]
    pub breakdown: FeeBreakdown,
    pub minimum_amount: Decimal,
}

/// Admin request to set one fee parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpsertFeeSettingRequest {
    pub key: String,
    pub value: Decimal,
    #[serde(default)]
    pub currency: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Wallet DTOs
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenWalletRequest {
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletResponse {
    pub id: WalletId,
    pub user_id: UserId,
    pub currency: Currency,
    pub balance: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl From<Wallet> for WalletResponse {
    fn from(wallet: Wallet) -> Self {
        Self {
            id: wallet.id,
            user_id: wallet.user_id,
            currency: wallet.currency(),
            balance: wallet.balance.amount(),
            updated_at: wallet.updated_at,
        }
    }
}

/// Payment-in provider that confirmed a deposit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DepositProvider {
    Moneroo,
    Nowpayments,
}

impl DepositProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            DepositProvider::Moneroo => "moneroo",
            DepositProvider::Nowpayments => "nowpayments",
        }
    }
}

impl std::fmt::Display for DepositProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A confirmed payment-in to credit to a user's wallet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditDepositRequest {
    pub user_id: UserId,
    pub currency: String,
    pub amount: Decimal,
    pub provider: DepositProvider,
    /// Provider payment reference. Crediting is idempotent on it.
    pub reference: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositResponse {
    pub wallet_id: WalletId,
    pub currency: Currency,
    pub old_balance: Decimal,
    pub new_balance: Decimal,
    pub transaction_id: Option<TransactionId>,
    /// True when this reference had already been credited.
    pub duplicate: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Card DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Request to issue a new card, billed from the wallet of the same currency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCardRequest {
    pub customer_email: String,
    pub name_on_card: String,
    pub currency: String,
    #[serde(default = "default_card_type")]
    pub card_type: String,
    /// Principal to load onto the card, fees excluded.
    pub amount: Decimal,
}

fn default_card_type() -> String {
    CardType::Visa.as_str().to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardResponse {
    pub card_id: CardId,
    pub currency: Currency,
    pub balance: Decimal,
    pub status: CardStatus,
    pub card_type: CardType,
    pub name_on_card: String,
    pub masked_number: Option<String>,
    pub expiry: Option<String>,
    pub needs_reconciliation: bool,
    pub created_at: DateTime<Utc>,
}

impl From<Card> for CardResponse {
    fn from(card: Card) -> Self {
        Self {
            currency: card.currency(),
            balance: card.balance.amount(),
            card_id: card.card_id,
            status: card.status,
            card_type: card.card_type,
            name_on_card: card.name_on_card,
            masked_number: card.masked_number,
            expiry: card.expiry,
            needs_reconciliation: card.needs_reconciliation,
            created_at: card.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCardResponse {
    pub card: CardResponse,
    pub wallet_balance: Decimal,
    pub fees: FeeBreakdown,
    pub wallet_transaction_id: Option<TransactionId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundCardRequest {
    pub amount: Decimal,
    /// Client-chosen key for this attempt. Generated when absent.
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundCardResponse {
    pub card_id: CardId,
    pub currency: Currency,
    pub card_balance: Decimal,
    pub wallet_balance: Decimal,
    pub fees: FeeBreakdown,
    pub idempotency_key: String,
    pub provider_transaction_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlockCardRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Admin DTOs
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdjustmentAction {
    Add,
    Subtract,
}

impl AdjustmentAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdjustmentAction::Add => "add",
            AdjustmentAction::Subtract => "subtract",
        }
    }
}

impl std::fmt::Display for AdjustmentAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `manage_wallet` admin action.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManageWalletRequest {
    pub action: AdjustmentAction,
    pub user_id: UserId,
    pub wallet_id: WalletId,
    pub amount: Decimal,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustedWallet {
    pub id: WalletId,
    pub currency: Currency,
    pub old_balance: Decimal,
    pub new_balance: Decimal,
    pub amount_changed: Decimal,
}

impl From<&BalanceChange> for AdjustedWallet {
    fn from(change: &BalanceChange) -> Self {
        Self {
            id: change.wallet_id,
            currency: change.currency,
            old_balance: change.old_balance,
            new_balance: change.new_balance,
            amount_changed: change.amount_changed(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManageWalletResponse {
    pub success: bool,
    pub wallet: AdjustedWallet,
    /// False when the balance changed but the audit line could not be written.
    pub transaction_recorded: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Webhook DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Envelope of an inbound issuer event.
///
/// Issuers name the fields differently. The canonical name wins when a payload carries
/// several, then the alternates are tried in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawWebhookEnvelope")]
pub struct IncomingWebhook {
    pub event_id: String,
    pub event_type: String,
    pub card_id: Option<String>,
}

#[derive(Deserialize)]
struct RawWebhookEnvelope {
    event_id: Option<String>,
    id: Option<String>,
    event_type: Option<String>,
    event: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    card_id: Option<String>,
    #[serde(rename = "cardId")]
    card_id_camel: Option<String>,
}

impl TryFrom<RawWebhookEnvelope> for IncomingWebhook {
    type Error = String;

    fn try_from(raw: RawWebhookEnvelope) -> Result<Self, Self::Error> {
        let event_id = raw
            .event_id
            .or(raw.id)
            .ok_or_else(|| "missing field `event_id`".to_string())?;
        let event_type = raw
            .event_type
            .or(raw.event)
            .or(raw.kind)
            .ok_or_else(|| "missing field `event_type`".to_string())?;
        Ok(Self {
            event_id,
            event_type,
            card_id: raw.card_id.or(raw.card_id_camel),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookAck {
    pub event_id: String,
    pub outcome: ApplyOutcome,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetryWebhooksRequest {
    #[serde(default)]
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetryWebhooksResponse {
    pub attempted: usize,
    pub applied: usize,
    pub failed: usize,
}
