//! # Strowallet Client
//!
//! Card issuer adapter implementing [`CardProviderClient`] against the Strowallet
//! `bitvcard` API.
//!
//! Every call walks the configured base URLs in order. Mutating calls move on to the next
//! endpoint after any failure except a timeout, since a timed out create or fund may have
//! gone through. Card detail reads repeat the whole walk a few times.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

use cardwallet_types::ports::{
    CardDetail, CardFunded, CardStatusChanged, IssueCardRequest, IssuedCard,
};
use cardwallet_types::{
    CardId, CardProviderClient, CardStatus, CardType, Currency, Money, ProviderError,
};

const CREATE_CARD_PATH: &str = "/api/bitvcard/create-card/";
const FUND_CARD_PATH: &str = "/api/bitvcard/fund-card/";
const CARD_DETAIL_PATH: &str = "/api/bitvcard/fetch-card-detail/";
const CARD_ACTION_PATH: &str = "/api/bitvcard/action/status/";

/// Error type for building a client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP client could not be built: {0}")]
    Http(#[from] reqwest::Error),

    #[error("At least one base URL is required")]
    NoEndpoints,

    #[error("Public key is required")]
    MissingPublicKey,
}

/// Connection settings for [`StrowalletClient`].
#[derive(Debug, Clone)]
pub struct StrowalletConfig {
    /// Tried in order.
    pub base_urls: Vec<String>,
    pub public_key: String,
    /// `sandbox` on test accounts, absent in production.
    pub mode: Option<String>,
    /// Bound on a single HTTP request to one endpoint.
    pub request_timeout: Duration,
    /// Full walks over the endpoints for card detail reads.
    pub read_attempts: u32,
    pub retry_backoff: Duration,
}

impl StrowalletConfig {
    pub fn new(base_urls: Vec<String>, public_key: impl Into<String>) -> Self {
        Self {
            base_urls,
            public_key: public_key.into(),
            mode: None,
            request_timeout: Duration::from_secs(10),
            read_attempts: 2,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallKind {
    Mutating,
    Read,
}

/// Strowallet card issuer.
pub struct StrowalletClient {
    base_urls: Vec<String>,
    public_key: String,
    mode: Option<String>,
    read_attempts: u32,
    retry_backoff: Duration,
    request_timeout: Duration,
    http: Client,
}

impl StrowalletClient {
    pub fn new(config: StrowalletConfig) -> Result<Self, ClientError> {
        let base_urls: Vec<String> = config
            .base_urls
            .iter()
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty())
            .collect();
        if base_urls.is_empty() {
            return Err(ClientError::NoEndpoints);
        }
        if config.public_key.trim().is_empty() {
            return Err(ClientError::MissingPublicKey);
        }

        let http = Client::builder().timeout(config.request_timeout).build()?;

        Ok(Self {
            base_urls,
            public_key: config.public_key,
            mode: config.mode.filter(|m| !m.trim().is_empty()),
            read_attempts: config.read_attempts.max(1),
            retry_backoff: config.retry_backoff,
            request_timeout: config.request_timeout,
            http,
        })
    }

    pub fn base_urls(&self) -> &[String] {
        &self.base_urls
    }

    /// Longest a call can take when every endpoint hangs on every walk, plus one second of slack.
    ///
    /// A caller bounding issuer calls with less than this cuts the fallback walk short.
    pub fn call_budget(&self) -> Duration {
        let endpoints = u32::try_from(self.base_urls.len()).unwrap_or(u32::MAX);
        self.request_timeout
            .saturating_mul(endpoints.saturating_mul(self.read_attempts))
            .saturating_add(self.retry_backoff.saturating_mul(self.read_attempts - 1))
            .saturating_add(Duration::from_secs(1))
    }

    /// Adds the credentials every request body carries.
    fn body(&self, fields: Value) -> Value {
        let mut body = match fields {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        body.insert("public_key".into(), json!(self.public_key));
        if let Some(mode) = &self.mode {
            body.insert("mode".into(), json!(mode));
        }
        Value::Object(body)
    }

    async fn call(
        &self,
        operation: &'static str,
        path: &str,
        body: Value,
        kind: CallKind,
    ) -> Result<Value, ProviderError> {
        let walks = match kind {
            CallKind::Mutating => 1,
            CallKind::Read => self.read_attempts,
        };
        let mut last_error = ProviderError::Transport("no endpoint attempted".into());

        for walk in 1..=walks {
            for (index, base) in self.base_urls.iter().enumerate() {
                debug!(operation, endpoint = index, walk, "calling card issuer");
                match self.post_once(base, path, &body).await {
                    Ok(envelope) => {
                        if index > 0 || walk > 1 {
                            info!(operation, endpoint = index, walk, "card issuer answered on fallback");
                        }
                        return Ok(envelope);
                    }
                    Err(e) if e.is_timeout() && kind == CallKind::Mutating => {
                        warn!(operation, endpoint = index, error = %e, "card issuer timed out, outcome unknown");
                        return Err(e);
                    }
                    Err(e) => {
                        warn!(operation, endpoint = index, walk, error = %e, "card issuer call failed");
                        last_error = e;
                    }
                }
            }
            if walk < walks {
                tokio::time::sleep(self.retry_backoff).await;
            }
        }

        Err(last_error)
    }

    async fn post_once(&self, base: &str, path: &str, body: &Value) -> Result<Value, ProviderError> {
        let response = self
            .http
            .post(format!("{}{}", base, path))
            .json(body)
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        let text = response.text().await.map_err(request_error)?;
        let envelope = serde_json::from_str::<Value>(&text).ok();

        if status.is_client_error() {
            return Err(ProviderError::Rejected {
                status: status.as_u16(),
                message: failure_message(envelope.as_ref(), &text),
            });
        }
        if !status.is_success() {
            return Err(ProviderError::RemoteFailure {
                status: status.as_u16(),
                message: failure_message(envelope.as_ref(), &text),
            });
        }

        let envelope = envelope
            .ok_or_else(|| ProviderError::InvalidResponse("body is not JSON".into()))?;
        if envelope.get("success").and_then(Value::as_bool) == Some(false) {
            return Err(ProviderError::Rejected {
                status: status.as_u16(),
                message: failure_message(Some(&envelope), &text),
            });
        }
        Ok(envelope)
    }

    async fn change_status(
        &self,
        operation: &'static str,
        action: &str,
        card_id: &CardId,
        reason: Option<&str>,
        expected: CardStatus,
    ) -> Result<CardStatusChanged, ProviderError> {
        let mut fields = json!({ "card_id": card_id.as_str() });
        if let Some(reason) = reason {
            fields["reason"] = json!(reason);
        }
        let path = format!("{}?action={}", CARD_ACTION_PATH, action);
        let envelope = self
            .call(operation, &path, self.body(fields), CallKind::Mutating)
            .await?;

        let data = response_data(&envelope);
        let status = string_field(data, &["card_status", "status"])
            .and_then(|s| CardStatus::from_provider(&s))
            .unwrap_or(expected);
        Ok(CardStatusChanged {
            status,
            raw: envelope,
        })
    }
}

#[async_trait]
impl CardProviderClient for StrowalletClient {
    async fn create_card(&self, request: IssueCardRequest) -> Result<IssuedCard, ProviderError> {
        let fields = json!({
            "name_on_card": request.name_on_card,
            "card_type": request.card_type.as_str(),
            "amount": request.amount.amount().to_string(),
            "customerEmail": request.customer_email,
        });
        let envelope = self
            .call("create_card", CREATE_CARD_PATH, self.body(fields), CallKind::Mutating)
            .await?;

        let data = response_data(&envelope);
        let card_id = string_field(data, &["card_id", "cardId", "id"])
            .ok_or_else(|| ProviderError::InvalidResponse("card id missing from response".into()))?;

        Ok(IssuedCard {
            card_id: CardId::new(card_id),
            customer_id: string_field(data, &["customer_id", "customerId"]).unwrap_or_default(),
            name_on_card: string_field(data, &["name_on_card"])
                .unwrap_or_else(|| request.name_on_card.clone()),
            card_type: string_field(data, &["card_type", "card_brand"])
                .and_then(|t| t.parse::<CardType>().ok())
                .unwrap_or(request.card_type),
            balance: decimal_field(data, &["balance", "card_balance"])
                .unwrap_or_else(|| request.amount.amount()),
            currency: string_field(data, &["currency"])
                .and_then(|c| c.parse::<Currency>().ok())
                .unwrap_or_else(|| request.amount.currency()),
            status: string_field(data, &["card_status", "status"])
                .and_then(|s| CardStatus::from_provider(&s))
                .unwrap_or(CardStatus::Active),
            last4: last4(data),
            expiry: expiry(data),
            raw: envelope,
        })
    }

    async fn fund_card(&self, card_id: &CardId, amount: Money) -> Result<CardFunded, ProviderError> {
        let fields = json!({
            "card_id": card_id.as_str(),
            "amount": amount.amount().to_string(),
        });
        let envelope = self
            .call("fund_card", FUND_CARD_PATH, self.body(fields), CallKind::Mutating)
            .await?;

        let data = response_data(&envelope);
        Ok(CardFunded {
            balance_after: decimal_field(data, &["balance_after", "new_balance", "balance"]),
            transaction_id: string_field(
                data,
                &["transaction_id", "transactionId", "reference", "id"],
            ),
            raw: envelope,
        })
    }

    async fn block_card(
        &self,
        card_id: &CardId,
        reason: Option<&str>,
    ) -> Result<CardStatusChanged, ProviderError> {
        self.change_status("block_card", "freeze", card_id, reason, CardStatus::Blocked)
            .await
    }

    async fn unblock_card(&self, card_id: &CardId) -> Result<CardStatusChanged, ProviderError> {
        self.change_status("unblock_card", "unfreeze", card_id, None, CardStatus::Active)
            .await
    }

    async fn fetch_card_detail(&self, card_id: &CardId) -> Result<CardDetail, ProviderError> {
        let fields = json!({ "card_id": card_id.as_str() });
        let envelope = self
            .call("fetch_card_detail", CARD_DETAIL_PATH, self.body(fields), CallKind::Read)
            .await?;

        let data = response_data(&envelope);
        let data = match data.get("card_detail") {
            Some(detail) if detail.is_object() => detail,
            _ => data,
        };

        let balance = decimal_field(data, &["balance", "card_balance"])
            .ok_or_else(|| ProviderError::InvalidResponse("card balance missing".into()))?;
        let raw_status = string_field(data, &["card_status", "status"])
            .ok_or_else(|| ProviderError::InvalidResponse("card status missing".into()))?;
        let status = CardStatus::from_provider(&raw_status).ok_or_else(|| {
            ProviderError::InvalidResponse(format!("unknown card status '{}'", raw_status))
        })?;

        Ok(CardDetail {
            balance,
            status,
            last4: last4(data),
            expiry: expiry(data),
            raw: envelope,
        })
    }
}

fn request_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(e.to_string())
    } else {
        ProviderError::Transport(e.to_string())
    }
}

fn failure_message(envelope: Option<&Value>, text: &str) -> String {
    envelope
        .and_then(|v| string_field(v, &["message", "error"]))
        .unwrap_or_else(|| text.chars().take(200).collect())
}

/// Payload fields sit under `response` when the issuer wraps them.
fn response_data(envelope: &Value) -> &Value {
    match envelope.get("response") {
        Some(data) if data.is_object() => data,
        _ => envelope,
    }
}

fn decimal_field(data: &Value, names: &[&str]) -> Option<Decimal> {
    names.iter().find_map(|name| match data.get(*name)? {
        Value::String(s) => s.trim().parse().ok(),
        Value::Number(n) => n.to_string().parse().ok(),
        _ => None,
    })
}

fn string_field(data: &Value, names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| match data.get(*name)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn last4(data: &Value) -> Option<String> {
    if let Some(last4) = string_field(data, &["last4", "last_four"]) {
        return Some(last4);
    }
    let number = string_field(data, &["card_number"])?;
    let digits: Vec<char> = number.chars().filter(char::is_ascii_digit).collect();
    (digits.len() >= 4).then(|| digits[digits.len() - 4..].iter().collect())
}

fn expiry(data: &Value) -> Option<String> {
    if let Some(expiry) = string_field(data, &["expiry", "expiry_date"]) {
        return Some(expiry);
    }
    let month = string_field(data, &["expiry_month"])?;
    let year = string_field(data, &["expiry_year"])?;
    let year: String = year.chars().skip(year.chars().count().saturating_sub(2)).collect();
    Some(format!("{:0>2}/{}", month, year))
}
