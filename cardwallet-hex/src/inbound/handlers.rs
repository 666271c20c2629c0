//! HTTP request handlers.

use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::json;

use cardwallet_repo::security::verify_webhook_signature;
use cardwallet_types::{
    AppError, BlockCardRequest, CardId, CardProviderClient, CardResponse, CreateCardRequest,
    CreditDepositRequest, FeeQuoteQuery, FundCardRequest, IncomingWebhook, LedgerRepository,
    ManageWalletRequest, OpenWalletRequest, ProviderError, RetryWebhooksRequest,
    UpsertFeeSettingRequest, WalletId, WalletResponse, WebhookAck, WebhookEvent,
};

use super::auth::Actor;
use crate::CardWalletService;

/// Header carrying the issuer's HMAC-SHA256 of the raw webhook body.
pub const SIGNATURE_HEADER: &str = "x-strowallet-signature";

/// Application state shared across handlers.
pub struct AppState<R: LedgerRepository, P: CardProviderClient> {
    pub service: CardWalletService<R, P>,
    /// SHA-256 of the service-to-service API key.
    pub api_key_hash: String,
    pub webhook_secret: String,
}

type SharedState<R, P> = State<Arc<AppState<R, P>>>;

/// Wrapper to implement IntoResponse for AppError (orphan rule workaround).
#[derive(Debug)]
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        ApiError(err)
    }
}

pub(crate) fn status_for(err: &AppError) -> StatusCode {
    match err {
        AppError::Validation(_)
        | AppError::InvalidAmount(_)
        | AppError::BelowMinimum { .. }
        | AppError::InsufficientFunds { .. }
        | AppError::CurrencyMismatch { .. } => StatusCode::BAD_REQUEST,
        AppError::WalletNotFound(_)
        | AppError::NotFoundOrUnauthorized(_)
        | AppError::NotFound(_) => StatusCode::NOT_FOUND,
        AppError::CardLimitReached { .. }
        | AppError::DuplicateFundingAttempt { .. }
        | AppError::Conflict(_) => StatusCode::CONFLICT,
        AppError::Provider(ProviderError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
        AppError::Provider(_) => StatusCode::BAD_GATEWAY,
        AppError::Reconcile(_) => StatusCode::UNPROCESSABLE_ENTITY,
        AppError::Forbidden(_) => StatusCode::FORBIDDEN,
        AppError::CompensationNeeded(_) | AppError::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            tracing::error!(code = self.0.code(), error = %self.0, "request failed");
        }

        let body = json!({
            "success": false,
            "error": self.0.to_string(),
            "code": self.0.code(),
            "details": self.0.details(),
        });

        (status, Json(body)).into_response()
    }
}

fn parse_wallet_id(raw: &str) -> Result<WalletId, ApiError> {
    raw.parse()
        .map_err(|_| AppError::Validation(format!("Invalid wallet ID: {}", raw)).into())
}

/// Health check endpoint.
pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "healthy" }))
}

// ─────────────────────────────────────────────────────────────────────────────
// Fees
// ─────────────────────────────────────────────────────────────────────────────

pub async fn list_fees<R: LedgerRepository, P: CardProviderClient>(
    State(state): SharedState<R, P>,
    _actor: Actor,
) -> Result<impl IntoResponse, ApiError> {
    let settings = state.service.list_fee_settings().await?;
    Ok(Json(settings))
}

#[tracing::instrument(skip(state))]
pub async fn quote_fees<R: LedgerRepository, P: CardProviderClient>(
    State(state): SharedState<R, P>,
    _actor: Actor,
    Query(query): Query<FeeQuoteQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let quote = state.service.quote_fees(query).await?;
    Ok(Json(quote))
}

#[tracing::instrument(skip(state, req), fields(admin_id = %actor.user_id))]
pub async fn upsert_fee<R: LedgerRepository, P: CardProviderClient>(
    State(state): SharedState<R, P>,
    actor: Actor,
    Json(req): Json<UpsertFeeSettingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    actor.require_admin()?;
    let setting = state.service.upsert_fee_setting(req).await?;
    Ok(Json(setting))
}

// ─────────────────────────────────────────────────────────────────────────────
// Admin
// ─────────────────────────────────────────────────────────────────────────────

#[tracing::instrument(skip(state, req), fields(admin_id = %actor.user_id))]
pub async fn manage_wallet<R: LedgerRepository, P: CardProviderClient>(
    State(state): SharedState<R, P>,
    actor: Actor,
    Json(req): Json<ManageWalletRequest>,
) -> Result<impl IntoResponse, ApiError> {
    actor.require_admin()?;
    let res = state.service.manage_wallet(actor.user_id, req).await?;
    Ok(Json(res))
}

#[tracing::instrument(skip(state, req), fields(admin_id = %actor.user_id))]
pub async fn retry_webhooks<R: LedgerRepository, P: CardProviderClient>(
    State(state): SharedState<R, P>,
    actor: Actor,
    req: Option<Json<RetryWebhooksRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    actor.require_admin()?;
    let limit = req.and_then(|Json(r)| r.limit);
    let summary = state.service.retry_pending_events(limit).await?;
    Ok(Json(summary))
}

#[tracing::instrument(skip(state, req), fields(admin_id = %actor.user_id, user_id = %req.user_id))]
pub async fn credit_deposit<R: LedgerRepository, P: CardProviderClient>(
    State(state): SharedState<R, P>,
    actor: Actor,
    Json(req): Json<CreditDepositRequest>,
) -> Result<impl IntoResponse, ApiError> {
    actor.require_admin()?;
    let deposit = state.service.credit_deposit(req).await?;
    let status = if deposit.duplicate {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(deposit)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Wallets
// ─────────────────────────────────────────────────────────────────────────────

#[tracing::instrument(skip(state), fields(user_id = %actor.user_id))]
pub async fn list_wallets<R: LedgerRepository, P: CardProviderClient>(
    State(state): SharedState<R, P>,
    actor: Actor,
) -> Result<impl IntoResponse, ApiError> {
    let wallets: Vec<WalletResponse> = state
        .service
        .list_wallets(actor.user_id)
        .await?
        .into_iter()
        .map(Into::into)
        .collect();
    Ok(Json(wallets))
}

#[tracing::instrument(skip(state, req), fields(user_id = %actor.user_id))]
pub async fn open_wallet<R: LedgerRepository, P: CardProviderClient>(
    State(state): SharedState<R, P>,
    actor: Actor,
    Json(req): Json<OpenWalletRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let wallet = state.service.open_wallet(actor.user_id, req).await?;
    Ok((StatusCode::CREATED, Json(WalletResponse::from(wallet))))
}

#[tracing::instrument(skip(state), fields(user_id = %actor.user_id, wallet_id = %id))]
pub async fn wallet_transactions<R: LedgerRepository, P: CardProviderClient>(
    State(state): SharedState<R, P>,
    actor: Actor,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let wallet_id = parse_wallet_id(&id)?;
    let trail = state.service.wallet_history(actor.user_id, wallet_id).await?;
    Ok(Json(trail))
}

// ─────────────────────────────────────────────────────────────────────────────
// Cards
// ─────────────────────────────────────────────────────────────────────────────

#[tracing::instrument(skip(state), fields(user_id = %actor.user_id))]
pub async fn list_cards<R: LedgerRepository, P: CardProviderClient>(
    State(state): SharedState<R, P>,
    actor: Actor,
) -> Result<impl IntoResponse, ApiError> {
    let cards: Vec<CardResponse> = state
        .service
        .list_cards(actor.user_id)
        .await?
        .into_iter()
        .map(Into::into)
        .collect();
    Ok(Json(cards))
}

#[tracing::instrument(skip(state, req), fields(user_id = %actor.user_id))]
pub async fn create_card<R: LedgerRepository, P: CardProviderClient>(
    State(state): SharedState<R, P>,
    actor: Actor,
    Json(req): Json<CreateCardRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let created = state.service.create_card(actor.user_id, req).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[tracing::instrument(skip(state), fields(user_id = %actor.user_id, card_id = %id))]
pub async fn get_card<R: LedgerRepository, P: CardProviderClient>(
    State(state): SharedState<R, P>,
    actor: Actor,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let card = state
        .service
        .get_card(actor.user_id, &CardId::new(id))
        .await?;
    Ok(Json(CardResponse::from(card)))
}

#[tracing::instrument(skip(state, req), fields(user_id = %actor.user_id, card_id = %id))]
pub async fn fund_card<R: LedgerRepository, P: CardProviderClient>(
    State(state): SharedState<R, P>,
    actor: Actor,
    Path(id): Path<String>,
    Json(req): Json<FundCardRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let funded = state
        .service
        .fund_card(actor.user_id, &CardId::new(id), req)
        .await?;
    Ok(Json(funded))
}

#[tracing::instrument(skip(state, req), fields(user_id = %actor.user_id, card_id = %id))]
pub async fn block_card<R: LedgerRepository, P: CardProviderClient>(
    State(state): SharedState<R, P>,
    actor: Actor,
    Path(id): Path<String>,
    req: Option<Json<BlockCardRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let reason = req.and_then(|Json(r)| r.reason);
    let card = state
        .service
        .block_card(actor.user_id, &CardId::new(id), reason.as_deref())
        .await?;
    Ok(Json(CardResponse::from(card)))
}

#[tracing::instrument(skip(state), fields(user_id = %actor.user_id, card_id = %id))]
pub async fn unblock_card<R: LedgerRepository, P: CardProviderClient>(
    State(state): SharedState<R, P>,
    actor: Actor,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let card = state
        .service
        .unblock_card(actor.user_id, &CardId::new(id))
        .await?;
    Ok(Json(CardResponse::from(card)))
}

#[tracing::instrument(skip(state), fields(user_id = %actor.user_id, card_id = %id))]
pub async fn sync_card<R: LedgerRepository, P: CardProviderClient>(
    State(state): SharedState<R, P>,
    actor: Actor,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let card = state
        .service
        .sync_card(actor.user_id, &CardId::new(id))
        .await?;
    Ok(Json(CardResponse::from(card)))
}

#[tracing::instrument(skip(state), fields(user_id = %actor.user_id, card_id = %id))]
pub async fn card_transactions<R: LedgerRepository, P: CardProviderClient>(
    State(state): SharedState<R, P>,
    actor: Actor,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let trail = state
        .service
        .card_history(actor.user_id, &CardId::new(id))
        .await?;
    Ok(Json(trail))
}

// ─────────────────────────────────────────────────────────────────────────────
// Issuer webhook
// ─────────────────────────────────────────────────────────────────────────────

/// Receives an issuer event. The signature is checked over the raw body before parsing.
#[tracing::instrument(skip_all)]
pub async fn strowallet_webhook<R: LedgerRepository, P: CardProviderClient>(
    State(state): SharedState<R, P>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let signature_valid = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|sig| verify_webhook_signature(&body, sig, &state.webhook_secret));

    let payload: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|e| AppError::Validation(format!("Webhook body is not JSON: {}", e)))?;
    let envelope: IncomingWebhook = serde_json::from_value(payload.clone())
        .map_err(|e| AppError::Validation(format!("Webhook envelope: {}", e)))?;

    let event_id = envelope.event_id.clone();
    let event = WebhookEvent::new(
        envelope.event_id,
        envelope.event_type,
        envelope
            .card_id
            .filter(|id| !id.trim().is_empty())
            .map(CardId::new),
        payload,
        signature_valid,
    );

    match state.service.apply_webhook(event).await {
        Ok(outcome) => Ok(Json(WebhookAck { event_id, outcome }).into_response()),
        Err(_) if !signature_valid => Ok((
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "success": false,
                "error": "Invalid webhook signature",
                "code": "INVALID_SIGNATURE",
            })),
        )
            .into_response()),
        Err(e) => Err(e.into()),
    }
}
