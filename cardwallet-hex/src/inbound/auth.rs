//! Authentication middleware and caller identity.
//!
//! The ledger sits behind an authenticated gateway. The gateway proves itself with the
//! service API key and forwards the end user in `X-User-Id` / `X-User-Role`.

use std::sync::Arc;

use axum::{
    Json,
    body::Body,
    extract::{FromRequestParts, State},
    http::{HeaderMap, Request, StatusCode, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};

use cardwallet_repo::security::verify_api_key;
use cardwallet_types::{AppError, CardProviderClient, LedgerRepository, UserId};

use super::handlers::{ApiError, AppState};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Paths that do not carry the service API key.
const OPEN_PATHS: [&str; 2] = ["/health", "/api/webhooks/strowallet"];

/// Extracts the API key from the Authorization header.
/// Expected format: "Bearer <api_key>" or just "<api_key>"
pub(crate) fn extract_api_key(auth_header: Option<&str>) -> Option<&str> {
    let header = auth_header?.trim();
    Some(header.strip_prefix("Bearer ").unwrap_or(header).trim())
}

/// Non-blank, trimmed header value.
pub(crate) fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Rejects `/api/*` requests whose bearer key does not hash to the configured one.
pub async fn auth_middleware<R: LedgerRepository, P: CardProviderClient>(
    State(state): State<Arc<AppState<R, P>>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if OPEN_PATHS.contains(&request.uri().path()) {
        return next.run(request).await;
    }

    let verdict = match extract_api_key(header_value(request.headers(), "Authorization")) {
        Some(key) if !key.is_empty() => {
            if verify_api_key(key, &state.api_key_hash) {
                Ok(())
            } else {
                Err("Invalid API key")
            }
        }
        _ => Err("Missing or invalid Authorization header"),
    };

    match verdict {
        Ok(()) => next.run(request).await,
        Err(message) => {
            tracing::warn!(path = %request.uri().path(), message, "request refused");
            unauthorized_response(message)
        }
    }
}

fn unauthorized_response(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({
            "success": false,
            "error": message,
            "code": "UNAUTHORIZED"
        })),
    )
        .into_response()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Admin,
}

/// The end user a request acts for.
#[derive(Debug, Clone, Copy)]
pub struct Actor {
    pub user_id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn require_admin(&self) -> Result<(), ApiError> {
        match self.role {
            Role::Admin => Ok(()),
            Role::User => Err(AppError::Forbidden("Admin role required".into()).into()),
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Actor {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = header_value(&parts.headers, USER_ID_HEADER)
            .ok_or_else(|| AppError::Validation("Missing X-User-Id header".into()))?
            .parse::<UserId>()
            .map_err(|_| AppError::Validation("X-User-Id must be a UUID".into()))?;

        let role = header_value(&parts.headers, USER_ROLE_HEADER).map(str::to_ascii_lowercase);
        let role = match role.as_deref() {
            None | Some("user") => Role::User,
            Some("admin") => Role::Admin,
            Some(other) => {
                return Err(
                    AppError::Validation(format!("Unknown X-User-Role: {}", other)).into(),
                );
            }
        };

        Ok(Actor { user_id, role })
    }
}
