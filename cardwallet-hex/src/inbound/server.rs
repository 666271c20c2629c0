//! HTTP Server configuration and startup.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router, middleware,
    routing::{get, post, put},
};
use tower_http::trace::TraceLayer;

use cardwallet_repo::security::hash_api_key;
use cardwallet_types::{CardProviderClient, LedgerRepository};

use super::auth::auth_middleware;
use super::handlers::{self, AppState};
use super::rate_limit::{RateLimiterState, rate_limit_middleware};
use crate::CardWalletService;

/// HTTP Server for the card wallet API.
pub struct HttpServer<R: LedgerRepository, P: CardProviderClient> {
    state: Arc<AppState<R, P>>,
    rate_limiter: Arc<RateLimiterState>,
}

impl<R: LedgerRepository, P: CardProviderClient> HttpServer<R, P> {
    /// Creates a server that accepts `api_key` from the gateway and issuer webhooks signed
    /// with `webhook_secret`. Defaults to 100 requests per minute per user.
    pub fn new(service: CardWalletService<R, P>, api_key: &str, webhook_secret: &str) -> Self {
        Self {
            state: Arc::new(AppState {
                service,
                api_key_hash: hash_api_key(api_key),
                webhook_secret: webhook_secret.to_string(),
            }),
            rate_limiter: Arc::new(RateLimiterState::default()),
        }
    }

    pub fn with_rate_limit(mut self, requests_per_minute: u32) -> Self {
        self.rate_limiter = Arc::new(RateLimiterState::new(
            requests_per_minute,
            Duration::from_secs(60),
        ));
        self
    }

    /// Builds the Axum router with all routes.
    pub fn router(&self) -> Router {
        // Build HTTP metrics layer (uses globally set MeterProvider)
        let metrics = axum_otel_metrics::HttpMetricsLayerBuilder::new().build();

        Router::new()
            .route("/health", get(handlers::health))
            .route("/api/fees", get(handlers::list_fees::<R, P>))
            .route("/api/fees/quote", get(handlers::quote_fees::<R, P>))
            .route("/api/admin/fees", put(handlers::upsert_fee::<R, P>))
            .route(
                "/api/admin/manage-wallet",
                post(handlers::manage_wallet::<R, P>),
            )
            .route(
                "/api/admin/webhooks/retry",
                post(handlers::retry_webhooks::<R, P>),
            )
            .route(
                "/api/wallets",
                get(handlers::list_wallets::<R, P>).post(handlers::open_wallet::<R, P>),
            )
            .route(
                "/api/wallets/{id}/transactions",
                get(handlers::wallet_transactions::<R, P>),
            )
            .route("/api/deposits", post(handlers::credit_deposit::<R, P>))
            .route(
                "/api/cards",
                get(handlers::list_cards::<R, P>).post(handlers::create_card::<R, P>),
            )
            .route("/api/cards/{id}", get(handlers::get_card::<R, P>))
            .route("/api/cards/{id}/fund", post(handlers::fund_card::<R, P>))
            .route("/api/cards/{id}/block", post(handlers::block_card::<R, P>))
            .route(
                "/api/cards/{id}/unblock",
                post(handlers::unblock_card::<R, P>),
            )
            .route("/api/cards/{id}/sync", post(handlers::sync_card::<R, P>))
            .route(
                "/api/cards/{id}/transactions",
                get(handlers::card_transactions::<R, P>),
            )
            .route(
                "/api/webhooks/strowallet",
                post(handlers::strowallet_webhook::<R, P>),
            )
            .layer(metrics)
            .layer(middleware::from_fn_with_state(
                self.rate_limiter.clone(),
                rate_limit_middleware,
            ))
            .layer(middleware::from_fn_with_state(
                self.state.clone(),
                auth_middleware::<R, P>,
            ))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Runs the server on the given address with graceful shutdown.
    pub async fn run(self, addr: &str) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Server listening on {}", listener.local_addr()?);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown...");
}
