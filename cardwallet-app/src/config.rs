//! Server configuration from flags or environment.

use std::time::Duration;

use clap::Parser;

use cardwallet_hex::ServicePolicy;
use strowallet_client::StrowalletConfig;

/// Card wallet ledger server.
#[derive(Parser)]
#[command(name = "cardwallet-server")]
#[command(version, about = "Card wallet fee and balance ledger", long_about = None)]
pub struct Config {
    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// SQLite or PostgreSQL URL, depending on the build feature
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    /// Key the gateway presents as a bearer token
    #[arg(long, env = "LEDGER_API_KEY", hide_env_values = true)]
    pub ledger_api_key: String,

    /// Shared secret for issuer webhook signatures
    #[arg(long, env = "WEBHOOK_SECRET", hide_env_values = true)]
    pub webhook_secret: String,

    /// Issuer base URLs, tried in order
    #[arg(
        long,
        env = "STROWALLET_BASE_URLS",
        value_delimiter = ',',
        default_value = "https://strowallet.com,https://api.strowallet.com"
    )]
    pub strowallet_base_urls: Vec<String>,

    #[arg(long, env = "STROWALLET_PUBLIC_KEY", hide_env_values = true)]
    pub strowallet_public_key: String,

    /// `sandbox` for test accounts
    #[arg(long, env = "STROWALLET_MODE")]
    pub strowallet_mode: Option<String>,

    /// Bound on one HTTP request to one issuer endpoint
    #[arg(long, env = "PROVIDER_REQUEST_TIMEOUT_SECS", default_value_t = 10)]
    pub provider_request_timeout_secs: u64,

    /// Bound on a whole issuer call, raised to the client's fallback budget when lower
    #[arg(long, env = "PROVIDER_TIMEOUT_SECS")]
    pub provider_timeout_secs: Option<u64>,

    #[arg(long, env = "PROVIDER_READ_ATTEMPTS", default_value_t = 2)]
    pub provider_read_attempts: u32,

    #[arg(long, env = "PROVIDER_RETRY_BACKOFF_MS", default_value_t = 1000)]
    pub provider_retry_backoff_ms: u64,

    #[arg(long, env = "MAX_CARDS_PER_USER", default_value_t = 10)]
    pub max_cards_per_user: u32,

    #[arg(long, env = "RATE_LIMIT_PER_MINUTE", default_value_t = 100)]
    pub rate_limit_per_minute: u32,

    /// Export spans over OTLP
    #[arg(long, env = "OTEL_ENABLED", default_value_t = false)]
    pub otel_enabled: bool,
}

impl Config {
    /// `issuer_budget` is the time the issuer client needs to walk every endpoint.
    pub fn policy(&self, issuer_budget: Duration) -> ServicePolicy {
        let configured = self
            .provider_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or_default();
        ServicePolicy {
            max_cards_per_user: self.max_cards_per_user,
            provider_timeout: configured.max(issuer_budget),
        }
    }

    pub fn strowallet(&self) -> StrowalletConfig {
        let mut config = StrowalletConfig::new(
            self.strowallet_base_urls.clone(),
            self.strowallet_public_key.clone(),
        );
        config.mode = self.strowallet_mode.clone();
        config.request_timeout = Duration::from_secs(self.provider_request_timeout_secs);
        config.read_attempts = self.provider_read_attempts;
        config.retry_backoff = Duration::from_millis(self.provider_retry_backoff_ms);
        config
    }
}
