//! # Card Wallet Application
//!
//! Binary that wires together all the components:
//! - Load configuration from flags and environment
//! - Initialize the repository adapter and the card issuer client
//! - Create the card wallet service
//! - Start the HTTP server

mod config;

use clap::Parser;
use opentelemetry::global;
use opentelemetry_sdk::{propagation::TraceContextPropagator, trace as sdktrace};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cardwallet_hex::{CardWalletService, inbound::HttpServer};
use cardwallet_repo::build_repo;
use strowallet_client::StrowalletClient;

fn init_tracer() -> anyhow::Result<(sdktrace::Tracer, sdktrace::SdkTracerProvider)> {
    global::set_text_map_propagator(TraceContextPropagator::new());

    // gRPC exporter with batch processing (non-blocking)
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .build()?;

    let provider = sdktrace::SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .build();

    global::set_tracer_provider(provider.clone());

    use opentelemetry::trace::TracerProvider as _;
    Ok((provider.tracer("cardwallet-service"), provider))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = config::Config::parse();

    let (telemetry, otel_provider) = if config.otel_enabled {
        let (tracer, provider) = init_tracer()?;
        (
            Some(tracing_opentelemetry::layer().with_tracer(tracer)),
            Some(provider),
        )
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "info,cardwallet_app=debug,cardwallet_hex=debug,strowallet_client=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(telemetry)
        .init();

    tracing::info!(
        port = config.port,
        endpoints = config.strowallet_base_urls.len(),
        otel = config.otel_enabled,
        "Starting card wallet server"
    );

    // Build repository (handles connection and migration)
    let repo = build_repo(&config.database_url).await?;
    let issuer = StrowalletClient::new(config.strowallet())?;

    let policy = config.policy(issuer.call_budget());
    tracing::info!(
        provider_timeout = ?policy.provider_timeout,
        "Issuer calls bounded"
    );

    let service = CardWalletService::new(repo, issuer).with_policy(policy);

    let server = HttpServer::new(service, &config.ledger_api_key, &config.webhook_secret)
        .with_rate_limit(config.rate_limit_per_minute);
    let addr = format!("0.0.0.0:{}", config.port);

    server.run(&addr).await?;

    // Flush traces before exit
    if let Some(provider) = otel_provider {
        if let Err(e) = provider.shutdown() {
            tracing::warn!(error = %e, "trace exporter did not shut down cleanly");
        }
    }
    Ok(())
}
