//! # Wallet Application
//!
//! Binary that wires together all the components:
//! - Load configuration from environment
//! - Initialize the store and payment provider adapters
//! - Create the reconciliation engine and wallet service
//! - Start the background sweep and the HTTP server

mod config;

use std::sync::Arc;

use opentelemetry::global;
use opentelemetry_sdk::{propagation::TraceContextPropagator, trace as sdktrace};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use payment_gateway::{Gateway, HttpGateway, SimulatedGateway};
use wallet_hex::{ReconciliationEngine, ReconciliationWorker, WalletService, inbound::HttpServer};
use wallet_repo::build_repo;

use config::{Config, GatewaySettings};

fn init_tracer() -> anyhow::Result<(sdktrace::Tracer, sdktrace::SdkTracerProvider)> {
    global::set_text_map_propagator(TraceContextPropagator::new());

    // gRPC exporter with batch processing (non-blocking); endpoint comes from
    // OTEL_EXPORTER_OTLP_ENDPOINT
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .build()?;

    let provider = sdktrace::SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .build();

    global::set_tracer_provider(provider.clone());

    use opentelemetry::trace::TracerProvider as _;
    Ok((provider.tracer("wallet-service"), provider))
}

fn build_gateway(settings: &GatewaySettings) -> anyhow::Result<Gateway> {
    match settings {
        GatewaySettings::Http(http) => {
            tracing::info!("Using payment provider at {}", http.base_url);
            Ok(Gateway::Http(HttpGateway::new(http.clone())?))
        }
        GatewaySettings::Simulated => {
            tracing::warn!("Using the simulated payment provider; no real money moves");
            Ok(Gateway::Simulated(Arc::new(SimulatedGateway::new())))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // OpenTelemetry export only when a collector is configured
    let otel = match std::env::var_os("OTEL_EXPORTER_OTLP_ENDPOINT") {
        Some(_) => Some(init_tracer()?),
        None => None,
    };
    let telemetry = otel
        .as_ref()
        .map(|(tracer, _)| tracing_opentelemetry::layer().with_tracer(tracer.clone()));

    // Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,wallet_app=debug,wallet_hex=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(telemetry)
        .init();

    // Load configuration
    let config = Config::from_env()?;

    tracing::info!("Starting wallet server on port {}", config.port);
    tracing::info!("Using database: {}", config.database_url);
    tracing::info!("Ledger currency: {}", config.currency);

    // Build adapters (the store handles connection and migration)
    let repo = Arc::new(build_repo(&config.database_url).await?);
    let gateway = Arc::new(build_gateway(&config.gateway)?);

    let engine = Arc::new(ReconciliationEngine::new(
        repo,
        gateway,
        config.engine.clone(),
    ));

    // Background reconciliation of stuck transactions
    let worker = ReconciliationWorker::new(engine.clone(), config.sweep_interval);
    let sweeper = tokio::spawn(worker.run());

    if config.callback_secret.is_none() {
        tracing::warn!("PROVIDER_CALLBACK_SECRET not set; provider callbacks will be refused");
    }

    // Create and run the HTTP server
    let service = WalletService::new(engine, config.currency);
    let server = HttpServer::with_callback_secret(service, config.callback_secret.clone());
    let addr = format!("0.0.0.0:{}", config.port);

    let result = server.run(&addr).await;

    sweeper.abort();
    // Ensure traces are flushed before exit
    if let Some((_, provider)) = otel {
        let _ = provider.shutdown();
    }
    result
}
