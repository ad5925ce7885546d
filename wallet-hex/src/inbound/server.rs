//! HTTP Server configuration and startup.

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use wallet_types::{LedgerRepository, PaymentGateway};

use super::callbacks;
use super::handlers::{self, AppState};
use crate::WalletService;

/// HTTP Server for the Wallet API.
pub struct HttpServer<R: LedgerRepository, G: PaymentGateway> {
    state: Arc<AppState<R, G>>,
}

impl<R: LedgerRepository, G: PaymentGateway> HttpServer<R, G> {
    /// Creates a new HTTP server. Provider callbacks stay disabled.
    pub fn new(service: WalletService<R, G>) -> Self {
        Self::with_callback_secret(service, None)
    }

    /// Creates a new HTTP server that accepts callbacks signed with `secret`.
    pub fn with_callback_secret(service: WalletService<R, G>, secret: Option<String>) -> Self {
        Self {
            state: Arc::new(AppState {
                service,
                callback_secret: secret,
            }),
        }
    }

    /// Builds the Axum router with all routes.
    pub fn router(&self) -> Router {
        // Build HTTP metrics layer (uses globally set MeterProvider)
        let metrics = axum_otel_metrics::HttpMetricsLayerBuilder::new().build();

        Router::new()
            .route("/health", get(handlers::health))
            .route("/api/deposits", post(handlers::create_deposit::<R, G>))
            .route(
                "/api/deposits/{id}/confirm",
                post(handlers::confirm_deposit::<R, G>),
            )
            .route("/api/payouts", post(handlers::send_payout::<R, G>))
            .route(
                "/api/accounts/{id}/credit",
                post(handlers::credit_account::<R, G>),
            )
            .route(
                "/api/accounts/{id}/balance",
                get(handlers::get_balance::<R, G>),
            )
            .route(
                "/api/accounts/{id}/transactions",
                get(handlers::list_transactions::<R, G>),
            )
            .route(
                "/api/transactions/{id}",
                get(handlers::get_transaction::<R, G>),
            )
            .route(
                "/api/transactions/{id}/reconcile",
                post(handlers::reconcile::<R, G>),
            )
            .route(
                "/api/provider/events",
                post(callbacks::provider_event::<R, G>),
            )
            .layer(metrics)
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
            tracing::error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
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
