//! Background reconciliation worker.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, error, info, instrument};

use wallet_types::{LedgerRepository, PaymentGateway};

use crate::reconciler::{ReconciliationEngine, SweepReport};

/// Periodically resumes transactions stuck in non-terminal states.
pub struct ReconciliationWorker<R: LedgerRepository, G: PaymentGateway> {
    engine: Arc<ReconciliationEngine<R, G>>,
    interval: Duration,
}

impl<R: LedgerRepository, G: PaymentGateway> ReconciliationWorker<R, G> {
    pub fn new(engine: Arc<ReconciliationEngine<R, G>>, interval: Duration) -> Self {
        Self { engine, interval }
    }

    /// Runs sweep passes forever. Abort the task to stop it.
    #[instrument(skip(self), fields(interval_secs = self.interval.as_secs()))]
    pub async fn run(self) {
        info!("Starting reconciliation worker");
        loop {
            sleep(self.interval).await;
            self.tick().await;
        }
    }

    /// One sweep pass, logged.
    pub async fn tick(&self) -> Option<SweepReport> {
        match self.engine.sweep().await {
            Ok(report) if report.examined == 0 => {
                debug!("Nothing to reconcile");
                Some(report)
            }
            Ok(report) => {
                info!(
                    examined = report.examined,
                    settled = report.settled,
                    pending = report.pending,
                    errors = report.errors,
                    "Reconciliation sweep finished"
                );
                Some(report)
            }
            Err(e) => {
                error!("Reconciliation sweep failed: {}", e);
                None
            }
        }
    }
}
