//! Reconciliation Engine
//!
//! Drives transactions between the ledger and the payment provider. Every
//! step persists its state before calling out, so a crash or an ambiguous
//! provider reply leaves a record that can be resumed by replaying the same
//! step with the same idempotency key.
//!
//! Steps never turn a failure state into an error; they return a
//! [`Settlement`] and the public operations decide what the caller sees.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use wallet_types::{
    AppError, CaptureStatus, GatewayError, GatewayStep, IntentStatus, LedgerRepository,
    PaymentGateway, Posting, PostingLeg, Transaction, TransactionId, TransactionKind,
    TransactionState, TransferStatus,
};

use crate::coordinator::TransactionCoordinator;

/// Tunables for the engine and its sweep.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Bound on every provider call
    pub gateway_timeout: Duration,
    /// Optimistic-concurrency retries per posting
    pub conflict_retries: u32,
    /// Minimum age before a non-terminal transaction is swept
    pub stale_after: Duration,
    pub sweep_batch_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            gateway_timeout: Duration::from_secs(10),
            conflict_retries: 5,
            stale_after: Duration::from_secs(60),
            sweep_batch_size: 100,
        }
    }
}

/// Where a transaction stands after an operation, with the account balance.
#[derive(Debug, Clone)]
pub struct Settlement {
    pub transaction: Transaction,
    pub balance: i64,
}

/// Result of one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub examined: usize,
    /// Reached a terminal state
    pub settled: usize,
    /// Still waiting on the provider
    pub pending: usize,
    pub errors: usize,
}

pub struct ReconciliationEngine<R: LedgerRepository, G: PaymentGateway> {
    coordinator: TransactionCoordinator<R>,
    gateway: Arc<G>,
    config: EngineConfig,
}

impl<R: LedgerRepository, G: PaymentGateway> ReconciliationEngine<R, G> {
    pub fn new(repo: Arc<R>, gateway: Arc<G>, config: EngineConfig) -> Self {
        Self {
            coordinator: TransactionCoordinator::new(repo, config.conflict_retries),
            gateway,
            config,
        }
    }

    pub fn repo(&self) -> &R {
        self.coordinator.repo()
    }

    pub fn coordinator(&self) -> &TransactionCoordinator<R> {
        &self.coordinator
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Operations
    // ─────────────────────────────────────────────────────────────────────────────

    /// Opens a deposit and creates its provider intent.
    ///
    /// Replays retry an intent whose creation was ambiguous and otherwise
    /// report the stored state.
    #[instrument(skip(self, tx), fields(transaction_id = %tx.id, account_id = %tx.account_id))]
    pub async fn begin_deposit(&self, tx: Transaction) -> Result<Settlement, AppError> {
        let _guard = self.coordinator.lock(&tx.id).await;
        let (tx, _) = self.coordinator.open(tx).await?;

        if tx.state == TransactionState::Initiated {
            self.create_intent(tx).await
        } else {
            self.settled(tx).await
        }
    }

    /// Captures a deposit's intent and credits the account.
    #[instrument(skip(self))]
    pub async fn confirm_deposit(&self, id: &TransactionId) -> Result<Settlement, AppError> {
        let _guard = self.coordinator.lock(id).await;
        let tx = self.coordinator.load(id).await?;

        let not_confirmable = |tx: &Transaction| AppError::NotConfirmable {
            id: tx.id.clone(),
            state: tx.state,
        };
        if tx.kind != TransactionKind::Deposit {
            return Err(not_confirmable(&tx));
        }

        let settlement = match tx.state {
            TransactionState::IntentCreated | TransactionState::Capturing => {
                self.capture(tx).await?
            }
            TransactionState::Credited | TransactionState::CaptureFailed => {
                self.settled(tx).await?
            }
            _ => return Err(not_confirmable(&tx)),
        };

        match settlement.transaction.state {
            TransactionState::CaptureFailed => Err(AppError::CaptureFailed {
                id: settlement.transaction.id.clone(),
                reason: failure_reason(&settlement.transaction),
            }),
            _ => Ok(settlement),
        }
    }

    /// Reserves funds and sends them to the payout destination.
    #[instrument(skip(self, tx), fields(transaction_id = %tx.id, account_id = %tx.account_id))]
    pub async fn send_payout(&self, tx: Transaction) -> Result<Settlement, AppError> {
        let _guard = self.coordinator.lock(&tx.id).await;
        let (tx, _) = self.coordinator.open(tx).await?;
        let settlement = self.drive(tx).await?;

        let tx = &settlement.transaction;
        match tx.state {
            TransactionState::InsufficientFunds => Err(AppError::InsufficientFunds {
                available: settlement.balance,
                required: tx.amount.amount(),
            }),
            TransactionState::SendFailed => Err(AppError::SendFailed {
                id: tx.id.clone(),
                reason: failure_reason(tx),
            }),
            _ => Ok(settlement),
        }
    }

    /// Credits an account directly.
    #[instrument(skip(self, tx), fields(transaction_id = %tx.id, account_id = %tx.account_id))]
    pub async fn credit(&self, tx: Transaction) -> Result<Settlement, AppError> {
        let _guard = self.coordinator.lock(&tx.id).await;
        let (tx, _) = self.coordinator.open(tx).await?;
        self.drive(tx).await
    }

    /// Moves one transaction forward by the same rules as the foreground path.
    ///
    /// Deposits waiting in `IntentCreated` are captured, so a provider
    /// callback or an operator can complete them.
    #[instrument(skip(self))]
    pub async fn resume(&self, id: &TransactionId) -> Result<Settlement, AppError> {
        let _guard = self.coordinator.lock(id).await;
        let tx = self.coordinator.load(id).await?;
        self.drive(tx).await
    }

    /// Resumes stale non-terminal transactions, least recently touched first.
    ///
    /// Every attempt is recorded, so records that stay pending rotate behind
    /// the rest of the backlog instead of filling every batch.
    #[instrument(skip(self))]
    pub async fn sweep(&self) -> Result<SweepReport, AppError> {
        let stale_after = chrono::Duration::from_std(self.config.stale_after)
            .map_err(|e| AppError::Internal(e.to_string()))?;
        let cutoff = Utc::now() - stale_after;

        let batch = self
            .repo()
            .list_stale(
                TransactionState::sweepable(),
                cutoff,
                self.config.sweep_batch_size,
            )
            .await?;

        let mut report = SweepReport::default();
        for tx in batch {
            report.examined += 1;
            match self.resume(&tx.id).await {
                Ok(s) if s.transaction.state.is_terminal() => report.settled += 1,
                Ok(_) => report.pending += 1,
                Err(e) => {
                    report.errors += 1;
                    error!(transaction_id = %tx.id, error = %e, "sweep could not resume transaction");
                }
            }
            if let Err(e) = self.repo().mark_swept(&tx.id, Utc::now()).await {
                warn!(transaction_id = %tx.id, error = %e, "could not record sweep attempt");
            }
        }
        Ok(report)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Steps
    // ─────────────────────────────────────────────────────────────────────────────

    async fn drive(&self, tx: Transaction) -> Result<Settlement, AppError> {
        use TransactionKind::*;
        use TransactionState::*;

        match (tx.kind, tx.state) {
            (Deposit, Initiated) => self.create_intent(tx).await,
            (Deposit, IntentCreated | Capturing) => self.capture(tx).await,
            (Payout, Initiated) => self.reserve(tx).await,
            (Payout, Reserved | Sending) => self.transfer(tx).await,
            (InternalCredit, Initiated) => {
                let posting = Posting::new(PostingLeg::Credit, &tx, Credited)?;
                self.post(posting).await
            }
            _ => self.settled(tx).await,
        }
    }

    async fn create_intent(&self, tx: Transaction) -> Result<Settlement, AppError> {
        let key = tx.id.gateway_key(GatewayStep::Intent);

        match self.call(self.gateway.create_intent(&key, tx.amount)).await {
            Ok(receipt) if receipt.status == IntentStatus::Created => {
                let mut next = tx.advanced(TransactionState::IntentCreated)?;
                next.external_ref = Some(receipt.external_ref);
                next.provider_redirect = receipt.redirect_url;
                let tx = self.coordinator.save(&tx, next).await?;
                self.settled(tx).await
            }
            Ok(receipt) => {
                let mut next = tx.advanced(TransactionState::IntentFailed)?;
                if !receipt.external_ref.is_empty() {
                    next.external_ref = Some(receipt.external_ref);
                }
                next.failure_reason = Some(receipt.reason.unwrap_or_else(|| "intent failed".into()));
                let tx = self.coordinator.save(&tx, next).await?;
                self.settled(tx).await
            }
            Err(e) => {
                ambiguous(&tx, GatewayStep::Intent, &e);
                self.settled(tx).await
            }
        }
    }

    async fn capture(&self, tx: Transaction) -> Result<Settlement, AppError> {
        let tx = if tx.state == TransactionState::IntentCreated {
            self.coordinator
                .advance(&tx, TransactionState::Capturing)
                .await?
        } else {
            tx
        };
        let external_ref = tx.external_ref.clone().ok_or_else(|| {
            AppError::Internal(format!("Deposit {} has no provider reference", tx.id))
        })?;
        let key = tx.id.gateway_key(GatewayStep::Capture);

        match self
            .call(self.gateway.capture_intent(&external_ref, &key))
            .await
        {
            Ok(receipt) => match receipt.status {
                CaptureStatus::Captured => {
                    if receipt.captured_amount != tx.amount.amount() {
                        warn!(
                            transaction_id = %tx.id,
                            captured = receipt.captured_amount,
                            expected = tx.amount.amount(),
                            "provider captured a different amount; crediting the requested amount"
                        );
                    }
                    let posting =
                        Posting::new(PostingLeg::Credit, &tx, TransactionState::Credited)?;
                    self.post(posting).await
                }
                CaptureStatus::Pending => {
                    info!(transaction_id = %tx.id, "capture pending at provider");
                    self.settled(tx).await
                }
                CaptureStatus::Failed => {
                    let mut next = tx.advanced(TransactionState::CaptureFailed)?;
                    next.failure_reason =
                        Some(receipt.reason.unwrap_or_else(|| "capture failed".into()));
                    let tx = self.coordinator.save(&tx, next).await?;
                    self.settled(tx).await
                }
            },
            Err(e) => {
                ambiguous(&tx, GatewayStep::Capture, &e);
                self.settled(tx).await
            }
        }
    }

    async fn reserve(&self, tx: Transaction) -> Result<Settlement, AppError> {
        let posting = Posting::new(PostingLeg::Reserve, &tx, TransactionState::Reserved)?;

        match self.post(posting).await {
            Ok(reserved) => self.transfer(reserved.transaction).await,
            Err(AppError::InsufficientFunds {
                available,
                required,
            }) => {
                let mut next = tx.advanced(TransactionState::InsufficientFunds)?;
                next.failure_reason = Some(format!(
                    "insufficient funds: available {available}, required {required}"
                ));
                let transaction = self.coordinator.save(&tx, next).await?;
                Ok(Settlement {
                    transaction,
                    balance: available,
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn transfer(&self, tx: Transaction) -> Result<Settlement, AppError> {
        let tx = match tx.state {
            TransactionState::Reserved => {
                self.coordinator
                    .advance(&tx, TransactionState::Sending)
                    .await?
            }
            TransactionState::Sending => tx,
            _ => return self.settled(tx).await,
        };
        let destination = tx.destination.clone().ok_or_else(|| {
            AppError::Internal(format!("Payout {} has no destination", tx.id))
        })?;
        let key = tx.id.gateway_key(GatewayStep::Transfer);

        match self
            .call(self.gateway.send_transfer(&key, &destination, tx.amount))
            .await
        {
            Ok(receipt) if receipt.status == TransferStatus::Submitted => {
                let mut next = tx.advanced(TransactionState::Sent)?;
                next.external_ref = receipt.external_ref;
                let tx = self.coordinator.save(&tx, next).await?;
                self.settled(tx).await
            }
            Ok(receipt) => {
                let mut posting =
                    Posting::new(PostingLeg::Release, &tx, TransactionState::SendFailed)?;
                posting.transaction.failure_reason =
                    Some(receipt.reason.unwrap_or_else(|| "transfer failed".into()));
                self.post(posting).await
            }
            Err(e) => {
                ambiguous(&tx, GatewayStep::Transfer, &e);
                self.settled(tx).await
            }
        }
    }

    async fn post(&self, posting: Posting) -> Result<Settlement, AppError> {
        let posted = self.coordinator.post(posting).await?;
        Ok(Settlement {
            transaction: posted.transaction,
            balance: posted.balance,
        })
    }

    async fn settled(&self, transaction: Transaction) -> Result<Settlement, AppError> {
        let balance = self.repo().get_account(&transaction.account_id).await?.balance;
        Ok(Settlement {
            transaction,
            balance,
        })
    }

    async fn call<T>(
        &self,
        request: impl Future<Output = Result<T, GatewayError>>,
    ) -> Result<T, GatewayError> {
        match tokio::time::timeout(self.config.gateway_timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout(self.config.gateway_timeout)),
        }
    }
}

fn ambiguous(tx: &Transaction, step: GatewayStep, err: &GatewayError) {
    warn!(
        transaction_id = %tx.id,
        step = step.as_ref(),
        state = %tx.state,
        error = %err,
        "provider outcome unknown; transaction left pending"
    );
}

fn failure_reason(tx: &Transaction) -> String {
    tx.failure_reason
        .clone()
        .unwrap_or_else(|| format!("transaction ended in {}", tx.state))
}
