//! In-process payment provider with scriptable faults.
//!
//! Behaves like a well-behaved provider: results are recorded per idempotency
//! key and replayed verbatim. Faults are injected per operation, either as a
//! one-shot queue ([`SimulatedGateway::push_fault`]) or as a standing fault
//! ([`SimulatedGateway::set_fault`]) that applies until cleared.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use wallet_types::{
    CaptureReceipt, CaptureStatus, GatewayError, IntentReceipt, IntentStatus, Money,
    PaymentGateway, TransferReceipt, TransferStatus,
};

/// Provider operations, for fault scripting and call accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateIntent,
    CaptureIntent,
    SendTransfer,
}

/// How the next call to an operation misbehaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Definitive refusal; recorded under the key like any other result
    Decline,
    /// Capture not settled yet; nothing is recorded, a later call may capture
    Pending,
    /// The request never reached the provider
    Timeout,
    /// The provider executed the request but the reply was lost
    LostResponse,
}

struct RecordedTransfer {
    destination: String,
    amount: i64,
    receipt: TransferReceipt,
}

#[derive(Default)]
pub struct SimulatedGateway {
    queued: DashMap<Operation, VecDeque<Fault>>,
    standing: DashMap<Operation, Fault>,
    calls: DashMap<Operation, usize>,
    intents: DashMap<String, IntentReceipt>,
    intent_amounts: DashMap<String, Money>,
    captures: DashMap<String, CaptureReceipt>,
    transfers: DashMap<String, RecordedTransfer>,
    latency: Option<Duration>,
}

const SIMULATED_TIMEOUT: Duration = Duration::from_secs(30);

impl SimulatedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every reply, to exercise caller-side timeouts.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Queues a fault for the next call to `op`.
    pub fn push_fault(&self, op: Operation, fault: Fault) {
        self.queued.entry(op).or_default().push_back(fault);
    }

    /// Applies `fault` to every call to `op` until cleared with `None`.
    pub fn set_fault(&self, op: Operation, fault: Option<Fault>) {
        match fault {
            Some(f) => {
                self.standing.insert(op, f);
            }
            None => {
                self.standing.remove(&op);
            }
        }
    }

    /// Calls received for `op`, including replays and faulted calls.
    pub fn call_count(&self, op: Operation) -> usize {
        self.calls.get(&op).map(|c| *c).unwrap_or(0)
    }

    /// Distinct requests the provider actually executed for `op`.
    pub fn executed_count(&self, op: Operation) -> usize {
        match op {
            Operation::CreateIntent => self.intents.len(),
            Operation::CaptureIntent => self
                .captures
                .iter()
                .filter(|c| c.status == CaptureStatus::Captured)
                .count(),
            Operation::SendTransfer => self
                .transfers
                .iter()
                .filter(|t| t.receipt.status == TransferStatus::Submitted)
                .count(),
        }
    }

    /// Sum of submitted transfers to `destination`.
    pub fn sent_to(&self, destination: &str) -> i64 {
        self.transfers
            .iter()
            .filter(|t| t.receipt.status == TransferStatus::Submitted && t.destination == destination)
            .map(|t| t.amount)
            .sum()
    }

    async fn begin(&self, op: Operation) -> Option<Fault> {
        *self.calls.entry(op).or_default() += 1;
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let queued = self.queued.get_mut(&op).and_then(|mut q| q.pop_front());
        queued.or_else(|| self.standing.get(&op).map(|f| *f))
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    async fn create_intent(
        &self,
        idempotency_key: &str,
        amount: Money,
    ) -> Result<IntentReceipt, GatewayError> {
        let fault = self.begin(Operation::CreateIntent).await;
        if fault == Some(Fault::Timeout) {
            return Err(GatewayError::Timeout(SIMULATED_TIMEOUT));
        }

        let receipt = self
            .intents
            .entry(idempotency_key.to_string())
            .or_insert_with(|| {
                let external_ref = format!("pi_{}", uuid::Uuid::new_v4().simple());
                if fault == Some(Fault::Decline) {
                    return IntentReceipt {
                        external_ref,
                        status: IntentStatus::Failed,
                        redirect_url: None,
                        reason: Some("intent declined".into()),
                    };
                }
                self.intent_amounts.insert(external_ref.clone(), amount);
                IntentReceipt {
                    redirect_url: Some(format!("https://checkout.simulated.local/{external_ref}")),
                    external_ref,
                    status: IntentStatus::Created,
                    reason: None,
                }
            })
            .clone();
        debug!(idempotency_key, external_ref = %receipt.external_ref, "simulated intent");

        if fault == Some(Fault::LostResponse) {
            return Err(GatewayError::Timeout(SIMULATED_TIMEOUT));
        }
        Ok(receipt)
    }

    async fn capture_intent(
        &self,
        external_ref: &str,
        idempotency_key: &str,
    ) -> Result<CaptureReceipt, GatewayError> {
        let fault = self.begin(Operation::CaptureIntent).await;
        if fault == Some(Fault::Timeout) {
            return Err(GatewayError::Timeout(SIMULATED_TIMEOUT));
        }

        if let Some(recorded) = self.captures.get(idempotency_key) {
            if fault == Some(Fault::LostResponse) {
                return Err(GatewayError::Timeout(SIMULATED_TIMEOUT));
            }
            return Ok(recorded.clone());
        }

        if fault == Some(Fault::Pending) {
            return Ok(CaptureReceipt {
                status: CaptureStatus::Pending,
                captured_amount: 0,
                reason: None,
            });
        }

        let receipt = match (fault, self.intent_amounts.get(external_ref)) {
            (Some(Fault::Decline), _) => CaptureReceipt {
                status: CaptureStatus::Failed,
                captured_amount: 0,
                reason: Some("payment declined".into()),
            },
            (_, None) => CaptureReceipt {
                status: CaptureStatus::Failed,
                captured_amount: 0,
                reason: Some(format!("no such intent: {external_ref}")),
            },
            (_, Some(amount)) => CaptureReceipt {
                status: CaptureStatus::Captured,
                captured_amount: amount.amount(),
                reason: None,
            },
        };
        let receipt = self
            .captures
            .entry(idempotency_key.to_string())
            .or_insert(receipt)
            .clone();
        debug!(idempotency_key, status = ?receipt.status, "simulated capture");

        if fault == Some(Fault::LostResponse) {
            return Err(GatewayError::Timeout(SIMULATED_TIMEOUT));
        }
        Ok(receipt)
    }

    async fn send_transfer(
        &self,
        idempotency_key: &str,
        destination: &str,
        amount: Money,
    ) -> Result<TransferReceipt, GatewayError> {
        let fault = self.begin(Operation::SendTransfer).await;
        if fault == Some(Fault::Timeout) {
            return Err(GatewayError::Timeout(SIMULATED_TIMEOUT));
        }

        let receipt = self
            .transfers
            .entry(idempotency_key.to_string())
            .or_insert_with(|| {
                let receipt = if fault == Some(Fault::Decline) {
                    TransferReceipt {
                        external_ref: None,
                        status: TransferStatus::Failed,
                        reason: Some("receiver rejected transfer".into()),
                    }
                } else {
                    TransferReceipt {
                        external_ref: Some(format!("tr_{}", uuid::Uuid::new_v4().simple())),
                        status: TransferStatus::Submitted,
                        reason: None,
                    }
                };
                RecordedTransfer {
                    destination: destination.to_string(),
                    amount: amount.amount(),
                    receipt,
                }
            })
            .receipt
            .clone();
        debug!(idempotency_key, status = ?receipt.status, "simulated transfer");

        if fault == Some(Fault::LostResponse) {
            return Err(GatewayError::Timeout(SIMULATED_TIMEOUT));
        }
        Ok(receipt)
    }
}
