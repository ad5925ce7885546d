//! Payment provider port.
//!
//! Implementations can be HTTP clients, simulated providers, etc.
//! Every call takes a caller-chosen idempotency key; repeating a call with the
//! same key must not repeat its effect at the provider.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::Money;

/// A provider call whose outcome is unknown.
///
/// Definitive declines are reported through the receipt statuses, never here:
/// an error means the provider may or may not have executed the request.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    #[error("Provider call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Provider returned HTTP {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("Unexpected provider response: {0}")]
    UnexpectedResponse(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntentStatus {
    Created,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentReceipt {
    pub external_ref: String,
    pub status: IntentStatus,
    /// Where the payer completes the intent, if the provider supplies one.
    pub redirect_url: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaptureStatus {
    Captured,
    Pending,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureReceipt {
    pub status: CaptureStatus,
    pub captured_amount: i64,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferStatus {
    Submitted,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub external_ref: Option<String>,
    pub status: TransferStatus,
    pub reason: Option<String>,
}

/// Port trait for the external payment provider.
#[async_trait::async_trait]
pub trait PaymentGateway: Send + Sync + 'static {
    /// Creates a payment intent the payer will fund.
    async fn create_intent(
        &self,
        idempotency_key: &str,
        amount: Money,
    ) -> Result<IntentReceipt, GatewayError>;

    /// Captures a previously created intent.
    async fn capture_intent(
        &self,
        external_ref: &str,
        idempotency_key: &str,
    ) -> Result<CaptureReceipt, GatewayError>;

    /// Sends funds to an external receiver address.
    async fn send_transfer(
        &self,
        idempotency_key: &str,
        destination: &str,
        amount: Money,
    ) -> Result<TransferReceipt, GatewayError>;
}
