//! # Payment Gateway
//!
//! Adapters implementing the `PaymentGateway` port.
//!
//! - [`HttpGateway`] talks to a JSON/REST provider
//! - [`SimulatedGateway`] is an in-process provider with fault injection
//! - [`signing`] holds the HMAC scheme shared by outbound requests and
//!   inbound provider callbacks
//!
//! Adapters classify outcomes: a definitive decline comes back as a receipt
//! with a `Failed` status, anything whose effect is unknown as a
//! `GatewayError`.

use std::sync::Arc;

use async_trait::async_trait;
use wallet_types::{
    CaptureReceipt, GatewayError, IntentReceipt, Money, PaymentGateway, TransferReceipt,
};

pub mod http;
pub mod signing;
pub mod simulated;

pub use http::{HttpGateway, HttpGatewayConfig};
pub use simulated::{Fault, Operation, SimulatedGateway};

/// Gateway selected at startup.
pub enum Gateway {
    Http(HttpGateway),
    Simulated(Arc<SimulatedGateway>),
}

#[async_trait]
impl PaymentGateway for Gateway {
    async fn create_intent(
        &self,
        idempotency_key: &str,
        amount: Money,
    ) -> Result<IntentReceipt, GatewayError> {
        match self {
            Self::Http(g) => g.create_intent(idempotency_key, amount).await,
            Self::Simulated(g) => g.create_intent(idempotency_key, amount).await,
        }
    }

    async fn capture_intent(
        &self,
        external_ref: &str,
        idempotency_key: &str,
    ) -> Result<CaptureReceipt, GatewayError> {
        match self {
            Self::Http(g) => g.capture_intent(external_ref, idempotency_key).await,
            Self::Simulated(g) => g.capture_intent(external_ref, idempotency_key).await,
        }
    }

    async fn send_transfer(
        &self,
        idempotency_key: &str,
        destination: &str,
        amount: Money,
    ) -> Result<TransferReceipt, GatewayError> {
        match self {
            Self::Http(g) => g.send_transfer(idempotency_key, destination, amount).await,
            Self::Simulated(g) => g.send_transfer(idempotency_key, destination, amount).await,
        }
    }
}
