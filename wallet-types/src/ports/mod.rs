//! Port traits (interfaces for adapters).
//!
//! These are the contracts that adapters must implement.
//! The application layer depends on these traits, not concrete implementations.

mod gateway;
mod store;

pub use gateway::{
    CaptureReceipt, CaptureStatus, GatewayError, IntentReceipt, IntentStatus, PaymentGateway,
    TransferReceipt, TransferStatus,
};
pub use store::{AccountStore, LedgerRepository, TransactionStore};
