//! # Wallet Hex
//!
//! Application layer and HTTP adapter for the wallet service.
//!
//! ## Architecture
//!
//! - `coordinator` - Transaction lifecycle persistence, postings with
//!   conflict retries, per-transaction locks
//! - `reconciler` - Drives deposits, payouts and credits against the payment
//!   provider; resumes and sweeps unsettled transactions
//! - `sweeper` - Background worker running periodic sweeps
//! - `service` - Application service (validation, DTO mapping)
//! - `inbound/` - HTTP adapter (Axum server)
//!
//! Everything is generic over `R: LedgerRepository` and `G: PaymentGateway`,
//! so stores and providers are injected at compile time.

pub mod coordinator;
pub mod inbound;
pub mod reconciler;
pub mod service;
pub mod sweeper;

#[cfg(test)]
mod service_tests;

pub use coordinator::TransactionCoordinator;
pub use reconciler::{EngineConfig, ReconciliationEngine, Settlement, SweepReport};
pub use service::WalletService;
pub use sweeper::ReconciliationWorker;
