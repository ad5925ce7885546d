//! Domain models for the wallet ledger.

pub mod account;
pub mod money;
pub mod posting;
pub mod transaction;

pub use account::{Account, AccountId};
pub use money::{Currency, Money};
pub use posting::{Posting, PostingLeg};
pub use transaction::{GatewayStep, Transaction, TransactionId, TransactionKind, TransactionState};
