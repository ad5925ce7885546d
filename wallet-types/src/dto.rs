//! Data Transfer Objects (DTOs) for requests and responses.
//!
//! Identifiers and currencies arrive as plain strings and are validated by the
//! application service, so malformed input surfaces as a `BadRequest`.

use serde::{Deserialize, Serialize};

use crate::domain::{AccountId, Currency, Transaction, TransactionId, TransactionState};

// ─────────────────────────────────────────────────────────────────────────────
// Requests
// ─────────────────────────────────────────────────────────────────────────────

/// Request to open a provider-funded deposit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDepositRequest {
    /// Idempotency key; generated when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    pub account_id: String,
    /// Amount in smallest currency unit
    pub amount: i64,
    pub currency: String,
}

/// Request to send funds out to a provider-side receiver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendPayoutRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    pub account_id: String,
    /// Receiver address at the provider
    pub destination: String,
    pub amount: i64,
    pub currency: String,
}

/// Request to credit an account directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditAccountRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    pub amount: i64,
}

/// Notification pushed by the payment provider.
///
/// Only the reference matters: the outcome is re-derived by replaying the
/// transaction's provider call, never taken from the payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEvent {
    /// The transaction id whose derived idempotency key the provider saw
    pub transaction_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_ref: Option<String>,
    #[serde(default)]
    pub event_type: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Responses
// ─────────────────────────────────────────────────────────────────────────────

/// Coarse outcome of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Success,
    /// Not settled yet; poll or retry with the same transaction id
    Pending,
    Failed,
}

impl From<TransactionState> for TransactionStatus {
    fn from(state: TransactionState) -> Self {
        if state.is_failure() {
            TransactionStatus::Failed
        } else if state.is_terminal() || state == TransactionState::IntentCreated {
            TransactionStatus::Success
        } else {
            TransactionStatus::Pending
        }
    }
}

/// Response for every balance-affecting operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionResponse {
    pub transaction_id: TransactionId,
    pub state: TransactionState,
    pub status: TransactionStatus,
    /// Account balance after the operation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_balance: Option<i64>,
    /// Checkout info for a created deposit intent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_redirect: Option<String>,
}

impl TransactionResponse {
    pub fn new(tx: &Transaction, new_balance: Option<i64>) -> Self {
        Self {
            transaction_id: tx.id.clone(),
            state: tx.state,
            status: tx.state.into(),
            new_balance,
            provider_redirect: tx.provider_redirect.clone(),
        }
    }
}

/// Current balance of an account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub account_id: AccountId,
    pub balance: i64,
    pub currency: Currency,
}
