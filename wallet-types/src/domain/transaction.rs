//! Transaction domain model and lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::account::{AccountId, validate_opaque_id};
use super::money::Money;
use crate::error::DomainError;

/// Unique identifier for a Transaction. Doubles as the caller's idempotency key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(String);

impl TransactionId {
    /// Creates a TransactionId from a caller-supplied key.
    pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();
        validate_opaque_id("transaction id", &id)?;
        Ok(Self(id))
    }

    /// Creates a new random TransactionId.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Idempotency key handed to the payment provider for one step of this transaction.
    pub fn gateway_key(&self, step: GatewayStep) -> String {
        format!("{}:{}", self.0, step.as_ref())
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for TransactionId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// External step a transaction may drive at the payment provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayStep {
    Intent,
    Capture,
    Transfer,
}

impl AsRef<str> for GatewayStep {
    fn as_ref(&self) -> &str {
        match self {
            Self::Intent => "intent",
            Self::Capture => "capture",
            Self::Transfer => "transfer",
        }
    }
}

/// What a transaction does to its account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    /// Funds coming in through a provider intent
    Deposit,
    /// Funds leaving to a provider-side receiver
    Payout,
    /// Provider-free credit
    InternalCredit,
}

impl AsRef<str> for TransactionKind {
    fn as_ref(&self) -> &str {
        match self {
            Self::Deposit => "DEPOSIT",
            Self::Payout => "PAYOUT",
            Self::InternalCredit => "INTERNAL_CREDIT",
        }
    }
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_ref())
    }
}

impl std::str::FromStr for TransactionKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DEPOSIT" => Ok(Self::Deposit),
            "PAYOUT" => Ok(Self::Payout),
            "INTERNAL_CREDIT" => Ok(Self::InternalCredit),
            _ => Err(DomainError::ValidationError(format!(
                "Unknown transaction kind: {s}"
            ))),
        }
    }
}

/// Lifecycle state of a transaction.
///
/// Deposit: `Initiated -> IntentCreated -> Capturing -> Credited`, failing
/// into `IntentFailed` or `CaptureFailed`.
/// Payout: `Initiated -> Reserved -> Sending -> Sent`, failing into
/// `InsufficientFunds` or `SendFailed`.
/// InternalCredit: `Initiated -> Credited`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionState {
    Initiated,
    IntentCreated,
    IntentFailed,
    Capturing,
    Credited,
    CaptureFailed,
    Reserved,
    Sending,
    Sent,
    InsufficientFunds,
    SendFailed,
}

impl TransactionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::IntentFailed
                | Self::Credited
                | Self::CaptureFailed
                | Self::Sent
                | Self::InsufficientFunds
                | Self::SendFailed
        )
    }

    /// Terminal states in which the operation did not take effect.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::IntentFailed | Self::CaptureFailed | Self::InsufficientFunds | Self::SendFailed
        )
    }

    /// Whether `self -> next` is an edge of the state machine for `kind`.
    pub fn can_advance(&self, kind: TransactionKind, next: TransactionState) -> bool {
        use TransactionKind as K;
        use TransactionState as S;
        matches!(
            (kind, *self, next),
            (K::Deposit, S::Initiated, S::IntentCreated | S::IntentFailed)
                | (K::Deposit, S::IntentCreated, S::Capturing)
                | (K::Deposit, S::Capturing, S::Credited | S::CaptureFailed)
                | (K::Payout, S::Initiated, S::Reserved | S::InsufficientFunds)
                | (K::Payout, S::Reserved, S::Sending)
                | (K::Payout, S::Sending, S::Sent | S::SendFailed)
                | (K::InternalCredit, S::Initiated, S::Credited)
        )
    }

    /// States the reconciliation sweep picks up once they go stale.
    ///
    /// `Initiated` is included, so a request that was recorded but answered
    /// with `Busy` (or lost to a crash) is carried forward by the sweep: a
    /// payout is reserved and sent, a credit is posted, a deposit gets its
    /// intent. A caller retrying with the same id joins that same record.
    pub fn sweepable() -> &'static [TransactionState] {
        &[
            Self::Initiated,
            Self::Capturing,
            Self::Reserved,
            Self::Sending,
        ]
    }
}

impl AsRef<str> for TransactionState {
    fn as_ref(&self) -> &str {
        match self {
            Self::Initiated => "INITIATED",
            Self::IntentCreated => "INTENT_CREATED",
            Self::IntentFailed => "INTENT_FAILED",
            Self::Capturing => "CAPTURING",
            Self::Credited => "CREDITED",
            Self::CaptureFailed => "CAPTURE_FAILED",
            Self::Reserved => "RESERVED",
            Self::Sending => "SENDING",
            Self::Sent => "SENT",
            Self::InsufficientFunds => "INSUFFICIENT_FUNDS",
            Self::SendFailed => "SEND_FAILED",
        }
    }
}

impl std::fmt::Display for TransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_ref())
    }
}

impl std::str::FromStr for TransactionState {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "INITIATED" => Self::Initiated,
            "INTENT_CREATED" => Self::IntentCreated,
            "INTENT_FAILED" => Self::IntentFailed,
            "CAPTURING" => Self::Capturing,
            "CREDITED" => Self::Credited,
            "CAPTURE_FAILED" => Self::CaptureFailed,
            "RESERVED" => Self::Reserved,
            "SENDING" => Self::Sending,
            "SENT" => Self::Sent,
            "INSUFFICIENT_FUNDS" => Self::InsufficientFunds,
            "SEND_FAILED" => Self::SendFailed,
            _ => {
                return Err(DomainError::ValidationError(format!(
                    "Unknown transaction state: {s}"
                )));
            }
        })
    }
}

/// A durable record of one balance-affecting operation and its lifecycle.
///
/// Records are never deleted; they answer idempotent replays and audits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub account_id: AccountId,
    pub kind: TransactionKind,
    pub amount: Money,
    pub state: TransactionState,
    /// Provider-side identifier once known
    pub external_ref: Option<String>,
    /// Receiver address for payouts
    pub destination: Option<String>,
    /// Checkout/redirect info returned with a created intent
    pub provider_redirect: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finalized_at: Option<DateTime<Utc>>,
}

impl Transaction {
    fn initiated(
        id: TransactionId,
        account_id: AccountId,
        kind: TransactionKind,
        amount: Money,
        destination: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            account_id,
            kind,
            amount,
            state: TransactionState::Initiated,
            external_ref: None,
            destination,
            provider_redirect: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
            finalized_at: None,
        }
    }

    /// Creates a new deposit transaction.
    pub fn deposit(id: TransactionId, account_id: AccountId, amount: Money) -> Self {
        Self::initiated(id, account_id, TransactionKind::Deposit, amount, None)
    }

    /// Creates a new payout transaction.
    pub fn payout(
        id: TransactionId,
        account_id: AccountId,
        destination: String,
        amount: Money,
    ) -> Self {
        Self::initiated(
            id,
            account_id,
            TransactionKind::Payout,
            amount,
            Some(destination),
        )
    }

    /// Creates a new internal credit transaction.
    pub fn internal_credit(id: TransactionId, account_id: AccountId, amount: Money) -> Self {
        Self::initiated(id, account_id, TransactionKind::InternalCredit, amount, None)
    }

    /// Moves the transaction to `next`, stamping timestamps.
    pub fn advance(&mut self, next: TransactionState) -> Result<(), DomainError> {
        if !self.state.can_advance(self.kind, next) {
            return Err(DomainError::InvalidTransition {
                kind: self.kind,
                from: self.state,
                to: next,
            });
        }
        let now = Utc::now();
        self.state = next;
        self.updated_at = now;
        if next.is_terminal() {
            self.finalized_at = Some(now);
        }
        Ok(())
    }

    /// Like [`Transaction::advance`] but returns the advanced copy.
    pub fn advanced(&self, next: TransactionState) -> Result<Self, DomainError> {
        let mut tx = self.clone();
        tx.advance(next)?;
        Ok(tx)
    }

    /// Whether `other` describes the same requested operation.
    ///
    /// A replay must repeat the original parameters; reusing an id for a
    /// different operation is a caller error.
    pub fn same_request(&self, other: &Transaction) -> bool {
        self.id == other.id
            && self.account_id == other.account_id
            && self.kind == other.kind
            && self.amount == other.amount
            && self.destination == other.destination
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Currency;

    fn usd(amount: i64) -> Money {
        Money::new(amount, Currency::USD).unwrap()
    }

    fn deposit() -> Transaction {
        Transaction::deposit(
            TransactionId::new("tx-1").unwrap(),
            AccountId::new("acc1").unwrap(),
            usd(500),
        )
    }

    #[test]
    fn test_deposit_happy_path() {
        let mut tx = deposit();
        assert_eq!(tx.state, TransactionState::Initiated);
        tx.advance(TransactionState::IntentCreated).unwrap();
        tx.advance(TransactionState::Capturing).unwrap();
        assert!(tx.finalized_at.is_none());
        tx.advance(TransactionState::Credited).unwrap();
        assert!(tx.state.is_terminal());
        assert!(tx.finalized_at.is_some());
    }

    #[test]
    fn test_states_are_not_revisited() {
        let mut tx = deposit();
        tx.advance(TransactionState::IntentCreated).unwrap();
        let err = tx.advance(TransactionState::IntentCreated).unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition { .. }));
        assert!(tx.advance(TransactionState::Initiated).is_err());
    }

    #[test]
    fn test_deposit_cannot_skip_capturing() {
        let mut tx = deposit();
        tx.advance(TransactionState::IntentCreated).unwrap();
        assert!(tx.advance(TransactionState::Credited).is_err());
        assert_eq!(tx.state, TransactionState::IntentCreated);
    }

    #[test]
    fn test_payout_edges() {
        let mut tx = Transaction::payout(
            TransactionId::generate(),
            AccountId::new("acc1").unwrap(),
            "dest-1".into(),
            usd(300),
        );
        assert!(tx.advance(TransactionState::Sending).is_err());
        tx.advance(TransactionState::Reserved).unwrap();
        tx.advance(TransactionState::Sending).unwrap();
        tx.advance(TransactionState::SendFailed).unwrap();
        assert!(tx.state.is_failure());
        assert!(tx.advance(TransactionState::Sent).is_err());
    }

    #[test]
    fn test_internal_credit_is_single_step() {
        let tx = Transaction::internal_credit(
            TransactionId::generate(),
            AccountId::new("acc1").unwrap(),
            usd(1),
        );
        assert!(tx.advanced(TransactionState::Credited).is_ok());
        assert!(tx.advanced(TransactionState::Reserved).is_err());
    }

    #[test]
    fn test_state_round_trips_through_strings() {
        for state in [
            TransactionState::Initiated,
            TransactionState::IntentCreated,
            TransactionState::Capturing,
            TransactionState::InsufficientFunds,
            TransactionState::SendFailed,
        ] {
            assert_eq!(state.as_ref().parse::<TransactionState>().unwrap(), state);
        }
    }

    #[test]
    fn test_gateway_keys_are_derived_from_id() {
        let id = TransactionId::new("abc").unwrap();
        assert_eq!(id.gateway_key(GatewayStep::Intent), "abc:intent");
        assert_eq!(id.gateway_key(GatewayStep::Transfer), "abc:transfer");
    }

    #[test]
    fn test_same_request() {
        let a = deposit();
        let mut b = deposit();
        assert!(a.same_request(&b));
        b.amount = usd(501);
        assert!(!a.same_request(&b));
    }
}
