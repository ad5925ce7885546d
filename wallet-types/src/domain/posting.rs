//! Balance postings: the unit the account store applies atomically.

use serde::{Deserialize, Serialize};

use super::account::AccountId;
use super::transaction::{Transaction, TransactionKind, TransactionState};
use crate::error::DomainError;

/// Which balance effect of a transaction a posting carries.
///
/// Each `(transaction id, leg)` pair is applied at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PostingLeg {
    /// Deposit capture or internal credit
    Credit,
    /// Payout debit taken before the external send
    Reserve,
    /// Compensation of a reserve after a definitive send failure
    Release,
}

impl PostingLeg {
    fn valid_for(&self, kind: TransactionKind) -> bool {
        matches!(
            (self, kind),
            (Self::Credit, TransactionKind::Deposit | TransactionKind::InternalCredit)
                | (Self::Reserve | Self::Release, TransactionKind::Payout)
        )
    }
}

impl AsRef<str> for PostingLeg {
    fn as_ref(&self) -> &str {
        match self {
            Self::Credit => "CREDIT",
            Self::Reserve => "RESERVE",
            Self::Release => "RELEASE",
        }
    }
}

impl std::fmt::Display for PostingLeg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_ref())
    }
}

/// A balance delta bound to the transaction state change it settles.
#[derive(Debug, Clone, PartialEq)]
pub struct Posting {
    pub leg: PostingLeg,
    pub delta: i64,
    /// State the stored transaction must still be in for the posting to commit.
    pub expected_state: TransactionState,
    /// The transaction record as persisted together with the balance change.
    pub transaction: Transaction,
}

impl Posting {
    /// Builds the posting that moves `current` to `next`.
    pub fn new(
        leg: PostingLeg,
        current: &Transaction,
        next: TransactionState,
    ) -> Result<Self, DomainError> {
        if !leg.valid_for(current.kind) {
            return Err(DomainError::ValidationError(format!(
                "{leg} posting is not valid for a {} transaction",
                current.kind
            )));
        }
        let delta = match leg {
            PostingLeg::Credit | PostingLeg::Release => current.amount.as_credit(),
            PostingLeg::Reserve => current.amount.as_debit(),
        };
        Ok(Self {
            leg,
            delta,
            expected_state: current.state,
            transaction: current.advanced(next)?,
        })
    }

    pub fn account_id(&self) -> &AccountId {
        &self.transaction.account_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Currency, Money, TransactionId};

    fn payout() -> Transaction {
        Transaction::payout(
            TransactionId::new("p-1").unwrap(),
            AccountId::new("acc1").unwrap(),
            "dest".into(),
            Money::new(300, Currency::USD).unwrap(),
        )
    }

    #[test]
    fn test_reserve_is_a_debit() {
        let posting =
            Posting::new(PostingLeg::Reserve, &payout(), TransactionState::Reserved).unwrap();
        assert_eq!(posting.delta, -300);
        assert_eq!(posting.expected_state, TransactionState::Initiated);
        assert_eq!(posting.transaction.state, TransactionState::Reserved);
    }

    #[test]
    fn test_release_is_a_credit() {
        let mut tx = payout();
        tx.advance(TransactionState::Reserved).unwrap();
        tx.advance(TransactionState::Sending).unwrap();
        let posting = Posting::new(PostingLeg::Release, &tx, TransactionState::SendFailed).unwrap();
        assert_eq!(posting.delta, 300);
        assert!(posting.transaction.finalized_at.is_some());
    }

    #[test]
    fn test_leg_must_match_kind() {
        let result = Posting::new(PostingLeg::Credit, &payout(), TransactionState::Reserved);
        assert!(matches!(result, Err(DomainError::ValidationError(_))));
    }

    #[test]
    fn test_invalid_transition_rejected() {
        let result = Posting::new(PostingLeg::Reserve, &payout(), TransactionState::Sent);
        assert!(matches!(result, Err(DomainError::InvalidTransition { .. })));
    }
}
