//! Account domain model.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

const MAX_ID_LEN: usize = 128;

/// Opaque identifier for a wallet account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    /// Creates an AccountId, rejecting empty or oversized identifiers.
    pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();
        validate_opaque_id("account id", &id)?;
        Ok(Self(id))
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for AccountId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

pub(crate) fn validate_opaque_id(what: &str, id: &str) -> Result<(), DomainError> {
    if id.trim().is_empty() {
        return Err(DomainError::ValidationError(format!("{what} cannot be empty")));
    }
    if id.len() > MAX_ID_LEN {
        return Err(DomainError::ValidationError(format!(
            "{what} longer than {MAX_ID_LEN} bytes"
        )));
    }
    if id.chars().any(char::is_control) {
        return Err(DomainError::ValidationError(format!(
            "{what} contains control characters"
        )));
    }
    Ok(())
}

/// An internal wallet balance.
///
/// `version` increases by one with every committed balance change and is the
/// token callers hand back for optimistic concurrency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    /// Balance in the smallest currency unit. Never negative.
    pub balance: i64,
    pub version: i64,
}

impl Account {
    /// The state of an account that has never been written.
    pub fn empty(id: AccountId) -> Self {
        Self {
            id,
            balance: 0,
            version: 0,
        }
    }

    /// Creates an account with all fields specified (for storage reconstruction).
    pub fn from_parts(id: AccountId, balance: i64, version: i64) -> Self {
        Self {
            id,
            balance,
            version,
        }
    }

    /// Computes the balance after applying `delta`, refusing to go negative.
    pub fn balance_after(&self, delta: i64) -> Result<i64, DomainError> {
        let next = self
            .balance
            .checked_add(delta)
            .ok_or_else(|| DomainError::ValidationError("balance overflow".into()))?;
        if next < 0 {
            return Err(DomainError::InsufficientFunds {
                available: self.balance,
                required: -delta,
            });
        }
        Ok(next)
    }

    /// Applies `delta` and bumps the version.
    pub fn apply(&mut self, delta: i64) -> Result<(), DomainError> {
        self.balance = self.balance_after(delta)?;
        self.version += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acc(id: &str) -> AccountId {
        AccountId::new(id).unwrap()
    }

    #[test]
    fn test_empty_account() {
        let account = Account::empty(acc("alice"));
        assert_eq!(account.balance, 0);
        assert_eq!(account.version, 0);
    }

    #[test]
    fn test_invalid_ids_rejected() {
        assert!(AccountId::new("").is_err());
        assert!(AccountId::new("   ").is_err());
        assert!(AccountId::new("a".repeat(129)).is_err());
        assert!(AccountId::new("bad\nid").is_err());
    }

    #[test]
    fn test_apply_credit_and_debit() {
        let mut account = Account::empty(acc("alice"));
        account.apply(1000).unwrap();
        account.apply(-300).unwrap();
        assert_eq!(account.balance, 700);
        assert_eq!(account.version, 2);
    }

    #[test]
    fn test_insufficient_funds() {
        let mut account = Account::from_parts(acc("alice"), 100, 4);
        let result = account.apply(-200);
        assert!(matches!(
            result,
            Err(DomainError::InsufficientFunds {
                available: 100,
                required: 200
            })
        ));
        assert_eq!(account.balance, 100);
        assert_eq!(account.version, 4);
    }

    #[test]
    fn test_debit_to_exactly_zero() {
        let mut account = Account::from_parts(acc("alice"), 100, 1);
        account.apply(-100).unwrap();
        assert_eq!(account.balance, 0);
    }
}
