//! Storage ports.
//!
//! Adapters (SQLite, in-memory) implement both traits over one backing store,
//! because `apply_delta` persists a balance change and a transaction state
//! change as a single atomic unit.

use chrono::{DateTime, Utc};

use crate::domain::{Account, AccountId, Posting, Transaction, TransactionId, TransactionState};
use crate::error::RepoError;

/// Durable account balances with optimistic concurrency.
#[async_trait::async_trait]
pub trait AccountStore: Send + Sync + 'static {
    /// Returns the account, or a zero-balance version-0 account if never written.
    async fn get_account(&self, id: &AccountId) -> Result<Account, RepoError>;

    /// Atomically applies `posting.delta` to the posting's account.
    ///
    /// In the same atomic unit the store:
    /// - rejects a `(transaction id, leg)` pair that was already applied
    ///   with [`RepoError::DuplicatePosting`];
    /// - rejects a stale `expected_version` with [`RepoError::VersionConflict`];
    /// - rejects a negative resulting balance with `InsufficientFunds`;
    /// - replaces the stored transaction with `posting.transaction`, provided
    ///   it is still in `posting.expected_state` ([`RepoError::Conflict`] otherwise).
    ///
    /// The change is durable when this returns `Ok`.
    async fn apply_delta(&self, posting: &Posting, expected_version: i64)
    -> Result<Account, RepoError>;
}

/// Append-mostly transaction records.
#[async_trait::async_trait]
pub trait TransactionStore: Send + Sync + 'static {
    /// Inserts a new record. Returns the stored record instead when the id is taken.
    async fn insert_transaction(&self, tx: &Transaction) -> Result<Option<Transaction>, RepoError>;

    async fn get_transaction(&self, id: &TransactionId) -> Result<Option<Transaction>, RepoError>;

    /// Replaces a record, provided its stored state is still `expected_state`.
    async fn update_transaction(
        &self,
        tx: &Transaction,
        expected_state: TransactionState,
    ) -> Result<(), RepoError>;

    /// Transactions of an account in insertion order.
    async fn list_transactions_for_account(
        &self,
        account_id: &AccountId,
    ) -> Result<Vec<Transaction>, RepoError>;

    /// Transactions in one of `states` neither updated nor swept since
    /// `updated_before`, least recently touched first.
    async fn list_stale(
        &self,
        states: &[TransactionState],
        updated_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Transaction>, RepoError>;

    /// Records a sweep attempt, moving the record behind untried ones in `list_stale`.
    async fn mark_swept(&self, id: &TransactionId, at: DateTime<Utc>) -> Result<(), RepoError>;
}

/// A backing store that provides both ports.
pub trait LedgerRepository: AccountStore + TransactionStore {}

impl<T: AccountStore + TransactionStore> LedgerRepository for T {}
