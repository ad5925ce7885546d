//! In-memory repository adapter.
//!
//! Used by tests and by `memory://` deployments. Nothing survives a restart.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use wallet_types::{
    Account, AccountId, AccountStore, Posting, PostingLeg, RepoError, Transaction, TransactionId,
    TransactionState, TransactionStore,
};

struct StoredTransaction {
    seq: u64,
    tx: Transaction,
    swept_at: Option<DateTime<Utc>>,
}

impl StoredTransaction {
    /// Last time the record advanced or was picked up by a sweep.
    fn touched_at(&self) -> DateTime<Utc> {
        self.swept_at
            .map_or(self.tx.updated_at, |swept| swept.max(self.tx.updated_at))
    }
}

#[derive(Default)]
struct Inner {
    accounts: DashMap<AccountId, Account>,
    transactions: DashMap<TransactionId, StoredTransaction>,
    postings: DashMap<(TransactionId, PostingLeg), i64>,
    seq: AtomicU64,
}

/// DashMap-backed store. Clones share the same data.
#[derive(Clone, Default)]
pub struct MemoryRepo {
    inner: Arc<Inner>,
}

impl MemoryRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of postings applied so far.
    pub fn posting_count(&self) -> usize {
        self.inner.postings.len()
    }
}

#[async_trait]
impl AccountStore for MemoryRepo {
    async fn get_account(&self, id: &AccountId) -> Result<Account, RepoError> {
        Ok(self
            .inner
            .accounts
            .get(id)
            .map(|a| a.clone())
            .unwrap_or_else(|| Account::empty(id.clone())))
    }

    async fn apply_delta(
        &self,
        posting: &Posting,
        expected_version: i64,
    ) -> Result<Account, RepoError> {
        let tx = &posting.transaction;
        let key = (tx.id.clone(), posting.leg);

        // Lock order: account entry, then transaction entry. Every check runs
        // before the first mutation so a rejected posting leaves no trace.
        let mut account = self
            .inner
            .accounts
            .entry(posting.account_id().clone())
            .or_insert_with(|| Account::empty(posting.account_id().clone()));

        if self.inner.postings.contains_key(&key) {
            return Err(RepoError::DuplicatePosting);
        }
        if account.version != expected_version {
            return Err(RepoError::VersionConflict {
                expected: expected_version,
                actual: account.version,
            });
        }
        let balance = account.balance_after(posting.delta)?;

        let mut stored = self
            .inner
            .transactions
            .get_mut(&tx.id)
            .ok_or(RepoError::NotFound)?;
        if stored.tx.state != posting.expected_state {
            return Err(RepoError::Conflict(format!(
                "transaction {} is {}, expected {}",
                tx.id, stored.tx.state, posting.expected_state
            )));
        }

        self.inner.postings.insert(key, posting.delta);
        stored.tx = tx.clone();
        account.balance = balance;
        account.version += 1;

        Ok(account.clone())
    }
}

#[async_trait]
impl TransactionStore for MemoryRepo {
    async fn insert_transaction(&self, tx: &Transaction) -> Result<Option<Transaction>, RepoError> {
        use dashmap::mapref::entry::Entry;

        match self.inner.transactions.entry(tx.id.clone()) {
            Entry::Occupied(existing) => Ok(Some(existing.get().tx.clone())),
            Entry::Vacant(slot) => {
                let seq = self.inner.seq.fetch_add(1, Ordering::Relaxed);
                slot.insert(StoredTransaction {
                    seq,
                    tx: tx.clone(),
                    swept_at: None,
                });
                Ok(None)
            }
        }
    }

    async fn get_transaction(&self, id: &TransactionId) -> Result<Option<Transaction>, RepoError> {
        Ok(self.inner.transactions.get(id).map(|s| s.tx.clone()))
    }

    async fn update_transaction(
        &self,
        tx: &Transaction,
        expected_state: TransactionState,
    ) -> Result<(), RepoError> {
        let mut stored = self
            .inner
            .transactions
            .get_mut(&tx.id)
            .ok_or(RepoError::NotFound)?;
        if stored.tx.state != expected_state {
            return Err(RepoError::Conflict(format!(
                "transaction {} is {}, expected {}",
                tx.id, stored.tx.state, expected_state
            )));
        }
        stored.tx = tx.clone();
        Ok(())
    }

    async fn list_transactions_for_account(
        &self,
        account_id: &AccountId,
    ) -> Result<Vec<Transaction>, RepoError> {
        let mut rows: Vec<(u64, Transaction)> = self
            .inner
            .transactions
            .iter()
            .filter(|s| &s.tx.account_id == account_id)
            .map(|s| (s.seq, s.tx.clone()))
            .collect();
        rows.sort_by_key(|(seq, _)| *seq);
        Ok(rows.into_iter().map(|(_, tx)| tx).collect())
    }

    async fn list_stale(
        &self,
        states: &[TransactionState],
        updated_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Transaction>, RepoError> {
        let mut rows: Vec<(DateTime<Utc>, u64, Transaction)> = self
            .inner
            .transactions
            .iter()
            .filter(|s| states.contains(&s.tx.state) && s.touched_at() < updated_before)
            .map(|s| (s.touched_at(), s.seq, s.tx.clone()))
            .collect();
        rows.sort_by_key(|(touched_at, seq, _)| (*touched_at, *seq));
        Ok(rows
            .into_iter()
            .take(limit)
            .map(|(_, _, tx)| tx)
            .collect())
    }

    async fn mark_swept(&self, id: &TransactionId, at: DateTime<Utc>) -> Result<(), RepoError> {
        let mut stored = self
            .inner
            .transactions
            .get_mut(id)
            .ok_or(RepoError::NotFound)?;
        stored.swept_at = Some(at);
        Ok(())
    }
}
