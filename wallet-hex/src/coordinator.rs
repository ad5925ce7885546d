//! Transaction Coordinator
//!
//! Persists Transaction records through their lifecycle and applies postings
//! with optimistic-concurrency retries. Also owns the per-transaction lock
//! table that serializes work on one transaction id.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use rand::Rng;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

use wallet_types::{
    AppError, LedgerRepository, Posting, RepoError, Transaction, TransactionId, TransactionState,
};

const BACKOFF_BASE: Duration = Duration::from_millis(5);
const BACKOFF_CAP: Duration = Duration::from_millis(200);

/// A posting that committed, or was found already committed.
#[derive(Debug, Clone)]
pub struct Posted {
    pub transaction: Transaction,
    pub balance: i64,
}

/// Exclusive hold on one transaction id. Released on drop.
pub struct TransactionGuard<'a> {
    id: TransactionId,
    table: &'a DashMap<TransactionId, Arc<Mutex<()>>>,
    held: Option<OwnedMutexGuard<()>>,
}

impl Drop for TransactionGuard<'_> {
    fn drop(&mut self) {
        // Unlock first so the strong count below reflects waiters only.
        drop(self.held.take());
        self.table
            .remove_if(&self.id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

pub struct TransactionCoordinator<R: LedgerRepository> {
    repo: Arc<R>,
    locks: DashMap<TransactionId, Arc<Mutex<()>>>,
    conflict_retries: u32,
}

impl<R: LedgerRepository> TransactionCoordinator<R> {
    pub fn new(repo: Arc<R>, conflict_retries: u32) -> Self {
        Self {
            repo,
            locks: DashMap::new(),
            conflict_retries,
        }
    }

    pub fn repo(&self) -> &R {
        &self.repo
    }

    /// Waits until no other caller is working on `id`.
    pub async fn lock(&self, id: &TransactionId) -> TransactionGuard<'_> {
        let lock = self.locks.entry(id.clone()).or_default().clone();
        let held = lock.lock_owned().await;
        TransactionGuard {
            id: id.clone(),
            table: &self.locks,
            held: Some(held),
        }
    }

    /// Ids currently locked or awaited.
    pub fn active_locks(&self) -> usize {
        self.locks.len()
    }

    /// Persists a new record, or returns the stored one for a replayed id.
    ///
    /// The boolean is `true` when the record was created by this call.
    pub async fn open(&self, tx: Transaction) -> Result<(Transaction, bool), AppError> {
        match self.repo.insert_transaction(&tx).await? {
            None => {
                debug!(transaction_id = %tx.id, kind = %tx.kind, "transaction opened");
                Ok((tx, true))
            }
            Some(existing) if existing.same_request(&tx) => Ok((existing, false)),
            Some(existing) => Err(AppError::BadRequest(format!(
                "Transaction id {} is already used by a different {} request",
                existing.id, existing.kind
            ))),
        }
    }

    pub async fn load(&self, id: &TransactionId) -> Result<Transaction, AppError> {
        self.repo
            .get_transaction(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Transaction {id}")))
    }

    /// Persists `next`, provided the stored record is still in `current`'s state.
    pub async fn save(
        &self,
        current: &Transaction,
        next: Transaction,
    ) -> Result<Transaction, AppError> {
        self.repo.update_transaction(&next, current.state).await?;
        tracing::info!(
            transaction_id = %next.id,
            from = %current.state,
            to = %next.state,
            "transaction advanced"
        );
        Ok(next)
    }

    /// Advances `current` to `next` without moving money.
    pub async fn advance(
        &self,
        current: &Transaction,
        next: TransactionState,
    ) -> Result<Transaction, AppError> {
        let advanced = current.advanced(next)?;
        self.save(current, advanced).await
    }

    /// Applies a posting, retrying on version conflicts.
    ///
    /// A posting that was already applied is reported as committed with the
    /// stored record. Overdrafts surface as `AppError::InsufficientFunds`.
    pub async fn post(&self, posting: Posting) -> Result<Posted, AppError> {
        let account_id = posting.account_id().clone();

        for attempt in 0..=self.conflict_retries {
            let account = self.repo.get_account(&account_id).await?;

            match self.repo.apply_delta(&posting, account.version).await {
                Ok(account) => {
                    tracing::info!(
                        transaction_id = %posting.transaction.id,
                        leg = %posting.leg,
                        delta = posting.delta,
                        balance = account.balance,
                        state = %posting.transaction.state,
                        "posting applied"
                    );
                    return Ok(Posted {
                        transaction: posting.transaction,
                        balance: account.balance,
                    });
                }
                Err(RepoError::VersionConflict { expected, actual }) => {
                    warn!(
                        %account_id,
                        expected,
                        actual,
                        attempt,
                        "version conflict, retrying"
                    );
                    tokio::time::sleep(backoff(attempt)).await;
                }
                Err(RepoError::DuplicatePosting) => {
                    debug!(transaction_id = %posting.transaction.id, leg = %posting.leg, "posting already applied");
                    let transaction = self.load(&posting.transaction.id).await?;
                    let balance = self.repo.get_account(&account_id).await?.balance;
                    return Ok(Posted {
                        transaction,
                        balance,
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(AppError::Busy(format!(
            "Account {account_id} is under heavy contention, retry later"
        )))
    }
}

fn backoff(attempt: u32) -> Duration {
    let ceiling = BACKOFF_BASE
        .saturating_mul(1u32 << attempt.min(6))
        .min(BACKOFF_CAP);
    let millis = ceiling.as_millis() as u64;
    Duration::from_millis(rand::rng().random_range(millis / 2..=millis))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wallet_repo::MemoryRepo;
    use wallet_types::{AccountId, Currency, Money, PostingLeg};

    fn coordinator() -> TransactionCoordinator<MemoryRepo> {
        TransactionCoordinator::new(Arc::new(MemoryRepo::new()), 3)
    }

    fn credit(id: &str, amount: i64) -> Transaction {
        Transaction::internal_credit(
            TransactionId::new(id).unwrap(),
            AccountId::new("alice").unwrap(),
            Money::new(amount, Currency::USD).unwrap(),
        )
    }

    #[test]
    fn test_backoff_is_bounded() {
        for attempt in 0..20 {
            assert!(backoff(attempt) <= BACKOFF_CAP);
        }
    }

    #[tokio::test]
    async fn test_open_detects_replay_and_reuse() {
        let coord = coordinator();

        let (_, fresh) = coord.open(credit("c-1", 10)).await.unwrap();
        assert!(fresh);
        let (_, fresh) = coord.open(credit("c-1", 10)).await.unwrap();
        assert!(!fresh);

        let err = coord.open(credit("c-1", 99)).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_post_is_applied_once() {
        let coord = coordinator();
        let (tx, _) = coord.open(credit("c-1", 10)).await.unwrap();

        let posting = Posting::new(PostingLeg::Credit, &tx, TransactionState::Credited).unwrap();
        let first = coord.post(posting.clone()).await.unwrap();
        let again = coord.post(posting).await.unwrap();

        assert_eq!(first.balance, 10);
        assert_eq!(again.balance, 10);
        assert_eq!(again.transaction.state, TransactionState::Credited);
    }

    #[tokio::test]
    async fn test_lock_entries_are_released() {
        let coord = coordinator();
        let id = TransactionId::new("t-1").unwrap();

        {
            let _guard = coord.lock(&id).await;
            assert_eq!(coord.active_locks(), 1);
        }
        assert_eq!(coord.active_locks(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_lock_serializes_same_id() {
        let coord = Arc::new(coordinator());
        let id = TransactionId::new("t-1").unwrap();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        let guard = coord.lock(&id).await;
        let waiter = {
            let coord = coord.clone();
            let id = id.clone();
            let order = order.clone();
            tokio::spawn(async move {
                let _guard = coord.lock(&id).await;
                order.lock().unwrap().push("second");
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        order.lock().unwrap().push("first");
        drop(guard);
        waiter.await.unwrap();

        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
        assert_eq!(coord.active_locks(), 0);
    }
}
