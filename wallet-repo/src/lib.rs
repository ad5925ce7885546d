//! # Wallet Repository
//!
//! Concrete store implementations (adapters) for the wallet service.
//! Every adapter implements both `AccountStore` and `TransactionStore` over a
//! single backing store, so a posting and its transaction state change commit
//! together.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use wallet_types::{
    Account, AccountId, AccountStore, Posting, RepoError, Transaction, TransactionId,
    TransactionState, TransactionStore,
};

pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "sqlite")]
mod types;


pub use memory::MemoryRepo;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteRepo;

/// Unified repository wrapper selected by database URL.
pub enum Repo {
    Memory(MemoryRepo),
    #[cfg(feature = "sqlite")]
    Sqlite(SqliteRepo),
}

/// Build and initialize a repository from a database URL.
///
/// - `memory://` gives a process-local store
/// - `sqlite://path/to/wallet.db` (or `sqlite::memory:`) connects and migrates
///
/// # Examples
///
/// ```ignore
/// let repo = build_repo("sqlite://data/wallet.db").await?;
/// let scratch = build_repo("memory://").await?;
/// ```
pub async fn build_repo(database_url: &str) -> anyhow::Result<Repo> {
    Repo::new(database_url).await
}

impl Repo {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        if database_url.starts_with("memory:") {
            tracing::warn!("using in-memory store; balances will not survive a restart");
            return Ok(Self::Memory(MemoryRepo::new()));
        }

        #[cfg(feature = "sqlite")]
        if database_url.starts_with("sqlite:") {
            return Ok(Self::Sqlite(SqliteRepo::new(database_url).await?));
        }

        anyhow::bail!("unsupported DATABASE_URL scheme: {database_url}")
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Implement the store ports for Repo (delegation)
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl AccountStore for Repo {
    async fn get_account(&self, id: &AccountId) -> Result<Account, RepoError> {
        match self {
            Self::Memory(r) => r.get_account(id).await,
            #[cfg(feature = "sqlite")]
            Self::Sqlite(r) => r.get_account(id).await,
        }
    }

    async fn apply_delta(
        &self,
        posting: &Posting,
        expected_version: i64,
    ) -> Result<Account, RepoError> {
        match self {
            Self::Memory(r) => r.apply_delta(posting, expected_version).await,
            #[cfg(feature = "sqlite")]
            Self::Sqlite(r) => r.apply_delta(posting, expected_version).await,
        }
    }
}

#[async_trait]
impl TransactionStore for Repo {
    async fn insert_transaction(&self, tx: &Transaction) -> Result<Option<Transaction>, RepoError> {
        match self {
            Self::Memory(r) => r.insert_transaction(tx).await,
            #[cfg(feature = "sqlite")]
            Self::Sqlite(r) => r.insert_transaction(tx).await,
        }
    }

    async fn get_transaction(&self, id: &TransactionId) -> Result<Option<Transaction>, RepoError> {
        match self {
            Self::Memory(r) => r.get_transaction(id).await,
            #[cfg(feature = "sqlite")]
            Self::Sqlite(r) => r.get_transaction(id).await,
        }
    }

    async fn update_transaction(
        &self,
        tx: &Transaction,
        expected_state: TransactionState,
    ) -> Result<(), RepoError> {
        match self {
            Self::Memory(r) => r.update_transaction(tx, expected_state).await,
            #[cfg(feature = "sqlite")]
            Self::Sqlite(r) => r.update_transaction(tx, expected_state).await,
        }
    }

    async fn list_transactions_for_account(
        &self,
        account_id: &AccountId,
    ) -> Result<Vec<Transaction>, RepoError> {
        match self {
            Self::Memory(r) => r.list_transactions_for_account(account_id).await,
            #[cfg(feature = "sqlite")]
            Self::Sqlite(r) => r.list_transactions_for_account(account_id).await,
        }
    }

    async fn list_stale(
        &self,
        states: &[TransactionState],
        updated_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Transaction>, RepoError> {
        match self {
            Self::Memory(r) => r.list_stale(states, updated_before, limit).await,
            #[cfg(feature = "sqlite")]
            Self::Sqlite(r) => r.list_stale(states, updated_before, limit).await,
        }
    }

    async fn mark_swept(&self, id: &TransactionId, at: DateTime<Utc>) -> Result<(), RepoError> {
        match self {
            Self::Memory(r) => r.mark_swept(id, at).await,
            #[cfg(feature = "sqlite")]
            Self::Sqlite(r) => r.mark_swept(id, at).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_build_repo_selects_memory() {
        let repo = build_repo("memory://").await.unwrap();
        assert!(matches!(repo, Repo::Memory(_)));
    }

    #[tokio::test]
    async fn test_build_repo_rejects_unknown_scheme() {
        assert!(build_repo("postgres://localhost/wallet").await.is_err());
    }
}
