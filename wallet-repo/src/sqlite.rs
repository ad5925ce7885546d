//! SQLite repository adapter.
#![allow(clippy::collapsible_if)]

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

use wallet_types::{
    Account, AccountId, AccountStore, Posting, RepoError, Transaction, TransactionId,
    TransactionState, TransactionStore,
};

use crate::types::{DbAccount, DbTransaction, TRANSACTION_COLUMNS, fmt_ts};

const MIGRATION: &str = include_str!("../migrations/0001_create_tables.sql");

/// Latest of the last state change and the last sweep attempt.
const TOUCHED_AT: &str = "MAX(updated_at, COALESCE(swept_at, updated_at))";

fn db_err(e: sqlx::Error) -> RepoError {
    RepoError::Database(e.to_string())
}

// ─────────────────────────────────────────────────────────────────────────────
// SQLite Repository
// ─────────────────────────────────────────────────────────────────────────────

/// SQLite repository implementation.
pub struct SqliteRepo {
    pool: SqlitePool,
}

impl SqliteRepo {
    /// Creates a new SQLite repository with automatic migration.
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let in_memory = database_url.contains(":memory:") || database_url.contains("mode=memory");

        // Ensure on-disk SQLite target directory exists (no-op for in-memory).
        if let Some(path) = database_url.strip_prefix("sqlite://") {
            let path = path.split('?').next().unwrap_or(path);
            if !in_memory {
                let p = std::path::Path::new(path);
                if let Some(parent) = p.parent() {
                    if !parent.as_os_str().is_empty() {
                        tokio::fs::create_dir_all(parent).await?;
                    }
                }
            }
        }

        let mut options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        // Every in-memory connection is its own database; keep exactly one.
        let pool = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(8)
                .connect_with(options)
                .await?
        };

        sqlx::raw_sql(MIGRATION).execute(&pool).await?;
        tracing::debug!(database_url, "sqlite store ready");

        Ok(Self { pool })
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn fetch_transaction<'e, E>(
        executor: E,
        id: &TransactionId,
    ) -> Result<Option<Transaction>, RepoError>
    where
        E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
    {
        let sql = format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = ?");
        let row: Option<DbTransaction> = sqlx::query_as(&sql)
            .bind(id.as_str())
            .fetch_optional(executor)
            .await
            .map_err(db_err)?;

        row.map(DbTransaction::into_domain).transpose()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Account store
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl AccountStore for SqliteRepo {
    async fn get_account(&self, id: &AccountId) -> Result<Account, RepoError> {
        let row: Option<DbAccount> =
            sqlx::query_as(r#"SELECT id, balance, version FROM accounts WHERE id = ?"#)
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;

        match row {
            Some(row) => row.into_domain(),
            None => Ok(Account::empty(id.clone())),
        }
    }

    async fn apply_delta(
        &self,
        posting: &Posting,
        expected_version: i64,
    ) -> Result<Account, RepoError> {
        let account_id = posting.account_id().as_str();
        let tx = &posting.transaction;
        let now = fmt_ts(Utc::now());

        let mut db_tx = self.pool.begin().await.map_err(db_err)?;

        // Writing first takes the write lock up front, so concurrent writers
        // queue on busy_timeout instead of failing lock upgrades.
        sqlx::query(
            r#"INSERT OR IGNORE INTO accounts (id, balance, version, created_at, updated_at)
               VALUES (?, 0, 0, ?, ?)"#,
        )
        .bind(account_id)
        .bind(&now)
        .bind(&now)
        .execute(&mut *db_tx)
        .await
        .map_err(db_err)?;

        let applied: Option<(i64,)> =
            sqlx::query_as(r#"SELECT 1 FROM postings WHERE transaction_id = ? AND leg = ?"#)
                .bind(tx.id.as_str())
                .bind(posting.leg.as_ref())
                .fetch_optional(&mut *db_tx)
                .await
                .map_err(db_err)?;
        if applied.is_some() {
            return Err(RepoError::DuplicatePosting);
        }

        let row: DbAccount =
            sqlx::query_as(r#"SELECT id, balance, version FROM accounts WHERE id = ?"#)
                .bind(account_id)
                .fetch_one(&mut *db_tx)
                .await
                .map_err(db_err)?;
        let mut account = row.into_domain()?;

        if account.version != expected_version {
            return Err(RepoError::VersionConflict {
                expected: expected_version,
                actual: account.version,
            });
        }
        account.apply(posting.delta)?;

        let updated = sqlx::query(
            r#"UPDATE accounts SET balance = ?, version = ?, updated_at = ?
               WHERE id = ? AND version = ?"#,
        )
        .bind(account.balance)
        .bind(account.version)
        .bind(&now)
        .bind(account_id)
        .bind(expected_version)
        .execute(&mut *db_tx)
        .await
        .map_err(db_err)?;
        if updated.rows_affected() == 0 {
            return Err(RepoError::VersionConflict {
                expected: expected_version,
                actual: expected_version + 1,
            });
        }

        sqlx::query(
            r#"INSERT INTO postings (transaction_id, leg, account_id, delta, created_at)
               VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(tx.id.as_str())
        .bind(posting.leg.as_ref())
        .bind(account_id)
        .bind(posting.delta)
        .bind(&now)
        .execute(&mut *db_tx)
        .await
        .map_err(db_err)?;

        let moved = update_transaction_row(&mut *db_tx, tx, posting.expected_state).await?;
        if !moved {
            return Err(RepoError::Conflict(format!(
                "transaction {} is no longer {}",
                tx.id, posting.expected_state
            )));
        }

        db_tx.commit().await.map_err(db_err)?;
        Ok(account)
    }
}

/// Compare-and-set on the stored state. Returns whether a row changed.
async fn update_transaction_row<'e, E>(
    executor: E,
    tx: &Transaction,
    expected_state: TransactionState,
) -> Result<bool, RepoError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let result = sqlx::query(
        r#"UPDATE transactions
           SET state = ?, external_ref = ?, destination = ?, provider_redirect = ?,
               failure_reason = ?, updated_at = ?, finalized_at = ?
           WHERE id = ? AND state = ?"#,
    )
    .bind(tx.state.as_ref())
    .bind(&tx.external_ref)
    .bind(&tx.destination)
    .bind(&tx.provider_redirect)
    .bind(&tx.failure_reason)
    .bind(fmt_ts(tx.updated_at))
    .bind(tx.finalized_at.map(fmt_ts))
    .bind(tx.id.as_str())
    .bind(expected_state.as_ref())
    .execute(executor)
    .await
    .map_err(db_err)?;

    Ok(result.rows_affected() > 0)
}

// ─────────────────────────────────────────────────────────────────────────────
// Transaction store
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl TransactionStore for SqliteRepo {
    async fn insert_transaction(&self, tx: &Transaction) -> Result<Option<Transaction>, RepoError> {
        let result = sqlx::query(
            r#"INSERT INTO transactions (id, account_id, kind, amount, currency, state,
                   external_ref, destination, provider_redirect, failure_reason,
                   created_at, updated_at, finalized_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO NOTHING"#,
        )
        .bind(tx.id.as_str())
        .bind(tx.account_id.as_str())
        .bind(tx.kind.as_ref())
        .bind(tx.amount.amount())
        .bind(tx.amount.currency().to_string())
        .bind(tx.state.as_ref())
        .bind(&tx.external_ref)
        .bind(&tx.destination)
        .bind(&tx.provider_redirect)
        .bind(&tx.failure_reason)
        .bind(fmt_ts(tx.created_at))
        .bind(fmt_ts(tx.updated_at))
        .bind(tx.finalized_at.map(fmt_ts))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() > 0 {
            return Ok(None);
        }
        match Self::fetch_transaction(&self.pool, &tx.id).await? {
            Some(existing) => Ok(Some(existing)),
            None => Err(RepoError::Database(format!(
                "transaction {} vanished after insert conflict",
                tx.id
            ))),
        }
    }

    async fn get_transaction(&self, id: &TransactionId) -> Result<Option<Transaction>, RepoError> {
        Self::fetch_transaction(&self.pool, id).await
    }

    async fn update_transaction(
        &self,
        tx: &Transaction,
        expected_state: TransactionState,
    ) -> Result<(), RepoError> {
        if update_transaction_row(&self.pool, tx, expected_state).await? {
            return Ok(());
        }
        match Self::fetch_transaction(&self.pool, &tx.id).await? {
            Some(stored) => Err(RepoError::Conflict(format!(
                "transaction {} is {}, expected {}",
                tx.id, stored.state, expected_state
            ))),
            None => Err(RepoError::NotFound),
        }
    }

    async fn list_transactions_for_account(
        &self,
        account_id: &AccountId,
    ) -> Result<Vec<Transaction>, RepoError> {
        let sql =
            format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE account_id = ? ORDER BY seq");
        let rows: Vec<DbTransaction> = sqlx::query_as(&sql)
            .bind(account_id.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        rows.into_iter().map(DbTransaction::into_domain).collect()
    }

    async fn list_stale(
        &self,
        states: &[TransactionState],
        updated_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Transaction>, RepoError> {
        if states.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; states.len()].join(", ");
        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions \
             WHERE state IN ({placeholders}) AND {TOUCHED_AT} < ? \
             ORDER BY {TOUCHED_AT}, seq LIMIT ?"
        );

        let mut query = sqlx::query_as::<_, DbTransaction>(&sql);
        for state in states {
            query = query.bind(state.as_ref());
        }
        let rows = query
            .bind(fmt_ts(updated_before))
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        rows.into_iter().map(DbTransaction::into_domain).collect()
    }

    async fn mark_swept(&self, id: &TransactionId, at: DateTime<Utc>) -> Result<(), RepoError> {
        let result = sqlx::query("UPDATE transactions SET swept_at = ? WHERE id = ?")
            .bind(fmt_ts(at))
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }
}
