//! Database row types and conversions for the SQLite adapter.

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::FromRow;

use wallet_types::{
    Account, AccountId, Currency, Money, RepoError, Transaction, TransactionId, TransactionKind,
    TransactionState,
};

// ─────────────────────────────────────────────────────────────────────────────
// Database row structs (derive FromRow for automatic mapping)
// ─────────────────────────────────────────────────────────────────────────────

/// Account row from database.
#[derive(FromRow)]
pub struct DbAccount {
    pub id: String,
    pub balance: i64,
    pub version: i64,
}

/// Transaction row from database.
#[derive(FromRow)]
pub struct DbTransaction {
    pub id: String,
    pub account_id: String,
    pub kind: String,
    pub amount: i64,
    pub currency: String,
    pub state: String,
    pub external_ref: Option<String>,
    pub destination: Option<String>,
    pub provider_redirect: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub finalized_at: Option<String>,
}

/// Column list matching [`DbTransaction`].
pub const TRANSACTION_COLUMNS: &str = "id, account_id, kind, amount, currency, state, external_ref, \
     destination, provider_redirect, failure_reason, created_at, updated_at, finalized_at";

// ─────────────────────────────────────────────────────────────────────────────
// Parsing helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Fixed-width UTC timestamps so that text comparison orders chronologically.
pub fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_ts(s: &str) -> Result<DateTime<Utc>, RepoError> {
    Ok(DateTime::parse_from_rfc3339(s)
        .map_err(|e| RepoError::Database(e.to_string()))?
        .with_timezone(&Utc))
}

fn corrupt<E: std::fmt::Display>(e: E) -> RepoError {
    RepoError::Database(format!("Corrupt row: {e}"))
}

// ─────────────────────────────────────────────────────────────────────────────
// Domain conversion
// ─────────────────────────────────────────────────────────────────────────────

impl DbAccount {
    /// Convert database row to domain Account.
    pub fn into_domain(self) -> Result<Account, RepoError> {
        let id = AccountId::new(self.id).map_err(corrupt)?;
        Ok(Account::from_parts(id, self.balance, self.version))
    }
}

impl DbTransaction {
    /// Convert database row to domain Transaction.
    pub fn into_domain(self) -> Result<Transaction, RepoError> {
        let currency: Currency = self.currency.parse().map_err(corrupt)?;
        let kind: TransactionKind = self.kind.parse().map_err(corrupt)?;
        let state: TransactionState = self.state.parse().map_err(corrupt)?;

        Ok(Transaction {
            id: TransactionId::new(self.id).map_err(corrupt)?,
            account_id: AccountId::new(self.account_id).map_err(corrupt)?,
            kind,
            amount: Money::new(self.amount, currency).map_err(corrupt)?,
            state,
            external_ref: self.external_ref,
            destination: self.destination,
            provider_redirect: self.provider_redirect,
            failure_reason: self.failure_reason,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
            finalized_at: self.finalized_at.as_deref().map(parse_ts).transpose()?,
        })
    }
}
