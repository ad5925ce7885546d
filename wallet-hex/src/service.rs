//! Wallet Application Service
//!
//! Validates inbound requests, turns them into domain values and hands them
//! to the reconciliation engine. Contains NO infrastructure logic.

use std::sync::Arc;

use wallet_types::{
    AccountId, AppError, BalanceResponse, CreateDepositRequest, CreditAccountRequest, Currency,
    LedgerRepository, Money, PaymentGateway, ProviderEvent, SendPayoutRequest, Transaction,
    TransactionId, TransactionResponse,
};

use crate::reconciler::{ReconciliationEngine, Settlement, SweepReport};

/// Application service for wallet operations.
///
/// Generic over the store and the provider adapter, both injected at
/// compile time.
pub struct WalletService<R: LedgerRepository, G: PaymentGateway> {
    engine: Arc<ReconciliationEngine<R, G>>,
    currency: Currency,
}

impl<R: LedgerRepository, G: PaymentGateway> WalletService<R, G> {
    /// Creates a service booking every amount in `currency`.
    pub fn new(engine: Arc<ReconciliationEngine<R, G>>, currency: Currency) -> Self {
        Self { engine, currency }
    }

    pub fn engine(&self) -> &Arc<ReconciliationEngine<R, G>> {
        &self.engine
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Validation
    // ─────────────────────────────────────────────────────────────────────────────

    fn money(&self, amount: i64, currency: &str) -> Result<Money, AppError> {
        let currency: Currency = currency.parse()?;
        if currency != self.currency {
            return Err(AppError::BadRequest(format!(
                "Currency {currency} is not supported by this ledger (expected {})",
                self.currency
            )));
        }
        Ok(Money::new(amount, currency)?)
    }

    fn transaction_id(supplied: Option<String>) -> Result<TransactionId, AppError> {
        match supplied {
            Some(id) => Ok(TransactionId::new(id)?),
            None => Ok(TransactionId::generate()),
        }
    }

    fn respond(settlement: Settlement) -> TransactionResponse {
        TransactionResponse::new(&settlement.transaction, Some(settlement.balance))
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Deposits
    // ─────────────────────────────────────────────────────────────────────────────

    /// Opens a deposit and creates the provider intent the payer will fund.
    pub async fn create_deposit(
        &self,
        req: CreateDepositRequest,
    ) -> Result<TransactionResponse, AppError> {
        let account_id = AccountId::new(req.account_id)?;
        let amount = self.money(req.amount, &req.currency)?;
        let id = Self::transaction_id(req.transaction_id)?;

        let settlement = self
            .engine
            .begin_deposit(Transaction::deposit(id, account_id, amount))
            .await?;
        Ok(Self::respond(settlement))
    }

    /// Captures a deposit and credits the account.
    pub async fn confirm_deposit(&self, id: &str) -> Result<TransactionResponse, AppError> {
        let id = TransactionId::new(id)?;
        let settlement = self.engine.confirm_deposit(&id).await?;
        Ok(Self::respond(settlement))
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Payouts and credits
    // ─────────────────────────────────────────────────────────────────────────────

    /// Debits the account and sends the funds to an external receiver.
    pub async fn send_payout(&self, req: SendPayoutRequest) -> Result<TransactionResponse, AppError> {
        let account_id = AccountId::new(req.account_id)?;
        let amount = self.money(req.amount, &req.currency)?;
        let destination = req.destination.trim();
        if destination.is_empty() {
            return Err(AppError::BadRequest("Destination cannot be empty".into()));
        }
        let id = Self::transaction_id(req.transaction_id)?;

        let tx = Transaction::payout(id, account_id, destination.to_string(), amount);
        let settlement = self.engine.send_payout(tx).await?;
        Ok(Self::respond(settlement))
    }

    /// Credits an account without involving the provider.
    pub async fn credit_account(
        &self,
        account_id: &str,
        req: CreditAccountRequest,
    ) -> Result<TransactionResponse, AppError> {
        let account_id = AccountId::new(account_id)?;
        let amount = Money::new(req.amount, self.currency)?;
        let id = Self::transaction_id(req.transaction_id)?;

        let settlement = self
            .engine
            .credit(Transaction::internal_credit(id, account_id, amount))
            .await?;
        Ok(Self::respond(settlement))
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────────

    /// Current balance; unknown accounts read as zero.
    pub async fn get_balance(&self, account_id: &str) -> Result<BalanceResponse, AppError> {
        let account_id = AccountId::new(account_id)?;
        let account = self.engine.repo().get_account(&account_id).await?;
        Ok(BalanceResponse {
            account_id,
            balance: account.balance,
            currency: self.currency,
        })
    }

    pub async fn get_transaction(&self, id: &str) -> Result<Transaction, AppError> {
        let id = TransactionId::new(id)?;
        self.engine.coordinator().load(&id).await
    }

    /// Transaction history of an account, oldest first.
    pub async fn list_transactions(&self, account_id: &str) -> Result<Vec<Transaction>, AppError> {
        let account_id = AccountId::new(account_id)?;
        self.engine
            .repo()
            .list_transactions_for_account(&account_id)
            .await
            .map_err(Into::into)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Reconciliation
    // ─────────────────────────────────────────────────────────────────────────────

    /// Resumes one transaction now.
    pub async fn reconcile(&self, id: &str) -> Result<TransactionResponse, AppError> {
        let id = TransactionId::new(id)?;
        let settlement = self.engine.resume(&id).await?;
        Ok(Self::respond(settlement))
    }

    /// Handles an authenticated provider notification.
    ///
    /// The event only says which transaction to look at; the outcome comes
    /// from replaying the provider call under the original idempotency key.
    pub async fn handle_provider_event(
        &self,
        event: ProviderEvent,
    ) -> Result<TransactionResponse, AppError> {
        let id = TransactionId::new(event.transaction_id)?;
        let stored = self.engine.coordinator().load(&id).await?;

        if let (Some(claimed), Some(known)) = (&event.external_ref, &stored.external_ref) {
            if claimed != known {
                return Err(AppError::BadRequest(format!(
                    "Provider reference {claimed} does not match transaction {id}"
                )));
            }
        }
        tracing::info!(transaction_id = %id, event_type = %event.event_type, "provider event received");

        let settlement = self.engine.resume(&id).await?;
        Ok(Self::respond(settlement))
    }

    pub async fn sweep(&self) -> Result<SweepReport, AppError> {
        self.engine.sweep().await
    }
}
