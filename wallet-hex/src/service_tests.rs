//! WalletService unit tests.

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};

    use payment_gateway::{Fault, Operation, SimulatedGateway};
    use wallet_repo::MemoryRepo;
    use wallet_types::{
        Account, AccountId, AccountStore, AppError, CreateDepositRequest, CreditAccountRequest,
        Currency, Posting, ProviderEvent, RepoError, SendPayoutRequest, Transaction,
        TransactionId, TransactionState, TransactionStatus, TransactionStore,
    };

    use crate::{EngineConfig, ReconciliationEngine, WalletService};

    /// Memory store that reports a version conflict on the first `conflicts`
    /// postings, as if another writer got there first.
    pub struct ContendedRepo {
        inner: MemoryRepo,
        conflicts: AtomicU32,
    }

    impl ContendedRepo {
        pub fn new(conflicts: u32) -> Self {
            Self {
                inner: MemoryRepo::new(),
                conflicts: AtomicU32::new(conflicts),
            }
        }
    }

    #[async_trait]
    impl AccountStore for ContendedRepo {
        async fn get_account(&self, id: &AccountId) -> Result<Account, RepoError> {
            self.inner.get_account(id).await
        }

        async fn apply_delta(
            &self,
            posting: &Posting,
            expected_version: i64,
        ) -> Result<Account, RepoError> {
            let injected = self
                .conflicts
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if injected {
                return Err(RepoError::VersionConflict {
                    expected: expected_version,
                    actual: expected_version + 1,
                });
            }
            self.inner.apply_delta(posting, expected_version).await
        }
    }

    #[async_trait]
    impl TransactionStore for ContendedRepo {
        async fn insert_transaction(
            &self,
            tx: &Transaction,
        ) -> Result<Option<Transaction>, RepoError> {
            self.inner.insert_transaction(tx).await
        }

        async fn get_transaction(
            &self,
            id: &TransactionId,
        ) -> Result<Option<Transaction>, RepoError> {
            self.inner.get_transaction(id).await
        }

        async fn update_transaction(
            &self,
            tx: &Transaction,
            expected_state: TransactionState,
        ) -> Result<(), RepoError> {
            self.inner.update_transaction(tx, expected_state).await
        }

        async fn list_transactions_for_account(
            &self,
            account_id: &AccountId,
        ) -> Result<Vec<Transaction>, RepoError> {
            self.inner.list_transactions_for_account(account_id).await
        }

        async fn list_stale(
            &self,
            states: &[TransactionState],
            updated_before: DateTime<Utc>,
            limit: usize,
        ) -> Result<Vec<Transaction>, RepoError> {
            self.inner.list_stale(states, updated_before, limit).await
        }

        async fn mark_swept(&self, id: &TransactionId, at: DateTime<Utc>) -> Result<(), RepoError> {
            self.inner.mark_swept(id, at).await
        }
    }

    fn service_on<R: wallet_types::LedgerRepository>(
        repo: R,
        retries: u32,
    ) -> (WalletService<R, SimulatedGateway>, Arc<SimulatedGateway>) {
        let gateway = Arc::new(SimulatedGateway::new());
        let config = EngineConfig {
            conflict_retries: retries,
            ..EngineConfig::default()
        };
        let engine = ReconciliationEngine::new(Arc::new(repo), gateway.clone(), config);
        (
            WalletService::new(Arc::new(engine), Currency::USD),
            gateway,
        )
    }

    fn service() -> (
        WalletService<MemoryRepo, SimulatedGateway>,
        Arc<SimulatedGateway>,
    ) {
        service_on(MemoryRepo::new(), 5)
    }

    fn deposit_req(id: Option<&str>, amount: i64, currency: &str) -> CreateDepositRequest {
        CreateDepositRequest {
            transaction_id: id.map(String::from),
            account_id: "alice".into(),
            amount,
            currency: currency.into(),
        }
    }

    fn payout_req(id: &str, amount: i64, destination: &str) -> SendPayoutRequest {
        SendPayoutRequest {
            transaction_id: Some(id.into()),
            account_id: "alice".into(),
            destination: destination.into(),
            amount,
            currency: "USD".into(),
        }
    }

    fn credit_req(id: &str, amount: i64) -> CreditAccountRequest {
        CreditAccountRequest {
            transaction_id: Some(id.into()),
            amount,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Validation
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_rejects_non_positive_amounts() {
        let (svc, gateway) = service();

        for amount in [0, -5] {
            let err = svc
                .create_deposit(deposit_req(None, amount, "USD"))
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::BadRequest(_)), "{amount}");
        }
        let err = svc.credit_account("alice", credit_req("c-1", 0)).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        assert_eq!(gateway.call_count(Operation::CreateIntent), 0);
    }

    #[tokio::test]
    async fn test_rejects_foreign_and_unknown_currency() {
        let (svc, _) = service();

        let err = svc
            .create_deposit(deposit_req(None, 10, "EUR"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        let err = svc
            .create_deposit(deposit_req(None, 10, "XYZ"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        // Case-insensitive match on the ledger currency is fine.
        svc.create_deposit(deposit_req(None, 10, "usd")).await.unwrap();
    }

    #[tokio::test]
    async fn test_rejects_empty_destination() {
        let (svc, gateway) = service();
        svc.credit_account("alice", credit_req("c-1", 100))
            .await
            .unwrap();

        let err = svc
            .send_payout(payout_req("p-1", 10, "   "))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::BadRequest(_)));
        assert_eq!(gateway.call_count(Operation::SendTransfer), 0);
        assert_eq!(svc.get_balance("alice").await.unwrap().balance, 100);
    }

    #[tokio::test]
    async fn test_rejects_blank_ids() {
        let (svc, _) = service();

        let err = svc.get_balance("  ").await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        let err = svc
            .create_deposit(deposit_req(Some(""), 10, "USD"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Operations
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_generated_ids_are_distinct() {
        let (svc, _) = service();

        let a = svc.create_deposit(deposit_req(None, 10, "USD")).await.unwrap();
        let b = svc.create_deposit(deposit_req(None, 10, "USD")).await.unwrap();

        assert_ne!(a.transaction_id, b.transaction_id);
        assert_eq!(a.status, TransactionStatus::Success);
        assert!(a.provider_redirect.is_some());
    }

    #[tokio::test]
    async fn test_deposit_round_trip() {
        let (svc, _) = service();

        svc.create_deposit(deposit_req(Some("d-1"), 500, "USD"))
            .await
            .unwrap();
        let confirmed = svc.confirm_deposit("d-1").await.unwrap();

        assert_eq!(confirmed.state, TransactionState::Credited);
        assert_eq!(confirmed.new_balance, Some(500));
        let balance = svc.get_balance("alice").await.unwrap();
        assert_eq!(balance.balance, 500);
        assert_eq!(balance.currency, Currency::USD);
    }

    #[tokio::test]
    async fn test_unknown_account_reads_empty() {
        let (svc, _) = service();

        assert_eq!(svc.get_balance("nobody").await.unwrap().balance, 0);
        assert!(svc.list_transactions("nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_history_in_insertion_order() {
        let (svc, _) = service();
        svc.credit_account("alice", credit_req("c-1", 100))
            .await
            .unwrap();
        svc.send_payout(payout_req("p-1", 30, "ext-bob"))
            .await
            .unwrap();
        svc.create_deposit(deposit_req(Some("d-1"), 5, "USD"))
            .await
            .unwrap();

        let ids: Vec<_> = svc
            .list_transactions("alice")
            .await
            .unwrap()
            .into_iter()
            .map(|tx| tx.id.to_string())
            .collect();

        assert_eq!(ids, ["c-1", "p-1", "d-1"]);
    }

    #[tokio::test]
    async fn test_get_transaction() {
        let (svc, _) = service();
        svc.credit_account("alice", credit_req("c-1", 100))
            .await
            .unwrap();

        let tx = svc.get_transaction("c-1").await.unwrap();
        assert_eq!(tx.state, TransactionState::Credited);

        let err = svc.get_transaction("nope").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_reconcile_finishes_pending_payout() {
        let (svc, gateway) = service();
        svc.credit_account("alice", credit_req("c-1", 100))
            .await
            .unwrap();
        gateway.push_fault(Operation::SendTransfer, Fault::Timeout);

        let pending = svc
            .send_payout(payout_req("p-1", 40, "ext-bob"))
            .await
            .unwrap();
        assert_eq!(pending.status, TransactionStatus::Pending);

        let done = svc.reconcile("p-1").await.unwrap();
        assert_eq!(done.state, TransactionState::Sent);
        assert_eq!(done.new_balance, Some(60));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Provider events
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_provider_event_completes_deposit() {
        let (svc, _) = service();
        svc.create_deposit(deposit_req(Some("d-1"), 250, "USD"))
            .await
            .unwrap();
        let external_ref = svc.get_transaction("d-1").await.unwrap().external_ref;

        let event = ProviderEvent {
            transaction_id: "d-1".into(),
            external_ref,
            event_type: "payment_intent.succeeded".into(),
        };
        let resp = svc.handle_provider_event(event.clone()).await.unwrap();
        assert_eq!(resp.state, TransactionState::Credited);

        // Duplicate delivery is harmless.
        svc.handle_provider_event(event).await.unwrap();
        assert_eq!(svc.get_balance("alice").await.unwrap().balance, 250);
    }

    #[tokio::test]
    async fn test_provider_event_reference_mismatch() {
        let (svc, _) = service();
        svc.create_deposit(deposit_req(Some("d-1"), 250, "USD"))
            .await
            .unwrap();

        let err = svc
            .handle_provider_event(ProviderEvent {
                transaction_id: "d-1".into(),
                external_ref: Some("pi_forged".into()),
                event_type: "payment_intent.succeeded".into(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::BadRequest(_)));
        assert_eq!(svc.get_balance("alice").await.unwrap().balance, 0);
    }

    #[tokio::test]
    async fn test_provider_event_unknown_transaction() {
        let (svc, _) = service();

        let err = svc
            .handle_provider_event(ProviderEvent {
                transaction_id: "ghost".into(),
                external_ref: None,
                event_type: String::new(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::NotFound(_)));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Contention
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_conflicts_are_retried() {
        let (svc, _) = service_on(ContendedRepo::new(3), 5);

        let resp = svc
            .credit_account("alice", credit_req("c-1", 100))
            .await
            .unwrap();

        assert_eq!(resp.new_balance, Some(100));
    }

    #[tokio::test]
    async fn test_exhausted_retries_report_busy() {
        let (svc, _) = service_on(ContendedRepo::new(10), 2);

        let err = svc
            .credit_account("alice", credit_req("c-1", 100))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Busy(_)));

        // Nothing was applied; the record stays open for a replay.
        let tx = svc.get_transaction("c-1").await.unwrap();
        assert_eq!(tx.state, TransactionState::Initiated);
        assert_eq!(svc.get_balance("alice").await.unwrap().balance, 0);
    }

    #[tokio::test]
    async fn test_busy_payout_is_carried_forward_by_sweep() {
        let repo = Arc::new(ContendedRepo::new(0));
        let gateway = Arc::new(SimulatedGateway::new());
        let config = EngineConfig {
            conflict_retries: 2,
            stale_after: std::time::Duration::ZERO,
            ..EngineConfig::default()
        };
        let engine = Arc::new(ReconciliationEngine::new(repo.clone(), gateway.clone(), config));
        let svc = WalletService::new(engine.clone(), Currency::USD);
        svc.credit_account("alice", credit_req("c-1", 100))
            .await
            .unwrap();

        repo.conflicts.store(10, Ordering::SeqCst);
        let err = svc
            .send_payout(payout_req("p-1", 40, "ext-bob"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Busy(_)));
        assert_eq!(gateway.call_count(Operation::SendTransfer), 0);
        assert_eq!(
            svc.get_transaction("p-1").await.unwrap().state,
            TransactionState::Initiated
        );

        repo.conflicts.store(0, Ordering::SeqCst);
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let report = engine.sweep().await.unwrap();

        assert_eq!(report.settled, 1);
        assert_eq!(
            svc.get_transaction("p-1").await.unwrap().state,
            TransactionState::Sent
        );
        assert_eq!(gateway.sent_to("ext-bob"), 40);
        assert_eq!(svc.get_balance("alice").await.unwrap().balance, 60);
    }
}
