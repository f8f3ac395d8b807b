//! Integration test: compensation failures, timeouts, and reconciliation
//! of reservations the engine could not finish.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use lnpay_core::{EngineConfig, OutgoingPayment, PaymentId, PaymentState, SettlementResult, UserId};
use lnpay_integration_tests::{pay_request, FixedFeeReserve, Harness, Script, ScriptedNetwork};
use lnpay_settlement::{
    BalanceOracle, Collaborators, InMemoryLedger, LedgerError, PaymentLookup, PaymentStore,
    ReconcileOutcome, Reconciler, RecordingReporter, SettlementEngine, SettlementError,
};

const USER: UserId = UserId(42);

/// Delegates to an in-memory ledger but can no longer delete.
struct UndeletableStore(Arc<InMemoryLedger>);

#[async_trait]
impl PaymentStore for UndeletableStore {
    async fn create(&self, payment: &OutgoingPayment) -> Result<(), LedgerError> {
        self.0.create(payment).await
    }

    async fn delete(&self, _payment_id: PaymentId) -> Result<(), LedgerError> {
        Err(LedgerError::Storage("disk full".into()))
    }

    async fn update(&self, payment: &OutgoingPayment) -> Result<(), LedgerError> {
        self.0.update(payment).await
    }

    async fn get(&self, payment_id: PaymentId) -> Result<Option<OutgoingPayment>, LedgerError> {
        self.0.get(payment_id).await
    }

    async fn reserved(&self) -> Result<Vec<OutgoingPayment>, LedgerError> {
        self.0.reserved().await
    }

    async fn credit(&self, user_id: UserId, amount: u64) -> Result<(), LedgerError> {
        self.0.credit(user_id, amount).await
    }
}

/// Delegates to an in-memory ledger but cannot persist settlements.
struct NoSettleStore(Arc<InMemoryLedger>);

#[async_trait]
impl PaymentStore for NoSettleStore {
    async fn create(&self, payment: &OutgoingPayment) -> Result<(), LedgerError> {
        self.0.create(payment).await
    }

    async fn delete(&self, payment_id: PaymentId) -> Result<(), LedgerError> {
        self.0.delete(payment_id).await
    }

    async fn update(&self, payment: &OutgoingPayment) -> Result<(), LedgerError> {
        if payment.state == PaymentState::Settled {
            return Err(LedgerError::Storage("write timed out".into()));
        }
        self.0.update(payment).await
    }

    async fn get(&self, payment_id: PaymentId) -> Result<Option<OutgoingPayment>, LedgerError> {
        self.0.get(payment_id).await
    }

    async fn reserved(&self) -> Result<Vec<OutgoingPayment>, LedgerError> {
        self.0.reserved().await
    }

    async fn credit(&self, user_id: UserId, amount: u64) -> Result<(), LedgerError> {
        self.0.credit(user_id, amount).await
    }
}

struct UnavailableOracle;

#[async_trait]
impl BalanceOracle for UnavailableOracle {
    async fn balance(&self, _user_id: UserId) -> Result<i64, LedgerError> {
        Err(LedgerError::Storage("connection reset".into()))
    }
}

fn reconciler_for(h: &Harness) -> Reconciler {
    Reconciler::new(h.ledger.clone(), h.network.clone(), Duration::from_secs(600))
}

#[tokio::test]
async fn test_timeout_then_reconcile_to_settled() {
    let network = ScriptedNetwork::new(Script::SucceedWithFee(2)).with_latency(Duration::from_millis(300));
    network.add_invoice("lnbc1slow", "02dest", 200, "slowhash");
    let config = EngineConfig {
        execution_timeout_ms: 25,
        ..EngineConfig::default()
    };
    let h = Harness::new(network, None, config);
    h.ledger.credit(USER, 1000).await.unwrap();

    let err = h
        .engine
        .pay_invoice(USER, &pay_request("lnbc1slow"))
        .await
        .unwrap_err();
    let payment_id = match err {
        SettlementError::ExecutionTimeout(id) => id,
        other => panic!("expected timeout, got {:?}", other),
    };

    // The reservation still counts and is flagged for reconciliation.
    assert_eq!(h.engine.balance(USER).await.unwrap(), 800);
    let reconciler = reconciler_for(&h);
    let stale = reconciler.stale_reservations(Utc::now()).await.unwrap();
    assert_eq!(stale.len(), 1);
    assert_eq!(stale[0].id, payment_id);

    // Nothing known yet: stays reserved.
    assert_eq!(
        reconciler.reconcile(payment_id).await.unwrap(),
        ReconcileOutcome::Pending { payment_id }
    );

    h.network.set_lookup(
        "slowhash",
        PaymentLookup::Succeeded(SettlementResult {
            amount: 200,
            fee: 2,
            preimage: "11".repeat(32),
            payment_hash: "slowhash".into(),
        }),
    );
    let outcome = reconciler.reconcile(payment_id).await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::Settled { payment_id, fee: 2 });

    let record = h.ledger.get(payment_id).await.unwrap().unwrap();
    assert_eq!(record.state, PaymentState::Settled);
    assert!(record.reconcile_reason.is_none());
    assert_eq!(h.engine.balance(USER).await.unwrap(), 798);
    assert!(reconciler.stale_reservations(Utc::now()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_compensation_escalates() {
    let network = Arc::new(ScriptedNetwork::new(Script::SucceedWithFee(0)));
    network.add_invoice("lnbc1big", "02dest", 5000, "bighash");
    let ledger = Arc::new(InMemoryLedger::new());
    ledger.credit(USER, 100).await.unwrap();

    let parts = Collaborators {
        decoder: network.clone(),
        fee_reserve: Arc::new(FixedFeeReserve(0)),
        balances: ledger.clone(),
        store: Arc::new(UndeletableStore(ledger.clone())),
        executor: network.clone(),
        reporter: Arc::new(RecordingReporter::new()),
    };
    let engine = SettlementEngine::new(parts, EngineConfig::default(), false);

    let err = engine
        .pay_invoice(USER, &pay_request("lnbc1big"))
        .await
        .unwrap_err();
    let payment_id = match err {
        SettlementError::ReconciliationRequired { payment_id, .. } => payment_id,
        other => panic!("expected reconciliation, got {:?}", other),
    };
    assert_eq!(network.calls(), 0);

    // Never silently orphaned: flagged and visible to the reconciler.
    let reconciler = Reconciler::new(ledger.clone(), network.clone(), Duration::from_secs(600));
    let stale = reconciler.stale_reservations(Utc::now()).await.unwrap();
    assert_eq!(stale.len(), 1);
    assert!(stale[0]
        .reconcile_reason
        .as_deref()
        .unwrap()
        .starts_with("compensation failed"));

    // The network never saw it, so an operator may void it.
    reconciler.void(payment_id).await.unwrap();
    assert!(ledger.is_empty());
    assert_eq!(ledger.balance(USER).await.unwrap(), 100);
}

#[tokio::test]
async fn test_balance_unavailable_compensates() {
    let network = Arc::new(ScriptedNetwork::new(Script::SucceedWithFee(0)));
    network.add_invoice("lnbc1any", "02dest", 10, "anyhash");
    let ledger = Arc::new(InMemoryLedger::new());

    let parts = Collaborators {
        decoder: network.clone(),
        fee_reserve: Arc::new(FixedFeeReserve(0)),
        balances: Arc::new(UnavailableOracle),
        store: ledger.clone(),
        executor: network.clone(),
        reporter: Arc::new(RecordingReporter::new()),
    };
    let engine = SettlementEngine::new(parts, EngineConfig::default(), false);

    let err = engine
        .pay_invoice(USER, &pay_request("lnbc1any"))
        .await
        .unwrap_err();
    assert!(matches!(err, SettlementError::BalanceUnavailable(_)));
    assert!(!err.is_client_error());
    assert!(ledger.is_empty());
    assert_eq!(network.calls(), 0);
}

#[tokio::test]
async fn test_reconcile_failed_lookup_releases_funds() {
    let network = ScriptedNetwork::new(Script::SucceedWithFee(0)).with_latency(Duration::from_millis(200));
    network.add_invoice("lnbc1stuck", "02dest", 300, "stuckhash");
    let config = EngineConfig {
        execution_timeout_ms: 10,
        ..EngineConfig::default()
    };
    let h = Harness::new(network, None, config);
    h.ledger.credit(USER, 500).await.unwrap();

    let _ = h.engine.pay_invoice(USER, &pay_request("lnbc1stuck")).await;
    assert_eq!(h.engine.balance(USER).await.unwrap(), 200);

    h.network.set_lookup("stuckhash", PaymentLookup::InFlight);
    let reconciler = reconciler_for(&h);
    assert!(reconciler.void(h.ledger.reserved().await.unwrap()[0].id).await.is_err());

    h.network
        .set_lookup("stuckhash", PaymentLookup::Failed("FAILURE_REASON_TIMEOUT".into()));
    let outcomes = reconciler.reconcile_stale(Utc::now()).await.unwrap();
    assert_eq!(outcomes.len(), 1);
    assert!(matches!(outcomes[0], ReconcileOutcome::Failed { .. }));
    assert_eq!(h.engine.balance(USER).await.unwrap(), 500);
}

#[tokio::test]
async fn test_aged_reservation_is_stale() {
    let h = Harness::new(
        ScriptedNetwork::new(Script::SucceedWithFee(0)),
        None,
        EngineConfig::default(),
    );
    h.network.add_invoice("lnbc1orphan", "02dest", 50, "orphanhash");
    let descriptor = lnpay_core::PaymentDescriptor {
        destination: "02dest".into(),
        num_satoshis: 50,
        description: String::new(),
        description_hash: String::new(),
        payment_hash: "orphanhash".into(),
    };
    // A worker that crashed after reserving.
    let orphan = OutgoingPayment::reserve(
        USER,
        lnpay_core::PaymentRequest::normalize("lnbc1orphan").unwrap(),
        &descriptor,
        50,
    );
    h.ledger.create(&orphan).await.unwrap();

    let reconciler = reconciler_for(&h);
    assert!(reconciler.stale_reservations(Utc::now()).await.unwrap().is_empty());
    let later = Utc::now() + chrono::Duration::minutes(11);
    let stale = reconciler.stale_reservations(later).await.unwrap();
    assert_eq!(stale.len(), 1);
    assert_eq!(stale[0].id, orphan.id);
}

#[tokio::test]
async fn test_void_refused_while_payment_executing() {
    let network = ScriptedNetwork::new(Script::SucceedWithFee(1)).with_latency(Duration::from_millis(200));
    network.add_invoice("lnbc1midflight", "02dest", 600, "midhash");
    let h = Harness::new(network, None, EngineConfig::default());
    h.ledger.credit(USER, 1000).await.unwrap();

    let engine = h.engine.clone();
    let paying = tokio::spawn(async move {
        engine
            .pay_invoice(USER, &pay_request("lnbc1midflight"))
            .await
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    // The network has not registered the payment yet.
    let reserved = h.ledger.reserved().await.unwrap();
    assert_eq!(reserved.len(), 1);
    let err = reconciler_for(&h).void(reserved[0].id).await.unwrap_err();
    assert!(matches!(err, SettlementError::InvalidStateTransition(_)));

    paying.await.unwrap().unwrap();
    let records = h.ledger.payments_for(USER);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].state, PaymentState::Settled);
    assert_eq!(h.engine.balance(USER).await.unwrap(), 399);
}

#[tokio::test]
async fn test_failed_settlement_write_is_flagged_and_reconciled() {
    let network = Arc::new(ScriptedNetwork::new(Script::SucceedWithFee(4)));
    network.add_invoice("lnbc1lostwrite", "02dest", 250, "lostwritehash");
    let ledger = Arc::new(InMemoryLedger::new());
    ledger.credit(USER, 1000).await.unwrap();

    let parts = Collaborators {
        decoder: network.clone(),
        fee_reserve: Arc::new(FixedFeeReserve(0)),
        balances: ledger.clone(),
        store: Arc::new(NoSettleStore(ledger.clone())),
        executor: network.clone(),
        reporter: Arc::new(RecordingReporter::new()),
    };
    let engine = SettlementEngine::new(parts, EngineConfig::default(), false);

    // The network paid, so the caller is told so.
    let response = engine
        .pay_invoice(USER, &pay_request("lnbc1lostwrite"))
        .await
        .unwrap();
    assert_eq!(response.amount, 250);
    assert_eq!(response.fee, 4);

    // The funds stay held and the record surfaces immediately.
    let reconciler = Reconciler::new(ledger.clone(), network.clone(), Duration::from_secs(600));
    let stale = reconciler.stale_reservations(Utc::now()).await.unwrap();
    assert_eq!(stale.len(), 1);
    assert_eq!(stale[0].state, PaymentState::Reserved);
    assert!(stale[0]
        .reconcile_reason
        .as_deref()
        .unwrap()
        .starts_with("settled but record update failed"));
    assert_eq!(ledger.balance(USER).await.unwrap(), 750);

    network.set_lookup(
        "lostwritehash",
        PaymentLookup::Succeeded(SettlementResult {
            amount: 250,
            fee: 4,
            preimage: "00".repeat(32),
            payment_hash: "lostwritehash".into(),
        }),
    );
    let outcome = reconciler.reconcile(stale[0].id).await.unwrap();
    assert!(matches!(outcome, ReconcileOutcome::Settled { fee: 4, .. }));
    assert_eq!(ledger.balance(USER).await.unwrap(), 746);
}
