//! Integration test: pay-invoice outcomes against the reservation ledger.

use lnpay_core::{AmountInput, EngineConfig, ErrorResponse, PayInvoiceRequest, PaymentState, SettlementResult, UserId};
use lnpay_integration_tests::{committed, pay_request, Harness, Script, ScriptedNetwork};
use lnpay_settlement::{ErrorKind, PaymentStore, SettlementError};

const ALICE: UserId = UserId(1);

fn example_result() -> SettlementResult {
    SettlementResult {
        amount: 500,
        fee: 3,
        preimage: "abc".into(),
        payment_hash: "h1".into(),
    }
}

// =========================================================================
// Worked examples
// =========================================================================

#[tokio::test]
async fn test_settles_with_reserve_disabled() {
    let network = ScriptedNetwork::new(Script::Succeed(example_result()));
    network.add_invoice("lnbc5u1example", "02bob", 500, "h1");
    let h = Harness::new(network, None, EngineConfig::default());
    h.ledger.credit(ALICE, 1000).await.unwrap();

    let response = h
        .engine
        .pay_invoice(ALICE, &pay_request("lnbc5u1example"))
        .await
        .expect("payment should settle");

    assert_eq!(response.amount, 500);
    assert_eq!(response.fee, 3);
    assert_eq!(response.payment_preimage, "abc");
    assert_eq!(response.payment_hash, "h1");
    assert_eq!(response.payment_request, "lnbc5u1example");

    let records = h.ledger.payments_for(ALICE);
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.state, PaymentState::Settled);
    assert_eq!(record.fee, Some(3));
    assert_eq!(record.preimage.as_deref(), Some("abc"));
    assert_eq!(record.settlement_hash.as_deref(), Some("h1"));
    assert_eq!(h.engine.balance(ALICE).await.unwrap(), 497);
}

#[tokio::test]
async fn test_reserve_margin_blocks_exact_balance() {
    let network = ScriptedNetwork::new(Script::SucceedWithFee(1));
    network.add_invoice("lnbc4u1example", "02bob", 400, "h2");
    let h = Harness::new(network, Some(50), EngineConfig::default());
    h.ledger.credit(ALICE, 400).await.unwrap();

    let err = h
        .engine
        .pay_invoice(ALICE, &pay_request("lnbc4u1example"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SettlementError::InsufficientBalance { available: 400, required: 450 }
    ));
    assert_eq!(err.kind(), ErrorKind::InsufficientBalance);
    assert_eq!(err.to_response().code, ErrorResponse::CODE_NOT_ENOUGH_BALANCE);

    // Record created then removed: the ledger is exactly as before.
    assert!(h.ledger.is_empty());
    assert_eq!(h.engine.balance(ALICE).await.unwrap(), 400);
    assert_eq!(h.network.calls(), 0);
}

// =========================================================================
// Client input errors never touch the ledger
// =========================================================================

#[tokio::test]
async fn test_decode_failure_creates_no_record() {
    let h = Harness::new(
        ScriptedNetwork::new(Script::SucceedWithFee(0)),
        None,
        EngineConfig::default(),
    );
    h.ledger.credit(ALICE, 1000).await.unwrap();

    let err = h
        .engine
        .pay_invoice(ALICE, &pay_request("lnbc1notaninvoice"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ClientInput);
    assert_eq!(err.to_response().code, ErrorResponse::CODE_BAD_ARGUMENTS);
    assert!(h.ledger.is_empty());
}

#[tokio::test]
async fn test_invalid_amount_creates_no_record() {
    let network = ScriptedNetwork::new(Script::SucceedWithFee(0));
    network.add_invoice("lnbc1amountless", "02bob", 0, "h3");
    let h = Harness::new(network, None, EngineConfig::default());
    h.ledger.credit(ALICE, 1000).await.unwrap();

    for amount in [
        None,
        Some(AmountInput::from(0)),
        Some(AmountInput::from(-5)),
        Some(AmountInput::Text("ten".into())),
    ] {
        let request = PayInvoiceRequest {
            invoice: "lnbc1amountless".into(),
            amount,
        };
        let err = h.engine.pay_invoice(ALICE, &request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ClientInput);
    }
    assert!(h.ledger.is_empty());
    assert_eq!(h.network.calls(), 0);
}

#[tokio::test]
async fn test_amountless_uses_caller_amount() {
    let network = ScriptedNetwork::new(Script::SucceedWithFee(1));
    network.add_invoice("lnbc1amountless", "02bob", 0, "h4");
    let h = Harness::new(network, None, EngineConfig::default());
    h.ledger.credit(ALICE, 1000).await.unwrap();

    let request = PayInvoiceRequest {
        invoice: "  LIGHTNING:LNBC1AMOUNTLESS ".into(),
        amount: Some(AmountInput::Text("250".into())),
    };
    let response = h.engine.pay_invoice(ALICE, &request).await.unwrap();
    assert_eq!(response.amount, 250);
    assert_eq!(h.engine.balance(ALICE).await.unwrap(), 749);
}

#[tokio::test]
async fn test_caller_amount_ignored_for_fixed_invoice() {
    let network = ScriptedNetwork::new(Script::SucceedWithFee(0));
    network.add_invoice("lnbc1fixed", "02bob", 100, "h5");
    let h = Harness::new(network, None, EngineConfig::default());
    h.ledger.credit(ALICE, 1000).await.unwrap();

    let request = PayInvoiceRequest {
        invoice: "lnbc1fixed".into(),
        amount: Some(AmountInput::from(900)),
    };
    let response = h.engine.pay_invoice(ALICE, &request).await.unwrap();
    assert_eq!(response.amount, 100);
    assert_eq!(h.ledger.payments_for(ALICE)[0].amount, 100);
}

// =========================================================================
// Execution failure is retained for audit
// =========================================================================

#[tokio::test]
async fn test_execution_failure_keeps_one_failed_record() {
    let network = ScriptedNetwork::new(Script::Fail("FAILURE_REASON_NO_ROUTE".into()));
    network.add_invoice("lnbc1noroute", "02carol", 300, "h6");
    let h = Harness::new(network, Some(10), EngineConfig::default());
    h.ledger.credit(ALICE, 1000).await.unwrap();

    let err = h
        .engine
        .pay_invoice(ALICE, &pay_request("lnbc1noroute"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Execution);
    let body = err.to_response();
    assert_eq!(body.code, ErrorResponse::CODE_PAYMENT_FAILED);
    assert_eq!(body.message, "FAILURE_REASON_NO_ROUTE");

    let records = h.ledger.payments_for(ALICE);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].state, PaymentState::Failed);
    assert_eq!(records[0].amount, 300);
    assert!(records[0].fee.is_none());
    assert!(records[0].preimage.is_none());
    assert_eq!(
        records[0].error_message.as_deref(),
        Some("FAILURE_REASON_NO_ROUTE")
    );
    assert_eq!(committed(&h.ledger, ALICE), 0);
    assert_eq!(h.engine.balance(ALICE).await.unwrap(), 1000);

    let reports = h.reporter.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].payment_id, records[0].id);
    assert_eq!(reports[0].user_id, ALICE);
    assert_eq!(reports[0].destination, "02carol");
    assert_eq!(reports[0].payment_request, "lnbc1noroute");
}

#[tokio::test]
async fn test_failed_record_cannot_be_reopened() {
    let network = ScriptedNetwork::new(Script::Fail("expired".into()));
    network.add_invoice("lnbc1expired", "02bob", 10, "h7");
    let h = Harness::new(network, None, EngineConfig::default());
    h.ledger.credit(ALICE, 100).await.unwrap();

    let _ = h.engine.pay_invoice(ALICE, &pay_request("lnbc1expired")).await;
    let mut record = h.ledger.payments_for(ALICE).remove(0);
    record.state = PaymentState::Reserved;
    assert!(h.ledger.update(&record).await.is_err());
    assert!(h.ledger.delete(record.id).await.is_err());
}
