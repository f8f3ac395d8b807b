//! Integration test: concurrent payment attempts by the same and by
//! different users.

use std::time::Duration;

use lnpay_core::{EngineConfig, UserId};
use lnpay_integration_tests::{committed, pay_request, Harness, Script, ScriptedNetwork};
use lnpay_settlement::{PaymentStore, SettlementError};

fn network_with(invoices: &[(&str, u64)], latency: Duration) -> ScriptedNetwork {
    let network = ScriptedNetwork::new(Script::SucceedWithFee(0)).with_latency(latency);
    for (i, (invoice, amount)) in invoices.iter().enumerate() {
        network.add_invoice(invoice, "02dest", *amount, &format!("hash-{}", i));
    }
    network
}

#[tokio::test]
async fn test_racing_requests_over_half_balance_only_one_executes() {
    let network = network_with(
        &[("lnbc1first", 600), ("lnbc1second", 600)],
        Duration::from_millis(50),
    );
    let h = Harness::new(network, None, EngineConfig::default());
    let user = UserId(1);
    h.ledger.credit(user, 1000).await.unwrap();

    let first = pay_request("lnbc1first");
    let second = pay_request("lnbc1second");
    let (a, b) = tokio::join!(
        h.engine.pay_invoice(user, &first),
        h.engine.pay_invoice(user, &second),
    );

    let succeeded = [&a, &b].iter().filter(|r| r.is_ok()).count();
    assert_eq!(succeeded, 1);
    let rejected = [a, b]
        .into_iter()
        .filter_map(Result::err)
        .next()
        .expect("one request must be rejected");
    assert!(matches!(rejected, SettlementError::InsufficientBalance { .. }));

    assert_eq!(h.network.calls(), 1);
    assert_eq!(h.ledger.len(), 1);
    assert_eq!(h.engine.balance(user).await.unwrap(), 400);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_concurrent_requests_never_overspend() {
    let invoices: Vec<(String, u64)> = (0..25).map(|i| (format!("lnbc1burst{}", i), 100)).collect();
    let refs: Vec<(&str, u64)> = invoices.iter().map(|(s, a)| (s.as_str(), *a)).collect();
    let h = Harness::new(
        network_with(&refs, Duration::from_millis(5)),
        None,
        EngineConfig::default(),
    );
    let user = UserId(7);
    h.ledger.credit(user, 1000).await.unwrap();

    let engine = h.engine.clone();
    let mut tasks = Vec::new();
    for (invoice, _) in &invoices {
        let engine = engine.clone();
        let request = pay_request(invoice);
        tasks.push(tokio::spawn(async move {
            engine.pay_invoice(user, &request).await
        }));
    }

    let mut settled = 0;
    for task in tasks {
        if task.await.unwrap().is_ok() {
            settled += 1;
        }
    }

    assert_eq!(settled, 10);
    assert_eq!(h.network.calls(), 10);
    assert!(committed(&h.ledger, user) <= h.ledger.credited(user));
    assert_eq!(h.engine.balance(user).await.unwrap(), 0);
}

#[tokio::test]
async fn test_lock_released_before_execution() {
    let network = network_with(
        &[("lnbc1a", 100), ("lnbc1b", 100)],
        Duration::from_millis(100),
    );
    let h = Harness::new(network, None, EngineConfig::default());
    let user = UserId(3);
    h.ledger.credit(user, 1000).await.unwrap();

    let first = pay_request("lnbc1a");
    let second = pay_request("lnbc1b");
    let (a, b) = tokio::join!(
        h.engine.pay_invoice(user, &first),
        h.engine.pay_invoice(user, &second),
    );
    assert!(a.is_ok() && b.is_ok());
    // Both payments were at the network at the same time.
    assert_eq!(h.network.max_in_flight(), 2);
}

#[tokio::test]
async fn test_users_are_independent() {
    let network = network_with(
        &[("lnbc1alice", 900), ("lnbc1bob", 900)],
        Duration::from_millis(20),
    );
    let h = Harness::new(network, None, EngineConfig::default());
    h.ledger.credit(UserId(1), 1000).await.unwrap();
    h.ledger.credit(UserId(2), 1000).await.unwrap();

    let alice = pay_request("lnbc1alice");
    let bob = pay_request("lnbc1bob");
    let (a, b) = tokio::join!(
        h.engine.pay_invoice(UserId(1), &alice),
        h.engine.pay_invoice(UserId(2), &bob),
    );
    assert!(a.is_ok());
    assert!(b.is_ok());
    assert_eq!(h.engine.balance(UserId(1)).await.unwrap(), 100);
    assert_eq!(h.engine.balance(UserId(2)).await.unwrap(), 100);
    assert!(h.ledger.reserved().await.unwrap().is_empty());
}
