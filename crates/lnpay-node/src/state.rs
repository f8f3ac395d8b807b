//! Shared node state for the HTTP handlers.

use lnpay_settlement::{PaymentStore, Reconciler, SettlementEngine};
use std::sync::Arc;
use std::time::Instant;

use crate::config::Backend;

/// Shared state for the running node, accessible from HTTP handlers.
pub struct NodeState {
    /// Authorizes and settles outgoing payments.
    pub engine: Arc<SettlementEngine>,
    /// Resolves leaked or flagged reservations.
    pub reconciler: Arc<Reconciler>,
    /// Ledger write side, used for credits.
    pub store: Arc<dyn PaymentStore>,
    /// Which Lightning backend the engine pays through.
    pub backend: Backend,
    /// When the node started.
    pub start_time: Instant,
}

impl NodeState {
    pub fn new(
        engine: Arc<SettlementEngine>,
        reconciler: Arc<Reconciler>,
        store: Arc<dyn PaymentStore>,
        backend: Backend,
    ) -> Self {
        Self {
            engine,
            reconciler,
            store,
            backend,
            start_time: Instant::now(),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
