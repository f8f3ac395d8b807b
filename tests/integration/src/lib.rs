//! Shared fixtures for the cross-crate scenarios in `tests/`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use lnpay_core::{
    EngineConfig, PayInvoiceRequest, PaymentDescriptor, PaymentRequest, SettlementResult, UserId,
};
use lnpay_settlement::{
    Collaborators, DecodeError, ExecutorError, FeeReserveEstimator, InMemoryLedger,
    InvoiceDecoder, PaymentExecutor, PaymentLookup, RecordingReporter, ResolvedPayment,
    SettlementEngine,
};

/// What the scripted network answers to `pay`.
#[derive(Debug, Clone)]
pub enum Script {
    Succeed(SettlementResult),
    /// Succeed with the requested amount and this fee.
    SucceedWithFee(u64),
    Fail(String),
}

/// Decoder and executor driven entirely by the test.
pub struct ScriptedNetwork {
    invoices: Mutex<HashMap<String, PaymentDescriptor>>,
    script: Mutex<Script>,
    lookups: Mutex<HashMap<String, PaymentLookup>>,
    latency: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedNetwork {
    pub fn new(script: Script) -> Self {
        Self {
            invoices: Mutex::new(HashMap::new()),
            script: Mutex::new(script),
            lookups: Mutex::new(HashMap::new()),
            latency: Duration::ZERO,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Register `invoice` so it decodes to a descriptor for `amount`.
    pub fn add_invoice(&self, invoice: &str, destination: &str, amount: u64, payment_hash: &str) {
        let descriptor = PaymentDescriptor {
            destination: destination.to_string(),
            num_satoshis: amount,
            description: format!("invoice {}", invoice),
            description_hash: String::new(),
            payment_hash: payment_hash.to_string(),
        };
        self.invoices
            .lock()
            .unwrap()
            .insert(invoice.to_lowercase(), descriptor);
    }

    pub fn set_script(&self, script: Script) {
        *self.script.lock().unwrap() = script;
    }

    pub fn set_lookup(&self, payment_hash: &str, lookup: PaymentLookup) {
        self.lookups
            .lock()
            .unwrap()
            .insert(payment_hash.to_string(), lookup);
    }

    /// Number of `pay` calls received.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of `pay` calls running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InvoiceDecoder for ScriptedNetwork {
    async fn decode(
        &self,
        payment_request: &PaymentRequest,
    ) -> Result<PaymentDescriptor, DecodeError> {
        self.invoices
            .lock()
            .unwrap()
            .get(payment_request.as_str())
            .cloned()
            .ok_or_else(|| DecodeError::Invalid("checksum failed".into()))
    }
}

#[async_trait]
impl PaymentExecutor for ScriptedNetwork {
    async fn pay(&self, payment: &ResolvedPayment) -> Result<SettlementResult, ExecutorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let script = self.script.lock().unwrap().clone();
        match script {
            Script::Succeed(result) => Ok(result),
            Script::SucceedWithFee(fee) => Ok(SettlementResult {
                amount: payment.amount,
                fee,
                preimage: "00".repeat(32),
                payment_hash: payment.descriptor.payment_hash.clone(),
            }),
            Script::Fail(message) => Err(ExecutorError::PaymentFailed(message)),
        }
    }

    async fn lookup(&self, payment_hash: &str) -> Result<PaymentLookup, ExecutorError> {
        Ok(self
            .lookups
            .lock()
            .unwrap()
            .get(payment_hash)
            .cloned()
            .unwrap_or(PaymentLookup::Unknown))
    }

    fn executor_id(&self) -> &str {
        "scripted"
    }
}

/// Fee reserve estimator that always answers the same margin.
pub struct FixedFeeReserve(pub u64);

impl FeeReserveEstimator for FixedFeeReserve {
    fn estimate(&self, _destination: &str, _amount: u64) -> u64 {
        self.0
    }
}

pub struct Harness {
    pub engine: Arc<SettlementEngine>,
    pub ledger: Arc<InMemoryLedger>,
    pub network: Arc<ScriptedNetwork>,
    pub reporter: Arc<RecordingReporter>,
}

impl Harness {
    /// Engine over an in-memory ledger. `fee_margin` of `None` disables the
    /// fee reserve.
    pub fn new(network: ScriptedNetwork, fee_margin: Option<u64>, config: EngineConfig) -> Self {
        let network = Arc::new(network);
        let ledger = Arc::new(InMemoryLedger::new());
        let reporter = Arc::new(RecordingReporter::new());
        let parts = Collaborators {
            decoder: network.clone(),
            fee_reserve: Arc::new(FixedFeeReserve(fee_margin.unwrap_or(0))),
            balances: ledger.clone(),
            store: ledger.clone(),
            executor: network.clone(),
            reporter: reporter.clone(),
        };
        Self {
            engine: Arc::new(SettlementEngine::new(parts, config, fee_margin.is_some())),
            ledger,
            network,
            reporter,
        }
    }
}

pub fn pay_request(invoice: &str) -> PayInvoiceRequest {
    PayInvoiceRequest {
        invoice: invoice.to_string(),
        amount: None,
    }
}

/// Sum of what `user_id`'s records take out of the ledger right now.
pub fn committed(ledger: &InMemoryLedger, user_id: UserId) -> u64 {
    ledger
        .payments_for(user_id)
        .iter()
        .map(|p| p.balance_debit())
        .sum()
}
