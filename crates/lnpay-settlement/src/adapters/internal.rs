use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use lnpay_core::{PaymentDescriptor, PaymentRequest, SettlementResult};
use sha2::{Digest, Sha256};

use crate::error::{DecodeError, ExecutorError};
use crate::traits::{InvoiceDecoder, PaymentExecutor};
use crate::types::{PaymentLookup, ResolvedPayment};

const PPM: u64 = 1_000_000;

/// An invoice issued by the internal network, with its secret.
#[derive(Debug, Clone)]
struct IssuedInvoice {
    descriptor: PaymentDescriptor,
    preimage: [u8; 32],
}

/// In-process Lightning network.
///
/// Issues invoices, decodes them, and settles payments instantly (or after a
/// configured latency) with a proportional routing fee. Used by tests and by
/// nodes that run without an external Lightning backend.
pub struct InternalNetwork {
    /// Identity pubkey of the local node.
    node_pubkey: String,
    /// Issued invoices keyed by normalized payment request.
    invoices: DashMap<String, IssuedInvoice>,
    /// Known payment outcomes keyed by payment hash.
    payments: DashMap<String, PaymentLookup>,
    /// Destinations no route can reach.
    unreachable: DashMap<String, ()>,
    routing_fee_ppm: u64,
    latency: Duration,
}

impl InternalNetwork {
    /// Create a network with zero fees and no latency.
    pub fn new(node_pubkey: impl Into<String>) -> Self {
        Self {
            node_pubkey: node_pubkey.into(),
            invoices: DashMap::new(),
            payments: DashMap::new(),
            unreachable: DashMap::new(),
            routing_fee_ppm: 0,
            latency: Duration::ZERO,
        }
    }

    /// Charge `ppm` parts-per-million of the amount as routing fee (rounded up).
    pub fn with_routing_fee_ppm(mut self, ppm: u64) -> Self {
        self.routing_fee_ppm = ppm;
        self
    }

    /// Delay every payment's answer by `latency`.
    ///
    /// The outcome is recorded before the delay, so `lookup` reports it
    /// even when the caller stops waiting.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn node_pubkey(&self) -> &str {
        &self.node_pubkey
    }

    /// Issue an invoice payable to `destination`. `amount` 0 issues an
    /// amountless invoice.
    pub fn issue_invoice(&self, destination: &str, amount: u64, description: &str) -> String {
        let preimage: [u8; 32] = rand::random();
        let payment_hash = hex::encode(Sha256::digest(preimage));
        let payment_request = format!("lnint{}1{}", amount, payment_hash);

        let descriptor = PaymentDescriptor {
            destination: destination.to_lowercase(),
            num_satoshis: amount,
            description: description.to_string(),
            description_hash: String::new(),
            payment_hash,
        };
        self.invoices.insert(
            payment_request.clone(),
            IssuedInvoice {
                descriptor,
                preimage,
            },
        );
        tracing::debug!(%payment_request, amount, "internal invoice issued");
        payment_request
    }

    /// Make every payment to `destination` fail with no route.
    pub fn mark_unreachable(&self, destination: &str) {
        self.unreachable.insert(destination.to_lowercase(), ());
    }

    /// Force the outcome reported by `lookup` for a payment hash.
    pub fn set_outcome(&self, payment_hash: &str, outcome: PaymentLookup) {
        self.payments.insert(payment_hash.to_string(), outcome);
    }

    /// Number of payments that settled.
    pub fn settled_count(&self) -> usize {
        self.payments
            .iter()
            .filter(|entry| matches!(entry.value(), PaymentLookup::Succeeded(_)))
            .count()
    }

    fn routing_fee(&self, amount: u64) -> u64 {
        let scaled = amount as u128 * self.routing_fee_ppm as u128;
        u64::try_from(scaled.div_ceil(PPM as u128)).unwrap_or(u64::MAX)
    }

    /// Decide and record the outcome of a payment.
    fn route(
        &self,
        payment: &ResolvedPayment,
        invoice: &IssuedInvoice,
    ) -> Result<SettlementResult, ExecutorError> {
        let payment_hash = invoice.descriptor.payment_hash.clone();
        if self
            .unreachable
            .contains_key(&invoice.descriptor.destination)
        {
            return Err(self.fail(&payment_hash, "no route to destination"));
        }

        let fee = self.routing_fee(payment.amount);
        if let Some(limit) = payment.fee_limit {
            if fee > limit {
                return Err(self.fail(&payment_hash, "route fee exceeds fee limit"));
            }
        }

        let result = SettlementResult {
            amount: payment.amount,
            fee,
            preimage: hex::encode(invoice.preimage),
            payment_hash: payment_hash.clone(),
        };
        self.payments
            .insert(payment_hash, PaymentLookup::Succeeded(result.clone()));
        tracing::info!(payment_id = %payment.payment_id, amount = payment.amount, fee, "internal payment settled");
        Ok(result)
    }

    fn fail(&self, payment_hash: &str, message: &str) -> ExecutorError {
        self.payments.insert(
            payment_hash.to_string(),
            PaymentLookup::Failed(message.to_string()),
        );
        ExecutorError::PaymentFailed(message.to_string())
    }
}

#[async_trait]
impl InvoiceDecoder for InternalNetwork {
    async fn decode(
        &self,
        payment_request: &PaymentRequest,
    ) -> Result<PaymentDescriptor, DecodeError> {
        self.invoices
            .get(payment_request.as_str())
            .map(|invoice| invoice.descriptor.clone())
            .ok_or_else(|| DecodeError::Invalid(format!("unknown payment request {}", payment_request)))
    }
}

#[async_trait]
impl PaymentExecutor for InternalNetwork {
    async fn pay(&self, payment: &ResolvedPayment) -> Result<SettlementResult, ExecutorError> {
        let invoice = self
            .invoices
            .get(payment.payment_request.as_str())
            .map(|entry| entry.clone())
            .ok_or_else(|| ExecutorError::PaymentFailed("invoice not found".into()))?;
        let payment_hash = invoice.descriptor.payment_hash.clone();

        match self.payments.entry(payment_hash.clone()) {
            Entry::Occupied(mut existing) => {
                match existing.get() {
                    PaymentLookup::Succeeded(_) => {
                        return Err(ExecutorError::PaymentFailed("invoice is already paid".into()));
                    }
                    PaymentLookup::InFlight => {
                        return Err(ExecutorError::PaymentFailed("payment is in transition".into()));
                    }
                    PaymentLookup::Failed(_) | PaymentLookup::Unknown => {}
                }
                existing.insert(PaymentLookup::InFlight);
            }
            Entry::Vacant(slot) => {
                slot.insert(PaymentLookup::InFlight);
            }
        }

        let outcome = self.route(payment, &invoice);

        // The caller waits, but the network has already decided.
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        outcome
    }

    async fn lookup(&self, payment_hash: &str) -> Result<PaymentLookup, ExecutorError> {
        Ok(self
            .payments
            .get(payment_hash)
            .map(|entry| entry.clone())
            .unwrap_or(PaymentLookup::Unknown))
    }

    fn executor_id(&self) -> &str {
        "internal"
    }
}
