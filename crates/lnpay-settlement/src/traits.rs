use async_trait::async_trait;
use lnpay_core::{OutgoingPayment, PaymentDescriptor, PaymentId, PaymentRequest, SettlementResult, UserId};

use crate::error::{DecodeError, ExecutorError, LedgerError};
use crate::types::{FailureReport, PaymentLookup, ResolvedPayment};

/// Parses a normalized payment request into a descriptor.
#[async_trait]
pub trait InvoiceDecoder: Send + Sync {
    async fn decode(&self, payment_request: &PaymentRequest)
        -> Result<PaymentDescriptor, DecodeError>;
}

/// Upper bound on routing fees for a payment.
///
/// Must be deterministic and non-decreasing in `amount`. Whether the reserve
/// applies at all is the engine's decision, not the estimator's.
pub trait FeeReserveEstimator: Send + Sync {
    fn estimate(&self, destination: &str, amount: u64) -> u64;
}

/// Read side of the reservation ledger.
#[async_trait]
pub trait BalanceOracle: Send + Sync {
    /// Credits minus settled debits minus every Reserved amount.
    async fn balance(&self, user_id: UserId) -> Result<i64, LedgerError>;
}

/// Write side of the reservation ledger.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Persist a new Reserved record.
    async fn create(&self, payment: &OutgoingPayment) -> Result<(), LedgerError>;

    /// Remove a Reserved record that never reached the network.
    async fn delete(&self, payment_id: PaymentId) -> Result<(), LedgerError>;

    /// Replace a record. Records already in a terminal state are immutable.
    async fn update(&self, payment: &OutgoingPayment) -> Result<(), LedgerError>;

    async fn get(&self, payment_id: PaymentId) -> Result<Option<OutgoingPayment>, LedgerError>;

    /// Every record still in `Reserved`, oldest first.
    async fn reserved(&self) -> Result<Vec<OutgoingPayment>, LedgerError>;

    /// Add to a user's settled ledger total.
    async fn credit(&self, user_id: UserId, amount: u64) -> Result<(), LedgerError>;
}

/// Submits payments to the Lightning network.
#[async_trait]
pub trait PaymentExecutor: Send + Sync {
    /// Pay and wait for the final outcome.
    async fn pay(&self, payment: &ResolvedPayment) -> Result<SettlementResult, ExecutorError>;

    /// Query what the network knows about a payment hash.
    async fn lookup(&self, payment_hash: &str) -> Result<PaymentLookup, ExecutorError>;

    /// Return the unique identifier of this executor (e.g. "lnd").
    fn executor_id(&self) -> &str;
}

/// Receives execution failures for external observability.
pub trait ErrorReporter: Send + Sync {
    fn capture_execution_failure(&self, report: &FailureReport);
}
