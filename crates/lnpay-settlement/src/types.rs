use lnpay_core::{OutgoingPayment, PaymentDescriptor, PaymentId, PaymentRequest, SettlementResult, UserId};
use serde::{Deserialize, Serialize};

/// A decoded payment with its amount resolved, ready for the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedPayment {
    /// Reservation this execution belongs to.
    pub payment_id: PaymentId,
    /// Normalized payment request string.
    pub payment_request: PaymentRequest,
    /// Decoded invoice as returned by the decoder.
    pub descriptor: PaymentDescriptor,
    /// Amount to pay, in satoshis. Differs from `descriptor.num_satoshis`
    /// only for amountless invoices.
    pub amount: u64,
    /// Maximum routing fee the network may spend, if capped.
    pub fee_limit: Option<u64>,
}

/// Authoritative state of a payment as known by the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentLookup {
    /// The payment completed.
    Succeeded(SettlementResult),
    /// The payment definitively failed.
    Failed(String),
    /// HTLCs are still in flight.
    InFlight,
    /// The network has no record of this payment hash.
    Unknown,
}

/// Context attached to an execution failure when it is reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReport {
    pub payment_id: PaymentId,
    pub user_id: UserId,
    pub destination: String,
    pub payment_request: String,
    pub message: String,
}

impl FailureReport {
    pub fn new(payment: &OutgoingPayment, message: impl Into<String>) -> Self {
        Self {
            payment_id: payment.id,
            user_id: payment.user_id,
            destination: payment.destination.clone(),
            payment_request: payment.payment_request.to_string(),
            message: message.into(),
        }
    }
}

/// Result of reconciling one reservation against the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// The reservation became Settled.
    Settled { payment_id: PaymentId, fee: u64 },
    /// The reservation became Failed.
    Failed { payment_id: PaymentId, message: String },
    /// The network outcome is still unknown; the reservation stays.
    Pending { payment_id: PaymentId },
}

impl ReconcileOutcome {
    pub fn payment_id(&self) -> PaymentId {
        match self {
            Self::Settled { payment_id, .. }
            | Self::Failed { payment_id, .. }
            | Self::Pending { payment_id } => *payment_id,
        }
    }
}
