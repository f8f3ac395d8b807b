use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::CoreError;
use crate::invoice::{AmountInput, PaymentDescriptor, PaymentRequest};
use crate::state_machine::{PaymentEvent, PaymentState, PaymentStateMachine};

/// Identity of a custodial user in the internal ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i64>()
            .map(Self)
            .map_err(|_| CoreError::InvalidUserId(s.to_string()))
    }
}

/// Unique identifier of an outgoing payment record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PaymentId(pub Uuid);

impl PaymentId {
    /// Create a new random payment ID (UUID v7, time-ordered).
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the inner UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for PaymentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PaymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PaymentId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Outcome reported by the payment network for a completed payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementResult {
    /// Amount delivered to the destination, in satoshis.
    pub amount: u64,
    /// Routing fee actually paid, in satoshis.
    pub fee: u64,
    /// Hex-encoded payment preimage.
    pub preimage: String,
    /// Hex-encoded payment hash.
    pub payment_hash: String,
}

/// One attempted outgoing payment.
///
/// Created in `Reserved`, which holds `amount` against the owner's balance,
/// and leaves it exactly once for `Settled` or `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingPayment {
    pub id: PaymentId,
    pub user_id: UserId,
    pub payment_request: PaymentRequest,
    /// Resolved amount in satoshis, always > 0.
    pub amount: u64,
    pub destination: String,
    pub description: String,
    pub description_hash: String,
    /// Payment hash from the decoded invoice; used to look the payment up on the network.
    pub payment_hash: String,
    pub state: PaymentState,
    /// Routing fee, set only when settled.
    pub fee: Option<u64>,
    /// Preimage, set only when settled.
    pub preimage: Option<String>,
    /// Payment hash reported by the network at settlement.
    pub settlement_hash: Option<String>,
    /// Executor failure detail, set only when failed.
    pub error_message: Option<String>,
    /// Why this reservation needs out-of-band reconciliation, if it does.
    pub reconcile_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OutgoingPayment {
    /// Build a fresh reservation for a decoded, amount-resolved invoice.
    pub fn reserve(
        user_id: UserId,
        payment_request: PaymentRequest,
        descriptor: &PaymentDescriptor,
        amount: u64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: PaymentId::new(),
            user_id,
            payment_request,
            amount,
            destination: descriptor.destination.clone(),
            description: descriptor.description.clone(),
            description_hash: descriptor.description_hash.clone(),
            payment_hash: descriptor.payment_hash.clone(),
            state: PaymentState::Reserved,
            fee: None,
            preimage: None,
            settlement_hash: None,
            error_message: None,
            reconcile_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `Settled`, stamping the network's reported values.
    pub fn settle(&mut self, result: &SettlementResult) -> Result<(), CoreError> {
        self.state = PaymentStateMachine::transition(self.state, PaymentEvent::ExecutionSucceeded)?;
        self.fee = Some(result.fee);
        self.preimage = Some(result.preimage.clone());
        self.settlement_hash = Some(result.payment_hash.clone());
        self.reconcile_reason = None;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Move to `Failed`, keeping the record for audit.
    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), CoreError> {
        self.state = PaymentStateMachine::transition(self.state, PaymentEvent::ExecutionFailed)?;
        self.error_message = Some(message.into());
        self.reconcile_reason = None;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Mark a reservation whose outcome must be resolved out of band.
    pub fn flag_for_reconciliation(&mut self, reason: impl Into<String>) {
        self.reconcile_reason = Some(reason.into());
        self.updated_at = Utc::now();
    }

    /// Amount this record currently takes out of the owner's balance.
    pub fn balance_debit(&self) -> u64 {
        match self.state {
            PaymentState::Reserved => self.amount,
            PaymentState::Settled => self.amount.saturating_add(self.fee.unwrap_or(0)),
            PaymentState::Failed => 0,
        }
    }
}

/// Body of a pay-invoice request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayInvoiceRequest {
    /// Payment request string.
    pub invoice: String,
    /// Amount in satoshis; only used for amountless invoices.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<AmountInput>,
}

/// Body of a successful pay-invoice response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayInvoiceResponse {
    pub payment_request: String,
    pub amount: u64,
    pub fee: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    pub payment_preimage: String,
    pub payment_hash: String,
}

impl PayInvoiceResponse {
    /// Assemble the response from the settled record and the network result.
    pub fn from_settlement(payment: &OutgoingPayment, result: &SettlementResult) -> Self {
        fn non_empty(value: &str) -> Option<String> {
            (!value.is_empty()).then(|| value.to_string())
        }

        Self {
            payment_request: payment.payment_request.to_string(),
            amount: result.amount,
            fee: result.fee,
            description: non_empty(&payment.description),
            description_hash: non_empty(&payment.description_hash),
            destination: non_empty(&payment.destination),
            payment_preimage: result.preimage.clone(),
            payment_hash: result.payment_hash.clone(),
        }
    }
}

/// Error body returned to API clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: bool,
    pub code: u16,
    pub message: String,
}

impl ErrorResponse {
    pub const CODE_BAD_AUTH: u16 = 1;
    pub const CODE_NOT_ENOUGH_BALANCE: u16 = 2;
    pub const CODE_GENERAL_SERVER_ERROR: u16 = 6;
    pub const CODE_BAD_ARGUMENTS: u16 = 8;
    pub const CODE_PAYMENT_FAILED: u16 = 10;

    fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            error: true,
            code,
            message: message.into(),
        }
    }

    pub fn bad_auth() -> Self {
        Self::new(Self::CODE_BAD_AUTH, "bad auth")
    }

    pub fn bad_arguments() -> Self {
        Self::new(Self::CODE_BAD_ARGUMENTS, "Bad arguments")
    }

    pub fn not_enough_balance() -> Self {
        Self::new(
            Self::CODE_NOT_ENOUGH_BALANCE,
            "not enough balance. Make sure you have at least 1% reserved for potential fees",
        )
    }

    pub fn general_server_error() -> Self {
        Self::new(
            Self::CODE_GENERAL_SERVER_ERROR,
            "Something went wrong. Please try again later",
        )
    }

    /// Server error that carries the backend's own message.
    pub fn server_error(message: impl Into<String>) -> Self {
        Self::new(Self::CODE_GENERAL_SERVER_ERROR, message)
    }

    pub fn payment_failed(message: impl Into<String>) -> Self {
        Self::new(Self::CODE_PAYMENT_FAILED, message)
    }
}
