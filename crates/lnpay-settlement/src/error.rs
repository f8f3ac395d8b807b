use lnpay_core::{CoreError, ErrorResponse, PaymentId};

/// Invoice decoder errors.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The payment request is not a well-formed invoice.
    #[error("invalid payment request: {0}")]
    Invalid(String),

    /// The decoding backend could not be reached.
    #[error("invoice decoder unavailable: {0}")]
    Unavailable(String),
}

/// Reservation ledger errors.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("outgoing payment not found: {0}")]
    NotFound(PaymentId),

    #[error("outgoing payment already exists: {0}")]
    AlreadyExists(PaymentId),

    #[error("invalid ledger state transition: {0}")]
    InvalidStateTransition(String),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Payment executor errors.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    /// The network answered and refused or failed the payment.
    #[error("{0}")]
    PaymentFailed(String),

    /// The network could not be reached or answered garbage.
    #[error("payment backend unavailable: {0}")]
    Unavailable(String),
}

/// Public error taxonomy of the settlement engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Fix the request and retry; nothing was written.
    ClientInput,
    /// Top up or lower the amount; the reservation was compensated.
    InsufficientBalance,
    /// Infrastructure failure on our side.
    Server,
    /// The network failed the payment; the record is kept as Failed.
    Execution,
}

/// Settlement engine errors.
#[derive(Debug, thiserror::Error)]
pub enum SettlementError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("invalid request: {0}")]
    InvalidRequest(#[from] CoreError),

    #[error("insufficient balance: available {available}, required {required}")]
    InsufficientBalance { available: i64, required: u64 },

    #[error("persistence error: {0}")]
    Persistence(LedgerError),

    #[error("balance unavailable: {0}")]
    BalanceUnavailable(LedgerError),

    #[error("payment {payment_id} failed: {message}")]
    Execution {
        payment_id: PaymentId,
        message: String,
    },

    #[error("payment {0} timed out; reservation kept for reconciliation")]
    ExecutionTimeout(PaymentId),

    #[error("payment {payment_id} requires reconciliation: {reason}")]
    ReconciliationRequired {
        payment_id: PaymentId,
        reason: String,
    },

    #[error("outgoing payment not found: {0}")]
    NotFound(PaymentId),

    #[error("invalid settlement state transition: {0}")]
    InvalidStateTransition(String),

    #[error("payment backend error: {0}")]
    Backend(ExecutorError),
}

impl SettlementError {
    /// Classify into the public error taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Decode(DecodeError::Unavailable(_)) => ErrorKind::Server,
            Self::Decode(_) | Self::InvalidRequest(_) => ErrorKind::ClientInput,
            Self::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            Self::Execution { .. } => ErrorKind::Execution,
            Self::NotFound(_) | Self::InvalidStateTransition(_) => ErrorKind::ClientInput,
            Self::Persistence(_)
            | Self::BalanceUnavailable(_)
            | Self::ExecutionTimeout(_)
            | Self::ReconciliationRequired { .. }
            | Self::Backend(_) => ErrorKind::Server,
        }
    }

    /// Whether the caller, not the system, is at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::ClientInput | ErrorKind::InsufficientBalance
        )
    }

    /// Wire body for this error.
    pub fn to_response(&self) -> ErrorResponse {
        match self {
            Self::Execution { message, .. } => ErrorResponse::payment_failed(message.clone()),
            Self::Backend(_) | Self::ExecutionTimeout(_) => ErrorResponse::server_error(self.to_string()),
            _ => match self.kind() {
                ErrorKind::ClientInput => ErrorResponse::bad_arguments(),
                ErrorKind::InsufficientBalance => ErrorResponse::not_enough_balance(),
                ErrorKind::Server | ErrorKind::Execution => ErrorResponse::general_server_error(),
            },
        }
    }
}
