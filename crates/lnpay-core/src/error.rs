use crate::state_machine::PaymentState;

/// Core protocol errors.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        from: PaymentState,
        to: PaymentState,
    },

    #[error("invalid payment request: {0}")]
    InvalidPaymentRequest(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("invalid user id: {0}")]
    InvalidUserId(String),
}
