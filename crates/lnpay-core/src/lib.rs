//! lnpay core
//!
//! Shared vocabulary for the outgoing payment engine: normalized payment
//! requests, decoded descriptors, the reservation record and its lifecycle,
//! and the request/response types exposed over the API.

pub mod config;
pub mod error;
pub mod invoice;
pub mod state_machine;
pub mod types;

pub use config::{EngineConfig, FeeReserveConfig};
pub use error::CoreError;
pub use invoice::{resolve_amount, AmountInput, PaymentDescriptor, PaymentRequest};
pub use state_machine::{PaymentEvent, PaymentState, PaymentStateMachine};
pub use types::{
    ErrorResponse, OutgoingPayment, PayInvoiceRequest, PayInvoiceResponse, PaymentId,
    SettlementResult, UserId,
};
