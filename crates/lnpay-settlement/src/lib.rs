//! lnpay settlement
//!
//! Authorizes outgoing Lightning payments against a reservation ledger,
//! executes them through a pluggable payment network, and reconciles
//! reservations whose outcome was never recorded.

pub mod adapters;
pub mod engine;
pub mod error;
pub mod fee_reserve;
pub mod ledger;
pub mod locks;
pub mod reconcile;
pub mod reporter;
pub mod traits;
pub mod types;

pub use engine::{Collaborators, SettlementEngine};
pub use error::{DecodeError, ErrorKind, ExecutorError, LedgerError, SettlementError};
pub use fee_reserve::DefaultFeeReserve;
pub use ledger::InMemoryLedger;
pub use locks::UserLocks;
pub use reconcile::Reconciler;
pub use reporter::{RecordingReporter, TracingReporter};
pub use traits::{
    BalanceOracle, ErrorReporter, FeeReserveEstimator, InvoiceDecoder, PaymentExecutor,
    PaymentStore,
};
pub use types::{FailureReport, PaymentLookup, ReconcileOutcome, ResolvedPayment};
