//! Payment network adapters.

pub mod internal;
pub mod lnd;

pub use internal::InternalNetwork;
pub use lnd::{LndClient, LndConfig};
