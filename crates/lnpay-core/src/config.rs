use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Routing-fee reserve held on top of the payment amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeReserveConfig {
    /// Whether the reserve is added to the minimum balance at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Flat reserve for small payments, in satoshis.
    #[serde(default = "default_min_fee")]
    pub min_fee: u64,
    /// Amounts above this use the proportional reserve.
    #[serde(default = "default_proportional_threshold")]
    pub proportional_threshold: u64,
    /// Proportional reserve in basis points of the amount.
    #[serde(default = "default_proportional_bps")]
    pub proportional_bps: u64,
    /// Added to the proportional reserve, in satoshis.
    #[serde(default = "default_surcharge")]
    pub surcharge: u64,
}

/// Settlement engine tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound on a single executor call, in milliseconds.
    #[serde(default = "default_execution_timeout_ms")]
    pub execution_timeout_ms: u64,
    /// Age after which a reservation is considered leaked.
    #[serde(default = "default_stale_reservation_secs")]
    pub stale_reservation_secs: u64,
    /// How often the node sweeps stale reservations.
    #[serde(default = "default_reconcile_interval_secs")]
    pub reconcile_interval_secs: u64,
}

fn default_true() -> bool {
    true
}
fn default_min_fee() -> u64 {
    10
}
fn default_proportional_threshold() -> u64 {
    1000
}
fn default_proportional_bps() -> u64 {
    100
}
fn default_surcharge() -> u64 {
    1
}
fn default_execution_timeout_ms() -> u64 {
    60_000
}
fn default_stale_reservation_secs() -> u64 {
    600
}
fn default_reconcile_interval_secs() -> u64 {
    60
}

impl Default for FeeReserveConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            min_fee: default_min_fee(),
            proportional_threshold: default_proportional_threshold(),
            proportional_bps: default_proportional_bps(),
            surcharge: default_surcharge(),
        }
    }
}

impl FeeReserveConfig {
    /// Reserve switched off; the engine treats the margin as zero.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            execution_timeout_ms: default_execution_timeout_ms(),
            stale_reservation_secs: default_stale_reservation_secs(),
            reconcile_interval_secs: default_reconcile_interval_secs(),
        }
    }
}

impl EngineConfig {
    pub fn execution_timeout(&self) -> Duration {
        Duration::from_millis(self.execution_timeout_ms)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_reservation_secs)
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }
}
