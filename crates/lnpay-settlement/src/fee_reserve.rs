use std::collections::HashSet;

use lnpay_core::FeeReserveConfig;

use crate::traits::FeeReserveEstimator;

const BPS_DENOMINATOR: u64 = 10_000;

/// Flat reserve for small payments, proportional above a threshold, and
/// nothing for payments to our own node.
#[derive(Debug, Clone)]
pub struct DefaultFeeReserve {
    config: FeeReserveConfig,
    own_pubkeys: HashSet<String>,
}

impl DefaultFeeReserve {
    pub fn new(config: FeeReserveConfig) -> Self {
        Self {
            config,
            own_pubkeys: HashSet::new(),
        }
    }

    /// Treat `pubkey` as one of our own node identities.
    pub fn with_own_pubkey(mut self, pubkey: impl Into<String>) -> Self {
        self.own_pubkeys.insert(pubkey.into().to_lowercase());
        self
    }

    fn is_own_node(&self, destination: &str) -> bool {
        self.own_pubkeys.contains(&destination.to_lowercase())
    }
}

impl FeeReserveEstimator for DefaultFeeReserve {
    fn estimate(&self, destination: &str, amount: u64) -> u64 {
        if self.is_own_node(destination) {
            return 0;
        }
        if amount <= self.config.proportional_threshold {
            return self.config.min_fee;
        }
        // ceil(amount * bps / 10_000), computed in u128 to avoid overflow
        let scaled = amount as u128 * self.config.proportional_bps as u128;
        let proportional = scaled.div_ceil(BPS_DENOMINATOR as u128);
        let proportional = u64::try_from(proportional)
            .unwrap_or(u64::MAX)
            .saturating_add(self.config.surcharge);
        proportional.max(self.config.min_fee)
    }
}
