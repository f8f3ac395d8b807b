use async_trait::async_trait;
use dashmap::DashMap;
use lnpay_core::{OutgoingPayment, PaymentId, UserId};

use crate::error::LedgerError;
use crate::traits::{BalanceOracle, PaymentStore};

/// In-memory reservation ledger.
///
/// Balances are never stored: every read recomputes them from credits and
/// the outgoing records, so they cannot drift from the records that justify
/// them.
pub struct InMemoryLedger {
    /// Outgoing payment records keyed by id.
    payments: DashMap<PaymentId, OutgoingPayment>,
    /// Settled credits per user.
    credits: DashMap<UserId, u64>,
}

impl InMemoryLedger {
    /// Create a new, empty ledger.
    pub fn new() -> Self {
        Self {
            payments: DashMap::new(),
            credits: DashMap::new(),
        }
    }

    /// All records owned by `user_id`, oldest first.
    pub fn payments_for(&self, user_id: UserId) -> Vec<OutgoingPayment> {
        let mut payments: Vec<OutgoingPayment> = self
            .payments
            .iter()
            .filter(|entry| entry.user_id == user_id)
            .map(|entry| entry.value().clone())
            .collect();
        payments.sort_by_key(|p| p.created_at);
        payments
    }

    /// Total credited to `user_id`.
    pub fn credited(&self, user_id: UserId) -> u64 {
        self.credits.get(&user_id).map(|v| *v).unwrap_or(0)
    }

    /// Number of records of any state.
    pub fn len(&self) -> usize {
        self.payments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payments.is_empty()
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BalanceOracle for InMemoryLedger {
    async fn balance(&self, user_id: UserId) -> Result<i64, LedgerError> {
        let debits: u128 = self
            .payments
            .iter()
            .filter(|entry| entry.user_id == user_id)
            .map(|entry| entry.balance_debit() as u128)
            .sum();
        let balance = self.credited(user_id) as i128 - debits as i128;
        i64::try_from(balance)
            .map_err(|_| LedgerError::Storage(format!("balance out of range for user {}", user_id)))
    }
}

#[async_trait]
impl PaymentStore for InMemoryLedger {
    async fn create(&self, payment: &OutgoingPayment) -> Result<(), LedgerError> {
        use dashmap::mapref::entry::Entry;

        match self.payments.entry(payment.id) {
            Entry::Occupied(_) => Err(LedgerError::AlreadyExists(payment.id)),
            Entry::Vacant(slot) => {
                slot.insert(payment.clone());
                tracing::debug!(payment_id = %payment.id, user_id = %payment.user_id, "outgoing payment stored");
                Ok(())
            }
        }
    }

    async fn delete(&self, payment_id: PaymentId) -> Result<(), LedgerError> {
        if self
            .payments
            .remove_if(&payment_id, |_, p| p.state.is_reserved())
            .is_some()
        {
            tracing::debug!(payment_id = %payment_id, "reservation removed");
            return Ok(());
        }
        match self.payments.get(&payment_id) {
            Some(existing) => Err(LedgerError::InvalidStateTransition(format!(
                "cannot delete payment in state {}",
                existing.state
            ))),
            None => Err(LedgerError::NotFound(payment_id)),
        }
    }

    async fn update(&self, payment: &OutgoingPayment) -> Result<(), LedgerError> {
        let mut entry = self
            .payments
            .get_mut(&payment.id)
            .ok_or(LedgerError::NotFound(payment.id))?;

        let existing = entry.value_mut();
        if existing.state.is_final() {
            return Err(LedgerError::InvalidStateTransition(format!(
                "payment {} is already {}",
                payment.id, existing.state
            )));
        }

        *existing = payment.clone();
        Ok(())
    }

    async fn get(&self, payment_id: PaymentId) -> Result<Option<OutgoingPayment>, LedgerError> {
        Ok(self.payments.get(&payment_id).map(|entry| entry.clone()))
    }

    async fn reserved(&self) -> Result<Vec<OutgoingPayment>, LedgerError> {
        let mut reserved: Vec<OutgoingPayment> = self
            .payments
            .iter()
            .filter(|entry| entry.state.is_reserved())
            .map(|entry| entry.value().clone())
            .collect();
        reserved.sort_by_key(|p| p.created_at);
        Ok(reserved)
    }

    async fn credit(&self, user_id: UserId, amount: u64) -> Result<(), LedgerError> {
        let mut entry = self.credits.entry(user_id).or_insert(0);
        let updated = entry
            .checked_add(amount)
            .ok_or_else(|| LedgerError::Storage(format!("credit overflow for user {}", user_id)))?;
        *entry = updated;
        tracing::info!(user_id = %user_id, amount, "ledger credited");
        Ok(())
    }
}
