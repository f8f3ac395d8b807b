use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use lnpay_core::{OutgoingPayment, PaymentId};
use tokio::sync::watch;

use crate::error::{LedgerError, SettlementError};
use crate::traits::{PaymentExecutor, PaymentStore};
use crate::types::{PaymentLookup, ReconcileOutcome};

/// Resolves reservations whose worker never reached a terminal state.
///
/// Outcomes come only from the executor's authoritative `lookup`. A
/// payment the network still reports as in flight, or does not know
/// about, stays Reserved.
pub struct Reconciler {
    store: Arc<dyn PaymentStore>,
    executor: Arc<dyn PaymentExecutor>,
    stale_after: Duration,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn PaymentStore>,
        executor: Arc<dyn PaymentExecutor>,
        stale_after: Duration,
    ) -> Self {
        Self {
            store,
            executor,
            stale_after,
        }
    }

    /// Reserved records older than the stale threshold, plus any flagged
    /// for reconciliation regardless of age.
    pub async fn stale_reservations(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<OutgoingPayment>, SettlementError> {
        let reserved = self.store.reserved().await.map_err(ledger_error)?;
        Ok(reserved
            .into_iter()
            .filter(|p| self.is_stale(p, now))
            .collect())
    }

    /// Flagged, or old enough that no worker can still be executing it.
    fn is_stale(&self, payment: &OutgoingPayment, now: DateTime<Utc>) -> bool {
        let stale_after = chrono::Duration::from_std(self.stale_after)
            .unwrap_or_else(|_| chrono::Duration::days(36_500));
        payment.reconcile_reason.is_some() || now - payment.created_at >= stale_after
    }

    /// Move one Reserved record to the state the network reports for it.
    pub async fn reconcile(&self, payment_id: PaymentId) -> Result<ReconcileOutcome, SettlementError> {
        let mut payment = self.reserved_record(payment_id).await?;

        let lookup = self
            .executor
            .lookup(&payment.payment_hash)
            .await
            .map_err(SettlementError::Backend)?;

        let outcome = match lookup {
            PaymentLookup::Succeeded(result) => {
                payment.settle(&result)?;
                self.store.update(&payment).await.map_err(ledger_error)?;
                ReconcileOutcome::Settled {
                    payment_id,
                    fee: result.fee,
                }
            }
            PaymentLookup::Failed(message) => {
                payment.fail(message.clone())?;
                self.store.update(&payment).await.map_err(ledger_error)?;
                ReconcileOutcome::Failed {
                    payment_id,
                    message,
                }
            }
            PaymentLookup::InFlight | PaymentLookup::Unknown => {
                ReconcileOutcome::Pending { payment_id }
            }
        };

        tracing::info!(
            payment_id = %payment_id,
            user_id = %payment.user_id,
            outcome = ?outcome,
            "reservation reconciled"
        );
        Ok(outcome)
    }

    /// Reconcile every stale reservation. Individual failures are logged
    /// and skipped.
    pub async fn reconcile_stale(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ReconcileOutcome>, SettlementError> {
        let stale = self.stale_reservations(now).await?;
        let mut outcomes = Vec::with_capacity(stale.len());
        for payment in stale {
            match self.reconcile(payment.id).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    tracing::warn!(payment_id = %payment.id, error = %e, "reconciliation skipped");
                }
            }
        }
        Ok(outcomes)
    }

    /// Delete a stale Reserved record the network has never seen.
    ///
    /// A fresh, unflagged reservation may still be on its way to the
    /// executor, where `lookup` cannot see it yet, so it is refused.
    pub async fn void(&self, payment_id: PaymentId) -> Result<(), SettlementError> {
        self.void_at(payment_id, Utc::now()).await
    }

    /// `void` evaluated at `now`.
    pub async fn void_at(
        &self,
        payment_id: PaymentId,
        now: DateTime<Utc>,
    ) -> Result<(), SettlementError> {
        let payment = self.reserved_record(payment_id).await?;
        if !self.is_stale(&payment, now) {
            return Err(SettlementError::InvalidStateTransition(format!(
                "payment {} is not stale and may still be executing",
                payment_id
            )));
        }

        let lookup = self
            .executor
            .lookup(&payment.payment_hash)
            .await
            .map_err(SettlementError::Backend)?;
        if lookup != PaymentLookup::Unknown {
            return Err(SettlementError::InvalidStateTransition(format!(
                "payment {} is known to the network; reconcile it instead",
                payment_id
            )));
        }

        self.store.delete(payment_id).await.map_err(ledger_error)?;
        tracing::warn!(
            payment_id = %payment_id,
            user_id = %payment.user_id,
            amount = payment.amount,
            "reservation voided by operator"
        );
        Ok(())
    }

    /// Run `reconcile_stale` every `interval` until `shutdown` flips to true.
    pub async fn run_periodic(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.reconcile_stale(Utc::now()).await {
                        Ok(outcomes) if !outcomes.is_empty() => {
                            tracing::info!(count = outcomes.len(), "reconciliation pass finished");
                        }
                        Ok(_) => {}
                        Err(e) => tracing::error!(error = %e, "reconciliation pass failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::debug!("reconciler stopping");
                        break;
                    }
                }
            }
        }
    }

    async fn reserved_record(&self, payment_id: PaymentId) -> Result<OutgoingPayment, SettlementError> {
        let payment = self
            .store
            .get(payment_id)
            .await
            .map_err(ledger_error)?
            .ok_or(SettlementError::NotFound(payment_id))?;
        if !payment.state.is_reserved() {
            return Err(SettlementError::InvalidStateTransition(format!(
                "payment {} is already {}",
                payment_id, payment.state
            )));
        }
        Ok(payment)
    }
}

fn ledger_error(e: LedgerError) -> SettlementError {
    match e {
        LedgerError::NotFound(id) => SettlementError::NotFound(id),
        LedgerError::InvalidStateTransition(msg) => SettlementError::InvalidStateTransition(msg),
        other => SettlementError::Persistence(other),
    }
}
