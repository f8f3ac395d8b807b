use std::sync::Arc;

use lnpay_core::{
    resolve_amount, EngineConfig, OutgoingPayment, PayInvoiceRequest, PayInvoiceResponse,
    PaymentRequest, UserId,
};

use crate::error::{ExecutorError, SettlementError};
use crate::locks::UserLocks;
use crate::traits::{
    BalanceOracle, ErrorReporter, FeeReserveEstimator, InvoiceDecoder, PaymentExecutor,
    PaymentStore,
};
use crate::types::{FailureReport, ResolvedPayment};

/// The collaborators a settlement engine drives.
#[derive(Clone)]
pub struct Collaborators {
    pub decoder: Arc<dyn InvoiceDecoder>,
    pub fee_reserve: Arc<dyn FeeReserveEstimator>,
    pub balances: Arc<dyn BalanceOracle>,
    pub store: Arc<dyn PaymentStore>,
    pub executor: Arc<dyn PaymentExecutor>,
    pub reporter: Arc<dyn ErrorReporter>,
}

/// A reservation that passed the authorization gate.
struct Authorized {
    payment: OutgoingPayment,
    descriptor: lnpay_core::PaymentDescriptor,
    fee_limit: Option<u64>,
}

/// Authorizes and settles outgoing Lightning payments against the
/// reservation ledger.
///
/// Every attempt goes through the same steps: decode, resolve the amount,
/// reserve, check the balance, execute, finalize. Reservation and balance
/// check run under a per-user lock; the executor call does not.
pub struct SettlementEngine {
    parts: Collaborators,
    config: EngineConfig,
    fee_reserve_enabled: bool,
    locks: UserLocks,
}

impl SettlementEngine {
    pub fn new(parts: Collaborators, config: EngineConfig, fee_reserve_enabled: bool) -> Self {
        Self {
            parts,
            config,
            fee_reserve_enabled,
            locks: UserLocks::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn fee_reserve_enabled(&self) -> bool {
        self.fee_reserve_enabled
    }

    /// Identifier of the configured payment executor.
    pub fn executor_id(&self) -> &str {
        self.parts.executor.executor_id()
    }

    /// Current derived balance of `user_id`.
    pub async fn balance(&self, user_id: UserId) -> Result<i64, SettlementError> {
        self.parts
            .balances
            .balance(user_id)
            .await
            .map_err(SettlementError::BalanceUnavailable)
    }

    /// Pay a BOLT11 invoice on behalf of `user_id`.
    pub async fn pay_invoice(
        &self,
        user_id: UserId,
        request: &PayInvoiceRequest,
    ) -> Result<PayInvoiceResponse, SettlementError> {
        let payment_request = PaymentRequest::normalize(&request.invoice)?;
        let descriptor = self.parts.decoder.decode(&payment_request).await?;
        let amount = resolve_amount(&descriptor, request.amount.as_ref())?;

        let authorized = self
            .authorize(user_id, payment_request, descriptor, amount)
            .await?;
        self.execute(authorized).await
    }

    /// Reserve `amount` and check it against the pre-reservation balance.
    ///
    /// On any failure after the record exists, the reservation is
    /// compensated (deleted) before the error is returned.
    async fn authorize(
        &self,
        user_id: UserId,
        payment_request: PaymentRequest,
        descriptor: lnpay_core::PaymentDescriptor,
        amount: u64,
    ) -> Result<Authorized, SettlementError> {
        let fee_margin = if self.fee_reserve_enabled {
            self.parts.fee_reserve.estimate(&descriptor.destination, amount)
        } else {
            0
        };
        let minimum_balance = amount.saturating_add(fee_margin);

        let _guard = self.locks.acquire(user_id).await;

        let payment = OutgoingPayment::reserve(user_id, payment_request, &descriptor, amount);
        self.parts
            .store
            .create(&payment)
            .await
            .map_err(SettlementError::Persistence)?;

        let balance = match self.parts.balances.balance(user_id).await {
            Ok(balance) => balance,
            Err(e) => {
                tracing::error!(payment_id = %payment.id, user_id = %user_id, error = %e, "balance read failed");
                self.compensate(&payment).await?;
                return Err(SettlementError::BalanceUnavailable(e));
            }
        };

        // The read already subtracts this reservation; add it back to
        // compare against what the user had before reserving.
        let available = balance as i128 + amount as i128;
        if available < minimum_balance as i128 {
            tracing::warn!(
                payment_id = %payment.id,
                user_id = %user_id,
                available = %available,
                required = minimum_balance,
                "insufficient balance"
            );
            self.compensate(&payment).await?;
            return Err(SettlementError::InsufficientBalance {
                available: i64::try_from(available).unwrap_or(i64::MAX),
                required: minimum_balance,
            });
        }

        tracing::info!(
            payment_id = %payment.id,
            user_id = %user_id,
            amount,
            fee_margin,
            "payment reserved"
        );
        Ok(Authorized {
            payment,
            descriptor,
            fee_limit: self.fee_reserve_enabled.then_some(fee_margin),
        })
    }

    /// Remove a reservation that never reached the network.
    ///
    /// If the delete fails the record is flagged instead, so the reconciler
    /// can find it, and the caller gets `ReconciliationRequired`.
    async fn compensate(&self, payment: &OutgoingPayment) -> Result<(), SettlementError> {
        let Err(e) = self.parts.store.delete(payment.id).await else {
            tracing::debug!(payment_id = %payment.id, "reservation compensated");
            return Ok(());
        };

        let reason = format!("compensation failed: {}", e);
        tracing::error!(payment_id = %payment.id, user_id = %payment.user_id, error = %e, "failed to remove reservation");

        let mut flagged = payment.clone();
        flagged.flag_for_reconciliation(reason.clone());
        if let Err(flag_err) = self.parts.store.update(&flagged).await {
            tracing::error!(payment_id = %payment.id, error = %flag_err, "failed to flag reservation");
        }
        Err(SettlementError::ReconciliationRequired {
            payment_id: payment.id,
            reason,
        })
    }

    /// Call the executor with no lock held and finalize the record.
    async fn execute(&self, authorized: Authorized) -> Result<PayInvoiceResponse, SettlementError> {
        let Authorized {
            mut payment,
            descriptor,
            fee_limit,
        } = authorized;

        let resolved = ResolvedPayment {
            payment_id: payment.id,
            payment_request: payment.payment_request.clone(),
            descriptor,
            amount: payment.amount,
            fee_limit,
        };

        let outcome = tokio::time::timeout(
            self.config.execution_timeout(),
            self.parts.executor.pay(&resolved),
        )
        .await;

        match outcome {
            Ok(Ok(result)) => {
                let mut reserved = payment.clone();
                payment.settle(&result)?;
                if !self.fee_reserve_enabled && result.fee > 0 {
                    tracing::debug!(payment_id = %payment.id, fee = result.fee, "uncapped routing fee charged");
                }
                if let Err(e) = self.parts.store.update(&payment).await {
                    // The network already paid; the reconciler settles the
                    // record from the executor's lookup.
                    tracing::error!(
                        payment_id = %payment.id,
                        user_id = %payment.user_id,
                        error = %e,
                        "payment settled but record update failed"
                    );
                    self.flag(&mut reserved, format!("settled but record update failed: {}", e))
                        .await;
                } else {
                    tracing::info!(
                        payment_id = %payment.id,
                        user_id = %payment.user_id,
                        amount = result.amount,
                        fee = result.fee,
                        "payment settled"
                    );
                }
                Ok(PayInvoiceResponse::from_settlement(&payment, &result))
            }
            Ok(Err(ExecutorError::PaymentFailed(message))) => {
                payment.fail(message.clone())?;
                if let Err(e) = self.parts.store.update(&payment).await {
                    tracing::error!(payment_id = %payment.id, error = %e, "failed to record payment failure");
                }
                self.parts
                    .reporter
                    .capture_execution_failure(&FailureReport::new(&payment, message.clone()));
                Err(SettlementError::Execution {
                    payment_id: payment.id,
                    message,
                })
            }
            Ok(Err(e @ ExecutorError::Unavailable(_))) => {
                let reason = format!("executor unavailable: {}", e);
                self.flag(&mut payment, reason.clone()).await;
                self.parts
                    .reporter
                    .capture_execution_failure(&FailureReport::new(&payment, reason));
                Err(SettlementError::Backend(e))
            }
            Err(_elapsed) => {
                tracing::warn!(
                    payment_id = %payment.id,
                    timeout_ms = self.config.execution_timeout_ms,
                    "payment execution timed out"
                );
                self.flag(&mut payment, "execution timed out").await;
                self.parts
                    .reporter
                    .capture_execution_failure(&FailureReport::new(&payment, "execution timed out"));
                Err(SettlementError::ExecutionTimeout(payment.id))
            }
        }
    }

    /// Keep the record Reserved but mark it for reconciliation.
    async fn flag(&self, payment: &mut OutgoingPayment, reason: impl Into<String>) {
        payment.flag_for_reconciliation(reason);
        if let Err(e) = self.parts.store.update(payment).await {
            tracing::error!(payment_id = %payment.id, error = %e, "failed to flag reservation");
        }
    }
}
