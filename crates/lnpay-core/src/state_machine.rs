use std::fmt;

use crate::error::CoreError;

/// Lifecycle states of an outgoing payment record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum PaymentState {
    /// Funds are held against the user's balance; outcome not yet known.
    Reserved,
    /// The network confirmed the payment. Final state.
    Settled,
    /// The network rejected the payment; kept for audit. Final state.
    Failed,
}

impl PaymentState {
    /// Whether this is a final (terminal) state.
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Settled | Self::Failed)
    }

    /// Whether a record in this state holds funds against the balance
    /// without having been debited yet.
    pub fn is_reserved(&self) -> bool {
        matches!(self, Self::Reserved)
    }
}

impl fmt::Display for PaymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reserved => write!(f, "Reserved"),
            Self::Settled => write!(f, "Settled"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// Events that move a record out of `Reserved`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentEvent {
    /// The executor (or reconciliation) reported success.
    ExecutionSucceeded,
    /// The executor (or reconciliation) reported failure.
    ExecutionFailed,
}

impl PaymentEvent {
    fn target(&self) -> PaymentState {
        match self {
            Self::ExecutionSucceeded => PaymentState::Settled,
            Self::ExecutionFailed => PaymentState::Failed,
        }
    }
}

/// Valid transitions:
/// - Reserved → Settled (ExecutionSucceeded)
/// - Reserved → Failed (ExecutionFailed)
///
/// Terminal states accept nothing, so a record leaves `Reserved` exactly once.
pub struct PaymentStateMachine;

impl PaymentStateMachine {
    /// Attempt a state transition based on an event.
    pub fn transition(
        current: PaymentState,
        event: PaymentEvent,
    ) -> Result<PaymentState, CoreError> {
        let new_state = match (current, event) {
            (PaymentState::Reserved, PaymentEvent::ExecutionSucceeded) => PaymentState::Settled,
            (PaymentState::Reserved, PaymentEvent::ExecutionFailed) => PaymentState::Failed,
            _ => {
                return Err(CoreError::InvalidStateTransition {
                    from: current,
                    to: event.target(),
                });
            }
        };

        tracing::debug!(
            from = %current,
            to = %new_state,
            event = ?event,
            "outgoing payment state transition"
        );

        Ok(new_state)
    }

    /// Check if a transition is valid without performing it.
    pub fn can_transition(current: PaymentState, event: PaymentEvent) -> bool {
        Self::transition(current, event).is_ok()
    }
}
