//! TCC protocol state machine.

use serde::{Deserialize, Serialize};

/// The state of one TCC order creation attempt.
///
/// State transitions:
/// ```text
/// Idle ──► Locking ──► Reserving ──► Building ──► ReservingStock ──► Confirming ──► Committed
///  │          │            │             │              │                 │
///  └──────────┴────────────┴─────────────┴──────────────┴─────────────────┴──► Cancelling ──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TccState {
    /// Waiting for the caller's freeze handshake.
    #[default]
    Idle,

    /// Handshake received and admission lock held; opening the reservation stream.
    Locking,

    /// Inventory frozen; waiting for the create payload.
    Reserving,

    /// Naked order exists; appending line items.
    Building,

    /// Line items recorded; sending the decrement batch.
    ReservingStock,

    /// Batch sent; waiting for the inventory acknowledgement.
    Confirming,

    /// Order acknowledged and emitted (terminal state).
    Committed,

    /// Undoing local writes after a failure.
    Cancelling,

    /// Cleanup finished after a failure (terminal state).
    Cancelled,
}

impl TccState {
    /// Returns the state that follows this one on the success path.
    pub fn next(&self) -> Option<TccState> {
        match self {
            TccState::Idle => Some(TccState::Locking),
            TccState::Locking => Some(TccState::Reserving),
            TccState::Reserving => Some(TccState::Building),
            TccState::Building => Some(TccState::ReservingStock),
            TccState::ReservingStock => Some(TccState::Confirming),
            TccState::Confirming => Some(TccState::Committed),
            TccState::Cancelling => Some(TccState::Cancelled),
            TccState::Committed | TccState::Cancelled => None,
        }
    }

    /// Returns true if an attempt in this state may move to `next`.
    pub fn can_transition_to(&self, next: TccState) -> bool {
        if self.next() == Some(next) {
            return true;
        }
        next == TccState::Cancelling && self.can_cancel()
    }

    /// Returns true if the attempt can still be cancelled.
    pub fn can_cancel(&self) -> bool {
        !matches!(
            self,
            TccState::Committed | TccState::Cancelling | TccState::Cancelled
        )
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TccState::Committed | TccState::Cancelled)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            TccState::Idle => "Idle",
            TccState::Locking => "Locking",
            TccState::Reserving => "Reserving",
            TccState::Building => "Building",
            TccState::ReservingStock => "ReservingStock",
            TccState::Confirming => "Confirming",
            TccState::Committed => "Committed",
            TccState::Cancelling => "Cancelling",
            TccState::Cancelled => "Cancelled",
        }
    }
}

impl std::fmt::Display for TccState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
