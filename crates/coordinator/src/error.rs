//! Order service error types.

use common::ErrorKind;
use domain::DomainError;
use order_store::StoreError;
use thiserror::Error;

use crate::lock::LockError;
use crate::services::InventoryError;
use crate::tcc::{StreamError, TccState};

/// Errors that can occur while creating or managing orders.
#[derive(Debug, Error)]
pub enum OrderServiceError {
    /// Order store error.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Request validation or aggregate error.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Inventory service error.
    #[error("Inventory error: {0}")]
    Inventory(#[from] InventoryError),

    /// Caller stream error.
    #[error(transparent)]
    Stream(#[from] StreamError),

    /// Admission lock error.
    #[error(transparent)]
    Lock(#[from] LockError),

    /// The caller broke the TCC message sequence.
    #[error("Protocol violation in state {state}: {reason}")]
    Protocol { state: TccState, reason: String },

    /// The coordinator reached a state it cannot handle.
    #[error("Coordinator error in state {state}: {reason}")]
    Coordination { state: TccState, reason: String },
}

impl OrderServiceError {
    /// Classifies the error for transport mapping.
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrderServiceError::Store(e) => e.kind(),
            OrderServiceError::Domain(e) => e.kind(),
            OrderServiceError::Inventory(e) => e.kind(),
            OrderServiceError::Stream(e) => e.kind(),
            OrderServiceError::Lock(e) => e.kind(),
            OrderServiceError::Protocol { .. } => ErrorKind::InvalidArgument,
            OrderServiceError::Coordination { .. } => ErrorKind::Internal,
        }
    }
}

/// Convenience type alias for order service results.
pub type Result<T> = std::result::Result<T, OrderServiceError>;
