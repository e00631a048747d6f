//! Domain error types.

use common::{ErrorKind, InvalidId, Money, MoneyOverflow, OrderStatus, ParseStatusError, ProductId};
use thiserror::Error;

/// Errors raised while validating requests or assembling aggregates.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Order must contain at least one product")]
    EmptyOrder,

    #[error("Invalid amount {amount} for product {product_id}: must be positive")]
    InvalidAmount { product_id: ProductId, amount: u32 },

    #[error("Product {0} appears more than once in the order")]
    DuplicateProduct(ProductId),

    #[error("Order cost cannot be negative: {0}")]
    NegativeOrderCost(Money),

    #[error("Comment is {len} characters long, at most {max} are allowed")]
    CommentTooLong { len: usize, max: usize },

    #[error("Cannot move order from {from} to {to}")]
    InvalidStatusTransition { from: OrderStatus, to: OrderStatus },

    #[error("Invalid product: {0}")]
    InvalidProduct(String),

    #[error(transparent)]
    InvalidId(#[from] InvalidId),

    #[error(transparent)]
    InvalidStatus(#[from] ParseStatusError),

    #[error("Arithmetic error: {0}")]
    Overflow(#[from] MoneyOverflow),
}

impl DomainError {
    /// Classifies the error for transport mapping.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::Overflow(_) => ErrorKind::Internal,
            _ => ErrorKind::InvalidArgument,
        }
    }
}

/// Result type for domain operations.
pub type Result<T> = std::result::Result<T, DomainError>;
