use common::{ErrorKind, Money, MoneyOverflow, OrderId, OrderStatus, ProductId};
use thiserror::Error;

/// Errors that can occur when interacting with the order store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The order does not exist.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The product does not exist in the catalog.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// An order was submitted without line items.
    #[error("Order must contain at least one product")]
    EmptyOrder,

    /// The supplied order cost differs from the sum of its line items.
    #[error("Order total {supplied} doesn't match products sum {computed}")]
    InvalidOrderTotal { supplied: Money, computed: Money },

    /// The product already has a line item on this order.
    #[error("Product {product_id} is already part of order {order_id}")]
    DuplicateLineItem {
        order_id: OrderId,
        product_id: ProductId,
    },

    /// The product is still referenced by order line items.
    #[error("Product {0} is referenced by existing orders")]
    ProductInUse(ProductId),

    /// The order's stored status does not allow the requested one.
    #[error("Cannot move order from {from} to {to}")]
    InvalidStatusTransition { from: OrderStatus, to: OrderStatus },

    /// A line item quantity was zero or too large to store.
    #[error("Invalid product amount: {0}")]
    InvalidAmount(u32),

    /// Monetary arithmetic overflowed.
    #[error("Arithmetic error: {0}")]
    Overflow(#[from] MoneyOverflow),

    /// A stored value could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),

    /// The store is temporarily unable to serve the request.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    /// Classifies the error for transport mapping.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::OrderNotFound(_) | StoreError::ProductNotFound(_) => ErrorKind::NotFound,
            StoreError::EmptyOrder
            | StoreError::InvalidOrderTotal { .. }
            | StoreError::DuplicateLineItem { .. }
            | StoreError::ProductInUse(_)
            | StoreError::InvalidStatusTransition { .. }
            | StoreError::InvalidAmount(_) => ErrorKind::InvalidArgument,
            StoreError::Overflow(_)
            | StoreError::Decode(_)
            | StoreError::Unavailable(_)
            | StoreError::Database(_)
            | StoreError::Migration(_) => ErrorKind::Internal,
        }
    }
}

/// Result type for order store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
