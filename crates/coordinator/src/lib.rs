//! Cross-service order creation.
//!
//! Orders reserve stock in a separate inventory service, so creating one
//! spans two systems. This crate provides two strategies for keeping them
//! consistent:
//! 1. TCC: a streaming Try-Confirm/Cancel exchange serialized behind an
//!    admission lock. Stock is requested only after the order's line items
//!    are stored, and a failed attempt deletes its order.
//! 2. Saga: stock is decremented first, then the order is written. A failed
//!    write is compensated by one restore batch.
//!
//! [`OrderService`] wraps both together with the plain CRUD operations.

pub mod error;
pub mod lock;
pub mod retry;
pub mod saga;
pub mod service;
pub mod services;
pub mod tcc;
pub mod validation;

pub use error::{OrderServiceError, Result};
pub use lock::{AdmissionGuard, AdmissionLock, LockError, ProcessLock};
pub use retry::{RetryPolicy, with_constant_backoff};
pub use saga::SagaCoordinator;
pub use service::OrderService;
pub use services::{
    InMemoryStockService, InventoryCall, InventoryError, ReservationAck, ReservationStream,
    StockReservationClient, StockReservationRequest,
};
pub use tcc::{
    CallerStream, ChannelCallerStream, StreamError, TccClient, TccCoordinator, TccRequest,
    TccState,
};
pub use validation::{ValidatedOrder, validate_order_products};
