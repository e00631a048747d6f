//! HTTP handlers and the state they share.

pub mod create;
pub mod health;
pub mod metrics;
pub mod orders;
pub mod products;

use common::{OrderId, ProductId};
use coordinator::{OrderService, StockReservationClient};
use domain::DomainError;
use order_store::{OrderRepository, ProductCatalog};

/// Storage the handlers can run against.
pub trait OrderBackend: OrderRepository + ProductCatalog + 'static {}

impl<T: OrderRepository + ProductCatalog + 'static> OrderBackend for T {}

/// Inventory client the handlers can run against.
pub trait InventoryBackend: StockReservationClient + 'static {}

impl<T: StockReservationClient + 'static> InventoryBackend for T {}

/// Shared application state accessible from all handlers.
pub struct AppState<R, I> {
    pub service: OrderService<R, I>,
}

impl<R: OrderBackend, I: InventoryBackend> AppState<R, I> {
    pub fn new(service: OrderService<R, I>) -> Self {
        Self { service }
    }
}

pub(crate) fn parse_order_id(raw: &str) -> Result<OrderId, DomainError> {
    Ok(raw.parse::<OrderId>()?)
}

pub(crate) fn parse_product_id(raw: &str) -> Result<ProductId, DomainError> {
    Ok(raw.parse::<ProductId>()?)
}
