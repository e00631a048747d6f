//! Order and product catalog storage.
//!
//! [`OrderRepository`] owns persisted orders and their line items;
//! [`ProductCatalog`] owns the product rows whose prices become line-item
//! prices when an order is created. Both traits have an in-memory and a
//! PostgreSQL implementation.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod rows;
pub mod store;

pub use common::{Money, OrderId, OrderStatus, ProductId};
pub use error::{Result, StoreError};
pub use memory::InMemoryOrderStore;
pub use postgres::PostgresOrderStore;
pub use rows::{
    NewOrder, NewOrderProduct, NewProduct, OrderFilter, OrderProductRow, OrderRow, OrderUpdate,
    ProductRow,
};
pub use store::{OrderRepository, ProductCatalog, line_total, reconcile_order_cost};
