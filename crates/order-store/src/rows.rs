//! Row types read from and written to the order store.

use chrono::{DateTime, Utc};
use common::{Money, OrderId, OrderStatus, ProductId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A persisted order header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRow {
    pub id: OrderId,
    pub comment: String,
    pub user_id: String,
    pub staff_id: String,
    pub order_cost: Money,
    pub status: OrderStatus,
    pub creation_date: DateTime<Utc>,
    pub finish_date: Option<DateTime<Utc>>,
}

/// A line item joined with the catalog fields shown to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderProductRow {
    pub order_id: OrderId,
    pub product_id: ProductId,
    /// Unit price captured from the catalog when the line item was added.
    pub result_price: Money,
    pub amount: u32,
    pub product_name: String,
    pub product_code: Uuid,
}

/// A product catalog row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRow {
    pub id: ProductId,
    pub name: String,
    pub product_code: Uuid,
    pub customer_cost: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Header of an order about to be created.
///
/// A zero `order_cost` asks the store to compute the total from the line
/// items.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewOrder {
    pub comment: String,
    pub user_id: String,
    pub staff_id: String,
    pub order_cost: Money,
}

/// A line item about to be created. Its price is taken from the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewOrderProduct {
    pub product_id: ProductId,
    pub amount: u32,
}

impl NewOrderProduct {
    pub fn new(product_id: ProductId, amount: u32) -> Self {
        Self { product_id, amount }
    }
}

/// A catalog product about to be created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub product_code: Uuid,
    pub customer_cost: Money,
}

/// Partial update of an order header. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderUpdate {
    pub comment: Option<String>,
    pub status: Option<OrderStatus>,
    pub order_cost: Option<Money>,
}

impl OrderUpdate {
    pub fn is_empty(&self) -> bool {
        self.comment.is_none() && self.status.is_none() && self.order_cost.is_none()
    }
}

/// Paging and filtering for order listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderFilter {
    /// Maximum number of orders to return.
    pub limit: u32,
    /// Number of orders to skip.
    pub offset: u32,
    /// Only return orders in this status.
    pub status: Option<OrderStatus>,
}

impl OrderFilter {
    /// Default page size.
    pub const DEFAULT_LIMIT: u32 = 20;

    /// Largest page size a caller may request.
    pub const MAX_LIMIT: u32 = 100;

    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the page size, clamped to `1..=MAX_LIMIT`.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit.clamp(1, Self::MAX_LIMIT);
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = offset;
        self
    }

    pub fn status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Returns true if the order passes the status filter.
    pub fn matches(&self, order: &OrderRow) -> bool {
        self.status.is_none_or(|status| order.status == status)
    }
}

impl Default for OrderFilter {
    fn default() -> Self {
        Self {
            limit: Self::DEFAULT_LIMIT,
            offset: 0,
            status: None,
        }
    }
}
