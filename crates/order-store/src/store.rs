use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Money, OrderId, OrderStatus, ProductId};

use crate::{
    NewOrder, NewOrderProduct, NewProduct, OrderFilter, OrderProductRow, OrderRow, OrderUpdate,
    ProductRow, Result, StoreError,
};

/// Transactional storage for orders and their line items.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Persists an order header without line items.
    ///
    /// Used by the streaming protocol, which appends line items one at a time
    /// afterwards.
    async fn create_naked_order(&self, order: NewOrder) -> Result<OrderRow>;

    /// Persists an order header together with all of its line items.
    ///
    /// The write is all-or-nothing. Fails with `EmptyOrder` when `products`
    /// is empty, `ProductNotFound` for an unknown product,
    /// `DuplicateLineItem` for a repeated product and `InvalidOrderTotal`
    /// when a non-zero `order.order_cost` differs from the line-item sum.
    /// A zero cost is replaced by the computed sum.
    async fn create_with_products(
        &self,
        order: NewOrder,
        products: Vec<NewOrderProduct>,
    ) -> Result<OrderRow>;

    /// Appends one line item to an existing order at the current catalog
    /// price. The order cost is not touched.
    async fn add_order_product(
        &self,
        order_id: OrderId,
        product_id: ProductId,
        amount: u32,
    ) -> Result<OrderProductRow>;

    /// Retrieves an order header.
    async fn get(&self, id: OrderId) -> Result<OrderRow>;

    /// Lists order headers, newest first.
    async fn list(&self, filter: OrderFilter) -> Result<Vec<OrderRow>>;

    /// Applies a partial update to an order header.
    ///
    /// Moving into a terminal status stamps the finish date.
    async fn update(&self, id: OrderId, update: OrderUpdate) -> Result<OrderRow>;

    /// Sets the order status. Transition rules are enforced by callers.
    async fn update_status(&self, id: OrderId, status: OrderStatus) -> Result<OrderRow> {
        self.update(
            id,
            OrderUpdate {
                status: Some(status),
                ..Default::default()
            },
        )
        .await
    }

    /// Removes an order and its line items.
    async fn delete(&self, id: OrderId) -> Result<()>;

    /// Returns the line items of an order in insertion order.
    async fn get_order_products(&self, id: OrderId) -> Result<Vec<OrderProductRow>>;

    /// Sums `result_price * amount` over the line items of an order.
    async fn calculate_order_total(&self, id: OrderId) -> Result<Money> {
        let products = self.get_order_products(id).await?;
        let totals = products
            .iter()
            .map(|p| line_total(p.result_price, p.amount))
            .collect::<Result<Vec<_>>>()?;
        Ok(Money::checked_sum(totals)?)
    }
}

/// Product catalog storage.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn create_product(&self, product: NewProduct) -> Result<ProductRow>;

    async fn get_product(&self, id: ProductId) -> Result<ProductRow>;

    /// Lists all products ordered by name.
    async fn list_products(&self) -> Result<Vec<ProductRow>>;

    async fn delete_product(&self, id: ProductId) -> Result<()>;
}

/// Computes the total of one line item.
pub fn line_total(price: Money, amount: u32) -> Result<Money> {
    Ok(price.checked_mul(amount)?)
}

/// Decides the cost to persist for an order.
///
/// A zero supplied cost means "compute it"; any other supplied cost must
/// equal the computed one.
pub fn reconcile_order_cost(supplied: Money, computed: Money) -> Result<Money> {
    if supplied.is_zero() || supplied == computed {
        Ok(computed)
    } else {
        Err(StoreError::InvalidOrderTotal { supplied, computed })
    }
}

/// Returns the finish date an order should carry after moving to `status`.
pub(crate) fn finish_date_for(
    status: OrderStatus,
    current: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    if status.is_terminal() {
        current.or(Some(now))
    } else {
        current
    }
}

/// Converts a quantity to the storage integer type, rejecting zero.
pub(crate) fn checked_amount(amount: u32) -> Result<i32> {
    if amount == 0 {
        return Err(StoreError::InvalidAmount(amount));
    }
    i32::try_from(amount).map_err(|_| StoreError::InvalidAmount(amount))
}
