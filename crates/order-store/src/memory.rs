use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use common::{Money, OrderId, ProductId};
use tokio::sync::RwLock;

use crate::{
    NewOrder, NewOrderProduct, NewProduct, OrderFilter, OrderProductRow, OrderRow, OrderUpdate,
    ProductRow, Result, StoreError,
    store::{
        OrderRepository, ProductCatalog, checked_amount, finish_date_for, line_total,
        reconcile_order_cost,
    },
};

#[derive(Debug, Clone)]
struct LineItem {
    order_id: OrderId,
    product_id: ProductId,
    result_price: Money,
    amount: u32,
}

#[derive(Debug, Default)]
struct MemoryState {
    orders: HashMap<OrderId, OrderRow>,
    /// Order ids in creation order.
    sequence: Vec<OrderId>,
    line_items: Vec<LineItem>,
    products: HashMap<ProductId, ProductRow>,
}

impl MemoryState {
    fn product(&self, id: ProductId) -> Result<&ProductRow> {
        self.products.get(&id).ok_or(StoreError::ProductNotFound(id))
    }

    fn has_line_item(&self, order_id: OrderId, product_id: ProductId) -> bool {
        self.line_items
            .iter()
            .any(|item| item.order_id == order_id && item.product_id == product_id)
    }

    fn joined(&self, item: &LineItem) -> Result<OrderProductRow> {
        let product = self.products.get(&item.product_id).ok_or_else(|| {
            StoreError::Decode(format!(
                "line item references missing product {}",
                item.product_id
            ))
        })?;
        Ok(OrderProductRow {
            order_id: item.order_id,
            product_id: item.product_id,
            result_price: item.result_price,
            amount: item.amount,
            product_name: product.name.clone(),
            product_code: product.product_code,
        })
    }
}

/// In-memory order store for tests and local runs.
///
/// Offers the same guarantees as the PostgreSQL implementation: writes are
/// validated in full before anything is stored, so a failed create leaves no
/// trace.
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    state: Arc<RwLock<MemoryState>>,
    fail_on_create: Arc<AtomicBool>,
    fail_on_get: Arc<AtomicBool>,
}

impl InMemoryOrderStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `create_with_products` fail with `Unavailable`.
    pub fn set_fail_on_create(&self, fail: bool) {
        self.fail_on_create.store(fail, Ordering::SeqCst);
    }

    /// Makes `get` fail with `Unavailable`.
    pub fn set_fail_on_get(&self, fail: bool) {
        self.fail_on_get.store(fail, Ordering::SeqCst);
    }

    /// Returns the number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }

    /// Returns the number of stored line items across all orders.
    pub async fn line_item_count(&self) -> usize {
        self.state.read().await.line_items.len()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderStore {
    async fn create_naked_order(&self, order: NewOrder) -> Result<OrderRow> {
        let row = OrderRow {
            id: OrderId::new(),
            comment: order.comment,
            user_id: order.user_id,
            staff_id: order.staff_id,
            order_cost: order.order_cost,
            status: Default::default(),
            creation_date: Utc::now(),
            finish_date: None,
        };

        let mut state = self.state.write().await;
        state.sequence.push(row.id);
        state.orders.insert(row.id, row.clone());
        Ok(row)
    }

    async fn create_with_products(
        &self,
        order: NewOrder,
        products: Vec<NewOrderProduct>,
    ) -> Result<OrderRow> {
        if products.is_empty() {
            return Err(StoreError::EmptyOrder);
        }
        if self.fail_on_create.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("order store rejected the write".into()));
        }

        let mut state = self.state.write().await;
        let order_id = OrderId::new();
        let mut seen = HashSet::with_capacity(products.len());
        let mut items = Vec::with_capacity(products.len());
        let mut totals = Vec::with_capacity(products.len());

        for input in &products {
            checked_amount(input.amount)?;
            let product = state.product(input.product_id)?;
            if !seen.insert(input.product_id) {
                return Err(StoreError::DuplicateLineItem {
                    order_id,
                    product_id: input.product_id,
                });
            }
            totals.push(line_total(product.customer_cost, input.amount)?);
            items.push(LineItem {
                order_id,
                product_id: input.product_id,
                result_price: product.customer_cost,
                amount: input.amount,
            });
        }

        let computed = Money::checked_sum(totals)?;
        let order_cost = reconcile_order_cost(order.order_cost, computed)?;

        let row = OrderRow {
            id: order_id,
            comment: order.comment,
            user_id: order.user_id,
            staff_id: order.staff_id,
            order_cost,
            status: Default::default(),
            creation_date: Utc::now(),
            finish_date: None,
        };

        state.sequence.push(order_id);
        state.orders.insert(order_id, row.clone());
        state.line_items.extend(items);
        Ok(row)
    }

    async fn add_order_product(
        &self,
        order_id: OrderId,
        product_id: ProductId,
        amount: u32,
    ) -> Result<OrderProductRow> {
        checked_amount(amount)?;

        let mut state = self.state.write().await;
        if !state.orders.contains_key(&order_id) {
            return Err(StoreError::OrderNotFound(order_id));
        }
        let price = state.product(product_id)?.customer_cost;
        if state.has_line_item(order_id, product_id) {
            return Err(StoreError::DuplicateLineItem {
                order_id,
                product_id,
            });
        }

        let item = LineItem {
            order_id,
            product_id,
            result_price: price,
            amount,
        };
        let row = state.joined(&item)?;
        state.line_items.push(item);
        Ok(row)
    }

    async fn get(&self, id: OrderId) -> Result<OrderRow> {
        if self.fail_on_get.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("order store read failed".into()));
        }
        self.state
            .read()
            .await
            .orders
            .get(&id)
            .cloned()
            .ok_or(StoreError::OrderNotFound(id))
    }

    async fn list(&self, filter: OrderFilter) -> Result<Vec<OrderRow>> {
        let state = self.state.read().await;
        Ok(state
            .sequence
            .iter()
            .rev()
            .filter_map(|id| state.orders.get(id))
            .filter(|order| filter.matches(order))
            .skip(filter.offset as usize)
            .take(filter.limit as usize)
            .cloned()
            .collect())
    }

    async fn update(&self, id: OrderId, update: OrderUpdate) -> Result<OrderRow> {
        let mut state = self.state.write().await;
        let order = state
            .orders
            .get_mut(&id)
            .ok_or(StoreError::OrderNotFound(id))?;

        if let Some(next) = update.status
            && !order.status.can_transition_to(next)
        {
            return Err(StoreError::InvalidStatusTransition {
                from: order.status,
                to: next,
            });
        }

        if let Some(comment) = update.comment {
            order.comment = comment;
        }
        if let Some(order_cost) = update.order_cost {
            order.order_cost = order_cost;
        }
        if let Some(status) = update.status {
            order.status = status;
            order.finish_date = finish_date_for(status, order.finish_date, Utc::now());
        }

        Ok(order.clone())
    }

    async fn delete(&self, id: OrderId) -> Result<()> {
        let mut state = self.state.write().await;
        state.line_items.retain(|item| item.order_id != id);
        if state.orders.remove(&id).is_none() {
            return Err(StoreError::OrderNotFound(id));
        }
        state.sequence.retain(|existing| *existing != id);
        Ok(())
    }

    async fn get_order_products(&self, id: OrderId) -> Result<Vec<OrderProductRow>> {
        let state = self.state.read().await;
        state
            .line_items
            .iter()
            .filter(|item| item.order_id == id)
            .map(|item| state.joined(item))
            .collect()
    }
}

#[async_trait]
impl ProductCatalog for InMemoryOrderStore {
    async fn create_product(&self, product: NewProduct) -> Result<ProductRow> {
        let now = Utc::now();
        let row = ProductRow {
            id: ProductId::new(),
            name: product.name,
            product_code: product.product_code,
            customer_cost: product.customer_cost,
            created_at: now,
            updated_at: now,
        };
        self.state
            .write()
            .await
            .products
            .insert(row.id, row.clone());
        Ok(row)
    }

    async fn get_product(&self, id: ProductId) -> Result<ProductRow> {
        self.state.read().await.product(id).cloned()
    }

    async fn list_products(&self) -> Result<Vec<ProductRow>> {
        let state = self.state.read().await;
        let mut products: Vec<_> = state.products.values().cloned().collect();
        products.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(products)
    }

    async fn delete_product(&self, id: ProductId) -> Result<()> {
        let mut state = self.state.write().await;
        if state.line_items.iter().any(|item| item.product_id == id) {
            return Err(StoreError::ProductInUse(id));
        }
        state
            .products
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::ProductNotFound(id))
    }
}

#[cfg(test)]
mod tests {
    use common::OrderStatus;
    use uuid::Uuid;

    use super::*;

    async fn product(store: &InMemoryOrderStore, name: &str, minor: i64) -> ProductRow {
        store
            .create_product(NewProduct {
                name: name.to_string(),
                product_code: Uuid::new_v4(),
                customer_cost: Money::from_minor(minor),
            })
            .await
            .unwrap()
    }

    fn header(cost: Money) -> NewOrder {
        NewOrder {
            comment: "leave at the door".into(),
            user_id: "user-1".into(),
            staff_id: "staff-1".into(),
            order_cost: cost,
        }
    }

    #[tokio::test]
    async fn create_with_products_computes_zero_cost() {
        let store = InMemoryOrderStore::new();
        let p1 = product(&store, "P1", 5000).await;

        let order = store
            .create_with_products(header(Money::zero()), vec![NewOrderProduct::new(p1.id, 2)])
            .await
            .unwrap();

        assert_eq!(order.order_cost, Money::from_minor(10000));
        assert_eq!(order.status, OrderStatus::New);
        assert_eq!(store.line_item_count().await, 1);
    }

    #[tokio::test]
    async fn create_with_products_accepts_matching_cost() {
        let store = InMemoryOrderStore::new();
        let p1 = product(&store, "P1", 5000).await;

        let order = store
            .create_with_products(
                header(Money::from_minor(10000)),
                vec![NewOrderProduct::new(p1.id, 2)],
            )
            .await
            .unwrap();

        assert_eq!(order.order_cost, Money::from_minor(10000));
    }

    #[tokio::test]
    async fn create_with_products_rejects_mismatched_cost_without_side_effects() {
        let store = InMemoryOrderStore::new();
        let p1 = product(&store, "P1", 5000).await;

        let result = store
            .create_with_products(
                header(Money::from_minor(9000)),
                vec![NewOrderProduct::new(p1.id, 2)],
            )
            .await;

        assert!(matches!(result, Err(StoreError::InvalidOrderTotal { .. })));
        assert_eq!(store.order_count().await, 0);
        assert_eq!(store.line_item_count().await, 0);
    }

    #[tokio::test]
    async fn create_with_products_rejects_empty_order() {
        let store = InMemoryOrderStore::new();
        let result = store.create_with_products(header(Money::zero()), vec![]).await;
        assert!(matches!(result, Err(StoreError::EmptyOrder)));
    }

    #[tokio::test]
    async fn create_with_products_rejects_unknown_and_duplicate_products() {
        let store = InMemoryOrderStore::new();
        let p1 = product(&store, "P1", 5000).await;

        let unknown = store
            .create_with_products(
                header(Money::zero()),
                vec![NewOrderProduct::new(ProductId::new(), 1)],
            )
            .await;
        assert!(matches!(unknown, Err(StoreError::ProductNotFound(_))));

        let duplicate = store
            .create_with_products(
                header(Money::zero()),
                vec![NewOrderProduct::new(p1.id, 1), NewOrderProduct::new(p1.id, 2)],
            )
            .await;
        assert!(matches!(duplicate, Err(StoreError::DuplicateLineItem { .. })));
        assert_eq!(store.order_count().await, 0);
    }

    #[tokio::test]
    async fn naked_order_then_add_products() {
        let store = InMemoryOrderStore::new();
        let p1 = product(&store, "P1", 5000).await;
        let p2 = product(&store, "P2", 125).await;

        let order = store.create_naked_order(header(Money::zero())).await.unwrap();
        let line = store.add_order_product(order.id, p1.id, 2).await.unwrap();
        store.add_order_product(order.id, p2.id, 4).await.unwrap();

        assert_eq!(line.result_price, Money::from_minor(5000));
        assert_eq!(line.product_name, "P1");
        assert_eq!(
            store.calculate_order_total(order.id).await.unwrap(),
            Money::from_minor(10500)
        );

        let again = store.add_order_product(order.id, p1.id, 1).await;
        assert!(matches!(again, Err(StoreError::DuplicateLineItem { .. })));
    }

    #[tokio::test]
    async fn add_product_requires_existing_order() {
        let store = InMemoryOrderStore::new();
        let p1 = product(&store, "P1", 5000).await;
        let result = store.add_order_product(OrderId::new(), p1.id, 1).await;
        assert!(matches!(result, Err(StoreError::OrderNotFound(_))));
    }

    #[tokio::test]
    async fn line_items_keep_insertion_order() {
        let store = InMemoryOrderStore::new();
        let b = product(&store, "B", 100).await;
        let a = product(&store, "A", 100).await;

        let order = store
            .create_with_products(
                header(Money::zero()),
                vec![NewOrderProduct::new(b.id, 1), NewOrderProduct::new(a.id, 1)],
            )
            .await
            .unwrap();

        let names: Vec<_> = store
            .get_order_products(order.id)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.product_name)
            .collect();
        assert_eq!(names, vec!["B", "A"]);
    }

    #[tokio::test]
    async fn update_status_stamps_finish_date() {
        let store = InMemoryOrderStore::new();
        let order = store.create_naked_order(header(Money::zero())).await.unwrap();

        let processing = store
            .update_status(order.id, OrderStatus::Processing)
            .await
            .unwrap();
        assert!(processing.finish_date.is_none());

        let completed = store
            .update_status(order.id, OrderStatus::Completed)
            .await
            .unwrap();
        assert!(completed.finish_date.is_some());
    }

    #[tokio::test]
    async fn update_rejects_a_transition_from_a_terminal_status() {
        let store = InMemoryOrderStore::new();
        let order = store.create_naked_order(header(Money::zero())).await.unwrap();
        store
            .update_status(order.id, OrderStatus::Processing)
            .await
            .unwrap();

        // Both callers saw Processing; only the first write may land.
        store
            .update_status(order.id, OrderStatus::Completed)
            .await
            .unwrap();
        let late = store
            .update(
                order.id,
                OrderUpdate {
                    comment: Some("too late".into()),
                    status: Some(OrderStatus::Cancelled),
                    ..Default::default()
                },
            )
            .await;

        assert!(matches!(
            late,
            Err(StoreError::InvalidStatusTransition {
                from: OrderStatus::Completed,
                to: OrderStatus::Cancelled,
            })
        ));
        let stored = store.get(order.id).await.unwrap();
        assert_eq!(stored.status, OrderStatus::Completed);
        assert_eq!(stored.comment, order.comment);
    }

    #[tokio::test]
    async fn delete_removes_order_and_line_items() {
        let store = InMemoryOrderStore::new();
        let p1 = product(&store, "P1", 5000).await;
        let order = store
            .create_with_products(header(Money::zero()), vec![NewOrderProduct::new(p1.id, 1)])
            .await
            .unwrap();

        store.delete(order.id).await.unwrap();

        assert!(matches!(
            store.get(order.id).await,
            Err(StoreError::OrderNotFound(_))
        ));
        assert_eq!(store.line_item_count().await, 0);
        assert!(matches!(
            store.delete(order.id).await,
            Err(StoreError::OrderNotFound(_))
        ));
    }

    #[tokio::test]
    async fn list_pages_newest_first_with_status_filter() {
        let store = InMemoryOrderStore::new();
        let first = store.create_naked_order(header(Money::zero())).await.unwrap();
        let second = store.create_naked_order(header(Money::zero())).await.unwrap();
        let third = store.create_naked_order(header(Money::zero())).await.unwrap();
        store
            .update_status(second.id, OrderStatus::Cancelled)
            .await
            .unwrap();

        let all = store.list(OrderFilter::new()).await.unwrap();
        let ids: Vec<_> = all.iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![third.id, second.id, first.id]);

        let page = store.list(OrderFilter::new().limit(1).offset(1)).await.unwrap();
        assert_eq!(page[0].id, second.id);

        let new_only = store
            .list(OrderFilter::new().status(OrderStatus::New))
            .await
            .unwrap();
        assert_eq!(new_only.len(), 2);
    }

    #[tokio::test]
    async fn referenced_product_cannot_be_deleted() {
        let store = InMemoryOrderStore::new();
        let p1 = product(&store, "P1", 5000).await;
        store
            .create_with_products(header(Money::zero()), vec![NewOrderProduct::new(p1.id, 1)])
            .await
            .unwrap();

        assert!(matches!(
            store.delete_product(p1.id).await,
            Err(StoreError::ProductInUse(_))
        ));
    }

    #[tokio::test]
    async fn injected_failures() {
        let store = InMemoryOrderStore::new();
        let p1 = product(&store, "P1", 5000).await;

        store.set_fail_on_create(true);
        let result = store
            .create_with_products(header(Money::zero()), vec![NewOrderProduct::new(p1.id, 1)])
            .await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
        assert_eq!(store.order_count().await, 0);

        store.set_fail_on_create(false);
        let order = store
            .create_with_products(header(Money::zero()), vec![NewOrderProduct::new(p1.id, 1)])
            .await
            .unwrap();

        store.set_fail_on_get(true);
        assert!(store.get(order.id).await.is_err());
    }
}
