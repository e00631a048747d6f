//! Order service facade used by the transports.

use std::sync::Arc;

use common::{OrderId, ProductId};
use domain::{
    OrderAggregate, OrderCreateRequest, OrderUpdateRequest, ProductCreateRequest, ProductDetail,
    build_order_aggregate, build_product_details,
};
use futures_util::future::try_join_all;
use order_store::{OrderFilter, OrderRepository, ProductCatalog, ProductRow};

use crate::error::Result;
use crate::lock::{AdmissionLock, ProcessLock};
use crate::saga::SagaCoordinator;
use crate::services::StockReservationClient;
use crate::tcc::{CallerStream, StreamError, TccClient, TccCoordinator, channel};
use crate::validation::validate_order_products;

/// Entry point for every order operation.
///
/// Owns the repository, the inventory client and both creation
/// coordinators. Cheap to share behind an `Arc`.
pub struct OrderService<R, I, L = ProcessLock> {
    repo: Arc<R>,
    inventory: Arc<I>,
    saga: SagaCoordinator<R, I>,
    tcc: TccCoordinator<R, I, L>,
}

impl<R, I> OrderService<R, I, ProcessLock>
where
    R: OrderRepository + ProductCatalog + 'static,
    I: StockReservationClient + 'static,
{
    /// Creates a service that admits TCC attempts through a process lock.
    pub fn new(repo: Arc<R>, inventory: Arc<I>) -> Self {
        Self::with_lock(repo, inventory, ProcessLock::new())
    }
}

impl<R, I, L> OrderService<R, I, L>
where
    R: OrderRepository + ProductCatalog + 'static,
    I: StockReservationClient + 'static,
    L: AdmissionLock,
{
    /// Creates a service with a custom admission lock.
    pub fn with_lock(repo: Arc<R>, inventory: Arc<I>, lock: L) -> Self {
        Self {
            saga: SagaCoordinator::new(Arc::clone(&repo), Arc::clone(&inventory)),
            tcc: TccCoordinator::new(Arc::clone(&repo), Arc::clone(&inventory), lock),
            repo,
            inventory,
        }
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub fn inventory(&self) -> &I {
        &self.inventory
    }

    pub fn admission_lock(&self) -> &L {
        self.tcc.lock()
    }

    /// Creates an order locally without touching inventory.
    #[tracing::instrument(skip(self, request), fields(strategy = "local"))]
    pub async fn create_order(&self, request: OrderCreateRequest) -> Result<OrderAggregate> {
        validate_order_products(self.repo.as_ref(), &request).await?;

        let order = self
            .repo
            .create_with_products(request.to_new_order(), request.line_items())
            .await?;
        let lines = self.repo.get_order_products(order.id).await?;

        metrics::counter!("orders_created_total", "strategy" => "local").increment(1);
        tracing::info!(order_id = %order.id, "order created");
        Ok(build_order_aggregate(&order, &lines)?)
    }

    /// Creates an order with the saga strategy.
    pub async fn create_saga_order(&self, request: OrderCreateRequest) -> Result<OrderAggregate> {
        self.saga.create_order(request).await
    }

    /// Creates an order with the TCC strategy over an in-process stream.
    #[tracing::instrument(skip(self, request))]
    pub async fn tcc_create_order(&self, request: OrderCreateRequest) -> Result<OrderAggregate> {
        let (client, stream) = channel();
        let (outcome, received) = tokio::join!(self.tcc.run(stream), drive_client(client, request));

        let order = outcome?;
        if let Err(e) = received {
            tracing::warn!(order_id = %order.id, error = %e, "in-process caller missed the order");
        }
        Ok(order)
    }

    /// Serves one TCC attempt over an externally supplied stream.
    pub async fn run_tcc_stream<C: CallerStream>(&self, caller: C) -> Result<OrderAggregate> {
        self.tcc.run(caller).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, id: OrderId) -> Result<OrderAggregate> {
        let order = self.repo.get(id).await?;
        let lines = self.repo.get_order_products(id).await?;
        Ok(build_order_aggregate(&order, &lines)?)
    }

    /// Lists orders newest first, each with its line items.
    #[tracing::instrument(skip(self))]
    pub async fn list_orders(&self, filter: OrderFilter) -> Result<Vec<OrderAggregate>> {
        let orders = self.repo.list(filter).await?;
        let lines = try_join_all(
            orders
                .iter()
                .map(|order| self.repo.get_order_products(order.id)),
        )
        .await?;

        orders
            .iter()
            .zip(&lines)
            .map(|(order, lines)| -> Result<OrderAggregate> {
                Ok(build_order_aggregate(order, lines)?)
            })
            .collect()
    }

    /// Updates the comment or status of an order.
    #[tracing::instrument(skip(self, request))]
    pub async fn update_order(
        &self,
        id: OrderId,
        request: OrderUpdateRequest,
    ) -> Result<OrderAggregate> {
        let current = self.repo.get(id).await?;
        request.validate(current.status)?;

        let update = request.into_update();
        let order = if update.is_empty() {
            current
        } else {
            self.repo.update(id, update).await?
        };
        let lines = self.repo.get_order_products(id).await?;
        Ok(build_order_aggregate(&order, &lines)?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_order(&self, id: OrderId) -> Result<()> {
        self.repo.delete(id).await?;
        tracing::info!(order_id = %id, "order deleted");
        Ok(())
    }

    /// Returns the line items of an existing order.
    #[tracing::instrument(skip(self))]
    pub async fn get_order_products(&self, id: OrderId) -> Result<Vec<ProductDetail>> {
        self.repo.get(id).await?;
        let lines = self.repo.get_order_products(id).await?;
        Ok(build_product_details(&lines)?)
    }

    /// Adds a product to the catalog, seeding its stock when requested.
    #[tracing::instrument(skip(self, request), fields(name = %request.name))]
    pub async fn create_product(&self, request: ProductCreateRequest) -> Result<ProductRow> {
        request.validate()?;
        let initial_stock = request.initial_stock;

        let product = self
            .repo
            .create_product(request.into_new_product())
            .await?;
        if let Some(amount) = initial_stock {
            self.inventory.set_amount(product.id, amount).await?;
        }
        Ok(product)
    }

    pub async fn get_product(&self, id: ProductId) -> Result<ProductRow> {
        Ok(self.repo.get_product(id).await?)
    }

    pub async fn list_products(&self) -> Result<Vec<ProductRow>> {
        Ok(self.repo.list_products().await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_product(&self, id: ProductId) -> Result<()> {
        Ok(self.repo.delete_product(id).await?)
    }
}

async fn drive_client(
    mut client: TccClient,
    request: OrderCreateRequest,
) -> std::result::Result<OrderAggregate, StreamError> {
    client.freeze().await?;
    client.submit(request).await?;
    client.receive().await
}
