//! Saga order creation with a compensating stock restore.

use std::sync::Arc;
use std::time::Instant;

use domain::{OrderAggregate, OrderCreateRequest, build_order_aggregate};
use order_store::{OrderRepository, ProductCatalog};

use crate::error::Result;
use crate::services::{
    StockReservationClient, StockReservationRequest, reservation_batch, restore_batch,
};
use crate::validation::validate_order_products;

const STEP_VALIDATE: &str = "validate";
const STEP_RESERVE_STOCK: &str = "reserve_stock";
const STEP_CREATE_ORDER: &str = "create_order";

/// Orchestrates order creation as a two-step saga.
///
/// Stock is decremented first, then the order is written in one local
/// transaction. When the write fails the decrement is undone with a single
/// restore batch. No lock is held, so concurrent sagas may over-reserve for
/// a moment.
pub struct SagaCoordinator<R, I> {
    repo: Arc<R>,
    inventory: Arc<I>,
}

impl<R, I> SagaCoordinator<R, I>
where
    R: OrderRepository + ProductCatalog,
    I: StockReservationClient,
{
    pub fn new(repo: Arc<R>, inventory: Arc<I>) -> Self {
        Self { repo, inventory }
    }

    /// Runs the saga for one request.
    #[tracing::instrument(skip(self, request), fields(strategy = "saga", items = request.products.len()))]
    pub async fn create_order(&self, request: OrderCreateRequest) -> Result<OrderAggregate> {
        let started = Instant::now();

        tracing::debug!(step = STEP_VALIDATE, "saga step started");
        let validated = validate_order_products(self.repo.as_ref(), &request).await?;

        tracing::debug!(step = STEP_RESERVE_STOCK, "saga step started");
        let batch = reservation_batch(&request.products);
        self.inventory.reserve(&batch).await?;

        tracing::debug!(step = STEP_CREATE_ORDER, "saga step started");
        let created = match self
            .repo
            .create_with_products(request.to_new_order(), request.line_items())
            .await
        {
            Ok(created) => created,
            Err(e) => {
                tracing::warn!(step = STEP_CREATE_ORDER, error = %e, "saga step failed");
                self.compensate(&batch).await;
                return Err(e.into());
            }
        };

        // Committed from here on; a failed read-back does not undo the order.
        let order = self.repo.get(created.id).await?;
        let lines = self.repo.get_order_products(order.id).await?;
        let aggregate = build_order_aggregate(&order, &lines)?;

        metrics::counter!("orders_created_total", "strategy" => "saga").increment(1);
        metrics::histogram!("order_creation_duration_seconds", "strategy" => "saga")
            .record(started.elapsed().as_secs_f64());
        tracing::info!(order_id = %order.id, total = %validated.total, "saga order created");

        Ok(aggregate)
    }

    /// Restores the stock taken by `batch`. Best-effort and not retried.
    async fn compensate(&self, batch: &[StockReservationRequest]) {
        metrics::counter!("saga_compensations_total").increment(1);

        match self.inventory.restore(&restore_batch(batch)).await {
            Ok(ack) => {
                tracing::info!(applied = ack.applied, "saga compensation completed");
            }
            Err(e) => {
                metrics::counter!("saga_compensation_failures_total").increment(1);
                tracing::warn!(error = %e, "saga compensation failed, stock stays reserved");
            }
        }
    }
}
