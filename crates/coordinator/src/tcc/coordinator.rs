//! Try-Confirm/Cancel order creation over a pair of streams.

use std::sync::Arc;
use std::time::Instant;

use common::{Money, OrderId};
use domain::{OrderAggregate, OrderCreateRequest, build_order_aggregate};
use order_store::{OrderProductRow, OrderRepository, OrderUpdate, line_total, reconcile_order_cost};

use crate::error::{OrderServiceError, Result};
use crate::lock::{AdmissionGuard, AdmissionLock, ProcessLock};
use crate::services::{ReservationStream, StockReservationClient, StockReservationRequest};
use crate::tcc::{CallerStream, TccRequest, TccState};

/// An order header written before its line items.
///
/// Deleted on cancellation. If dropped while still armed, for example because
/// the attempt future was dropped, the delete is spawned onto the runtime.
struct NakedOrder<R: OrderRepository + 'static> {
    id: OrderId,
    repo: Arc<R>,
    armed: bool,
}

impl<R: OrderRepository + 'static> NakedOrder<R> {
    fn new(id: OrderId, repo: Arc<R>) -> Self {
        Self {
            id,
            repo,
            armed: true,
        }
    }

    /// Keeps the order.
    fn commit(mut self) {
        self.armed = false;
    }

    /// Deletes the order, logging a failure instead of returning it.
    ///
    /// Stays armed until the delete returns, so dropping this future midway
    /// still hands the order to the background cleanup.
    async fn discard(mut self) {
        let result = self.repo.delete(self.id).await;
        self.armed = false;
        if let Err(e) = result {
            metrics::counter!("tcc_cleanup_failures_total").increment(1);
            tracing::warn!(order_id = %self.id, error = %e, "failed to delete naked order");
        }
    }
}

impl<R: OrderRepository + 'static> Drop for NakedOrder<R> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let id = self.id;
        let repo = Arc::clone(&self.repo);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = repo.delete(id).await {
                        tracing::warn!(order_id = %id, error = %e, "failed to delete abandoned naked order");
                    }
                });
            }
            Err(_) => {
                tracing::warn!(order_id = %id, "no runtime to delete abandoned naked order");
            }
        }
    }
}

/// Everything one attempt has acquired so far.
///
/// Dropping it releases the admission guard and schedules removal of an
/// uncommitted naked order.
struct TccAttempt<R: OrderRepository + 'static> {
    state: TccState,
    guard: Option<AdmissionGuard>,
    reservation: Option<Box<dyn ReservationStream>>,
    request: Option<OrderCreateRequest>,
    naked: Option<NakedOrder<R>>,
    lines: Vec<OrderProductRow>,
    batch: Vec<StockReservationRequest>,
    order: Option<OrderAggregate>,
}

impl<R: OrderRepository + 'static> TccAttempt<R> {
    fn new() -> Self {
        Self {
            state: TccState::Idle,
            guard: None,
            reservation: None,
            request: None,
            naked: None,
            lines: Vec::new(),
            batch: Vec::new(),
            order: None,
        }
    }

    fn advance(&mut self, next: TccState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(self.coordination(format!("cannot move to {next}")));
        }
        tracing::debug!(from = %self.state, to = %next, "tcc transition");
        self.state = next;
        Ok(())
    }

    fn protocol(&self, reason: impl Into<String>) -> OrderServiceError {
        OrderServiceError::Protocol {
            state: self.state,
            reason: reason.into(),
        }
    }

    fn coordination(&self, reason: impl Into<String>) -> OrderServiceError {
        OrderServiceError::Coordination {
            state: self.state,
            reason: reason.into(),
        }
    }

    fn naked_id(&self) -> Result<OrderId> {
        self.naked
            .as_ref()
            .map(|naked| naked.id)
            .ok_or_else(|| self.coordination("no naked order"))
    }

    fn reservation(&mut self) -> Result<&mut Box<dyn ReservationStream>> {
        let state = self.state;
        self.reservation
            .as_mut()
            .ok_or(OrderServiceError::Coordination {
                state,
                reason: "no reservation stream".to_string(),
            })
    }
}

/// Drives the two-phase order creation protocol.
///
/// Steps, one handler per state:
/// 1. `Idle`: receive the freeze handshake, take the admission lock.
/// 2. `Locking`: open the reservation stream and freeze the inventory.
/// 3. `Reserving`: receive and validate the payload, write a naked order.
/// 4. `Building`: append line items, persist the computed cost.
/// 5. `ReservingStock`: send the decrement batch.
/// 6. `Confirming`: await the acknowledgement, emit the order.
///
/// Any failure before commit deletes the naked order and releases the lock.
/// Stock is only requested after the line items are stored.
pub struct TccCoordinator<R, I, L = ProcessLock> {
    repo: Arc<R>,
    inventory: Arc<I>,
    lock: L,
}

impl<R, I, L> TccCoordinator<R, I, L>
where
    R: OrderRepository + 'static,
    I: StockReservationClient,
    L: AdmissionLock,
{
    pub fn new(repo: Arc<R>, inventory: Arc<I>, lock: L) -> Self {
        Self {
            repo,
            inventory,
            lock,
        }
    }

    /// Returns the admission lock.
    pub fn lock(&self) -> &L {
        &self.lock
    }

    /// Runs one attempt to completion over `caller`.
    ///
    /// The returned aggregate is the one emitted on the stream.
    #[tracing::instrument(skip(self, caller), fields(strategy = "tcc"))]
    pub async fn run<C: CallerStream>(&self, mut caller: C) -> Result<OrderAggregate> {
        metrics::counter!("tcc_attempts_total").increment(1);
        let started = Instant::now();
        let mut attempt = TccAttempt::new();

        match self.drive(&mut attempt, &mut caller).await {
            Ok(order) => {
                metrics::counter!("orders_created_total", "strategy" => "tcc").increment(1);
                metrics::histogram!("order_creation_duration_seconds", "strategy" => "tcc")
                    .record(started.elapsed().as_secs_f64());
                Ok(order)
            }
            Err(err) => {
                self.cancel(&mut attempt, &err).await;
                Err(err)
            }
        }
    }

    async fn drive<C: CallerStream>(
        &self,
        attempt: &mut TccAttempt<R>,
        caller: &mut C,
    ) -> Result<OrderAggregate> {
        loop {
            match attempt.state {
                TccState::Idle => self.on_idle(attempt, caller).await?,
                TccState::Locking => self.on_locking(attempt).await?,
                TccState::Reserving => self.on_reserving(attempt, caller).await?,
                TccState::Building => self.on_building(attempt).await?,
                TccState::ReservingStock => self.on_reserving_stock(attempt).await?,
                TccState::Confirming => return self.on_confirming(attempt, caller).await,
                TccState::Committed | TccState::Cancelling | TccState::Cancelled => {
                    return Err(attempt.coordination("attempt already finished"));
                }
            }
        }
    }

    async fn on_idle<C: CallerStream>(
        &self,
        attempt: &mut TccAttempt<R>,
        caller: &mut C,
    ) -> Result<()> {
        match caller.recv().await? {
            Some(TccRequest::Freeze) => {}
            Some(TccRequest::Create(_)) => {
                return Err(attempt.protocol("expected freeze handshake before the order"));
            }
            None => return Err(crate::tcc::StreamError::Closed.into()),
        }

        let waiting = Instant::now();
        attempt.guard = Some(self.lock.acquire().await?);
        metrics::histogram!("tcc_lock_wait_seconds").record(waiting.elapsed().as_secs_f64());

        attempt.advance(TccState::Locking)
    }

    async fn on_locking(&self, attempt: &mut TccAttempt<R>) -> Result<()> {
        let mut reservation = self.inventory.open_reservation_stream().await?;
        reservation.send(Vec::new()).await?;
        attempt.reservation = Some(reservation);

        attempt.advance(TccState::Reserving)
    }

    async fn on_reserving<C: CallerStream>(
        &self,
        attempt: &mut TccAttempt<R>,
        caller: &mut C,
    ) -> Result<()> {
        let request = match caller.recv().await? {
            Some(TccRequest::Create(request)) => request,
            Some(TccRequest::Freeze) => return Err(attempt.protocol("duplicate freeze handshake")),
            None => return Err(crate::tcc::StreamError::Closed.into()),
        };
        request.validate()?;

        let order = self.repo.create_naked_order(request.to_naked_order()).await?;
        tracing::debug!(order_id = %order.id, "naked order created");
        attempt.naked = Some(NakedOrder::new(order.id, Arc::clone(&self.repo)));
        attempt.request = Some(request);

        attempt.advance(TccState::Building)
    }

    async fn on_building(&self, attempt: &mut TccAttempt<R>) -> Result<()> {
        let order_id = attempt.naked_id()?;
        let request = attempt
            .request
            .take()
            .ok_or_else(|| attempt.coordination("no create payload"))?;

        let mut totals = Vec::with_capacity(request.products.len());
        for item in &request.products {
            let line = self
                .repo
                .add_order_product(order_id, item.product_id, item.amount)
                .await?;
            totals.push(line_total(line.result_price, line.amount)?);
            attempt
                .batch
                .push(StockReservationRequest::decrement(item.product_id, item.amount));
            attempt.lines.push(line);
        }

        let computed = Money::checked_sum(totals).map_err(order_store::StoreError::from)?;
        let order_cost = reconcile_order_cost(request.supplied_cost(), computed)?;
        let order = self
            .repo
            .update(
                order_id,
                OrderUpdate {
                    order_cost: Some(order_cost),
                    ..Default::default()
                },
            )
            .await?;
        attempt.order = Some(build_order_aggregate(&order, &attempt.lines)?);

        attempt.advance(TccState::ReservingStock)
    }

    async fn on_reserving_stock(&self, attempt: &mut TccAttempt<R>) -> Result<()> {
        let batch = attempt.batch.clone();
        attempt.reservation()?.send(batch).await?;

        attempt.advance(TccState::Confirming)
    }

    async fn on_confirming<C: CallerStream>(
        &self,
        attempt: &mut TccAttempt<R>,
        caller: &mut C,
    ) -> Result<OrderAggregate> {
        let ack = attempt.reservation()?.recv().await?;
        let order = attempt
            .order
            .take()
            .ok_or_else(|| attempt.coordination("no order to confirm"))?;

        attempt.advance(TccState::Committed)?;
        if let Some(naked) = attempt.naked.take() {
            naked.commit();
        }
        tracing::info!(order_id = %order.id, applied = ack.applied, "tcc order committed");

        if let Err(e) = caller.send(order.clone()).await {
            tracing::warn!(order_id = %order.id, error = %e, "committed order could not be emitted");
        }
        attempt.guard.take();
        attempt.reservation.take();

        Ok(order)
    }

    async fn cancel(&self, attempt: &mut TccAttempt<R>, cause: &OrderServiceError) {
        metrics::counter!("tcc_cancelled_total").increment(1);
        let failed_in = attempt.state;
        attempt.state = TccState::Cancelling;

        if let Some(naked) = attempt.naked.take() {
            naked.discard().await;
        }
        attempt.reservation.take();
        attempt.guard.take();
        attempt.state = TccState::Cancelled;

        tracing::warn!(state = %failed_in, error = %cause, "tcc attempt cancelled");
    }
}

#[cfg(test)]
mod tests {
    use common::ProductId;
    use domain::OrderProductInput;
    use order_store::{InMemoryOrderStore, NewProduct, ProductCatalog};

    use super::*;
    use crate::services::InMemoryStockService;
    use crate::tcc::channel;

    struct Fixture {
        store: Arc<InMemoryOrderStore>,
        stock: Arc<InMemoryStockService>,
        coordinator: TccCoordinator<InMemoryOrderStore, InMemoryStockService>,
        product: ProductId,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(InMemoryOrderStore::new());
        let stock = Arc::new(InMemoryStockService::new());
        let product = store
            .create_product(NewProduct {
                name: "P1".into(),
                product_code: uuid::Uuid::new_v4(),
                customer_cost: Money::from_minor(5000),
            })
            .await
            .unwrap();
        stock.set_amount(product.id, 10).await.unwrap();

        Fixture {
            coordinator: TccCoordinator::new(
                Arc::clone(&store),
                Arc::clone(&stock),
                ProcessLock::new(),
            ),
            store,
            stock,
            product: product.id,
        }
    }

    #[tokio::test]
    async fn happy_path_commits_and_emits() {
        let f = fixture().await;
        let (mut client, server) = channel();
        client.freeze().await.unwrap();
        client
            .submit(OrderCreateRequest::new(vec![OrderProductInput::new(f.product, 2)]))
            .await
            .unwrap();

        let order = f.coordinator.run(server).await.unwrap();
        let emitted = client.receive().await.unwrap();

        assert_eq!(order, emitted);
        assert_eq!(order.order_cost, Money::from_minor(10000));
        assert_eq!(f.stock.get_amount(f.product).await.unwrap(), 8);
        assert_eq!(f.store.order_count().await, 1);
        assert!(!f.coordinator.lock().is_locked());
    }

    #[tokio::test]
    async fn payload_before_handshake_is_a_protocol_violation() {
        let f = fixture().await;
        let (client, server) = channel();
        client
            .submit(OrderCreateRequest::new(vec![OrderProductInput::new(f.product, 1)]))
            .await
            .unwrap();

        let err = f.coordinator.run(server).await.unwrap_err();
        assert!(matches!(
            err,
            OrderServiceError::Protocol {
                state: TccState::Idle,
                ..
            }
        ));
        assert!(f.stock.calls().await.is_empty());
    }

    #[tokio::test]
    async fn hang_up_after_handshake_releases_the_lock() {
        let f = fixture().await;
        let (client, server) = channel();
        client.freeze().await.unwrap();
        drop(client);

        let err = f.coordinator.run(server).await.unwrap_err();
        assert!(matches!(err, OrderServiceError::Stream(_)));
        assert!(!f.coordinator.lock().is_locked());
        assert_eq!(f.store.order_count().await, 0);
    }

    #[tokio::test]
    async fn mismatched_cost_fails_before_stock_is_requested() {
        let f = fixture().await;
        let (client, server) = channel();
        client.freeze().await.unwrap();
        client
            .submit(
                OrderCreateRequest::new(vec![OrderProductInput::new(f.product, 2)])
                    .with_order_cost(Money::from_minor(9000)),
            )
            .await
            .unwrap();

        let err = f.coordinator.run(server).await.unwrap_err();
        assert!(matches!(
            err,
            OrderServiceError::Store(order_store::StoreError::InvalidOrderTotal { .. })
        ));
        assert_eq!(f.stock.stream_batch_count().await, 0);
        assert_eq!(f.store.order_count().await, 0);
        assert_eq!(f.store.line_item_count().await, 0);
    }

    #[tokio::test]
    async fn unknown_product_deletes_naked_order() {
        let f = fixture().await;
        let (client, server) = channel();
        client.freeze().await.unwrap();
        client
            .submit(OrderCreateRequest::new(vec![
                OrderProductInput::new(f.product, 1),
                OrderProductInput::new(ProductId::new(), 1),
            ]))
            .await
            .unwrap();

        let err = f.coordinator.run(server).await.unwrap_err();
        assert_eq!(err.kind(), common::ErrorKind::NotFound);
        assert_eq!(f.store.order_count().await, 0);
        assert_eq!(f.store.line_item_count().await, 0);
    }

    /// Inventory whose reservation streams never acknowledge.
    struct StallingInventory;

    struct StallingStream;

    #[async_trait::async_trait]
    impl ReservationStream for StallingStream {
        async fn send(
            &mut self,
            _batch: Vec<StockReservationRequest>,
        ) -> std::result::Result<(), crate::services::InventoryError> {
            Ok(())
        }

        async fn recv(
            &mut self,
        ) -> std::result::Result<crate::services::ReservationAck, crate::services::InventoryError>
        {
            std::future::pending().await
        }
    }

    #[async_trait::async_trait]
    impl StockReservationClient for StallingInventory {
        async fn reserve(
            &self,
            items: &[StockReservationRequest],
        ) -> std::result::Result<crate::services::ReservationAck, crate::services::InventoryError>
        {
            Ok(crate::services::ReservationAck {
                applied: items.len(),
            })
        }

        async fn restore(
            &self,
            items: &[StockReservationRequest],
        ) -> std::result::Result<crate::services::ReservationAck, crate::services::InventoryError>
        {
            Ok(crate::services::ReservationAck {
                applied: items.len(),
            })
        }

        async fn set_amount(
            &self,
            _product_id: ProductId,
            _amount: u64,
        ) -> std::result::Result<(), crate::services::InventoryError> {
            Ok(())
        }

        async fn get_amount(
            &self,
            _product_id: ProductId,
        ) -> std::result::Result<u64, crate::services::InventoryError> {
            Ok(0)
        }

        async fn open_reservation_stream(
            &self,
        ) -> std::result::Result<Box<dyn ReservationStream>, crate::services::InventoryError>
        {
            Ok(Box::new(StallingStream))
        }
    }

    #[tokio::test]
    async fn dropped_attempt_cleans_up_in_background() {
        let f = fixture().await;
        let coordinator =
            TccCoordinator::new(Arc::clone(&f.store), Arc::new(StallingInventory), ProcessLock::new());
        let (client, server) = channel();
        client.freeze().await.unwrap();
        client
            .submit(OrderCreateRequest::new(vec![OrderProductInput::new(f.product, 1)]))
            .await
            .unwrap();

        let timed_out = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            coordinator.run(server),
        )
        .await;
        assert!(timed_out.is_err());
        assert!(!coordinator.lock().is_locked());

        for _ in 0..50 {
            if f.store.order_count().await == 0 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(f.store.order_count().await, 0);
        assert_eq!(f.store.line_item_count().await, 0);
    }

    /// Delegates to the in-memory store, except that the first delete never
    /// completes.
    struct StallFirstDelete {
        inner: Arc<InMemoryOrderStore>,
        stalled: std::sync::atomic::AtomicBool,
    }

    #[async_trait::async_trait]
    impl OrderRepository for StallFirstDelete {
        async fn create_naked_order(
            &self,
            order: order_store::NewOrder,
        ) -> order_store::Result<order_store::OrderRow> {
            self.inner.create_naked_order(order).await
        }

        async fn create_with_products(
            &self,
            order: order_store::NewOrder,
            products: Vec<order_store::NewOrderProduct>,
        ) -> order_store::Result<order_store::OrderRow> {
            self.inner.create_with_products(order, products).await
        }

        async fn add_order_product(
            &self,
            order_id: OrderId,
            product_id: ProductId,
            amount: u32,
        ) -> order_store::Result<order_store::OrderProductRow> {
            self.inner.add_order_product(order_id, product_id, amount).await
        }

        async fn get(&self, id: OrderId) -> order_store::Result<order_store::OrderRow> {
            self.inner.get(id).await
        }

        async fn list(
            &self,
            filter: order_store::OrderFilter,
        ) -> order_store::Result<Vec<order_store::OrderRow>> {
            self.inner.list(filter).await
        }

        async fn update(
            &self,
            id: OrderId,
            update: order_store::OrderUpdate,
        ) -> order_store::Result<order_store::OrderRow> {
            self.inner.update(id, update).await
        }

        async fn delete(&self, id: OrderId) -> order_store::Result<()> {
            if !self.stalled.swap(true, std::sync::atomic::Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            self.inner.delete(id).await
        }

        async fn get_order_products(
            &self,
            id: OrderId,
        ) -> order_store::Result<Vec<order_store::OrderProductRow>> {
            self.inner.get_order_products(id).await
        }
    }

    #[tokio::test]
    async fn interrupted_discard_still_cleans_up() {
        let inner = Arc::new(InMemoryOrderStore::new());
        let repo = Arc::new(StallFirstDelete {
            inner: Arc::clone(&inner),
            stalled: std::sync::atomic::AtomicBool::new(false),
        });
        let order = repo
            .create_naked_order(OrderCreateRequest::new(vec![]).to_naked_order())
            .await
            .unwrap();

        let naked = NakedOrder::new(order.id, Arc::clone(&repo));
        let timed_out =
            tokio::time::timeout(std::time::Duration::from_millis(20), naked.discard()).await;
        assert!(timed_out.is_err());

        for _ in 0..50 {
            if inner.order_count().await == 0 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(inner.order_count().await, 0);
    }
}
