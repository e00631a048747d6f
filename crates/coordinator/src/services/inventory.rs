//! Stock reservation client contract and in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{ErrorKind, ProductId};
use domain::OrderProductInput;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

/// Errors reported by the inventory service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InventoryError {
    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: u64,
        available: u64,
    },

    #[error("Product {0} is not tracked by the inventory service")]
    UnknownProduct(ProductId),

    #[error("Inventory rejected the request: {0}")]
    Rejected(String),

    #[error("Inventory service unavailable: {0}")]
    Unavailable(String),

    #[error("Reservation stream closed")]
    StreamClosed,
}

impl InventoryError {
    /// Classifies the error for transport mapping.
    pub fn kind(&self) -> ErrorKind {
        match self {
            InventoryError::UnknownProduct(_) => ErrorKind::NotFound,
            InventoryError::InsufficientStock { .. } | InventoryError::Rejected(_) => {
                ErrorKind::InvalidArgument
            }
            InventoryError::Unavailable(_) | InventoryError::StreamClosed => ErrorKind::Internal,
        }
    }
}

/// A signed stock change for one product: negative reserves, positive
/// restores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StockReservationRequest {
    pub product_id: ProductId,
    pub delta: i64,
}

impl StockReservationRequest {
    /// Takes `amount` units out of stock.
    pub fn decrement(product_id: ProductId, amount: u32) -> Self {
        Self {
            product_id,
            delta: -i64::from(amount),
        }
    }

    /// Puts `amount` units back into stock.
    pub fn increment(product_id: ProductId, amount: u32) -> Self {
        Self {
            product_id,
            delta: i64::from(amount),
        }
    }

    /// Returns the request that undoes this one.
    pub fn inverted(&self) -> Self {
        Self {
            product_id: self.product_id,
            delta: -self.delta,
        }
    }
}

/// Builds one decrement per requested line item.
pub fn reservation_batch(products: &[OrderProductInput]) -> Vec<StockReservationRequest> {
    products
        .iter()
        .map(|p| StockReservationRequest::decrement(p.product_id, p.amount))
        .collect()
}

/// Builds the batch that undoes `batch`.
pub fn restore_batch(batch: &[StockReservationRequest]) -> Vec<StockReservationRequest> {
    batch.iter().map(StockReservationRequest::inverted).collect()
}

/// Acknowledgement of an applied batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationAck {
    /// Number of requests applied.
    pub applied: usize,
}

/// Client side of the inventory service.
///
/// `reserve` and `restore` apply a whole batch or nothing. The reservation
/// stream carries the two-phase exchange: an empty batch freezes the
/// participating stock, the next batch is applied and acknowledged.
#[async_trait]
pub trait StockReservationClient: Send + Sync {
    /// Applies a batch of decrements.
    async fn reserve(
        &self,
        items: &[StockReservationRequest],
    ) -> Result<ReservationAck, InventoryError>;

    /// Applies a batch of increments.
    async fn restore(
        &self,
        items: &[StockReservationRequest],
    ) -> Result<ReservationAck, InventoryError>;

    /// Sets the absolute stock of a product.
    async fn set_amount(&self, product_id: ProductId, amount: u64) -> Result<(), InventoryError>;

    /// Returns the stock of a product.
    async fn get_amount(&self, product_id: ProductId) -> Result<u64, InventoryError>;

    /// Opens a bidirectional reservation stream.
    async fn open_reservation_stream(&self)
    -> Result<Box<dyn ReservationStream>, InventoryError>;

    /// Checks that the service is reachable.
    async fn ping(&self) -> Result<(), InventoryError> {
        Ok(())
    }
}

/// An open reservation stream.
#[async_trait]
pub trait ReservationStream: Send {
    /// Sends a batch. An empty batch is the freeze handshake.
    async fn send(&mut self, batch: Vec<StockReservationRequest>) -> Result<(), InventoryError>;

    /// Waits for the acknowledgement of the last non-empty batch.
    async fn recv(&mut self) -> Result<ReservationAck, InventoryError>;
}

/// A call observed by [`InMemoryStockService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InventoryCall {
    Reserve(Vec<StockReservationRequest>),
    Restore(Vec<StockReservationRequest>),
    StreamFreeze { session: u64 },
    StreamBatch {
        session: u64,
        items: Vec<StockReservationRequest>,
    },
    StreamAck { session: u64 },
}

impl InventoryCall {
    /// Returns the stream session this call belongs to, if any.
    pub fn session(&self) -> Option<u64> {
        match self {
            InventoryCall::StreamFreeze { session }
            | InventoryCall::StreamBatch { session, .. }
            | InventoryCall::StreamAck { session } => Some(*session),
            InventoryCall::Reserve(_) | InventoryCall::Restore(_) => None,
        }
    }
}

#[derive(Debug, Default)]
struct StockState {
    stock: HashMap<ProductId, u64>,
    calls: Vec<InventoryCall>,
    next_session: u64,
    fail_on_reserve: bool,
    fail_on_restore: bool,
    fail_on_ack: bool,
    unavailable: bool,
    ping_failures: u32,
    latency: Option<Duration>,
}

impl StockState {
    /// Applies every delta or none of them.
    fn apply(&mut self, items: &[StockReservationRequest]) -> Result<ReservationAck, InventoryError> {
        let mut net: HashMap<ProductId, i64> = HashMap::new();
        for item in items {
            if !self.stock.contains_key(&item.product_id) {
                return Err(InventoryError::UnknownProduct(item.product_id));
            }
            *net.entry(item.product_id).or_default() += item.delta;
        }

        let mut updated = Vec::with_capacity(net.len());
        for (product_id, delta) in net {
            let available = self.stock.get(&product_id).copied().unwrap_or_default();
            let next = i128::from(available) + i128::from(delta);
            let next = u64::try_from(next).map_err(|_| InventoryError::InsufficientStock {
                product_id,
                requested: delta.unsigned_abs(),
                available,
            })?;
            updated.push((product_id, next));
        }

        self.stock.extend(updated);
        Ok(ReservationAck {
            applied: items.len(),
        })
    }
}

/// In-memory inventory service for tests and local runs.
///
/// Records every call for inspection and supports failure injection.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStockService {
    state: Arc<Mutex<StockState>>,
}

impl InMemoryStockService {
    /// Creates a new in-memory inventory service with no tracked products.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures `reserve` to fail without applying anything.
    pub async fn set_fail_on_reserve(&self, fail: bool) {
        self.state.lock().await.fail_on_reserve = fail;
    }

    /// Configures `restore` to fail without applying anything.
    pub async fn set_fail_on_restore(&self, fail: bool) {
        self.state.lock().await.fail_on_restore = fail;
    }

    /// Configures reservation streams to discard batches and never
    /// acknowledge them.
    pub async fn set_fail_on_ack(&self, fail: bool) {
        self.state.lock().await.fail_on_ack = fail;
    }

    /// Makes `ping` and `open_reservation_stream` fail.
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().await.unavailable = unavailable;
    }

    /// Makes the next `failures` pings fail.
    pub async fn set_ping_failures(&self, failures: u32) {
        self.state.lock().await.ping_failures = failures;
    }

    /// Delays every stream send by `latency`.
    pub async fn set_latency(&self, latency: Duration) {
        self.state.lock().await.latency = Some(latency);
    }

    /// Returns every call observed so far.
    pub async fn calls(&self) -> Vec<InventoryCall> {
        self.state.lock().await.calls.clone()
    }

    /// Returns the number of `reserve` calls.
    pub async fn reserve_count(&self) -> usize {
        self.count(|c| matches!(c, InventoryCall::Reserve(_))).await
    }

    /// Returns the number of `restore` calls.
    pub async fn restore_count(&self) -> usize {
        self.count(|c| matches!(c, InventoryCall::Restore(_))).await
    }

    /// Returns the number of non-empty batches sent on reservation streams.
    pub async fn stream_batch_count(&self) -> usize {
        self.count(|c| matches!(c, InventoryCall::StreamBatch { .. }))
            .await
    }

    async fn count(&self, predicate: impl Fn(&InventoryCall) -> bool) -> usize {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter(|c| predicate(c))
            .count()
    }
}

#[async_trait]
impl StockReservationClient for InMemoryStockService {
    async fn reserve(
        &self,
        items: &[StockReservationRequest],
    ) -> Result<ReservationAck, InventoryError> {
        let mut state = self.state.lock().await;
        state.calls.push(InventoryCall::Reserve(items.to_vec()));
        if state.fail_on_reserve {
            return Err(InventoryError::Unavailable("reserve failed".to_string()));
        }
        if let Some(item) = items.iter().find(|i| i.delta >= 0) {
            return Err(InventoryError::Rejected(format!(
                "reserve expects decrements, got {} for {}",
                item.delta, item.product_id
            )));
        }
        state.apply(items)
    }

    async fn restore(
        &self,
        items: &[StockReservationRequest],
    ) -> Result<ReservationAck, InventoryError> {
        let mut state = self.state.lock().await;
        state.calls.push(InventoryCall::Restore(items.to_vec()));
        if state.fail_on_restore {
            return Err(InventoryError::Unavailable("restore failed".to_string()));
        }
        if let Some(item) = items.iter().find(|i| i.delta <= 0) {
            return Err(InventoryError::Rejected(format!(
                "restore expects increments, got {} for {}",
                item.delta, item.product_id
            )));
        }
        state.apply(items)
    }

    async fn set_amount(&self, product_id: ProductId, amount: u64) -> Result<(), InventoryError> {
        self.state.lock().await.stock.insert(product_id, amount);
        Ok(())
    }

    async fn get_amount(&self, product_id: ProductId) -> Result<u64, InventoryError> {
        self.state
            .lock()
            .await
            .stock
            .get(&product_id)
            .copied()
            .ok_or(InventoryError::UnknownProduct(product_id))
    }

    async fn open_reservation_stream(
        &self,
    ) -> Result<Box<dyn ReservationStream>, InventoryError> {
        let mut state = self.state.lock().await;
        if state.unavailable {
            return Err(InventoryError::Unavailable(
                "cannot open reservation stream".to_string(),
            ));
        }
        state.next_session += 1;
        Ok(Box::new(InMemoryReservationStream {
            state: Arc::clone(&self.state),
            session: state.next_session,
            frozen: false,
            pending: None,
        }))
    }

    async fn ping(&self) -> Result<(), InventoryError> {
        let mut state = self.state.lock().await;
        if state.ping_failures > 0 {
            state.ping_failures -= 1;
            return Err(InventoryError::Unavailable("connection refused".to_string()));
        }
        if state.unavailable {
            return Err(InventoryError::Unavailable("connection refused".to_string()));
        }
        Ok(())
    }
}

struct InMemoryReservationStream {
    state: Arc<Mutex<StockState>>,
    session: u64,
    frozen: bool,
    pending: Option<Result<ReservationAck, InventoryError>>,
}

#[async_trait]
impl ReservationStream for InMemoryReservationStream {
    async fn send(&mut self, batch: Vec<StockReservationRequest>) -> Result<(), InventoryError> {
        let latency = self.state.lock().await.latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state.lock().await;
        if batch.is_empty() {
            state.calls.push(InventoryCall::StreamFreeze {
                session: self.session,
            });
            self.frozen = true;
            return Ok(());
        }

        if !self.frozen {
            return Err(InventoryError::Rejected(
                "batch sent before freeze handshake".to_string(),
            ));
        }

        state.calls.push(InventoryCall::StreamBatch {
            session: self.session,
            items: batch.clone(),
        });
        self.pending = Some(if state.fail_on_ack {
            Err(InventoryError::Unavailable(
                "reservation was not acknowledged".to_string(),
            ))
        } else {
            state.apply(&batch)
        });
        Ok(())
    }

    async fn recv(&mut self) -> Result<ReservationAck, InventoryError> {
        let outcome = self.pending.take().ok_or(InventoryError::StreamClosed)?;
        if outcome.is_ok() {
            self.state.lock().await.calls.push(InventoryCall::StreamAck {
                session: self.session,
            });
        }
        outcome
    }
}
