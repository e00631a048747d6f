//! Cross-service order creation endpoints, one per strategy.

use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use domain::{OrderAggregate, OrderCreateRequest};
use serde::{Deserialize, Serialize};

use super::{AppState, InventoryBackend, OrderBackend};
use crate::error::ApiError;

/// Body returned by every create endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct OrderEnvelope {
    pub order: OrderAggregate,
}

fn record(strategy: &'static str, started: Instant, ok: bool) {
    let outcome = if ok { "ok" } else { "error" };
    metrics::counter!("http_order_create_requests_total", "strategy" => strategy, "outcome" => outcome)
        .increment(1);
    metrics::histogram!("http_order_create_duration_seconds", "strategy" => strategy)
        .record(started.elapsed().as_secs_f64());
}

/// POST /api/SAGA/order/create: reserve stock, then write the order.
#[tracing::instrument(skip(state, payload))]
pub async fn saga<R: OrderBackend, I: InventoryBackend>(
    State(state): State<Arc<AppState<R, I>>>,
    payload: Result<Json<OrderCreateRequest>, JsonRejection>,
) -> Result<Json<OrderEnvelope>, ApiError> {
    let Json(request) = payload?;
    let started = Instant::now();

    let result = state.service.create_saga_order(request).await;
    record("saga", started, result.is_ok());

    Ok(Json(OrderEnvelope { order: result? }))
}

/// POST /api/TCC/order/create: run the TCC exchange over an in-process
/// stream.
#[tracing::instrument(skip(state, payload))]
pub async fn tcc<R: OrderBackend, I: InventoryBackend>(
    State(state): State<Arc<AppState<R, I>>>,
    payload: Result<Json<OrderCreateRequest>, JsonRejection>,
) -> Result<Json<OrderEnvelope>, ApiError> {
    let Json(request) = payload?;
    let started = Instant::now();

    let result = state.service.tcc_create_order(request).await;
    record("tcc", started, result.is_ok());

    Ok(Json(OrderEnvelope { order: result? }))
}
