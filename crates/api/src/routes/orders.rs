//! Order CRUD endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::OrderStatus;
use domain::{DomainError, OrderAggregate, OrderCreateRequest, OrderUpdateRequest, ProductDetail};
use order_store::OrderFilter;
use serde::Deserialize;

use super::create::OrderEnvelope;
use super::{AppState, InventoryBackend, OrderBackend, parse_order_id};
use crate::error::ApiError;

/// Query string of `GET /api/orders`.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub status: Option<String>,
}

impl ListParams {
    pub fn into_filter(self) -> Result<OrderFilter, DomainError> {
        let mut filter = OrderFilter::default();
        if let Some(limit) = self.limit {
            filter = filter.limit(limit);
        }
        if let Some(offset) = self.offset {
            filter = filter.offset(offset);
        }
        if let Some(status) = self.status.filter(|s| !s.is_empty()) {
            filter = filter.status(status.parse::<OrderStatus>()?);
        }
        Ok(filter)
    }
}

/// POST /api/orders: create an order locally, without reserving stock.
#[tracing::instrument(skip(state, payload))]
pub async fn create<R: OrderBackend, I: InventoryBackend>(
    State(state): State<Arc<AppState<R, I>>>,
    payload: Result<Json<OrderCreateRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<OrderEnvelope>), ApiError> {
    let Json(request) = payload?;
    let order = state.service.create_order(request).await?;
    Ok((StatusCode::CREATED, Json(OrderEnvelope { order })))
}

/// GET /api/orders: newest first, optionally filtered by status.
#[tracing::instrument(skip(state, params))]
pub async fn list<R: OrderBackend, I: InventoryBackend>(
    State(state): State<Arc<AppState<R, I>>>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<Vec<OrderAggregate>>, ApiError> {
    let Query(params) = params?;
    let filter = params.into_filter()?;
    Ok(Json(state.service.list_orders(filter).await?))
}

/// GET /api/orders/{id}
#[tracing::instrument(skip(state))]
pub async fn get<R: OrderBackend, I: InventoryBackend>(
    State(state): State<Arc<AppState<R, I>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderAggregate>, ApiError> {
    let id = parse_order_id(&id)?;
    Ok(Json(state.service.get_order(id).await?))
}

/// PATCH /api/orders/{id}: change the comment or move the status forward.
#[tracing::instrument(skip(state, payload))]
pub async fn update<R: OrderBackend, I: InventoryBackend>(
    State(state): State<Arc<AppState<R, I>>>,
    Path(id): Path<String>,
    payload: Result<Json<OrderUpdateRequest>, JsonRejection>,
) -> Result<Json<OrderAggregate>, ApiError> {
    let id = parse_order_id(&id)?;
    let Json(request) = payload?;
    Ok(Json(state.service.update_order(id, request).await?))
}

/// DELETE /api/orders/{id}
#[tracing::instrument(skip(state))]
pub async fn delete<R: OrderBackend, I: InventoryBackend>(
    State(state): State<Arc<AppState<R, I>>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_order_id(&id)?;
    state.service.delete_order(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/orders/{id}/products
#[tracing::instrument(skip(state))]
pub async fn products<R: OrderBackend, I: InventoryBackend>(
    State(state): State<Arc<AppState<R, I>>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<ProductDetail>>, ApiError> {
    let id = parse_order_id(&id)?;
    Ok(Json(state.service.get_order_products(id).await?))
}
