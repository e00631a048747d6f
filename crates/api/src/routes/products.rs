//! Product catalog endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use domain::ProductCreateRequest;
use order_store::ProductRow;

use super::{AppState, InventoryBackend, OrderBackend, parse_product_id};
use crate::error::ApiError;

/// POST /api/products: add a product, optionally seeding its stock.
#[tracing::instrument(skip(state, payload))]
pub async fn create<R: OrderBackend, I: InventoryBackend>(
    State(state): State<Arc<AppState<R, I>>>,
    payload: Result<Json<ProductCreateRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ProductRow>), ApiError> {
    let Json(request) = payload?;
    let product = state.service.create_product(request).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

/// GET /api/products: the catalog ordered by name.
pub async fn list<R: OrderBackend, I: InventoryBackend>(
    State(state): State<Arc<AppState<R, I>>>,
) -> Result<Json<Vec<ProductRow>>, ApiError> {
    Ok(Json(state.service.list_products().await?))
}

/// GET /api/products/{id}
pub async fn get<R: OrderBackend, I: InventoryBackend>(
    State(state): State<Arc<AppState<R, I>>>,
    Path(id): Path<String>,
) -> Result<Json<ProductRow>, ApiError> {
    let id = parse_product_id(&id)?;
    Ok(Json(state.service.get_product(id).await?))
}

/// DELETE /api/products/{id}: refused while any order references it.
#[tracing::instrument(skip(state))]
pub async fn delete<R: OrderBackend, I: InventoryBackend>(
    State(state): State<Arc<AppState<R, I>>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_product_id(&id)?;
    state.service.delete_product(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
