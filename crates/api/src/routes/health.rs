//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Serialize;

use super::{AppState, InventoryBackend, OrderBackend};

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inventory: Option<String>,
}

/// GET /health: `ok` while the inventory service answers pings.
pub async fn check<R: OrderBackend, I: InventoryBackend>(
    State(state): State<Arc<AppState<R, I>>>,
) -> (StatusCode, Json<HealthResponse>) {
    match state.service.inventory().ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok",
                inventory: None,
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "inventory health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "degraded",
                    inventory: Some(e.to_string()),
                }),
            )
        }
    }
}
