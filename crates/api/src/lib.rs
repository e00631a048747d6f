//! HTTP API server with observability for the order service.
//!
//! Provides REST endpoints for order and catalog management and for the two
//! cross-service creation strategies, with structured logging (tracing) and
//! Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::{get, post};
use coordinator::{InMemoryStockService, OrderService};
use metrics_exporter_prometheus::PrometheusHandle;
use order_store::InMemoryOrderStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use routes::{AppState, InventoryBackend, OrderBackend};

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<R: OrderBackend, I: InventoryBackend>(
    state: Arc<AppState<R, I>>,
    metrics_handle: PrometheusHandle,
    request_timeout: Duration,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<R, I>))
        .route("/api/SAGA/order/create", post(routes::create::saga::<R, I>))
        .route("/api/TCC/order/create", post(routes::create::tcc::<R, I>))
        .route(
            "/api/orders",
            post(routes::orders::create::<R, I>).get(routes::orders::list::<R, I>),
        )
        .route(
            "/api/orders/{id}",
            get(routes::orders::get::<R, I>)
                .patch(routes::orders::update::<R, I>)
                .delete(routes::orders::delete::<R, I>),
        )
        .route(
            "/api/orders/{id}/products",
            get(routes::orders::products::<R, I>),
        )
        .route(
            "/api/products",
            post(routes::products::create::<R, I>).get(routes::products::list::<R, I>),
        )
        .route(
            "/api/products/{id}",
            get(routes::products::get::<R, I>).delete(routes::products::delete::<R, I>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates state backed by the in-memory order store and stock service.
pub fn create_default_state() -> Arc<AppState<InMemoryOrderStore, InMemoryStockService>> {
    Arc::new(AppState::new(OrderService::new(
        Arc::new(InMemoryOrderStore::new()),
        Arc::new(InMemoryStockService::new()),
    )))
}
