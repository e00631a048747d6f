//! API server entry point.

use std::sync::Arc;

use api::config::{Config, LogFormat};
use api::routes::{AppState, InventoryBackend, OrderBackend};
use coordinator::{
    InMemoryStockService, InventoryError, OrderService, StockReservationClient,
    with_constant_backoff,
};
use metrics_exporter_prometheus::{BuildError, PrometheusHandle};
use order_store::{InMemoryOrderStore, PostgresOrderStore, StoreError};
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Debug, Error)]
enum StartupError {
    #[error("failed to install Prometheus recorder: {0}")]
    Metrics(#[from] BuildError),

    #[error("database connection failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migrations failed: {0}")]
    Store(#[from] StoreError),

    #[error("inventory service unreachable: {0}")]
    Inventory(#[from] InventoryError),

    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install SIGINT handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let json = config.log_format == LogFormat::Json;

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .init();
}

async fn connect_inventory(config: &Config) -> Result<Arc<InMemoryStockService>, StartupError> {
    let inventory = Arc::new(InMemoryStockService::new());
    with_constant_backoff(config.connect_policy(), "inventory", |_| inventory.ping()).await?;
    Ok(inventory)
}

async fn serve<R: OrderBackend, I: InventoryBackend>(
    state: Arc<AppState<R, I>>,
    metrics_handle: PrometheusHandle,
    config: &Config,
) -> Result<(), StartupError> {
    let app = api::create_app(state, metrics_handle, config.request_timeout);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server shut down gracefully");
    Ok(())
}

async fn run(config: Config) -> Result<(), StartupError> {
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;
    let inventory = connect_inventory(&config).await?;

    match config.database_url.as_deref() {
        Some(url) => {
            let pool = with_constant_backoff(config.connect_policy(), "postgres", |_| {
                PgPoolOptions::new()
                    .max_connections(config.database_max_connections)
                    .connect(url)
            })
            .await?;
            let store = PostgresOrderStore::new(pool);
            store.run_migrations().await?;
            tracing::info!("connected to PostgreSQL, migrations applied");

            let state = Arc::new(AppState::new(OrderService::new(Arc::new(store), inventory)));
            serve(state, metrics_handle, &config).await
        }
        None => {
            tracing::warn!("DATABASE_URL not set, orders are kept in memory");
            let store = Arc::new(InMemoryOrderStore::new());
            let state = Arc::new(AppState::new(OrderService::new(store, inventory)));
            serve(state, metrics_handle, &config).await
        }
    }
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();
    init_tracing(&config);

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, "order service failed");
        std::process::exit(1);
    }
}
