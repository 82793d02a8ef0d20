//! API server entry point.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use api::config::{Config, LogFormat};
use api::state::{AppState, SharedStore};
use common::Context;
use coordination_store::{InMemoryCoordinationStore, PostgresCoordinationStore};
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
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
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Periodically deletes expired coordination state until `ctx` is cancelled.
async fn purge_expired_loop<F, Fut>(purge: F, ctx: Context)
where
    F: Fn() -> Fut,
    Fut: Future<Output = coordination_store::Result<u64>>,
{
    let mut interval = tokio::time::interval(PURGE_INTERVAL);
    loop {
        tokio::select! {
            _ = ctx.done() => break,
            _ = interval.tick() => {
                match purge().await {
                    Ok(purged) if purged > 0 => tracing::debug!(purged, "purged expired coordination rows"),
                    Ok(_) => {}
                    Err(err) => tracing::warn!(error = %err, "failed to purge expired coordination rows"),
                }
            }
        }
    }
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let prometheus_builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    let metrics_handle = prometheus_builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Coordination store
    let root = Context::background();
    let store: SharedStore = match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await
                .expect("failed to connect to Postgres");
            let store = PostgresCoordinationStore::new(pool);
            store
                .run_migrations()
                .await
                .expect("failed to run migrations");
            let purger = store.clone();
            tokio::spawn(purge_expired_loop(
                move || {
                    let store = purger.clone();
                    async move { store.purge_expired().await }
                },
                root.child(),
            ));
            tracing::info!("using Postgres coordination store");
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory coordination store");
            let store = InMemoryCoordinationStore::new();
            let purger = store.clone();
            tokio::spawn(purge_expired_loop(
                move || {
                    let store = purger.clone();
                    async move { store.purge_expired().await }
                },
                root.child(),
            ));
            Arc::new(store)
        }
    };

    // 4. Application state
    tracing::info!(
        failure_policy = %config.rate_limit_failure_policy,
        capacity = config.rate_limit_capacity,
        refill_per_sec = config.rate_limit_refill_per_sec,
        "rate limiter configured"
    );
    let state = AppState::new(&config, store, api::demo_accounts())
        .expect("invalid component configuration");
    let app = api::create_app(Arc::new(state), metrics_handle);

    // 5. Start server
    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    root.cancel();
    tracing::info!("server shut down gracefully");
}
