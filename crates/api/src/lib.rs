//! HTTP API for the resilience toolkit.
//!
//! `POST /transfers` runs a funds-transfer saga through every component:
//! the per-client rate limiter gates the request, the idempotency guard
//! suppresses duplicate submissions, and the saga's account calls go
//! through a circuit breaker. Structured logging (tracing) and Prometheus
//! metrics are provided for all routes.

pub mod accounts;
pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::InMemoryAccountService;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::metrics::MetricsState;
use state::AppState;

/// Creates the Axum application router with all routes and shared state.
///
/// Only business routes are rate limited; `/health` and `/metrics` are not.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(MetricsState {
            handle: metrics_handle,
            app: state.clone(),
        });

    let limited = Router::new()
        .route("/transfers", post(routes::transfers::create))
        .route("/accounts/{id}", get(routes::accounts::balance))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::rate_limit,
        ));

    Router::new()
        .route("/health", get(routes::health::check))
        .merge(limited)
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates an in-memory account service seeded with demo accounts.
pub fn demo_accounts() -> InMemoryAccountService {
    let accounts = InMemoryAccountService::new();
    for name in ["alice", "bob", "carol"] {
        accounts.open_account(name, 100_000);
    }
    accounts
}
