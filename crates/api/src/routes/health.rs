//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use circuit_breaker::{BreakerSnapshot, BreakerState};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub breakers: Vec<BreakerSnapshot>,
}

/// GET /health: reports `degraded` while a breaker is not closed.
pub async fn check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let snapshot = state.breaker.snapshot();
    let status = if snapshot.state == BreakerState::Closed {
        "ok"
    } else {
        "degraded"
    };
    Json(HealthResponse {
        status,
        breakers: vec![snapshot],
    })
}
