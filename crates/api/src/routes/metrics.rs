//! Prometheus metrics endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use circuit_breaker::BreakerState;
use metrics_exporter_prometheus::PrometheusHandle;

use crate::state::AppState;

/// State for the metrics route.
#[derive(Clone)]
pub struct MetricsState {
    pub handle: PrometheusHandle,
    pub app: Arc<AppState>,
}

/// Gauge value per breaker state: 0 closed, 1 half-open, 2 open.
fn breaker_state_value(state: BreakerState) -> f64 {
    match state {
        BreakerState::Closed => 0.0,
        BreakerState::HalfOpen => 1.0,
        BreakerState::Open => 2.0,
    }
}

/// GET /metrics: returns Prometheus-formatted metrics.
pub async fn get(State(state): State<MetricsState>) -> impl IntoResponse {
    let breaker = &state.app.breaker;
    metrics::gauge!("circuit_breaker_state", "breaker" => breaker.name().to_string())
        .set(breaker_state_value(breaker.state()));

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        state.handle.render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_breaker_state_gauge_values() {
        assert_eq!(breaker_state_value(BreakerState::Closed), 0.0);
        assert_eq!(breaker_state_value(BreakerState::HalfOpen), 1.0);
        assert_eq!(breaker_state_value(BreakerState::Open), 2.0);
    }
}
