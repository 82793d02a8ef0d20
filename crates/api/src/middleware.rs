//! Per-client rate limiting.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use common::Context;
use rate_limit::RateLimitDecision;

use crate::error::ApiError;
use crate::state::AppState;

/// Header identifying the calling client. Requests without it share one bucket.
pub const CLIENT_ID_HEADER: &str = "x-client-id";
pub const RATE_LIMIT_REMAINING_HEADER: &str = "x-ratelimit-remaining";

const ANONYMOUS_CLIENT: &str = "anonymous";

/// Takes one token from the caller's bucket or rejects with 429.
pub async fn rate_limit(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let client = request
        .headers()
        .get(CLIENT_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(ANONYMOUS_CLIENT)
        .to_string();

    let ctx = Context::background().with_timeout(state.request_timeout);
    let decision = state
        .limiter
        .allow_with_policy(&ctx, &client, state.failure_policy)
        .await?;

    match decision {
        RateLimitDecision::Allowed { remaining } => {
            let mut response = next.run(request).await;
            response
                .headers_mut()
                .insert(RATE_LIMIT_REMAINING_HEADER, HeaderValue::from(remaining));
            Ok(response)
        }
        RateLimitDecision::Denied { retry_after } => {
            tracing::debug!(%client, ?retry_after, "request rate limited");
            Err(ApiError::RateLimited { retry_after })
        }
    }
}
