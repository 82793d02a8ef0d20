//! API error types with HTTP response mapping.

use std::time::Duration;

use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use idempotency::IdempotencyError;
use rate_limit::RateLimitError;
use saga::{AccountError, SagaError};

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request from the client.
    BadRequest(String),
    /// The client's rate limit bucket is empty.
    RateLimited { retry_after: Duration },
    /// Rate limiter failure other than a denial.
    RateLimit(RateLimitError),
    /// Idempotency guard outcome that is not a success.
    Idempotency(IdempotencyError<SagaError>),
    /// Account service error outside a saga.
    Account(AccountError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, retry_after) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, None),
            ApiError::RateLimited { retry_after } => (
                StatusCode::TOO_MANY_REQUESTS,
                "Rate limit exceeded".to_string(),
                Some(retry_after),
            ),
            ApiError::RateLimit(err) => rate_limit_error_to_response(err),
            ApiError::Idempotency(err) => idempotency_error_to_response(err),
            ApiError::Account(err) => {
                let (status, message) = account_error_to_response(&err);
                (status, message, None)
            }
        };

        let body = serde_json::json!({ "error": message });
        let mut response = (status, axum::Json(body)).into_response();
        if let Some(retry_after) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, retry_after_header(retry_after));
        }
        response
    }
}

/// Whole seconds, rounded up so clients never retry early.
fn retry_after_header(retry_after: Duration) -> HeaderValue {
    let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
    HeaderValue::from(secs.max(1))
}

fn rate_limit_error_to_response(err: RateLimitError) -> (StatusCode, String, Option<Duration>) {
    match &err {
        RateLimitError::Store(_) => (StatusCode::SERVICE_UNAVAILABLE, err.to_string(), None),
        RateLimitError::Cancelled(_) => (StatusCode::GATEWAY_TIMEOUT, err.to_string(), None),
        RateLimitError::InvalidConfig(_) => {
            tracing::error!(error = %err, "rate limiter misconfigured");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string(), None)
        }
    }
}

fn idempotency_error_to_response(
    err: IdempotencyError<SagaError>,
) -> (StatusCode, String, Option<Duration>) {
    let retry_after = err.is_retryable().then_some(Duration::from_secs(1));
    let (status, message) = match err {
        IdempotencyError::InvalidKey => (StatusCode::BAD_REQUEST, err.to_string()),
        IdempotencyError::InProgress { .. } => (StatusCode::CONFLICT, err.to_string()),
        IdempotencyError::Operation(saga_err) => saga_error_to_response(&saga_err),
        IdempotencyError::CompletionNotRecorded { .. } => {
            tracing::error!(
                error = %err,
                "transfer completed but its idempotency record was not written"
            );
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
        IdempotencyError::Store(_) => (StatusCode::SERVICE_UNAVAILABLE, err.to_string()),
        IdempotencyError::Cancelled(_) => (StatusCode::GATEWAY_TIMEOUT, err.to_string()),
    };
    (status, message, retry_after)
}

fn saga_error_to_response(err: &SagaError) -> (StatusCode, String) {
    if !err.compensation_failures().is_empty() {
        let failed_steps: Vec<&str> = err
            .compensation_failures()
            .iter()
            .map(|failure| failure.step.as_str())
            .collect();
        tracing::error!(
            error = %err,
            ?failed_steps,
            "transfer rollback incomplete, manual intervention required"
        );
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Transfer failed and could not be fully rolled back".to_string(),
        );
    }

    match err {
        SagaError::Cancelled { .. } => (StatusCode::GATEWAY_TIMEOUT, err.to_string()),
        SagaError::StepFailed { .. } => {
            match err
                .step_error()
                .and_then(|source| source.downcast_ref::<AccountError>())
            {
                Some(account_err) => account_error_to_response(account_err),
                None => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
            }
        }
    }
}

fn account_error_to_response(err: &AccountError) -> (StatusCode, String) {
    let status = match err {
        AccountError::NotFound(_) => StatusCode::NOT_FOUND,
        AccountError::InsufficientFunds { .. } | AccountError::InvalidAmount => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        AccountError::Unavailable(_) => StatusCode::BAD_GATEWAY,
        AccountError::CircuitOpen { .. } => StatusCode::SERVICE_UNAVAILABLE,
        AccountError::Cancelled(_) => StatusCode::GATEWAY_TIMEOUT,
    };
    (status, err.to_string())
}

impl From<RateLimitError> for ApiError {
    fn from(err: RateLimitError) -> Self {
        ApiError::RateLimit(err)
    }
}

impl From<IdempotencyError<SagaError>> for ApiError {
    fn from(err: IdempotencyError<SagaError>) -> Self {
        ApiError::Idempotency(err)
    }
}

impl From<AccountError> for ApiError {
    fn from(err: AccountError) -> Self {
        ApiError::Account(err)
    }
}
