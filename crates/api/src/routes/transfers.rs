//! Funds transfer endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use chrono::{DateTime, Utc};
use common::Context;
use idempotency::IdempotencyOutcome;
use saga::{TransferRequest, build_transfer_saga};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// Header carrying the client's idempotency key.
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct CreateTransferRequest {
    pub from: String,
    pub to: String,
    /// Minor units (cents).
    pub amount: u64,
}

impl CreateTransferRequest {
    fn validate(&self) -> Result<(), ApiError> {
        if self.from.trim().is_empty() || self.to.trim().is_empty() {
            return Err(ApiError::BadRequest(
                "Both 'from' and 'to' accounts are required".to_string(),
            ));
        }
        if self.from == self.to {
            return Err(ApiError::BadRequest(
                "Cannot transfer to the same account".to_string(),
            ));
        }
        if self.amount == 0 {
            return Err(ApiError::BadRequest(
                "Amount must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

// -- Response types --

#[derive(Debug, Serialize)]
pub struct TransferResponse {
    pub idempotency_key: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfer_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

// -- Handlers --

/// POST /transfers: moves funds between accounts at most once per idempotency key.
///
/// Returns 201 when the transfer ran, 200 when the key already completed and
/// 409 while another request with the same key is running.
#[tracing::instrument(skip(state, headers, req), fields(idempotency_key = tracing::field::Empty))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateTransferRequest>,
) -> Result<(StatusCode, Json<TransferResponse>), ApiError> {
    let key = headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Idempotency-Key header is required".to_string()))?
        .to_string();
    tracing::Span::current().record("idempotency_key", key.as_str());
    req.validate()?;

    let ctx = Context::background().with_timeout(state.request_timeout);
    let transfer = TransferRequest::new(req.from, req.to, req.amount);
    let transfer_id = transfer.transfer_id;
    let accounts = state.accounts.clone();

    let outcome = state
        .idempotency
        .execute(&ctx, &key, |op_ctx| async move {
            build_transfer_saga(accounts, transfer)
                .execute(&op_ctx)
                .await
        })
        .await?;

    let response = match outcome {
        IdempotencyOutcome::Executed(()) => {
            metrics::counter!("transfers_total", "outcome" => "completed").increment(1);
            tracing::info!(%transfer_id, "transfer completed");
            (
                StatusCode::CREATED,
                Json(TransferResponse {
                    idempotency_key: key,
                    status: "completed",
                    transfer_id: Some(transfer_id),
                    completed_at: None,
                }),
            )
        }
        IdempotencyOutcome::AlreadyCompleted { completed_at } => {
            metrics::counter!("transfers_total", "outcome" => "duplicate").increment(1);
            (
                StatusCode::OK,
                Json(TransferResponse {
                    idempotency_key: key,
                    status: "already_completed",
                    transfer_id: None,
                    completed_at: Some(completed_at),
                }),
            )
        }
    };
    Ok(response)
}
