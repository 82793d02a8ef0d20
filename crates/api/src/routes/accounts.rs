//! Account balance lookup.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::Context;
use serde::Serialize;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Serialize)]
pub struct BalanceResponse {
    pub account: String,
    pub balance: u64,
}

/// GET /accounts/{id}: current balance in minor units.
#[tracing::instrument(skip(state))]
pub async fn balance(
    State(state): State<Arc<AppState>>,
    Path(account): Path<String>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let ctx = Context::background().with_timeout(state.request_timeout);
    let balance = state.accounts.balance(&ctx, &account).await?;
    Ok(Json(BalanceResponse { account, balance }))
}
