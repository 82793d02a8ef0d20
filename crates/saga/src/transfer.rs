//! Funds-transfer saga.
//!
//! ```text
//! debit_source ──► credit_destination
//!      ▲
//!      └── compensation: refund the source
//! ```
//!
//! `credit_destination` is the last step, so its compensation (debit the
//! destination back) only runs if steps are appended after it.

use std::sync::Arc;

use common::Context;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::coordinator::Saga;
use crate::error::StepError;
use crate::services::AccountService;
use crate::step::Step;

/// Saga name used in logs and metrics labels.
pub const SAGA_NAME: &str = "funds_transfer";

pub const STEP_DEBIT_SOURCE: &str = "debit_source";
pub const STEP_CREDIT_DESTINATION: &str = "credit_destination";

/// A request to move `amount` minor units from one account to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub transfer_id: Uuid,
    pub from: String,
    pub to: String,
    pub amount: u64,
}

impl TransferRequest {
    pub fn new(from: impl Into<String>, to: impl Into<String>, amount: u64) -> Self {
        Self {
            transfer_id: Uuid::new_v4(),
            from: from.into(),
            to: to.into(),
            amount,
        }
    }
}

/// Builds the two-step transfer saga for `request` against `service`.
pub fn build_transfer_saga<S>(service: Arc<S>, request: TransferRequest) -> Saga
where
    S: AccountService + ?Sized + 'static,
{
    let request = Arc::new(request);

    let debit_source = {
        let (service, request) = (service.clone(), request.clone());
        move |ctx: Context| {
            let (service, request) = (service.clone(), request.clone());
            async move {
                service.debit(&ctx, &request.from, request.amount).await?;
                Ok::<(), StepError>(())
            }
        }
    };
    let refund_source = {
        let (service, request) = (service.clone(), request.clone());
        move |ctx: Context| {
            let (service, request) = (service.clone(), request.clone());
            async move {
                service.refund(&ctx, &request.from, request.amount).await?;
                Ok::<(), StepError>(())
            }
        }
    };
    let credit_destination = {
        let (service, request) = (service.clone(), request.clone());
        move |ctx: Context| {
            let (service, request) = (service.clone(), request.clone());
            async move {
                service.credit(&ctx, &request.to, request.amount).await?;
                Ok::<(), StepError>(())
            }
        }
    };
    let debit_destination = move |ctx: Context| {
        let (service, request) = (service.clone(), request.clone());
        async move {
            service.debit(&ctx, &request.to, request.amount).await?;
            Ok::<(), StepError>(())
        }
    };

    Saga::new(SAGA_NAME)
        .add_step(Step::new(STEP_DEBIT_SOURCE, debit_source, refund_source))
        .add_step(Step::new(
            STEP_CREDIT_DESTINATION,
            credit_destination,
            debit_destination,
        ))
}
