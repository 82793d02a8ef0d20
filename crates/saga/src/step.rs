//! Saga steps.

use std::fmt;
use std::future::Future;

use common::Context;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;

use crate::error::StepError;

type StepFn = Box<dyn Fn(Context) -> BoxFuture<'static, Result<(), StepError>> + Send + Sync>;

/// One unit of work in a [`Saga`](crate::Saga) and its compensating action.
///
/// The compensation runs only if the action completed successfully, and at
/// most once. It receives a context detached from the caller's, so it still
/// runs when the caller has been cancelled.
pub struct Step {
    name: String,
    action: StepFn,
    compensation: StepFn,
}

impl Step {
    pub fn new<A, AF, C, CF>(name: impl Into<String>, action: A, compensation: C) -> Self
    where
        A: Fn(Context) -> AF + Send + Sync + 'static,
        AF: Future<Output = Result<(), StepError>> + Send + 'static,
        C: Fn(Context) -> CF + Send + Sync + 'static,
        CF: Future<Output = Result<(), StepError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            action: Box::new(move |ctx| action(ctx).boxed()),
            compensation: Box::new(move |ctx| compensation(ctx).boxed()),
        }
    }

    /// Creates a step with nothing to undo, such as a read or a final notification.
    pub fn irreversible<A, AF>(name: impl Into<String>, action: A) -> Self
    where
        A: Fn(Context) -> AF + Send + Sync + 'static,
        AF: Future<Output = Result<(), StepError>> + Send + 'static,
    {
        Self::new(name, action, |_| async { Ok(()) })
    }

    /// Diagnostic name. Not required to be unique within a saga.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) async fn run(&self, ctx: Context) -> Result<(), StepError> {
        (self.action)(ctx).await
    }

    pub(crate) async fn compensate(&self, ctx: Context) -> Result<(), StepError> {
        (self.compensation)(ctx).await
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step").field("name", &self.name).finish_non_exhaustive()
    }
}
