//! Saga coordinator.

use std::time::Instant;

use common::Context;

use crate::error::{CompensationFailure, SagaError};
use crate::state::SagaState;
use crate::step::Step;

/// An ordered list of steps executed as one logical transaction.
///
/// Built with [`add_step`](Self::add_step) and consumed by
/// [`execute`](Self::execute), so a saga runs at most once.
#[derive(Debug)]
pub struct Saga {
    name: String,
    steps: Vec<Step>,
}

impl Saga {
    /// Creates an empty saga.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// Appends a step. Steps run in the order they are added.
    pub fn add_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Runs every step in order.
    ///
    /// Stops at the first failing action, or before the next step once `ctx`
    /// is cancelled or past its deadline, and compensates the completed
    /// steps in reverse order. Compensations run under a detached context.
    #[tracing::instrument(skip(self, ctx), fields(saga = %self.name, steps = self.steps.len()))]
    pub async fn execute(self, ctx: &Context) -> Result<(), SagaError> {
        metrics::counter!("saga_executions_total", "saga" => self.name.clone()).increment(1);
        let started = Instant::now();

        let mut state = SagaState::Pending;
        transition(&mut state, SagaState::Running);
        let mut executed: Vec<usize> = Vec::with_capacity(self.steps.len());

        for (index, step) in self.steps.iter().enumerate() {
            if let Err(reason) = ctx.check() {
                tracing::warn!(step = step.name(), index, %reason, "saga cancelled before step");
                transition(&mut state, SagaState::Compensating);
                let compensation_failures = self.compensate(&executed, ctx).await;
                let state = self.finish_compensation(&mut state, &compensation_failures, started);
                return Err(SagaError::Cancelled {
                    saga: self.name.clone(),
                    step: step.name().to_string(),
                    index,
                    reason,
                    compensation_failures,
                    state,
                });
            }

            tracing::debug!(step = step.name(), index, "saga step started");
            match step.run(ctx.child()).await {
                Ok(()) => {
                    tracing::debug!(step = step.name(), index, "saga step completed");
                    executed.push(index);
                }
                Err(source) => {
                    tracing::warn!(step = step.name(), index, error = %source, "saga step failed");
                    transition(&mut state, SagaState::Compensating);
                    let compensation_failures = self.compensate(&executed, ctx).await;
                    let state =
                        self.finish_compensation(&mut state, &compensation_failures, started);
                    return Err(SagaError::StepFailed {
                        saga: self.name.clone(),
                        step: step.name().to_string(),
                        index,
                        source,
                        compensation_failures,
                        state,
                    });
                }
            }
        }

        transition(&mut state, SagaState::Committed);
        let duration = started.elapsed().as_secs_f64();
        metrics::histogram!("saga_duration_seconds", "saga" => self.name.clone()).record(duration);
        metrics::counter!("saga_committed_total", "saga" => self.name.clone()).increment(1);
        tracing::info!(duration, "saga committed");
        Ok(())
    }

    /// Runs the compensations of `executed` steps in reverse order.
    async fn compensate(&self, executed: &[usize], ctx: &Context) -> Vec<CompensationFailure> {
        let ctx = ctx.detach();
        let mut failures = Vec::new();

        for &index in executed.iter().rev() {
            let step = &self.steps[index];
            match step.compensate(ctx.clone()).await {
                Ok(()) => {
                    tracing::info!(step = step.name(), index, "step compensated");
                }
                Err(source) => {
                    tracing::error!(
                        step = step.name(),
                        index,
                        error = %source,
                        "compensation failed"
                    );
                    metrics::counter!(
                        "saga_compensation_failures_total",
                        "saga" => self.name.clone()
                    )
                    .increment(1);
                    failures.push(CompensationFailure {
                        step: step.name().to_string(),
                        index,
                        source,
                    });
                }
            }
        }

        failures
    }

    fn finish_compensation(
        &self,
        state: &mut SagaState,
        failures: &[CompensationFailure],
        started: Instant,
    ) -> SagaState {
        let duration = started.elapsed().as_secs_f64();
        metrics::histogram!("saga_duration_seconds", "saga" => self.name.clone()).record(duration);

        if failures.is_empty() {
            transition(state, SagaState::Compensated);
            metrics::counter!("saga_compensated_total", "saga" => self.name.clone()).increment(1);
            tracing::warn!(duration, "saga rolled back");
        } else {
            transition(state, SagaState::CompensationFailed);
            tracing::error!(
                duration,
                failures = failures.len(),
                "saga rollback incomplete, manual intervention required"
            );
        }
        *state
    }
}

fn transition(state: &mut SagaState, next: SagaState) {
    debug_assert!(
        state.can_transition_to(next),
        "illegal saga transition {state} -> {next}"
    );
    tracing::trace!(from = %state, to = %next, "saga state transition");
    *state = next;
}
