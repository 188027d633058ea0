//! Sequential, resumable step execution.

use crate::core::{Component, Operation, OperationOutcome, OperationState};
use crate::manager::OperationManager;
use crate::observability::{step_span, SpanTimer};
use crate::steps::Step;
use std::sync::Arc;
use tracing::{debug, info, warn, Instrument};

/// An ordered list of steps for one operation type.
///
/// Every invocation resumes after the last step recorded in
/// `finished_stages`, so the pipeline can be run again after any
/// interruption or redelivery.
#[derive(Debug, Clone)]
pub struct StepPipeline {
    name: String,
    steps: Vec<Arc<dyn Step>>,
    manager: OperationManager,
}

impl StepPipeline {
    pub(super) fn new(name: String, steps: Vec<Arc<dyn Step>>, manager: OperationManager) -> Self {
        Self { name, steps, manager }
    }

    /// The pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Step names in execution order.
    #[must_use]
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Runs the unfinished steps of `operation`.
    ///
    /// Returns as soon as a step asks for a delay, fails, or finishes the
    /// operation; marks the operation succeeded after the last step.
    /// Terminal operations are returned untouched.
    pub async fn execute(&self, operation: Operation) -> OperationOutcome {
        if operation.is_finished() {
            debug!(operation_id = %operation.id, state = %operation.state, "operation already finished");
            return OperationOutcome::done(operation);
        }

        let mut operation = operation;
        if operation.state == OperationState::Pending {
            let outcome = self
                .manager
                .update_operation(operation, |op| {
                    op.state = OperationState::InProgress;
                    op.description = "Operation in progress".to_string();
                })
                .await;
            if outcome.needs_retry() || outcome.operation.is_finished() {
                return outcome;
            }
            operation = outcome.operation;
        }

        for step in &self.steps {
            let name = step.name();
            if operation.is_stage_finished(name) {
                debug!(operation_id = %operation.id, step = %name, "skipping finished step");
                continue;
            }

            let span = step_span(&operation, name);
            let timer = SpanTimer::start(name);
            let (op, delay, error) = step.run(operation).instrument(span).await.into_parts();
            operation = op;

            if !delay.is_zero() {
                let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                match &error {
                    Some(err) => {
                        warn!(operation_id = %operation.id, step = %name, error = %err, delay_ms, "step will be retried");
                    }
                    None => debug!(operation_id = %operation.id, step = %name, delay_ms, "step will be retried"),
                }
                return OperationOutcome::retry_after(operation, delay);
            }

            if let Some(err) = error {
                if operation.is_finished() {
                    return OperationOutcome::failed(operation, err);
                }
                warn!(operation_id = %operation.id, step = %name, error = %err, "step failed");
                let cause = anyhow::Error::msg(err.to_string());
                return self
                    .manager
                    .for_step(name, Component::Engine)
                    .operation_failed(operation, &format!("step {name} failed"), Some(cause))
                    .await;
            }

            if operation.is_finished() {
                info!(operation_id = %operation.id, step = %name, state = %operation.state, "step finished the operation");
                return OperationOutcome::done(operation);
            }

            let outcome = self
                .manager
                .update_operation(operation, |op| {
                    op.add_finished_stage(name);
                })
                .await;
            if outcome.needs_retry() || outcome.operation.is_finished() {
                return outcome;
            }
            operation = outcome.operation;
            info!(operation_id = %operation.id, step = %name, elapsed_ms = timer.elapsed_ms(), "step finished");
        }

        self.manager.operation_succeeded(operation, "Operation succeeded").await
    }
}
