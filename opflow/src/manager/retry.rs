//! Time-bounded retries measured from the operation's last persisted write.

use super::OperationManager;
use crate::core::{Operation, OperationEvent, OperationOutcome, OperationState};
use crate::errors::OpflowError;
use crate::events::ManagerEventKind;
use crate::utils::elapsed_since;
use std::time::Duration;
use tracing::{error, info, warn};

impl OperationManager {
    /// Retries while less than `max_time` passed since `updated_at`, then fails.
    ///
    /// Under budget the operation is returned untouched with `retry_interval`.
    /// Once the budget is spent the operation is failed with `message` and a
    /// [`OpflowError::RetriesExhausted`] is returned.
    pub async fn retry_operation(
        &self,
        operation: Operation,
        message: &str,
        err: Option<anyhow::Error>,
        retry_interval: Duration,
        max_time: Duration,
    ) -> OperationOutcome {
        let elapsed = elapsed_since(operation.updated_at);
        info!(
            operation_id = %operation.id,
            step = %self.step,
            retry_interval_ms = u64::try_from(retry_interval.as_millis()).unwrap_or(u64::MAX),
            max_time_ms = u64::try_from(max_time.as_millis()).unwrap_or(u64::MAX),
            error = ?err,
            "retrying step"
        );
        if elapsed < max_time {
            return OperationOutcome::retry_after(operation, retry_interval);
        }

        error!(operation_id = %operation.id, step = %self.step, "aborting after {max_time:?} of failing retries");
        let outcome = self.operation_failed(operation, message, err).await;
        if outcome.needs_retry() {
            return outcome;
        }
        match outcome.into_parts() {
            (operation, _, Some(source)) => OperationOutcome::failed(
                operation,
                OpflowError::RetriesExhausted {
                    max_time,
                    source: Box::new(source),
                },
            ),
            (operation, _, None) => OperationOutcome::done(operation),
        }
    }

    /// Tolerates exactly one retry after `wait` before failing.
    pub async fn retry_operation_once(
        &self,
        operation: Operation,
        message: &str,
        err: Option<anyhow::Error>,
        wait: Duration,
    ) -> OperationOutcome {
        self.retry_operation(operation, message, err, wait, wait + Duration::from_nanos(1))
            .await
    }

    /// Retries like [`retry_operation`](Self::retry_operation) but never fails.
    ///
    /// Under budget only the in-memory description changes: persisting it
    /// would refresh `updated_at` and restart the budget. Once the budget is
    /// spent `step_name` is recorded as executed but not completed and the
    /// pipeline proceeds as if the step had succeeded.
    pub async fn retry_operation_without_fail(
        &self,
        mut operation: Operation,
        step_name: &str,
        description: &str,
        retry_interval: Duration,
        max_time: Duration,
        err: Option<anyhow::Error>,
    ) -> OperationOutcome {
        let elapsed = elapsed_since(operation.updated_at);
        if elapsed < max_time {
            info!(operation_id = %operation.id, step = %step_name, error = ?err, "retrying step without fail");
            operation.description = description.to_string();
            return OperationOutcome::retry_after(operation, retry_interval);
        }

        let cause = err.as_ref().map(|e| format!("{e:#}"));
        let annotation = format!("step {step_name} gave up after {max_time:?}: {description}");
        let event = match &cause {
            Some(cause) => OperationEvent::error(annotation, cause.clone()),
            None => OperationEvent::info(annotation),
        };
        let outcome = self
            .update_operation(operation, |op| {
                op.state = OperationState::InProgress;
                op.description = description.to_string();
                op.add_executed_but_not_completed(step_name);
                op.record_event(event.clone());
            })
            .await;
        if outcome.needs_retry() {
            return outcome;
        }
        if outcome.operation.is_finished() {
            return Self::finished_elsewhere(outcome.operation);
        }

        warn!(
            operation_id = %outcome.operation.id,
            step = %step_name,
            error = ?cause,
            "retry budget of {max_time:?} exhausted, continuing without step"
        );
        self.emit(ManagerEventKind::StepNotCompleted, &outcome.operation, description).await;
        OperationOutcome::done(outcome.operation)
    }
}
