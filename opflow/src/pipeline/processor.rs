//! Loads delivered operations and dispatches them to their pipeline.

use super::PipelineRegistry;
use crate::errors::OpflowError;
use crate::manager::OperationManager;
use crate::queue::Executor;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info_span, warn, Instrument};

/// The queue's [`Executor`] for operations.
#[derive(Debug, Clone)]
pub struct OperationProcessor {
    registry: Arc<PipelineRegistry>,
    manager: OperationManager,
}

impl OperationProcessor {
    /// Creates a processor. `manager` loads operations and fails those
    /// whose type has no pipeline.
    #[must_use]
    pub fn new(registry: Arc<PipelineRegistry>, manager: OperationManager) -> Self {
        Self { registry, manager }
    }

    async fn process(&self, operation_id: &str) -> Result<Duration, OpflowError> {
        let operation = match self.manager.storage().get_operation_by_id(operation_id).await {
            Ok(operation) => operation,
            Err(err) if err.is_not_found() => return Err(err.into()),
            Err(err) => {
                warn!(operation_id, error = %err, "unable to load operation");
                return Ok(self.manager.config().storage_retry_backoff());
            }
        };
        if operation.is_finished() {
            debug!(operation_id, state = %operation.state, "operation already finished");
            return Ok(Duration::ZERO);
        }

        let operation_type = operation.operation_type;
        let Some(pipeline) = self.registry.get(operation_type) else {
            let outcome = self
                .manager
                .operation_failed(operation, &format!("no pipeline registered for {operation_type} operations"), None)
                .await;
            if outcome.needs_retry() {
                return Ok(outcome.delay);
            }
            return Err(OpflowError::NoPipeline(operation_type));
        };

        match pipeline.execute(operation).await.into_parts() {
            (_, delay, _) if !delay.is_zero() => Ok(delay),
            (_, _, Some(err)) => Err(err),
            (operation, _, None) => {
                debug!(operation_id, state = %operation.state, "pipeline returned");
                Ok(Duration::ZERO)
            }
        }
    }
}

#[async_trait]
impl Executor for OperationProcessor {
    async fn execute(&self, operation_id: &str) -> Result<Duration, OpflowError> {
        let span = info_span!("process", operation_id);
        self.process(operation_id).instrument(span).await
    }
}
