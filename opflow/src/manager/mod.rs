//! The operation manager.
//!
//! Every state change of an operation goes through an [`OperationManager`]:
//! terminal transitions, bounded retries and plain field updates all funnel
//! into [`OperationManager::update_operation`], which persists through the
//! storage port and resolves optimistic-concurrency conflicts by reloading,
//! merging and retrying once.
//!
//! Each manager is bound to the step it acts for and the component blamed
//! when that step fails; [`OperationManager::for_step`] derives a sibling
//! sharing storage, configuration and event sink.

mod retry;

use crate::core::{Component, LastError, Operation, OperationEvent, OperationOutcome, OperationState};
use crate::errors::{OpflowError, StorageError};
use crate::events::{EventSink, ManagerEvent, ManagerEventKind, NoOpEventSink};
use crate::storage::OperationStorage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

fn default_storage_retry_backoff_ms() -> u64 {
    60_000
}

/// Configuration of the operation manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Delay returned when the storage port fails transiently, in milliseconds.
    #[serde(default = "default_storage_retry_backoff_ms")]
    pub storage_retry_backoff_ms: u64,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            storage_retry_backoff_ms: default_storage_retry_backoff_ms(),
        }
    }
}

impl ManagerConfig {
    /// Creates a config with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the storage back-off.
    #[must_use]
    pub fn with_storage_retry_backoff(mut self, backoff: Duration) -> Self {
        self.storage_retry_backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// The storage back-off as a duration.
    #[must_use]
    pub fn storage_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.storage_retry_backoff_ms)
    }
}

/// Mediates every state transition of an operation on behalf of one step.
#[derive(Clone)]
pub struct OperationManager {
    storage: Arc<dyn OperationStorage>,
    step: String,
    component: Component,
    config: ManagerConfig,
    events: Arc<dyn EventSink>,
}

impl fmt::Debug for OperationManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationManager")
            .field("step", &self.step)
            .field("component", &self.component)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl OperationManager {
    /// Creates a manager acting for `step`, blaming `component` on failure.
    #[must_use]
    pub fn new(
        storage: Arc<dyn OperationStorage>,
        step: impl Into<String>,
        component: Component,
    ) -> Self {
        Self {
            storage,
            step: step.into(),
            component,
            config: ManagerConfig::default(),
            events: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the configuration.
    #[must_use]
    pub fn with_config(mut self, config: ManagerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the sink mirroring operation annotations.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// A manager for another step, sharing storage, config and event sink.
    #[must_use]
    pub fn for_step(&self, step: impl Into<String>, component: Component) -> Self {
        Self {
            step: step.into(),
            component,
            ..self.clone()
        }
    }

    /// The step this manager acts for.
    #[must_use]
    pub fn step(&self) -> &str {
        &self.step
    }

    /// The component blamed on failure.
    #[must_use]
    pub fn component(&self) -> Component {
        self.component
    }

    /// The storage port.
    #[must_use]
    pub fn storage(&self) -> &Arc<dyn OperationStorage> {
        &self.storage
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Marks the operation as succeeded.
    pub async fn operation_succeeded(&self, operation: Operation, description: &str) -> OperationOutcome {
        let outcome = self.transition(operation, OperationState::Succeeded, description).await;
        if outcome.is_done() && outcome.operation.state == OperationState::Succeeded {
            info!(operation_id = %outcome.operation.id, "operation succeeded");
            self.emit(ManagerEventKind::OperationSucceeded, &outcome.operation, "").await;
        }
        outcome
    }

    /// Marks the operation as canceled.
    pub async fn operation_canceled(&self, operation: Operation, description: &str) -> OperationOutcome {
        let outcome = self.transition(operation, OperationState::Canceled, description).await;
        if outcome.is_done() && outcome.operation.state == OperationState::Canceled {
            info!(operation_id = %outcome.operation.id, "operation canceled");
            self.emit(ManagerEventKind::OperationCanceled, &outcome.operation, "").await;
        }
        outcome
    }

    /// Marks the operation as failed and records `LastError`.
    ///
    /// Returns a terminal [`OpflowError::OperationFailed`] unless the persist
    /// failed transiently, in which case the storage back-off is returned
    /// without an error so the caller retries the whole call. An operation
    /// that already ended in another state is returned as stored, without
    /// an error.
    pub async fn operation_failed(
        &self,
        operation: Operation,
        description: &str,
        err: Option<anyhow::Error>,
    ) -> OperationOutcome {
        let message = err.as_ref().map(|e| format!("{e:#}")).unwrap_or_default();
        let last_error = LastError {
            reason: description.to_string(),
            component: self.component,
            step: self.step.clone(),
            message: message.clone(),
        };
        let event = if message.is_empty() {
            OperationEvent::info(format!("operation failed: {description}"))
        } else {
            OperationEvent::error(format!("operation failed: {description}"), message.clone())
        };

        let outcome = self
            .update_operation(operation, |op| {
                op.state = OperationState::Failed;
                op.description = description.to_string();
                op.last_error = Some(last_error.clone());
                op.record_event(event.clone());
            })
            .await;
        if outcome.needs_retry() {
            return OperationOutcome::retry_after(outcome.operation, outcome.delay);
        }
        if outcome.operation.state != OperationState::Failed {
            return Self::finished_elsewhere(outcome.operation);
        }

        error!(
            operation_id = %outcome.operation.id,
            step = %self.step,
            component = %self.component,
            error = %message,
            "operation failed: {description}"
        );
        self.emit(ManagerEventKind::OperationFailed, &outcome.operation, &message).await;
        OperationOutcome::failed(outcome.operation, OpflowError::operation_failed(description, err))
    }

    /// Records `step_name` as executed but not completed, without a budget check.
    pub async fn mark_step_as_executed_but_not_completed(
        &self,
        operation: Operation,
        step_name: &str,
        msg: &str,
    ) -> OperationOutcome {
        let event = OperationEvent::info(format!("step {step_name} executed but not completed: {msg}"));
        let outcome = self
            .update_operation(operation, |op| {
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

        warn!(operation_id = %outcome.operation.id, step = %step_name, "step executed but not completed: {msg}");
        self.emit(ManagerEventKind::StepNotCompleted, &outcome.operation, msg).await;
        OperationOutcome::done(outcome.operation)
    }

    /// Applies `update` and persists the result.
    ///
    /// The persist happens even if `update` changes nothing, which refreshes
    /// `updated_at`. On a version conflict the stored operation is reloaded;
    /// if it is already terminal it is returned as is, otherwise the local
    /// append-only progress is merged into it, `update` is applied again and
    /// the merged copy is persisted. A second conflict or any other storage
    /// error returns the operation as passed in together with the storage
    /// back-off and the error.
    pub async fn update_operation<F>(&self, operation: Operation, update: F) -> OperationOutcome
    where
        F: Fn(&mut Operation) + Send + Sync,
    {
        let mut intended = operation.clone();
        update(&mut intended);

        let err = match self.storage.update_operation(intended.clone()).await {
            Ok(stored) => return OperationOutcome::done(stored),
            Err(err) => err,
        };
        if !err.is_conflict() {
            error!(operation_id = %operation.id, step = %self.step, error = %err, "while updating operation");
            return self.back_off(operation, err);
        }

        debug!(operation_id = %operation.id, step = %self.step, "version conflict, reloading operation");
        let mut reloaded = match self.storage.get_operation_by_id(&operation.id).await {
            Ok(reloaded) => reloaded,
            Err(err) => {
                error!(operation_id = %operation.id, error = %err, "while getting operation");
                return self.back_off(operation, err);
            }
        };
        if reloaded.is_finished() {
            info!(
                operation_id = %reloaded.id,
                state = %reloaded.state,
                "operation finished concurrently, keeping stored state"
            );
            return OperationOutcome::done(reloaded);
        }

        reloaded.merge_from(&intended);
        update(&mut reloaded);
        match self.storage.update_operation(reloaded).await {
            Ok(stored) => OperationOutcome::done(stored),
            Err(err) => {
                error!(operation_id = %operation.id, error = %err, "while updating operation after conflict");
                self.back_off(operation, err)
            }
        }
    }

    async fn transition(&self, operation: Operation, state: OperationState, description: &str) -> OperationOutcome {
        self.update_operation(operation, |op| {
            op.state = state;
            op.description = description.to_string();
        })
        .await
    }

    fn finished_elsewhere(operation: Operation) -> OperationOutcome {
        info!(
            operation_id = %operation.id,
            state = %operation.state,
            "operation already finished, nothing to report"
        );
        OperationOutcome::done(operation)
    }

    fn back_off(&self, operation: Operation, err: StorageError) -> OperationOutcome {
        OperationOutcome::retry_after(operation, self.config.storage_retry_backoff()).with_error(err.into())
    }

    async fn emit(&self, kind: ManagerEventKind, operation: &Operation, message: &str) {
        let event = ManagerEvent::new(kind, operation, &self.step).with_message(message);
        self.events.emit(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{InputSnapshot, OperationType};
    use crate::events::CollectingEventSink;
    use crate::storage::{InMemoryOperationStorage, MockOperationStorage};
    use pretty_assertions::assert_eq;

    async fn stored_operation(storage: &InMemoryOperationStorage) -> Operation {
        let op = Operation::new("instance-1", OperationType::Provision, InputSnapshot::new("aws"));
        storage.insert_operation(op.clone()).await.unwrap();
        op
    }

    fn manager(storage: Arc<dyn OperationStorage>) -> OperationManager {
        OperationManager::new(storage, "create_cluster", Component::Provisioner)
    }

    fn conflict(id: &str) -> StorageError {
        StorageError::Conflict {
            id: id.to_string(),
            expected_version: 0,
            actual_version: 1,
        }
    }

    #[tokio::test]
    async fn test_update_always_persists_and_bumps_version() {
        let storage = Arc::new(InMemoryOperationStorage::new());
        let op = stored_operation(&storage).await;
        let before = op.updated_at;

        let outcome = manager(storage).update_operation(op, |_| {}).await;

        assert!(outcome.is_done());
        assert_eq!(outcome.operation.version, 1);
        assert!(outcome.operation.updated_at >= before);
    }

    #[tokio::test]
    async fn test_operation_succeeded() {
        let storage = Arc::new(InMemoryOperationStorage::new());
        let sink = Arc::new(CollectingEventSink::new());
        let op = stored_operation(&storage).await;

        let outcome = manager(storage.clone())
            .with_event_sink(sink.clone())
            .operation_succeeded(op, "Operation succeeded")
            .await;

        assert!(outcome.is_done());
        let stored = storage.get_operation_by_id(&outcome.operation.id).await.unwrap();
        assert_eq!(stored.state, OperationState::Succeeded);
        assert_eq!(stored.description, "Operation succeeded");
        assert_eq!(sink.count(ManagerEventKind::OperationSucceeded), 1);
    }

    #[tokio::test]
    async fn test_operation_failed_records_last_error() {
        let storage = Arc::new(InMemoryOperationStorage::new());
        let sink = Arc::new(CollectingEventSink::new());
        let op = stored_operation(&storage).await;

        let outcome = manager(storage.clone())
            .with_event_sink(sink.clone())
            .operation_failed(op, "unable to create cluster", Some(anyhow::anyhow!("quota exceeded")))
            .await;

        assert!(outcome.is_failed());
        let (op, _, err) = outcome.into_parts();
        assert_eq!(
            err.map(|e| e.to_string()).as_deref(),
            Some("unable to create cluster: quota exceeded")
        );
        assert_eq!(op.state, OperationState::Failed);
        assert_eq!(
            op.last_error,
            Some(LastError {
                reason: "unable to create cluster".to_string(),
                component: Component::Provisioner,
                step: "create_cluster".to_string(),
                message: "quota exceeded".to_string(),
            })
        );
        assert_eq!(op.events().len(), 1);
        let reported = sink.for_operation(&op.id, ManagerEventKind::OperationFailed);
        assert_eq!(reported.len(), 1);
        assert_eq!(reported[0].message.as_deref(), Some("quota exceeded"));
    }

    #[tokio::test]
    async fn test_operation_failed_on_storage_error_backs_off_without_error() {
        let mut storage = MockOperationStorage::new();
        storage
            .expect_update_operation()
            .times(1)
            .returning(|_| Err(StorageError::internal("connection reset")));
        let op = Operation::new("instance-1", OperationType::Update, InputSnapshot::default());

        let outcome = manager(Arc::new(storage))
            .operation_failed(op, "unable to update", None)
            .await;

        assert_eq!(outcome.delay, Duration::from_secs(60));
        assert!(outcome.error.is_none());
        assert_eq!(outcome.operation.state, OperationState::Pending);
    }

    #[tokio::test]
    async fn test_operation_canceled() {
        let storage = Arc::new(InMemoryOperationStorage::new());
        let op = stored_operation(&storage).await;

        let outcome = manager(storage).operation_canceled(op, "canceled by user").await;

        assert!(outcome.is_done());
        assert_eq!(outcome.operation.state, OperationState::Canceled);
    }

    #[tokio::test]
    async fn test_transient_storage_error_returns_unchanged_operation() {
        let mut storage = MockOperationStorage::new();
        storage
            .expect_update_operation()
            .times(1)
            .returning(|_| Err(StorageError::internal("db down")));
        let op = Operation::new("instance-1", OperationType::Update, InputSnapshot::default());
        let manager = manager(Arc::new(storage))
            .with_config(ManagerConfig::new().with_storage_retry_backoff(Duration::from_secs(5)));

        let outcome = manager
            .update_operation(op.clone(), |op| op.description = "changed".to_string())
            .await;

        assert_eq!(outcome.delay, Duration::from_secs(5));
        assert_eq!(outcome.operation, op);
        assert!(outcome.error.as_ref().and_then(OpflowError::as_storage).is_some());
    }

    #[tokio::test]
    async fn test_concurrent_updates_are_merged() {
        let storage = Arc::new(InMemoryOperationStorage::new());
        let manager = manager(storage.clone());
        let op = stored_operation(&storage).await;
        let op = manager.update_operation(op, |_| {}).await.operation;
        assert_eq!(op.version, 1);

        let (a, b) = tokio::join!(
            manager.update_operation(op.clone(), |op| {
                op.add_finished_stage("stepX");
            }),
            manager.update_operation(op.clone(), |op| {
                op.add_finished_stage("stepY");
            }),
        );
        assert!(a.is_done());
        assert!(b.is_done());

        let stored = storage.get_operation_by_id(&op.id).await.unwrap();
        assert_eq!(stored.version, 3);
        assert!(stored.is_stage_finished("stepX"));
        assert!(stored.is_stage_finished("stepY"));
    }

    #[tokio::test]
    async fn test_conflict_keeps_scalars_of_retrying_mutation() {
        let storage = Arc::new(InMemoryOperationStorage::new());
        let manager = manager(storage.clone());
        let stale = stored_operation(&storage).await;

        let mut other = stale.clone();
        other.description = "written concurrently".to_string();
        storage.update_operation(other).await.unwrap();

        let outcome = manager
            .update_operation(stale, |op| op.state = OperationState::InProgress)
            .await;

        assert!(outcome.is_done());
        assert_eq!(outcome.operation.version, 2);
        assert_eq!(outcome.operation.state, OperationState::InProgress);
        assert_eq!(outcome.operation.description, "written concurrently");
    }

    #[tokio::test]
    async fn test_conflict_with_terminal_operation_keeps_terminal_state() {
        let storage = Arc::new(InMemoryOperationStorage::new());
        let manager = manager(storage.clone());
        let stale = stored_operation(&storage).await;
        manager.operation_canceled(stale.clone(), "canceled").await;

        let outcome = manager
            .update_operation(stale, |op| {
                op.add_finished_stage("create_cluster");
            })
            .await;

        assert!(outcome.is_done());
        assert_eq!(outcome.operation.state, OperationState::Canceled);
        assert!(outcome.operation.finished_stages().is_empty());
        assert_eq!(storage.get_operation_by_id(&outcome.operation.id).await.unwrap().version, 1);
    }

    #[tokio::test]
    async fn test_second_conflict_backs_off() {
        let op = Operation::new("instance-1", OperationType::Provision, InputSnapshot::default());
        let reloaded = op.clone();
        let mut storage = MockOperationStorage::new();
        storage
            .expect_update_operation()
            .times(2)
            .returning(|op| Err(conflict(&op.id)));
        storage
            .expect_get_operation_by_id()
            .times(1)
            .returning(move |_| Ok(reloaded.clone()));

        let outcome = manager(Arc::new(storage))
            .update_operation(op.clone(), |op| {
                op.add_finished_stage("init");
            })
            .await;

        assert_eq!(outcome.delay, Duration::from_secs(60));
        assert_eq!(outcome.operation, op);
        let err = outcome.error.as_ref().and_then(OpflowError::as_storage);
        assert!(err.is_some_and(StorageError::is_conflict));
    }

    #[tokio::test]
    async fn test_reload_failure_backs_off() {
        let op = Operation::new("instance-1", OperationType::Provision, InputSnapshot::default());
        let mut storage = MockOperationStorage::new();
        storage
            .expect_update_operation()
            .times(1)
            .returning(|op| Err(conflict(&op.id)));
        storage
            .expect_get_operation_by_id()
            .times(1)
            .returning(|_| Err(StorageError::internal("db down")));

        let outcome = manager(Arc::new(storage)).update_operation(op, |_| {}).await;

        assert!(outcome.needs_retry());
        assert!(outcome.error.is_some());
    }

    #[tokio::test]
    async fn test_mark_step_as_executed_but_not_completed() {
        let storage = Arc::new(InMemoryOperationStorage::new());
        let sink = Arc::new(CollectingEventSink::new());
        let op = stored_operation(&storage).await;
        let manager = manager(storage).with_event_sink(sink.clone());

        let outcome = manager
            .mark_step_as_executed_but_not_completed(op, "remove_dns_entry", "dns entry left behind")
            .await;
        assert!(outcome.is_done());
        let outcome = manager
            .mark_step_as_executed_but_not_completed(outcome.operation, "remove_dns_entry", "dns entry left behind")
            .await;

        assert_eq!(outcome.operation.executed_but_not_completed_steps(), ["remove_dns_entry"]);
        assert_eq!(outcome.operation.description, "Operation created");
        assert_ne!(outcome.operation.state, OperationState::Failed);
        assert_eq!(sink.count(ManagerEventKind::StepNotCompleted), 2);
    }

    async fn canceled_elsewhere(storage: &Arc<InMemoryOperationStorage>) -> Operation {
        let stale = stored_operation(storage).await;
        let mut canceled = stale.clone();
        canceled.state = OperationState::Canceled;
        storage.update_operation(canceled).await.unwrap();
        stale
    }

    #[tokio::test]
    async fn test_succeeded_on_canceled_operation_reports_nothing() {
        let storage = Arc::new(InMemoryOperationStorage::new());
        let sink = Arc::new(CollectingEventSink::new());
        let stale = canceled_elsewhere(&storage).await;

        let outcome = manager(storage.clone())
            .with_event_sink(sink.clone())
            .operation_succeeded(stale, "Operation succeeded")
            .await;

        assert!(outcome.is_done());
        assert_eq!(outcome.operation.state, OperationState::Canceled);
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_failed_on_canceled_operation_returns_no_error() {
        let storage = Arc::new(InMemoryOperationStorage::new());
        let sink = Arc::new(CollectingEventSink::new());
        let stale = canceled_elsewhere(&storage).await;

        let outcome = manager(storage.clone())
            .with_event_sink(sink.clone())
            .operation_failed(stale, "unable to create cluster", Some(anyhow::anyhow!("boom")))
            .await;

        assert!(outcome.is_done());
        assert_eq!(outcome.operation.state, OperationState::Canceled);
        assert_eq!(outcome.operation.last_error, None);
        assert!(sink.is_empty());
        let stored = storage.get_operation_by_id(&outcome.operation.id).await.unwrap();
        assert_eq!(stored.last_error, None);
        assert_eq!(stored.version, 1);
    }

    #[tokio::test]
    async fn test_mark_step_on_canceled_operation_reports_nothing() {
        let storage = Arc::new(InMemoryOperationStorage::new());
        let sink = Arc::new(CollectingEventSink::new());
        let stale = canceled_elsewhere(&storage).await;

        let outcome = manager(storage)
            .with_event_sink(sink.clone())
            .mark_step_as_executed_but_not_completed(stale, "remove_dns_entry", "dns entry left behind")
            .await;

        assert!(outcome.is_done());
        assert!(outcome.operation.executed_but_not_completed_steps().is_empty());
        assert!(sink.is_empty());
    }

    #[test]
    fn test_for_step_shares_config() {
        let storage: Arc<dyn OperationStorage> = Arc::new(InMemoryOperationStorage::new());
        let base = OperationManager::new(storage, "init", Component::Engine)
            .with_config(ManagerConfig::new().with_storage_retry_backoff(Duration::from_secs(1)));
        let derived = base.for_step("wait_ready", Component::InfrastructureManager);

        assert_eq!(derived.step(), "wait_ready");
        assert_eq!(derived.component(), Component::InfrastructureManager);
        assert_eq!(derived.config().storage_retry_backoff(), Duration::from_secs(1));
    }
}
