//! Test fixtures for engine testing.

use std::sync::Arc;

use crate::core::{Component, InputSnapshot, Operation, OperationType};
use crate::errors::StorageError;
use crate::events::CollectingEventSink;
use crate::manager::OperationManager;
use crate::storage::OperationStorage;

/// Builds operations in a given shape.
#[derive(Debug, Clone)]
pub struct OperationFixture {
    instance_id: String,
    operation_type: OperationType,
    input: InputSnapshot,
    finished_stages: Vec<String>,
}

impl OperationFixture {
    /// A provision of `instance-1` on plan `aws`.
    #[must_use]
    pub fn provision() -> Self {
        Self::of_type(OperationType::Provision)
    }

    /// An operation of `operation_type` on `instance-1`.
    #[must_use]
    pub fn of_type(operation_type: OperationType) -> Self {
        Self {
            instance_id: "instance-1".to_string(),
            operation_type,
            input: InputSnapshot::new("aws"),
            finished_stages: Vec::new(),
        }
    }

    /// Sets the instance id.
    #[must_use]
    pub fn with_instance(mut self, instance_id: impl Into<String>) -> Self {
        self.instance_id = instance_id.into();
        self
    }

    /// Sets the input snapshot.
    #[must_use]
    pub fn with_input(mut self, input: InputSnapshot) -> Self {
        self.input = input;
        self
    }

    /// Marks steps as already finished.
    #[must_use]
    pub fn with_finished_stages(mut self, stages: &[&str]) -> Self {
        self.finished_stages = stages.iter().map(|s| (*s).to_string()).collect();
        self
    }

    /// Builds the operation.
    #[must_use]
    pub fn build(self) -> Operation {
        let mut op = Operation::new(self.instance_id, self.operation_type, self.input);
        for stage in self.finished_stages {
            op.add_finished_stage(stage);
        }
        op
    }

    /// Builds the operation and inserts it into `storage`.
    pub async fn insert(self, storage: &dyn OperationStorage) -> Result<Operation, StorageError> {
        let op = self.build();
        storage.insert_operation(op.clone()).await?;
        Ok(op)
    }
}

/// A manager wired to `storage` with a collecting event sink.
#[must_use]
pub fn test_manager(storage: Arc<dyn OperationStorage>) -> (OperationManager, Arc<CollectingEventSink>) {
    let sink = Arc::new(CollectingEventSink::new());
    let manager = OperationManager::new(storage, "processing", Component::Engine).with_event_sink(sink.clone());
    (manager, sink)
}
