//! Fault-injecting storage for testing.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::core::{Operation, OperationType};
use crate::errors::StorageError;
use crate::storage::{InMemoryOperationStorage, OperationStorage};

/// In-memory storage that injects write conflicts and backend failures.
///
/// An injected conflict is a real one: a concurrent writer bumps the stored
/// version right before the caller's write is applied.
#[derive(Debug, Default)]
pub struct FlakyStorage {
    inner: InMemoryOperationStorage,
    conflicts: AtomicUsize,
    update_failures: AtomicUsize,
    read_failures: AtomicUsize,
}

impl FlakyStorage {
    /// Creates a store without injected faults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `n` updates race with a concurrent writer.
    pub fn inject_conflicts(&self, n: usize) {
        self.conflicts.store(n, Ordering::SeqCst);
    }

    /// The next `n` updates fail with an internal error.
    pub fn inject_update_failures(&self, n: usize) {
        self.update_failures.store(n, Ordering::SeqCst);
    }

    /// The next `n` reads by id fail with an internal error.
    pub fn inject_read_failures(&self, n: usize) {
        self.read_failures.store(n, Ordering::SeqCst);
    }
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl OperationStorage for FlakyStorage {
    async fn get_operation_by_id(&self, id: &str) -> Result<Operation, StorageError> {
        if take_one(&self.read_failures) {
            return Err(StorageError::internal("injected read failure"));
        }
        self.inner.get_operation_by_id(id).await
    }

    async fn insert_operation(&self, operation: Operation) -> Result<(), StorageError> {
        self.inner.insert_operation(operation).await
    }

    async fn update_operation(&self, operation: Operation) -> Result<Operation, StorageError> {
        if take_one(&self.update_failures) {
            return Err(StorageError::internal("injected update failure"));
        }
        if take_one(&self.conflicts) {
            let stored = self.inner.get_operation_by_id(&operation.id).await?;
            self.inner.update_operation(stored).await?;
        }
        self.inner.update_operation(operation).await
    }

    async fn get_last_operation(&self, instance_id: &str) -> Result<Operation, StorageError> {
        self.inner.get_last_operation(instance_id).await
    }

    async fn get_provisioning_operation_by_instance_id(
        &self,
        instance_id: &str,
    ) -> Result<Operation, StorageError> {
        self.inner.get_provisioning_operation_by_instance_id(instance_id).await
    }

    async fn get_deprovisioning_operation_by_instance_id(
        &self,
        instance_id: &str,
    ) -> Result<Operation, StorageError> {
        self.inner.get_deprovisioning_operation_by_instance_id(instance_id).await
    }

    async fn get_not_finished_operations(
        &self,
        operation_type: OperationType,
    ) -> Result<Vec<Operation>, StorageError> {
        self.inner.get_not_finished_operations(operation_type).await
    }
}
