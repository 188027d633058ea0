//! Storage port for operations.
//!
//! Backends implement optimistic concurrency: every write carries the
//! version the writer last read, and a write against a stale version is
//! rejected with [`StorageError::Conflict`] instead of overwriting.

mod memory;

pub use memory::InMemoryOperationStorage;

use crate::core::{Operation, OperationType};
use crate::errors::StorageError;
use async_trait::async_trait;

/// Persistence abstraction consumed by the manager and the processor.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OperationStorage: Send + Sync {
    /// Loads an operation by id.
    async fn get_operation_by_id(&self, id: &str) -> Result<Operation, StorageError>;

    /// Stores a new operation as-is. Fails with `AlreadyExists` on a duplicate id.
    async fn insert_operation(&self, operation: Operation) -> Result<(), StorageError>;

    /// Persists `operation` if its version matches the stored one.
    ///
    /// On success the stored copy is returned with the version incremented
    /// and `updated_at` refreshed, even if nothing else changed.
    async fn update_operation(&self, operation: Operation) -> Result<Operation, StorageError>;

    /// The most recently created operation of an instance, any type.
    async fn get_last_operation(&self, instance_id: &str) -> Result<Operation, StorageError>;

    /// The most recent provision or unsuspension of an instance.
    async fn get_provisioning_operation_by_instance_id(
        &self,
        instance_id: &str,
    ) -> Result<Operation, StorageError>;

    /// The most recent deprovision or suspension of an instance.
    async fn get_deprovisioning_operation_by_instance_id(
        &self,
        instance_id: &str,
    ) -> Result<Operation, StorageError>;

    /// All pending or in-progress operations of a type.
    async fn get_not_finished_operations(
        &self,
        operation_type: OperationType,
    ) -> Result<Vec<Operation>, StorageError>;
}
