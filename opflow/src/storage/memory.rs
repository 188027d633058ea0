//! In-memory storage backend.

use super::OperationStorage;
use crate::core::{Operation, OperationType};
use crate::errors::StorageError;
use crate::utils::now_utc;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone)]
struct Record {
    operation: Operation,
    // Insertion order, breaks ties between operations created in the same instant.
    seq: u64,
}

/// Operation storage backed by a concurrent map.
///
/// Version checks happen under the map's per-entry lock, so racing writers
/// observe the same conflict semantics a database `UPDATE ... WHERE version`
/// would give.
#[derive(Debug, Default)]
pub struct InMemoryOperationStorage {
    operations: DashMap<String, Record>,
    next_seq: AtomicU64,
}

impl InMemoryOperationStorage {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    fn latest_where<F>(&self, instance_id: &str, predicate: F) -> Result<Operation, StorageError>
    where
        F: Fn(&Operation) -> bool,
    {
        self.operations
            .iter()
            .filter(|r| r.operation.instance_id == instance_id && predicate(&r.operation))
            .max_by_key(|r| (r.operation.created_at, r.seq))
            .map(|r| r.operation.clone())
            .ok_or_else(|| StorageError::not_found(format!("instance {instance_id}")))
    }
}

#[async_trait]
impl OperationStorage for InMemoryOperationStorage {
    async fn get_operation_by_id(&self, id: &str) -> Result<Operation, StorageError> {
        self.operations
            .get(id)
            .map(|r| r.operation.clone())
            .ok_or_else(|| StorageError::not_found(id))
    }

    async fn insert_operation(&self, operation: Operation) -> Result<(), StorageError> {
        let id = operation.id.clone();
        match self.operations.entry(id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(StorageError::AlreadyExists { id }),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
                slot.insert(Record { operation, seq });
                Ok(())
            }
        }
    }

    async fn update_operation(&self, mut operation: Operation) -> Result<Operation, StorageError> {
        let mut record = self
            .operations
            .get_mut(&operation.id)
            .ok_or_else(|| StorageError::not_found(operation.id.clone()))?;

        if record.operation.version != operation.version {
            return Err(StorageError::Conflict {
                id: operation.id,
                expected_version: operation.version,
                actual_version: record.operation.version,
            });
        }

        operation.keep_input_of(&record.operation);
        operation.version += 1;
        operation.updated_at = now_utc();
        record.operation = operation.clone();
        Ok(operation)
    }

    async fn get_last_operation(&self, instance_id: &str) -> Result<Operation, StorageError> {
        self.latest_where(instance_id, |_| true)
    }

    async fn get_provisioning_operation_by_instance_id(
        &self,
        instance_id: &str,
    ) -> Result<Operation, StorageError> {
        self.latest_where(instance_id, |op| op.operation_type.is_provisioning())
    }

    async fn get_deprovisioning_operation_by_instance_id(
        &self,
        instance_id: &str,
    ) -> Result<Operation, StorageError> {
        self.latest_where(instance_id, |op| op.operation_type.is_deprovisioning())
    }

    async fn get_not_finished_operations(
        &self,
        operation_type: OperationType,
    ) -> Result<Vec<Operation>, StorageError> {
        let mut records: Vec<Record> = self
            .operations
            .iter()
            .filter(|r| r.operation.operation_type == operation_type && !r.operation.is_finished())
            .map(|r| r.value().clone())
            .collect();
        records.sort_by_key(|r| (r.operation.created_at, r.seq));
        Ok(records.into_iter().map(|r| r.operation).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{InputSnapshot, OperationState};
    use pretty_assertions::assert_eq;

    fn operation(instance: &str, operation_type: OperationType) -> Operation {
        Operation::new(instance, operation_type, InputSnapshot::new("aws"))
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_id() {
        let storage = InMemoryOperationStorage::new();
        let op = operation("i-1", OperationType::Provision);
        storage.insert_operation(op.clone()).await.unwrap();

        let err = storage.insert_operation(op).await.unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists { .. }));
        assert_eq!(storage.len(), 1);
    }

    #[tokio::test]
    async fn test_update_increments_version_and_refreshes_updated_at() {
        let storage = InMemoryOperationStorage::new();
        let mut op = operation("i-1", OperationType::Provision);
        op.updated_at = crate::utils::before_now(std::time::Duration::from_secs(600));
        storage.insert_operation(op.clone()).await.unwrap();

        let stored = storage.update_operation(op.clone()).await.unwrap();
        assert_eq!(stored.version, 1);
        assert!(stored.updated_at > op.updated_at);

        let again = storage.update_operation(stored.clone()).await.unwrap();
        assert_eq!(again.version, 2);
    }

    #[tokio::test]
    async fn test_update_with_stale_version_conflicts() {
        let storage = InMemoryOperationStorage::new();
        let op = operation("i-1", OperationType::Provision);
        storage.insert_operation(op.clone()).await.unwrap();
        storage.update_operation(op.clone()).await.unwrap();

        let err = storage.update_operation(op).await.unwrap_err();
        assert!(err.is_conflict());
        assert!(matches!(
            err,
            StorageError::Conflict { expected_version: 0, actual_version: 1, .. }
        ));
    }

    #[tokio::test]
    async fn test_update_missing_operation_is_not_found() {
        let storage = InMemoryOperationStorage::new();
        let err = storage
            .update_operation(operation("i-1", OperationType::Update))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_update_keeps_input_snapshot() {
        let storage = InMemoryOperationStorage::new();
        let op = operation("i-1", OperationType::Provision);
        storage.insert_operation(op.clone()).await.unwrap();

        let mut tampered: Operation = serde_json::from_value({
            let mut json = serde_json::to_value(&op).unwrap();
            json["input"]["plan_id"] = serde_json::json!("gcp");
            json
        })
        .unwrap();
        tampered.description = "tampered".to_string();

        let stored = storage.update_operation(tampered).await.unwrap();
        assert_eq!(stored.input().plan_id, "aws");
        assert_eq!(stored.description, "tampered");
    }

    #[tokio::test]
    async fn test_lineage_lookups() {
        let storage = InMemoryOperationStorage::new();
        let provision = operation("i-1", OperationType::Provision);
        let suspension = operation("i-1", OperationType::Suspension);
        let update = operation("i-1", OperationType::Update);
        let other = operation("i-2", OperationType::Deprovision);
        for op in [&provision, &suspension, &update, &other] {
            storage.insert_operation(op.clone()).await.unwrap();
        }

        assert_eq!(storage.get_last_operation("i-1").await.unwrap().id, update.id);
        assert_eq!(
            storage.get_provisioning_operation_by_instance_id("i-1").await.unwrap().id,
            provision.id
        );
        assert_eq!(
            storage.get_deprovisioning_operation_by_instance_id("i-1").await.unwrap().id,
            suspension.id
        );
        assert!(storage
            .get_provisioning_operation_by_instance_id("i-2")
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_not_finished_operations() {
        let storage = InMemoryOperationStorage::new();
        let pending = operation("i-1", OperationType::Provision);
        let mut done = operation("i-2", OperationType::Provision);
        done.state = OperationState::Succeeded;
        let other_type = operation("i-3", OperationType::Update);
        for op in [&pending, &done, &other_type] {
            storage.insert_operation(op.clone()).await.unwrap();
        }

        let unfinished = storage
            .get_not_finished_operations(OperationType::Provision)
            .await
            .unwrap();
        assert_eq!(unfinished.len(), 1);
        assert_eq!(unfinished[0].id, pending.id);
    }
}
