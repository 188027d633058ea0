//! Restart recovery: re-enqueue operations a previous process left unfinished.

use crate::core::OperationType;
use crate::errors::StorageError;
use crate::queue::Queue;
use crate::storage::OperationStorage;
use tracing::info;

/// Adds every pending or in-progress operation of `types` to `queue`.
///
/// Returns the number of ids enqueued. Safe to call on every start: the
/// queue ignores ids it already holds and finished operations are skipped.
///
/// # Errors
///
/// Returns the first storage error; ids enqueued before it stay queued.
pub async fn requeue_unfinished(
    storage: &dyn OperationStorage,
    queue: &dyn Queue,
    types: &[OperationType],
) -> Result<usize, StorageError> {
    let mut count = 0;
    for &operation_type in types {
        let operations = storage.get_not_finished_operations(operation_type).await?;
        for operation in &operations {
            queue.add(&operation.id);
        }
        info!(operation_type = %operation_type, count = operations.len(), "requeued unfinished operations");
        count += operations.len();
    }
    Ok(count)
}
