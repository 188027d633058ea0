//! Read-path helpers over an instance's operation history.

use crate::core::RuntimeState;
use crate::errors::StorageError;
use crate::storage::OperationStorage;
use tracing::error;

/// Returns true if the instance is active.
///
/// An instance is active when it was never deprovisioned or suspended, or
/// when its latest provisioning (or unsuspension) came after the latest
/// deprovisioning (or suspension).
///
/// # Errors
///
/// Returns `NotFound` if the instance has no provisioning operation, and any
/// backend error of the lookups.
pub async fn is_instance_active(
    storage: &dyn OperationStorage,
    instance_id: &str,
) -> Result<bool, StorageError> {
    let provisioning = storage.get_provisioning_operation_by_instance_id(instance_id).await?;
    match storage.get_deprovisioning_operation_by_instance_id(instance_id).await {
        Ok(deprovisioning) => Ok(deprovisioning.created_at < provisioning.created_at),
        Err(err) if err.is_not_found() => Ok(true),
        Err(err) => {
            error!(instance_id, error = %err, "unable to get deprovisioning operation to check the active flag");
            Err(err)
        }
    }
}

/// Derives the runtime state of an instance from its most recent operation.
///
/// # Errors
///
/// Returns `NotFound` if the instance has no operations.
pub async fn runtime_state(
    storage: &dyn OperationStorage,
    instance_id: &str,
) -> Result<RuntimeState, StorageError> {
    let last = storage.get_last_operation(instance_id).await?;
    Ok(RuntimeState::from_last_operation(&last))
}
