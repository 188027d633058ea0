//! Runtime state derived from an instance's most recent operation.

use super::{Operation, OperationState, OperationType};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The externally reported state of a tenant runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeState {
    /// The last operation succeeded.
    Succeeded,
    /// A provision, deprovision, suspension or unsuspension failed.
    Failed,
    /// An update or cluster upgrade failed; the runtime keeps serving.
    Error,
    /// Provisioning or unsuspension is running.
    Provisioning,
    /// Deprovisioning or suspension is running.
    Deprovisioning,
    /// The runtime was removed.
    Deprovisioned,
    /// The runtime was removed but some steps were skipped and need a follow-up.
    DeprovisionIncomplete,
    /// A cluster upgrade is running.
    Upgrading,
    /// An update is running.
    Updating,
    /// The runtime is suspended.
    Suspended,
}

impl RuntimeState {
    /// Derives the runtime state from the last operation of an instance.
    #[must_use]
    pub fn from_last_operation(operation: &Operation) -> Self {
        use OperationType as T;

        match operation.state {
            OperationState::Pending | OperationState::InProgress => match operation.operation_type {
                T::Provision | T::Unsuspension => Self::Provisioning,
                T::Deprovision | T::Suspension => Self::Deprovisioning,
                T::UpgradeCluster => Self::Upgrading,
                T::Update => Self::Updating,
            },
            OperationState::Succeeded => match operation.operation_type {
                T::Deprovision if operation.executed_but_not_completed_steps().is_empty() => {
                    Self::Deprovisioned
                }
                T::Deprovision => Self::DeprovisionIncomplete,
                T::Suspension => Self::Suspended,
                _ => Self::Succeeded,
            },
            OperationState::Failed | OperationState::Canceled => match operation.operation_type {
                T::Update | T::UpgradeCluster => Self::Error,
                _ => Self::Failed,
            },
        }
    }
}

impl fmt::Display for RuntimeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Error => "error",
            Self::Provisioning => "provisioning",
            Self::Deprovisioning => "deprovisioning",
            Self::Deprovisioned => "deprovisioned",
            Self::DeprovisionIncomplete => "deprovision_incomplete",
            Self::Upgrading => "upgrading",
            Self::Updating => "updating",
            Self::Suspended => "suspended",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::InputSnapshot;

    fn op(operation_type: OperationType, state: OperationState) -> Operation {
        let mut op = Operation::new("instance", operation_type, InputSnapshot::default());
        op.state = state;
        op
    }

    #[test]
    fn test_in_progress_states() {
        let cases = [
            (OperationType::Provision, RuntimeState::Provisioning),
            (OperationType::Unsuspension, RuntimeState::Provisioning),
            (OperationType::Deprovision, RuntimeState::Deprovisioning),
            (OperationType::Suspension, RuntimeState::Deprovisioning),
            (OperationType::UpgradeCluster, RuntimeState::Upgrading),
            (OperationType::Update, RuntimeState::Updating),
        ];
        for (operation_type, expected) in cases {
            let state = RuntimeState::from_last_operation(&op(operation_type, OperationState::InProgress));
            assert_eq!(state, expected, "{operation_type}");
        }
    }

    #[test]
    fn test_deprovision_with_skipped_steps_is_incomplete() {
        let mut deprovision = op(OperationType::Deprovision, OperationState::Succeeded);
        assert_eq!(RuntimeState::from_last_operation(&deprovision), RuntimeState::Deprovisioned);

        deprovision.add_executed_but_not_completed("remove_dns_entry");
        assert_eq!(
            RuntimeState::from_last_operation(&deprovision),
            RuntimeState::DeprovisionIncomplete
        );
    }

    #[test]
    fn test_failed_update_is_recoverable_error() {
        let update = op(OperationType::Update, OperationState::Failed);
        assert_eq!(RuntimeState::from_last_operation(&update), RuntimeState::Error);

        let provision = op(OperationType::Provision, OperationState::Failed);
        assert_eq!(RuntimeState::from_last_operation(&provision), RuntimeState::Failed);
    }

    #[test]
    fn test_succeeded_suspension_is_suspended() {
        let suspension = op(OperationType::Suspension, OperationState::Succeeded);
        assert_eq!(RuntimeState::from_last_operation(&suspension), RuntimeState::Suspended);
        assert_eq!(RuntimeState::Suspended.to_string(), "suspended");
    }
}
