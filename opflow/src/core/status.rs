//! Operation type and state enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The lifecycle action an operation performs on a tenant instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    /// Create the runtime.
    Provision,
    /// Remove the runtime.
    Deprovision,
    /// Upgrade the underlying cluster.
    UpgradeCluster,
    /// Reconfigure the runtime (parameters, OIDC, machine types, ...).
    Update,
    /// Temporarily deprovision the runtime (e.g. expired trial).
    Suspension,
    /// Bring a suspended runtime back.
    Unsuspension,
}

impl OperationType {
    /// All operation types, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::Provision,
        Self::Deprovision,
        Self::UpgradeCluster,
        Self::Update,
        Self::Suspension,
        Self::Unsuspension,
    ];

    /// Returns true for types that create a runtime (provision, unsuspension).
    #[must_use]
    pub fn is_provisioning(&self) -> bool {
        matches!(self, Self::Provision | Self::Unsuspension)
    }

    /// Returns true for types that remove a runtime (deprovision, suspension).
    #[must_use]
    pub fn is_deprovisioning(&self) -> bool {
        matches!(self, Self::Deprovision | Self::Suspension)
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Provision => write!(f, "provision"),
            Self::Deprovision => write!(f, "deprovision"),
            Self::UpgradeCluster => write!(f, "upgrade_cluster"),
            Self::Update => write!(f, "update"),
            Self::Suspension => write!(f, "suspension"),
            Self::Unsuspension => write!(f, "unsuspension"),
        }
    }
}

/// The state of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationState {
    /// Created, not yet picked up by a worker.
    Pending,
    /// Steps are being executed.
    InProgress,
    /// All steps finished.
    Succeeded,
    /// A step failed fatally.
    Failed,
    /// The operation was canceled.
    Canceled,
}

impl Default for OperationState {
    fn default() -> Self {
        Self::Pending
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Canceled => write!(f, "canceled"),
        }
    }
}

impl OperationState {
    /// Returns true if no further step may run.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Canceled)
    }

    /// Returns true if the operation ended without success.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::Canceled)
    }
}
