//! Events mirrored from the operation manager.
//!
//! The manager records annotations ("operation failed", "step skipped") on
//! the operation itself and reports each terminal transition or skipped step
//! as a [`ManagerEvent`] to the [`EventSink`] handed to it at construction,
//! so monitoring can subscribe without reading storage.

mod sink;

pub use sink::{CollectingEventSink, EventSink, NoOpEventSink};

use crate::core::{Operation, OperationState, OperationType};
use crate::utils::{now_utc, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What the manager did to an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagerEventKind {
    /// The operation reached `Succeeded`.
    OperationSucceeded,
    /// The operation was marked `Failed`.
    OperationFailed,
    /// The operation was canceled.
    OperationCanceled,
    /// A step was recorded as executed but not completed.
    StepNotCompleted,
}

impl ManagerEventKind {
    /// Dotted name used in logs and by subscribers.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OperationSucceeded => "operation.succeeded",
            Self::OperationFailed => "operation.failed",
            Self::OperationCanceled => "operation.canceled",
            Self::StepNotCompleted => "step.not_completed",
        }
    }
}

impl fmt::Display for ManagerEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A snapshot of the operation taken when the manager reported it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerEvent {
    /// What happened.
    pub kind: ManagerEventKind,
    /// Operation id.
    pub operation_id: String,
    /// Instance the operation belongs to.
    pub instance_id: String,
    /// Operation type.
    pub operation_type: OperationType,
    /// State after the persisted write.
    pub state: OperationState,
    /// Step the reporting manager acts for.
    pub step: String,
    /// Failure cause or skip reason, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// When the manager reported it.
    pub at: Timestamp,
}

impl ManagerEvent {
    /// Captures `operation` as reported by the manager bound to `step`.
    #[must_use]
    pub fn new(kind: ManagerEventKind, operation: &Operation, step: &str) -> Self {
        Self {
            kind,
            operation_id: operation.id.clone(),
            instance_id: operation.instance_id.clone(),
            operation_type: operation.operation_type,
            state: operation.state,
            step: step.to_string(),
            message: None,
            at: now_utc(),
        }
    }

    /// Attaches a message; empty messages are dropped.
    #[must_use]
    pub fn with_message(mut self, message: &str) -> Self {
        if !message.is_empty() {
            self.message = Some(message.to_string());
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::InputSnapshot;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_event_snapshots_operation() {
        let mut op = Operation::new("instance-1", OperationType::Deprovision, InputSnapshot::new("aws"));
        op.state = OperationState::Failed;

        let event = ManagerEvent::new(ManagerEventKind::OperationFailed, &op, "remove_runtime")
            .with_message("runtime still attached");

        assert_eq!(event.operation_id, op.id);
        assert_eq!(event.state, OperationState::Failed);
        assert_eq!(event.message.as_deref(), Some("runtime still attached"));
        assert_eq!(event.kind.to_string(), "operation.failed");
    }

    #[test]
    fn test_empty_message_is_dropped() {
        let op = Operation::new("instance-1", OperationType::Provision, InputSnapshot::default());
        let event = ManagerEvent::new(ManagerEventKind::OperationSucceeded, &op, "processing").with_message("");

        assert_eq!(event.message, None);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "operation_succeeded");
        assert!(json.get("message").is_none());
    }
}
