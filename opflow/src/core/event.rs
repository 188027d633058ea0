//! Diagnostic annotations recorded on an operation.

use crate::utils::Timestamp;
use serde::{Deserialize, Serialize};

/// An entry of the operation's append-only event log.
///
/// Events are diagnostic only; no control decision reads them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationEvent {
    /// When the event was recorded.
    pub at: Timestamp,
    /// What happened.
    pub message: String,
    /// The error observed, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OperationEvent {
    /// Creates an informational event.
    #[must_use]
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            at: crate::utils::now_utc(),
            message: message.into(),
            error: None,
        }
    }

    /// Creates an event carrying an error message.
    #[must_use]
    pub fn error(message: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            at: crate::utils::now_utc(),
            message: message.into(),
            error: Some(error.into()),
        }
    }

    /// Two events are the same entry when timestamp and message match.
    pub(crate) fn same_entry(&self, other: &Self) -> bool {
        self.at == other.at && self.message == other.message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_event_serializes_error() {
        let event = OperationEvent::error("operation failed", "quota exceeded");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["message"], "operation failed");
        assert_eq!(json["error"], "quota exceeded");
    }

    #[test]
    fn test_info_event_omits_error() {
        let json = serde_json::to_value(OperationEvent::info("step done")).unwrap();
        assert!(json.get("error").is_none());
    }
}
