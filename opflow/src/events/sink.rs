//! Subscribers for manager events.

use super::{ManagerEvent, ManagerEventKind};
use async_trait::async_trait;
use parking_lot::Mutex;

/// Receives every [`ManagerEvent`] after the state it describes was persisted.
///
/// Delivery is best effort: a sink that cannot forward an event drops it,
/// the operation itself stays the source of truth.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Delivers one event.
    async fn emit(&self, event: ManagerEvent);
}

/// Discards every event. Default for managers built without a sink.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event: ManagerEvent) {}
}

/// Keeps every event in memory, in emission order.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: Mutex<Vec<ManagerEvent>>,
}

impl CollectingEventSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All events received so far.
    #[must_use]
    pub fn events(&self) -> Vec<ManagerEvent> {
        self.events.lock().clone()
    }

    /// Events of one kind for one operation.
    #[must_use]
    pub fn for_operation(&self, operation_id: &str, kind: ManagerEventKind) -> Vec<ManagerEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.operation_id == operation_id && e.kind == kind)
            .cloned()
            .collect()
    }

    /// Number of events of `kind` across all operations.
    #[must_use]
    pub fn count(&self, kind: ManagerEventKind) -> usize {
        self.events.lock().iter().filter(|e| e.kind == kind).count()
    }

    /// True if nothing was emitted yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event: ManagerEvent) {
        self.events.lock().push(event);
    }
}
