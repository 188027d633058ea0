//! Spans and timers for step execution.

use crate::core::Operation;
use std::time::Instant;
use tracing::{info_span, Span};

/// The span a step runs in.
#[must_use]
pub fn step_span(operation: &Operation, step: &str) -> Span {
    info_span!(
        "step",
        operation_id = %operation.id,
        instance_id = %operation.instance_id,
        operation_type = %operation.operation_type,
        step = %step
    )
}

/// Simple timer for measuring step durations.
#[derive(Debug)]
pub struct SpanTimer {
    start: Instant,
    name: String,
}

impl SpanTimer {
    /// Starts a new timer.
    #[must_use]
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            name: name.into(),
        }
    }

    /// Returns the elapsed time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.start.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Returns the timer name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}
