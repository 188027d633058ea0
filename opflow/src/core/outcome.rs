//! The `(operation, delay, error)` triple returned by steps and the manager.

use super::Operation;
use crate::errors::OpflowError;
use std::time::Duration;

/// Result of running a step or a manager call.
///
/// * zero delay, no error: done, proceed to the next step;
/// * non-zero delay: not done yet, invoke again after the delay;
/// * zero delay with an error: terminal, caller-visible failure.
///
/// A non-zero delay wins over an error: the error then only explains why
/// the caller has to come back later.
#[derive(Debug)]
pub struct OperationOutcome {
    /// The operation as it stands after the call.
    pub operation: Operation,
    /// When to re-attempt; zero means "proceed".
    pub delay: Duration,
    /// Set for terminal failures and for the cause of a storage back-off.
    pub error: Option<OpflowError>,
}

impl OperationOutcome {
    /// The step or transition completed.
    #[must_use]
    pub fn done(operation: Operation) -> Self {
        Self {
            operation,
            delay: Duration::ZERO,
            error: None,
        }
    }

    /// Not complete yet; come back after `delay`.
    #[must_use]
    pub fn retry_after(operation: Operation, delay: Duration) -> Self {
        Self {
            operation,
            delay,
            error: None,
        }
    }

    /// Terminal failure.
    #[must_use]
    pub fn failed(operation: Operation, error: OpflowError) -> Self {
        Self {
            operation,
            delay: Duration::ZERO,
            error: Some(error),
        }
    }

    /// Attaches an error, keeping the delay.
    #[must_use]
    pub fn with_error(mut self, error: OpflowError) -> Self {
        self.error = Some(error);
        self
    }

    /// Returns true when the caller may proceed.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.delay.is_zero() && self.error.is_none()
    }

    /// Returns true when the caller must re-attempt later.
    #[must_use]
    pub fn needs_retry(&self) -> bool {
        !self.delay.is_zero()
    }

    /// Returns true for a terminal failure.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.delay.is_zero() && self.error.is_some()
    }

    /// Splits the outcome into its parts.
    #[must_use]
    pub fn into_parts(self) -> (Operation, Duration, Option<OpflowError>) {
        (self.operation, self.delay, self.error)
    }
}
