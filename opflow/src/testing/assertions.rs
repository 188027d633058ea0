//! Test assertions for operations.

use crate::core::{Operation, OperationState};

/// Asserts that the operation is in `expected` state.
pub fn assert_operation_state(operation: &Operation, expected: OperationState) {
    assert_eq!(
        operation.state, expected,
        "Expected operation {} to be {}, got {} ({})",
        operation.id, expected, operation.state, operation.description
    );
}

/// Asserts that the operation succeeded.
pub fn assert_operation_succeeded(operation: &Operation) {
    assert_operation_state(operation, OperationState::Succeeded);
}

/// Asserts that the operation failed and recorded a last error.
pub fn assert_operation_failed(operation: &Operation) {
    assert_operation_state(operation, OperationState::Failed);
    assert!(
        operation.last_error.is_some(),
        "Expected failed operation {} to carry a last error",
        operation.id
    );
}

/// Asserts the exact list of finished stages, in order.
pub fn assert_finished_stages(operation: &Operation, expected: &[&str]) {
    let actual: Vec<&str> = operation.finished_stages().iter().map(String::as_str).collect();
    assert_eq!(actual, expected, "Unexpected finished stages for operation {}", operation.id);
}
