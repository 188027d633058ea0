//! Core domain model types for opflow.
//!
//! This module contains the persisted operation entity and its vocabulary:
//! - Operation type and state enums
//! - The operation itself with its append-only progress lists
//! - Diagnostic events and last-error details
//! - The outcome triple returned by steps and the manager
//! - Runtime state derivation

mod event;
mod operation;
mod outcome;
mod runtime_state;
mod status;

pub use event::OperationEvent;
pub use operation::{Component, InputSnapshot, LastError, Operation};
pub use outcome::OperationOutcome;
pub use runtime_state::RuntimeState;
pub use status::{OperationState, OperationType};
