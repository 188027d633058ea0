//! Testing utilities for opflow pipelines.
//!
//! This module provides:
//! - Scripted steps and counting executors
//! - Fault-injecting storage
//! - Operation fixtures and assertions

mod assertions;
mod fixtures;
mod mocks;
mod storage;

pub use assertions::{
    assert_finished_stages, assert_operation_failed, assert_operation_state,
    assert_operation_succeeded,
};
pub use fixtures::{test_manager, OperationFixture};
pub use mocks::{CountingExecutor, ScriptedStep, StepAction};
pub use storage::FlakyStorage;
