//! Step trait and implementations.
//!
//! Steps are the units of work a pipeline runs in order. A step receives
//! the current operation and answers with an [`OperationOutcome`]:
//!
//! * zero delay and no error: the step is complete;
//! * non-zero delay: not complete yet, run it again after the delay;
//! * an error: the operation cannot proceed.
//!
//! Steps are re-invoked after every redelivery, so they must be idempotent.
//! Steps that change operation state hold their own
//! [`OperationManager`](crate::manager::OperationManager).

mod region;

pub use region::RegionCheckStep;

use crate::core::{Operation, OperationOutcome};
use async_trait::async_trait;
use std::fmt::Debug;
use std::future::Future;
use std::marker::PhantomData;

/// Trait for pipeline steps.
#[async_trait]
pub trait Step: Send + Sync + Debug {
    /// Returns the name of the step, unique within its pipeline.
    fn name(&self) -> &str;

    /// Runs the step against the current operation.
    ///
    /// Logging goes to the `step` span the pipeline opens around this call.
    async fn run(&self, operation: Operation) -> OperationOutcome;
}

/// An async function-based step.
pub struct FnStep<F, Fut>
where
    F: Fn(Operation) -> Fut + Send + Sync,
    Fut: Future<Output = OperationOutcome> + Send,
{
    name: String,
    func: F,
    _phantom: PhantomData<fn() -> Fut>,
}

impl<F, Fut> FnStep<F, Fut>
where
    F: Fn(Operation) -> Fut + Send + Sync,
    Fut: Future<Output = OperationOutcome> + Send,
{
    /// Creates a new function-based step.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
            _phantom: PhantomData,
        }
    }
}

impl<F, Fut> Debug for FnStep<F, Fut>
where
    F: Fn(Operation) -> Fut + Send + Sync,
    Fut: Future<Output = OperationOutcome> + Send,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStep").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F, Fut> Step for FnStep<F, Fut>
where
    F: Fn(Operation) -> Fut + Send + Sync,
    Fut: Future<Output = OperationOutcome> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, operation: Operation) -> OperationOutcome {
        (self.func)(operation).await
    }
}

/// A step that completes immediately.
#[derive(Debug, Clone)]
pub struct NoOpStep {
    name: String,
}

impl NoOpStep {
    /// Creates a new no-op step.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Step for NoOpStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, operation: Operation) -> OperationOutcome {
        OperationOutcome::done(operation)
    }
}
