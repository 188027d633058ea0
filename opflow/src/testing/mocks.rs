//! Mock steps and executors for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use crate::core::{Operation, OperationOutcome};
use crate::errors::OpflowError;
use crate::queue::Executor;
use crate::steps::Step;

/// What a [`ScriptedStep`] does on one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepAction {
    /// Complete the step.
    Complete,
    /// Ask to be invoked again after the delay.
    Delay(Duration),
    /// Return a bare error without touching the operation state.
    Fail(String),
}

/// A step that plays back a script of actions and counts its invocations.
///
/// Once the script is exhausted the step completes.
#[derive(Debug)]
pub struct ScriptedStep {
    name: String,
    script: Mutex<VecDeque<StepAction>>,
    calls: Mutex<usize>,
}

impl ScriptedStep {
    /// Creates a step that always completes.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            script: Mutex::new(VecDeque::new()),
            calls: Mutex::new(0),
        }
    }

    /// Appends an action to the script.
    #[must_use]
    pub fn then(self, action: StepAction) -> Self {
        self.script.lock().push_back(action);
        self
    }

    /// Appends `times` delays of `delay`.
    #[must_use]
    pub fn then_delay(self, delay: Duration, times: usize) -> Self {
        (0..times).fold(self, |step, _| step.then(StepAction::Delay(delay)))
    }

    /// Returns the number of invocations.
    #[must_use]
    pub fn call_count(&self) -> usize {
        *self.calls.lock()
    }
}

#[async_trait]
impl Step for ScriptedStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, operation: Operation) -> OperationOutcome {
        *self.calls.lock() += 1;
        let action = self.script.lock().pop_front().unwrap_or(StepAction::Complete);
        match action {
            StepAction::Complete => OperationOutcome::done(operation),
            StepAction::Delay(delay) => OperationOutcome::retry_after(operation, delay),
            StepAction::Fail(message) => {
                OperationOutcome::failed(operation, OpflowError::operation_failed(message, None))
            }
        }
    }
}

/// Wraps an executor and counts deliveries per operation id.
pub struct CountingExecutor {
    inner: Arc<dyn Executor>,
    calls: Mutex<HashMap<String, usize>>,
}

impl std::fmt::Debug for CountingExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CountingExecutor")
            .field("calls", &*self.calls.lock())
            .finish_non_exhaustive()
    }
}

impl CountingExecutor {
    /// Wraps `inner`.
    #[must_use]
    pub fn new(inner: Arc<dyn Executor>) -> Self {
        Self {
            inner,
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Deliveries of `operation_id` so far.
    #[must_use]
    pub fn calls_for(&self, operation_id: &str) -> usize {
        self.calls.lock().get(operation_id).copied().unwrap_or(0)
    }

    /// Deliveries of all ids so far.
    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.calls.lock().values().sum()
    }
}

#[async_trait]
impl Executor for CountingExecutor {
    async fn execute(&self, operation_id: &str) -> Result<Duration, OpflowError> {
        *self.calls.lock().entry(operation_id.to_string()).or_insert(0) += 1;
        self.inner.execute(operation_id).await
    }
}
