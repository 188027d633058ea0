//! Pipeline builder with validation.

use super::StepPipeline;
use crate::errors::PipelineValidationError;
use crate::manager::OperationManager;
use crate::steps::Step;
use std::sync::Arc;

/// Builder for creating validated pipelines.
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    /// The pipeline name.
    name: String,
    /// The steps, in execution order.
    steps: Vec<Arc<dyn Step>>,
}

impl PipelineBuilder {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// Appends a step.
    ///
    /// # Errors
    ///
    /// Returns an error if a step with the same name was already added;
    /// completed steps are tracked by name, so names must be unique.
    pub fn step(mut self, step: Arc<dyn Step>) -> Result<Self, PipelineValidationError> {
        if self.steps.iter().any(|s| s.name() == step.name()) {
            return Err(PipelineValidationError::duplicate_step(&self.name, step.name()));
        }
        self.steps.push(step);
        Ok(self)
    }

    /// Returns the number of steps added so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if no step was added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Builds the pipeline. `manager` persists progress between steps.
    ///
    /// # Errors
    ///
    /// Returns an error if the pipeline has no steps.
    pub fn build(self, manager: OperationManager) -> Result<StepPipeline, PipelineValidationError> {
        if self.steps.is_empty() {
            return Err(PipelineValidationError::empty(&self.name));
        }
        Ok(StepPipeline::new(self.name, self.steps, manager))
    }
}
