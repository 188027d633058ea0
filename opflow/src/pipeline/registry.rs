//! Pipelines per operation type, resolved once at startup.

use super::StepPipeline;
use crate::core::OperationType;
use crate::errors::PipelineValidationError;
use std::collections::HashMap;
use std::sync::Arc;

/// Maps each operation type to the pipeline that drives it.
#[derive(Debug, Clone, Default)]
pub struct PipelineRegistry {
    pipelines: HashMap<OperationType, Arc<StepPipeline>>,
}

impl PipelineRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the pipeline for `operation_type`.
    ///
    /// # Errors
    ///
    /// Returns an error if the type already has a pipeline.
    pub fn register(
        &mut self,
        operation_type: OperationType,
        pipeline: StepPipeline,
    ) -> Result<(), PipelineValidationError> {
        if let Some(existing) = self.pipelines.get(&operation_type) {
            return Err(PipelineValidationError::new(format!(
                "operation type '{operation_type}' is already handled by pipeline '{}'",
                existing.name()
            )));
        }
        self.pipelines.insert(operation_type, Arc::new(pipeline));
        Ok(())
    }

    /// Builder-style [`register`](Self::register).
    ///
    /// # Errors
    ///
    /// Returns an error if the type already has a pipeline.
    pub fn with_pipeline(
        mut self,
        operation_type: OperationType,
        pipeline: StepPipeline,
    ) -> Result<Self, PipelineValidationError> {
        self.register(operation_type, pipeline)?;
        Ok(self)
    }

    /// The pipeline for `operation_type`, if registered.
    #[must_use]
    pub fn get(&self, operation_type: OperationType) -> Option<&Arc<StepPipeline>> {
        self.pipelines.get(&operation_type)
    }

    /// Registered operation types, in declaration order.
    #[must_use]
    pub fn operation_types(&self) -> Vec<OperationType> {
        OperationType::ALL
            .iter()
            .copied()
            .filter(|t| self.pipelines.contains_key(t))
            .collect()
    }

    /// Number of registered pipelines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }
}
