//! Pipeline building and execution.
//!
//! This module provides:
//! - Pipeline builder with validation
//! - The resumable step executor
//! - The per-type pipeline registry
//! - The queue executor that loads and dispatches operations

mod builder;
mod executor;
mod processor;
mod registry;


pub use builder::PipelineBuilder;
pub use executor::StepPipeline;
pub use processor::OperationProcessor;
pub use registry::PipelineRegistry;
