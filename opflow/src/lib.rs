//! # Opflow
//!
//! A durable, resumable operation execution engine for managed cluster
//! runtimes.
//!
//! Every provision, deprovision, update, upgrade, suspension or unsuspension
//! request is one persisted [`Operation`](core::Operation) driven to a
//! terminal state by:
//!
//! - **Step pipelines**: ordered, idempotent steps per operation type that
//!   resume after the last finished step
//! - **The operation manager**: the only writer of operation state, with
//!   bounded fatal and non-fatal retries
//! - **Optimistic concurrency**: versioned writes with reload-merge-retry on
//!   conflict
//! - **A work queue**: idempotent enqueue and timer-based delayed redelivery
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use opflow::prelude::*;
//!
//! let storage: Arc<dyn OperationStorage> = Arc::new(InMemoryOperationStorage::new());
//! let manager = OperationManager::new(storage.clone(), "processing", Component::Engine);
//!
//! let provision = PipelineBuilder::new("provision")
//!     .step(Arc::new(NoOpStep::new("init")))?
//!     .step(Arc::new(RegionCheckStep::new(
//!         Arc::new(Catalog::new().with_plan("standard", "standard", &["eu-west-1"])),
//!         manager.for_step(RegionCheckStep::NAME, Component::Engine),
//!     )))?
//!     .build(manager.clone())?;
//! let registry = PipelineRegistry::new().with_pipeline(OperationType::Provision, provision)?;
//!
//! let queue = WorkQueue::new(QueueConfig::new());
//! queue.start(Arc::new(OperationProcessor::new(Arc::new(registry), manager)));
//! requeue_unfinished(storage.as_ref(), &queue, &OperationType::ALL).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod lineage;
pub mod manager;
pub mod observability;
pub mod pipeline;
pub mod queue;
pub mod recovery;
pub mod steps;
pub mod storage;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use std::sync::Arc;

    pub use crate::config::{Catalog, EngineConfig};
    pub use crate::core::{
        Component, InputSnapshot, LastError, Operation, OperationOutcome, OperationState,
        OperationType, RuntimeState,
    };
    pub use crate::errors::{OpflowError, PipelineValidationError, StorageError};
    pub use crate::events::{EventSink, ManagerEvent, ManagerEventKind, NoOpEventSink};
    pub use crate::manager::{ManagerConfig, OperationManager};
    pub use crate::observability::{init_tracing, LoggingConfig};
    pub use crate::pipeline::{OperationProcessor, PipelineBuilder, PipelineRegistry, StepPipeline};
    pub use crate::queue::{Executor, Queue, QueueConfig, WorkQueue};
    pub use crate::recovery::requeue_unfinished;
    pub use crate::steps::{FnStep, NoOpStep, RegionCheckStep, Step};
    pub use crate::storage::{InMemoryOperationStorage, OperationStorage};
    pub use crate::utils::{generate_uuid, now_utc, Timestamp};
}
