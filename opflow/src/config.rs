//! Engine configuration.
//!
//! Everything the manager, the queue and the steps look up at runtime is
//! passed in explicitly from an [`EngineConfig`]; nothing is read from
//! process-wide state.

use crate::errors::OpflowError;
use crate::manager::ManagerConfig;
use crate::observability::LoggingConfig;
use crate::queue::QueueConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// A service plan known to the steps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanEntry {
    /// Human-readable plan name.
    pub name: String,
    /// Regions the plan may be provisioned in. Empty means any region.
    #[serde(default)]
    pub regions: Vec<String>,
}

/// Plan and region lookup tables used by steps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    /// Plans keyed by plan id.
    #[serde(default)]
    pub plans: HashMap<String, PlanEntry>,
}

impl Catalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a plan.
    #[must_use]
    pub fn with_plan(
        mut self,
        plan_id: impl Into<String>,
        name: impl Into<String>,
        regions: &[&str],
    ) -> Self {
        self.plans.insert(
            plan_id.into(),
            PlanEntry {
                name: name.into(),
                regions: regions.iter().map(|r| (*r).to_string()).collect(),
            },
        );
        self
    }

    /// Resolves a plan id to its name.
    #[must_use]
    pub fn plan_name(&self, plan_id: &str) -> Option<&str> {
        self.plans.get(plan_id).map(|p| p.name.as_str())
    }

    /// Returns true if `region` may be used with `plan_id`.
    ///
    /// Unknown plans support no region.
    #[must_use]
    pub fn is_region_supported(&self, plan_id: &str, region: &str) -> bool {
        self.plans
            .get(plan_id)
            .is_some_and(|p| p.regions.is_empty() || p.regions.iter().any(|r| r == region))
    }
}

/// Top-level configuration of an engine process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Operation manager settings.
    #[serde(default)]
    pub manager: ManagerConfig,
    /// Work queue settings.
    #[serde(default)]
    pub queue: QueueConfig,
    /// Plan and region tables.
    #[serde(default)]
    pub catalog: Catalog,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses and validates a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, OpflowError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, OpflowError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Sets the catalog.
    #[must_use]
    pub fn with_catalog(mut self, catalog: Catalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Sets the queue settings.
    #[must_use]
    pub fn with_queue(mut self, queue: QueueConfig) -> Self {
        self.queue = queue;
        self
    }

    /// Rejects settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), OpflowError> {
        if self.queue.workers == 0 {
            return Err(OpflowError::Config("queue.workers must be at least 1".to_string()));
        }
        if self.queue.speed_factor == 0 {
            return Err(OpflowError::Config("queue.speed_factor must be at least 1".to_string()));
        }
        if self.manager.storage_retry_backoff_ms == 0 {
            return Err(OpflowError::Config(
                "manager.storage_retry_backoff_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
