//! Plan/region compatibility check.

use super::Step;
use crate::config::Catalog;
use crate::core::{Operation, OperationOutcome};
use crate::manager::OperationManager;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Fails the operation when its requested region is not offered for its plan.
///
/// Operations without a requested region pass.
#[derive(Debug, Clone)]
pub struct RegionCheckStep {
    catalog: Arc<Catalog>,
    manager: OperationManager,
}

impl RegionCheckStep {
    /// Step name used in `finished_stages`.
    pub const NAME: &'static str = "check_region";

    /// Creates the step; `manager` should be bound to [`Self::NAME`].
    #[must_use]
    pub fn new(catalog: Arc<Catalog>, manager: OperationManager) -> Self {
        Self { catalog, manager }
    }
}

#[async_trait]
impl Step for RegionCheckStep {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn run(&self, operation: Operation) -> OperationOutcome {
        let Some(region) = operation.input().region.clone() else {
            return OperationOutcome::done(operation);
        };
        let plan_id = operation.input().plan_id.clone();
        if self.catalog.is_region_supported(&plan_id, &region) {
            debug!(plan_id = %plan_id, region = %region, "region supported");
            return OperationOutcome::done(operation);
        }

        let plan = self.catalog.plan_name(&plan_id).unwrap_or(&plan_id);
        let description = format!("region {region} is not supported for plan {plan}");
        self.manager.operation_failed(operation, &description, None).await
    }
}
