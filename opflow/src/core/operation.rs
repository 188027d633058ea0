//! The persisted operation entity.

use super::{OperationEvent, OperationState, OperationType};
use crate::utils::{generate_uuid, now_utc, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The subsystem blamed for a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    /// The engine itself.
    Engine,
    /// A dependency the engine calls (database, secrets, templates).
    EngineDependency,
    /// The cluster provisioner.
    Provisioner,
    /// The infrastructure manager driving cluster resources.
    InfrastructureManager,
    /// The lifecycle manager installing runtime components.
    LifecycleManager,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Engine => write!(f, "engine"),
            Self::EngineDependency => write!(f, "engine_dependency"),
            Self::Provisioner => write!(f, "provisioner"),
            Self::InfrastructureManager => write!(f, "infrastructure_manager"),
            Self::LifecycleManager => write!(f, "lifecycle_manager"),
        }
    }
}

/// Details of the fatal failure that ended an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastError {
    /// Short reason, the description passed when failing the operation.
    pub reason: String,
    /// The component blamed for the failure.
    pub component: Component,
    /// The step that failed the operation.
    pub step: String,
    /// The message of the underlying error, if one was given.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

/// Parameters an operation was created with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputSnapshot {
    /// Service plan identifier.
    pub plan_id: String,
    /// Requested region, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Remaining request parameters.
    #[serde(default)]
    pub parameters: serde_json::Value,
}

impl InputSnapshot {
    /// Creates a snapshot for a plan.
    #[must_use]
    pub fn new(plan_id: impl Into<String>) -> Self {
        Self {
            plan_id: plan_id.into(),
            region: None,
            parameters: serde_json::Value::Null,
        }
    }

    /// Sets the region.
    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Sets the request parameters.
    #[must_use]
    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.parameters = parameters;
        self
    }
}

/// One lifecycle action on one tenant instance.
///
/// Step progress lives in append-only lists that can only grow through
/// [`add_finished_stage`](Self::add_finished_stage) and friends, and the
/// input snapshot has no setter at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// Unique identifier, immutable.
    pub id: String,
    /// The owning tenant instance.
    pub instance_id: String,
    /// The lifecycle action.
    #[serde(rename = "type")]
    pub operation_type: OperationType,
    /// Current state.
    pub state: OperationState,
    /// Progress text, overwritten on each transition.
    pub description: String,
    /// Creation time.
    pub created_at: Timestamp,
    /// Time of the last persisted write. Refreshed by storage.
    pub updated_at: Timestamp,
    /// Optimistic concurrency counter. Owned by storage.
    pub version: u64,
    /// Set on fatal failure only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<LastError>,
    #[serde(default)]
    finished_stages: Vec<String>,
    #[serde(default)]
    executed_but_not_completed_steps: Vec<String>,
    input: InputSnapshot,
    #[serde(default)]
    events: Vec<OperationEvent>,
}

impl Operation {
    /// Creates a pending operation with a fresh id and version 0.
    #[must_use]
    pub fn new(
        instance_id: impl Into<String>,
        operation_type: OperationType,
        input: InputSnapshot,
    ) -> Self {
        Self::with_id(generate_uuid().to_string(), instance_id, operation_type, input)
    }

    /// Creates a pending operation with a caller-chosen id.
    #[must_use]
    pub fn with_id(
        id: impl Into<String>,
        instance_id: impl Into<String>,
        operation_type: OperationType,
        input: InputSnapshot,
    ) -> Self {
        let now = now_utc();
        Self {
            id: id.into(),
            instance_id: instance_id.into(),
            operation_type,
            state: OperationState::Pending,
            description: "Operation created".to_string(),
            created_at: now,
            updated_at: now,
            version: 0,
            last_error: None,
            finished_stages: Vec::new(),
            executed_but_not_completed_steps: Vec::new(),
            input,
            events: Vec::new(),
        }
    }

    /// The parameters the operation was created with.
    #[must_use]
    pub fn input(&self) -> &InputSnapshot {
        &self.input
    }

    /// Names of completed steps, in completion order.
    #[must_use]
    pub fn finished_stages(&self) -> &[String] {
        &self.finished_stages
    }

    /// Steps given up on without failing the operation.
    #[must_use]
    pub fn executed_but_not_completed_steps(&self) -> &[String] {
        &self.executed_but_not_completed_steps
    }

    /// The diagnostic event log.
    #[must_use]
    pub fn events(&self) -> &[OperationEvent] {
        &self.events
    }

    /// Returns true once the operation reached a terminal state.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.state.is_terminal()
    }

    /// Returns true if the named step already completed.
    #[must_use]
    pub fn is_stage_finished(&self, name: &str) -> bool {
        self.finished_stages.iter().any(|s| s == name)
    }

    /// Appends a completed step. Returns false if it was already recorded.
    pub fn add_finished_stage(&mut self, name: impl Into<String>) -> bool {
        push_unique(&mut self.finished_stages, name.into())
    }

    /// Appends a step whose effect was not confirmed. Returns false if already recorded.
    pub fn add_executed_but_not_completed(&mut self, name: impl Into<String>) -> bool {
        push_unique(&mut self.executed_but_not_completed_steps, name.into())
    }

    /// Appends an entry to the event log. Returns false if it was already recorded.
    pub fn record_event(&mut self, event: OperationEvent) -> bool {
        if self.events.iter().any(|e| e.same_entry(&event)) {
            return false;
        }
        self.events.push(event);
        true
    }

    /// Folds the append-only progress of `local` into `self`.
    ///
    /// `self` is the freshly reloaded copy and keeps its scalar fields;
    /// entries only `local` knows about are appended after the stored ones.
    pub fn merge_from(&mut self, local: &Self) {
        for stage in &local.finished_stages {
            push_unique(&mut self.finished_stages, stage.clone());
        }
        for step in &local.executed_but_not_completed_steps {
            push_unique(&mut self.executed_but_not_completed_steps, step.clone());
        }
        for event in &local.events {
            self.record_event(event.clone());
        }
    }

    /// Replaces the input snapshot with the stored one.
    ///
    /// Used by storage backends to keep the snapshot write-once.
    pub fn keep_input_of(&mut self, stored: &Self) {
        if self.input != stored.input {
            self.input = stored.input.clone();
        }
    }
}

fn push_unique(list: &mut Vec<String>, value: String) -> bool {
    if list.contains(&value) {
        return false;
    }
    list.push(value);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn operation() -> Operation {
        Operation::new(
            "instance-1",
            OperationType::Provision,
            InputSnapshot::new("azure").with_region("westeurope"),
        )
    }

    #[test]
    fn test_new_operation_is_pending() {
        let op = operation();
        assert_eq!(op.state, OperationState::Pending);
        assert_eq!(op.version, 0);
        assert!(op.finished_stages().is_empty());
        assert_eq!(op.input().region.as_deref(), Some("westeurope"));
        assert!(!op.is_finished());
    }

    #[test]
    fn test_add_finished_stage_is_deduplicated() {
        let mut op = operation();
        assert!(op.add_finished_stage("init"));
        assert!(op.add_finished_stage("create_cluster"));
        assert!(!op.add_finished_stage("init"));
        assert_eq!(op.finished_stages(), ["init", "create_cluster"]);
        assert!(op.is_stage_finished("init"));
        assert!(!op.is_stage_finished("wait_ready"));
    }

    #[test]
    fn test_merge_unions_append_only_fields() {
        let mut stored = operation();
        stored.add_finished_stage("init");
        stored.add_finished_stage("stepX");
        stored.description = "stored".to_string();

        let mut local = stored.clone();
        local.finished_stages.retain(|s| s != "stepX");
        local.add_finished_stage("stepY");
        local.add_executed_but_not_completed("audit_log");
        local.description = "local".to_string();

        stored.merge_from(&local);

        assert_eq!(stored.finished_stages(), ["init", "stepX", "stepY"]);
        assert_eq!(stored.executed_but_not_completed_steps(), ["audit_log"]);
        assert_eq!(stored.description, "stored");
    }

    #[test]
    fn test_merge_does_not_duplicate_events() {
        let mut stored = operation();
        let event = OperationEvent::info("started");
        assert!(stored.record_event(event.clone()));
        assert!(!stored.record_event(event.clone()));

        let mut local = stored.clone();
        local.record_event(OperationEvent::error("operation failed", "boom"));

        stored.merge_from(&local);
        stored.merge_from(&local);
        assert_eq!(stored.events().len(), 2);
        assert_eq!(stored.events()[0], event);
    }

    #[test]
    fn test_keep_input_of_restores_snapshot() {
        let stored = operation();
        let mut incoming = Operation::with_id(
            stored.id.clone(),
            "instance-1",
            OperationType::Provision,
            InputSnapshot::new("gcp"),
        );
        incoming.keep_input_of(&stored);
        assert_eq!(incoming.input().plan_id, "azure");
    }

    #[test]
    fn test_operation_serializes_type_field() {
        let json = serde_json::to_value(operation()).unwrap();
        assert_eq!(json["type"], "provision");
        assert_eq!(json["state"], "pending");
        assert_eq!(json["input"]["plan_id"], "azure");
    }
}
