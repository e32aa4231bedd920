//! Core data models for lights-out orchestration

use crate::error::{HandlerError, InvocationError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

/// Priority assigned when a resource carries no usable priority tag
pub const DEFAULT_PRIORITY: u32 = 50;

/// Schedule cohort assigned when a resource carries no group tag
pub const DEFAULT_GROUP: &str = "default";

/// Tag carrying the resource priority
pub const PRIORITY_TAG: &str = "lights-out:priority";

/// Tag carrying the resource schedule group
pub const GROUP_TAG: &str = "lights-out:group";

/// Resource type names, derived from control-plane identifiers
pub mod resource_types {
    pub const ECS_SERVICE: &str = "ecs-service";
    pub const EC2_INSTANCE: &str = "ec2-instance";
    pub const RDS_DB: &str = "rds-db";
    pub const RDS_CLUSTER: &str = "rds-cluster";
    pub const AUTOSCALING_GROUP: &str = "autoscaling-autoScalingGroup";
    pub const UNKNOWN: &str = "unknown";
}

/// Operation requested from the orchestration core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Start,
    Stop,
    Status,
    Discover,
}

impl Action {
    pub const ALL: [Action; 4] = [Action::Start, Action::Stop, Action::Status, Action::Discover];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Start => "start",
            Action::Stop => "stop",
            Action::Status => "status",
            Action::Discover => "discover",
        }
    }

    /// Returns true for actions that may change resource state
    pub fn is_mutating(&self) -> bool {
        matches!(self, Action::Start | Action::Stop)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = InvocationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .iter()
            .copied()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| InvocationError::InvalidAction(s.to_string()))
    }
}

/// A cloud resource in scope for management during one run
///
/// Built fresh by discovery on every invocation and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredResource {
    /// Resource family discriminator, e.g. "ecs-service"
    pub resource_type: String,
    /// Canonical identity string of the resource
    pub arn: String,
    /// Short human-readable identifier derived from the arn
    pub resource_id: String,
    /// Lower values are more foundational (started first, stopped last)
    pub priority: u32,
    /// Named schedule cohort
    pub group: String,
    pub tags: HashMap<String, String>,
    /// Family-specific data consumed only by the matching handler
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl DiscoveredResource {
    pub fn new(
        resource_type: impl Into<String>,
        arn: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            arn: arn.into(),
            resource_id: resource_id.into(),
            priority: DEFAULT_PRIORITY,
            group: DEFAULT_GROUP.to_string(),
            tags: HashMap::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Look up a tag value
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// Look up a string metadata entry
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }
}

/// Snapshot of a resource's state as reported by the control plane
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceStatus {
    /// Family-specific state name ("ACTIVE", "running", "available", ...)
    pub state: String,
    pub is_stopped: bool,
    /// Family-specific fields such as desired/running counts
    #[serde(flatten)]
    pub details: serde_json::Map<String, Value>,
}

impl ResourceStatus {
    pub fn new(state: impl Into<String>, is_stopped: bool) -> Self {
        Self {
            state: state.into(),
            is_stopped,
            details: serde_json::Map::new(),
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    pub fn detail_u64(&self, key: &str) -> Option<u64> {
        self.details.get(key).and_then(Value::as_u64)
    }
}

/// Outcome of one operation on one resource
///
/// A failed result always carries a non-empty error; a successful one never does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerResult {
    pub success: bool,
    pub action: Action,
    pub resource_type: String,
    pub resource_id: String,
    pub message: String,
    /// Status captured before any mutating call
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_state: Option<ResourceStatus>,
    /// Status reported by a read-only status query
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_state: Option<ResourceStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub dry_run: bool,
    /// The failure came from a control plane outage rather than the resource
    #[serde(skip)]
    pub control_plane_fault: bool,
}

impl HandlerResult {
    pub fn succeeded(
        action: Action,
        resource: &DiscoveredResource,
        message: impl Into<String>,
        previous_state: Option<ResourceStatus>,
    ) -> Self {
        Self {
            success: true,
            action,
            resource_type: resource.resource_type.clone(),
            resource_id: resource.resource_id.clone(),
            message: message.into(),
            previous_state,
            current_state: None,
            error: None,
            dry_run: false,
            control_plane_fault: false,
        }
    }

    pub fn failed(
        action: Action,
        resource: &DiscoveredResource,
        message: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        let mut error = error.into();
        if error.is_empty() {
            error = "unknown error".to_string();
        }

        Self {
            success: false,
            action,
            resource_type: resource.resource_type.clone(),
            resource_id: resource.resource_id.clone(),
            message: message.into(),
            previous_state: None,
            current_state: None,
            error: Some(error),
            dry_run: false,
            control_plane_fault: false,
        }
    }

    /// Result of a successful read-only status query
    pub fn status(resource: &DiscoveredResource, status: ResourceStatus) -> Self {
        let message = format!("Resource is {}", status.state);
        Self {
            current_state: Some(status),
            ..Self::succeeded(Action::Status, resource, message, None)
        }
    }

    pub fn with_previous_state(mut self, previous_state: Option<ResourceStatus>) -> Self {
        self.previous_state = previous_state;
        self
    }

    /// Failed result for a handler error, flagging control plane outages
    pub fn from_error(
        action: Action,
        resource: &DiscoveredResource,
        message: impl Into<String>,
        error: &HandlerError,
    ) -> Self {
        Self {
            control_plane_fault: error.is_control_plane_outage(),
            ..Self::failed(action, resource, message, error.to_string())
        }
    }

    pub fn as_dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }
}

/// Aggregated result of one orchestration run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationSummary {
    pub action: Action,
    /// Resources returned by discovery
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Resources without an active schedule; neither succeeded nor failed
    pub skipped: usize,
    /// Per-resource outcomes in processing order
    pub results: Vec<HandlerResult>,
}

impl OrchestrationSummary {
    pub fn new(action: Action, total: usize) -> Self {
        Self {
            action,
            total,
            succeeded: 0,
            failed: 0,
            skipped: 0,
            results: Vec::new(),
        }
    }

    /// Record one per-resource outcome
    pub fn record(&mut self, result: HandlerResult) {
        if result.success {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        self.results.push(result);
    }

    pub fn record_skip(&mut self) {
        self.skipped += 1;
    }

    pub fn is_complete(&self) -> bool {
        self.succeeded + self.failed + self.skipped == self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource() -> DiscoveredResource {
        DiscoveredResource::new(
            "ecs-service",
            "arn:aws:ecs:us-east-1:123456789012:service/cluster/api",
            "cluster/api",
        )
    }

    #[test]
    fn test_action_parsing() {
        assert_eq!("start".parse::<Action>().unwrap(), Action::Start);
        assert_eq!("discover".parse::<Action>().unwrap(), Action::Discover);
        assert!("restart".parse::<Action>().is_err());
        assert!("STOP".parse::<Action>().is_err());
    }

    #[test]
    fn test_resource_defaults() {
        let r = resource();
        assert_eq!(r.priority, DEFAULT_PRIORITY);
        assert_eq!(r.group, DEFAULT_GROUP);
        assert!(r.tags.is_empty());
        assert!(r.metadata.is_empty());
    }

    #[test]
    fn test_failed_result_always_has_error() {
        let result = HandlerResult::failed(Action::Stop, &resource(), "Stop failed", "");
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("unknown error"));

        let ok = HandlerResult::succeeded(Action::Stop, &resource(), "done", None);
        assert!(ok.success);
        assert!(ok.error.is_none());
    }

    #[test]
    fn test_summary_accounting() {
        let r = resource();
        let mut summary = OrchestrationSummary::new(Action::Stop, 3);
        summary.record(HandlerResult::succeeded(Action::Stop, &r, "ok", None));
        summary.record(HandlerResult::failed(Action::Stop, &r, "no", "boom"));
        assert!(!summary.is_complete());
        summary.record_skip();
        assert!(summary.is_complete());
        assert_eq!(summary.succeeded + summary.failed, 2);
    }

    #[test]
    fn test_status_serialization_flattens_details() {
        let status = ResourceStatus::new("ACTIVE", false)
            .with_detail("desired_count", 2)
            .with_detail("running_count", 1);
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["desired_count"], 2);
        assert_eq!(json["is_stopped"], false);
        assert_eq!(status.detail_u64("running_count"), Some(1));
    }
}
