//! Action/response contract
//!
//! Validates the requested action, runs it and shapes the response body.
//! Only an invalid action (400) and a discovery failure (500) produce a
//! non-200 response; per-resource failures are reported inside the body.

use crate::error::InvocationError;
use crate::models::{Action, DiscoveredResource, HandlerResult};
use crate::orchestrator::Orchestrator;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Action used when a request names none
pub const DEFAULT_ACTION: Action = Action::Status;

/// Successful start/stop/status response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResponse {
    pub action: Action,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    #[serde(default)]
    pub dry_run: bool,
    pub results: Vec<HandlerResult>,
    pub timestamp: String,
    pub request_id: String,
}

/// One resource as reported by the discover action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredResourceView {
    pub resource_type: String,
    pub resource_id: String,
    pub arn: String,
    pub priority: u32,
    pub group: String,
}

impl From<&DiscoveredResource> for DiscoveredResourceView {
    fn from(r: &DiscoveredResource) -> Self {
        Self {
            resource_type: r.resource_type.clone(),
            resource_id: r.resource_id.clone(),
            arn: r.arn.clone(),
            priority: r.priority,
            group: r.group.clone(),
        }
    }
}

/// Successful discover response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoverResponse {
    pub action: Action,
    pub discovered_count: usize,
    pub resources: Vec<DiscoveredResourceView>,
    pub timestamp: String,
    pub request_id: String,
}

/// Top-level failure response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    pub error: String,
    pub timestamp: String,
    pub request_id: String,
}

/// Status code plus JSON body, independent of any transport
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationResponse {
    pub status_code: u16,
    pub body: Value,
}

impl InvocationResponse {
    pub fn is_success(&self) -> bool {
        self.status_code == 200
    }
}

/// Parse a requested action; a missing action means status
pub fn parse_action(action: Option<&str>) -> Result<Action, InvocationError> {
    match action {
        None => Ok(DEFAULT_ACTION),
        Some(raw) => raw.parse(),
    }
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Runs actions against an orchestrator and builds responses
#[derive(Clone)]
pub struct Invoker {
    orchestrator: Arc<Orchestrator>,
}

impl Invoker {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Handle one request end to end; never fails
    pub async fn handle(&self, action: Option<&str>, request_id: &str) -> InvocationResponse {
        info!(action = ?action, request_id = %request_id, "Invocation received");

        let outcome = match parse_action(action) {
            Ok(action) => self.invoke(action, request_id).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(body) => InvocationResponse {
                status_code: 200,
                body,
            },
            Err(e) => {
                let status_code = e.status_code();
                if status_code >= 500 {
                    error!(request_id = %request_id, error = %e, "Invocation failed");
                } else {
                    warn!(request_id = %request_id, error = %e, "Invalid invocation");
                }
                let body = ErrorResponse {
                    action: Some(action.unwrap_or(DEFAULT_ACTION.as_str()).to_string()),
                    error: e.to_string(),
                    timestamp: timestamp(),
                    request_id: request_id.to_string(),
                };
                InvocationResponse {
                    status_code,
                    body: to_value(&body),
                }
            }
        }
    }

    /// Run a validated action and return the success body
    pub async fn invoke(&self, action: Action, request_id: &str) -> Result<Value, InvocationError> {
        if action == Action::Discover {
            let resources = self.orchestrator.discover_resources().await?;
            let response = DiscoverResponse {
                action,
                discovered_count: resources.len(),
                resources: resources.iter().map(DiscoveredResourceView::from).collect(),
                timestamp: timestamp(),
                request_id: request_id.to_string(),
            };
            return Ok(to_value(&response));
        }

        let summary = self.orchestrator.run(action, request_id).await?;
        let response = RunResponse {
            action,
            total: summary.total,
            succeeded: summary.succeeded,
            failed: summary.failed,
            skipped: summary.skipped,
            dry_run: self.orchestrator.is_dry_run() && action.is_mutating(),
            results: summary.results,
            timestamp: timestamp(),
            request_id: request_id.to_string(),
        };
        Ok(to_value(&response))
    }
}

fn to_value<T: Serialize>(body: &T) -> Value {
    serde_json::to_value(body).unwrap_or_else(|e| {
        error!(error = %e, "Failed to serialize response body");
        Value::Null
    })
}
