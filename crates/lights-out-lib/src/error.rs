//! Error types for each orchestration layer

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the resource control plane
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ControlPlaneError {
    #[error("{kind} {id} not found")]
    NotFound { kind: String, id: String },

    #[error("request throttled: {0}")]
    Throttled(String),

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("transport error: {0}")]
    Transport(String),
}

impl ControlPlaneError {
    /// The control plane itself misbehaved, as opposed to a missing resource
    pub fn is_outage(&self) -> bool {
        !matches!(self, ControlPlaneError::NotFound { .. })
    }
}

/// Failure of the discovery precondition; aborts the whole run
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("resource query failed: {0}")]
    Query(#[from] ControlPlaneError),

    #[error("pagination did not advance past token {0}")]
    Pagination(String),
}

/// Operation error raised inside a resource handler
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    ControlPlane(#[from] ControlPlaneError),

    #[error("resource {resource_id} did not stabilize within {}s ({attempts} attempts)", .timeout.as_secs())]
    StabilizationTimeout {
        resource_id: String,
        timeout: Duration,
        attempts: u32,
    },

    #[error("invalid identifier for {resource_type}: {identifier}")]
    InvalidIdentifier {
        resource_type: String,
        identifier: String,
    },
}

impl HandlerError {
    pub fn is_control_plane_outage(&self) -> bool {
        matches!(self, HandlerError::ControlPlane(e) if e.is_outage())
    }
}

/// Work-window scheduler construction errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("invalid timezone specified: {0}")]
    UnknownTimezone(String),

    #[error("work start {start} must be before work end {end}")]
    InvalidWorkHours { start: String, end: String },

    #[error("invalid work day {0}, expected 0 (Monday) through 6 (Sunday)")]
    InvalidWorkDay(u8),

    #[error("invalid time of day '{0}', expected HH:MM")]
    InvalidTimeOfDay(String),
}

/// Configuration loading and validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("configuration validation failed: {0}")]
    Invalid(String),
}

/// Top-level failures of one invocation
#[derive(Debug, Error)]
pub enum InvocationError {
    #[error("Invalid action '{0}'. Valid actions: start, stop, status, discover")]
    InvalidAction(String),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
}

impl InvocationError {
    /// HTTP-equivalent status code for this failure
    pub fn status_code(&self) -> u16 {
        match self {
            InvocationError::InvalidAction(_) => 400,
            InvocationError::Discovery(_) => 500,
        }
    }
}
