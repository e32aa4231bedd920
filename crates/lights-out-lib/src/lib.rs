//! Lights-out orchestration library
//!
//! This crate provides the core functionality for:
//! - Tag-based resource discovery and identity parsing
//! - Work-window evaluation
//! - Per-family resource handlers behind a string-keyed registry
//! - Priority-ordered start/stop/status runs with per-resource failure isolation
//! - Health checks and observability

pub mod config;
pub mod control_plane;
pub mod discovery;
pub mod error;
pub mod handlers;
pub mod health;
pub mod invocation;
pub mod models;
pub mod observability;
pub mod orchestrator;
pub mod runner;
pub mod scheduler;

pub use config::LightsOutConfig;
pub use control_plane::{ControlPlane, InMemoryControlPlane};
pub use discovery::{create_discovery, ResourceDiscovery, TagDiscovery};
pub use error::{
    ConfigError, ControlPlaneError, DiscoveryError, HandlerError, InvocationError, SchedulerError,
};
pub use handlers::{HandlerRegistry, ResourceHandler};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use invocation::{InvocationResponse, Invoker};
pub use models::*;
pub use observability::{OrchestratorMetrics, StructuredLogger};
pub use orchestrator::Orchestrator;
pub use runner::ScheduleRunner;
pub use scheduler::WorkScheduler;
