//! Resource handlers
//!
//! A handler is bound to one discovered resource and implements status,
//! start, stop and readiness against the control plane. Start and stop never
//! return errors: every operation error is folded into a failed
//! [`HandlerResult`] at the handler boundary.

mod compute_instance;
mod container_service;
mod managed_database;
mod registry;
mod scaling_group;

pub use compute_instance::ComputeInstanceHandler;
pub use container_service::ContainerServiceHandler;
pub use managed_database::ManagedDatabaseHandler;
pub use registry::{HandlerFactory, HandlerRegistry};
pub use scaling_group::ScalingGroupHandler;

use crate::config::{LightsOutConfig, ResourceDefaults};
use crate::control_plane::ControlPlane;
use crate::error::HandlerError;
use crate::models::{Action, DiscoveredResource, HandlerResult, ResourceStatus};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

pub use async_trait::async_trait;

/// Default upper bound on a stabilization wait
pub const DEFAULT_STABLE_TIMEOUT_SECS: u64 = 300;

/// Default fixed interval between readiness polls
pub const DEFAULT_STABLE_POLL_INTERVAL_MS: u64 = 15_000;

/// Everything a handler constructor receives
#[derive(Clone)]
pub struct HandlerContext {
    pub resource: DiscoveredResource,
    pub config: Arc<LightsOutConfig>,
    pub control_plane: Arc<dyn ControlPlane>,
}

impl HandlerContext {
    /// Options configured for this resource's type
    pub fn defaults(&self) -> ResourceDefaults {
        self.config.defaults_for(&self.resource.resource_type)
    }
}

/// Per-type lifecycle operations on one resource
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    /// The resource this handler is bound to
    fn resource(&self) -> &DiscoveredResource;

    /// Read current state without mutating anything
    async fn get_status(&self) -> Result<ResourceStatus, HandlerError>;

    /// Bring the resource to its running state; idempotent
    async fn start(&self) -> HandlerResult;

    /// Bring the resource to its stopped state; idempotent
    async fn stop(&self) -> HandlerResult;

    /// True when observed state matches desired state; false on query failure
    async fn is_ready(&self) -> bool;
}

/// Stabilization wait options read from resource defaults
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StabilizationSettings {
    pub wait_for_stable: bool,
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for StabilizationSettings {
    fn default() -> Self {
        Self {
            wait_for_stable: false,
            timeout: Duration::from_secs(DEFAULT_STABLE_TIMEOUT_SECS),
            poll_interval: Duration::from_millis(DEFAULT_STABLE_POLL_INTERVAL_MS),
        }
    }
}

impl StabilizationSettings {
    pub fn from_defaults(defaults: &ResourceDefaults) -> Self {
        let fallback = Self::default();
        Self {
            wait_for_stable: defaults
                .get_bool("wait_for_stable")
                .unwrap_or(fallback.wait_for_stable),
            timeout: defaults
                .get_u64("stable_timeout_seconds")
                .map(Duration::from_secs)
                .unwrap_or(fallback.timeout),
            poll_interval: defaults
                .get_u64("stable_poll_interval_ms")
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(fallback.poll_interval),
        }
    }

    /// Readiness checks allowed within the timeout, at least one
    pub fn attempts(&self) -> u32 {
        let attempts = self.timeout.as_millis() / self.poll_interval.as_millis().max(1);
        u32::try_from(attempts).unwrap_or(u32::MAX).max(1)
    }
}

/// Poll `is_ready` at a fixed interval until it holds or attempts run out
pub async fn wait_for_stable<H>(
    handler: &H,
    settings: &StabilizationSettings,
) -> Result<(), HandlerError>
where
    H: ResourceHandler + ?Sized,
{
    let attempts = settings.attempts();
    let resource_id = &handler.resource().resource_id;

    for attempt in 1..=attempts {
        if handler.is_ready().await {
            debug!(resource_id = %resource_id, attempt, "Resource stabilized");
            return Ok(());
        }
        if attempt < attempts {
            tokio::time::sleep(settings.poll_interval).await;
        }
    }

    Err(HandlerError::StabilizationTimeout {
        resource_id: resource_id.clone(),
        timeout: settings.timeout,
        attempts,
    })
}

/// Fold the outcome of a start or stop into a result, logging failures
pub(crate) fn finish(
    action: Action,
    resource: &DiscoveredResource,
    outcome: Result<HandlerResult, HandlerError>,
) -> HandlerResult {
    match outcome {
        Ok(result) => {
            info!(
                action = %action,
                resource_type = %resource.resource_type,
                resource_id = %resource.resource_id,
                message = %result.message,
                "Handler operation completed"
            );
            result
        }
        Err(e) => {
            error!(
                action = %action,
                resource_type = %resource.resource_type,
                resource_id = %resource.resource_id,
                error = %e,
                "Handler operation failed"
            );
            let message = match action {
                Action::Start => "Start operation failed",
                Action::Stop => "Stop operation failed",
                _ => "Operation failed",
            };
            HandlerResult::from_error(action, resource, message, &e)
        }
    }
}
