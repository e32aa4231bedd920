//! Compute instance handler

use super::{
    async_trait, finish, wait_for_stable, HandlerContext, ResourceHandler, StabilizationSettings,
};
use crate::control_plane::ControlPlane;
use crate::error::{ControlPlaneError, HandlerError};
use crate::models::{Action, DiscoveredResource, HandlerResult, ResourceStatus};
use std::sync::Arc;
use tracing::debug;

const RUNNING: &str = "running";
const PENDING: &str = "pending";
const STOPPED: &str = "stopped";
const STOPPING: &str = "stopping";

pub struct ComputeInstanceHandler {
    resource: DiscoveredResource,
    stabilization: StabilizationSettings,
    control_plane: Arc<dyn ControlPlane>,
}

impl ComputeInstanceHandler {
    pub fn new(ctx: HandlerContext) -> Self {
        Self {
            stabilization: StabilizationSettings::from_defaults(&ctx.defaults()),
            resource: ctx.resource,
            control_plane: ctx.control_plane,
        }
    }

    fn instance_id(&self) -> Result<&str, HandlerError> {
        let id = self.resource.resource_id.as_str();
        if id.is_empty() || id.contains('/') {
            return Err(HandlerError::InvalidIdentifier {
                resource_type: self.resource.resource_type.clone(),
                identifier: id.to_string(),
            });
        }
        Ok(id)
    }

    async fn state(&self) -> Result<String, HandlerError> {
        let id = self.instance_id()?;
        let instance = self.control_plane.describe_instance(id).await?.ok_or_else(|| {
            HandlerError::ControlPlane(ControlPlaneError::NotFound {
                kind: "instance".to_string(),
                id: id.to_string(),
            })
        })?;
        Ok(instance.state)
    }

    async fn try_stop(&self) -> Result<HandlerResult, HandlerError> {
        let status = self.get_status().await?;
        if status.state == STOPPED || status.state == STOPPING {
            let message = format!("Instance already {}", status.state);
            return Ok(HandlerResult::succeeded(
                Action::Stop,
                &self.resource,
                message,
                Some(status),
            ));
        }

        self.control_plane.stop_instance(self.instance_id()?).await?;
        if self.stabilization.wait_for_stable {
            wait_for_stable(self, &self.stabilization).await?;
        }

        let message = format!("Instance stop initiated (was {})", status.state);
        Ok(HandlerResult::succeeded(
            Action::Stop,
            &self.resource,
            message,
            Some(status),
        ))
    }

    async fn try_start(&self) -> Result<HandlerResult, HandlerError> {
        let status = self.get_status().await?;
        if status.state == RUNNING || status.state == PENDING {
            let message = format!("Instance already {}", status.state);
            return Ok(HandlerResult::succeeded(
                Action::Start,
                &self.resource,
                message,
                Some(status),
            ));
        }

        self.control_plane.start_instance(self.instance_id()?).await?;
        if self.stabilization.wait_for_stable {
            wait_for_stable(self, &self.stabilization).await?;
        }

        let message = format!("Instance start initiated (was {})", status.state);
        Ok(HandlerResult::succeeded(
            Action::Start,
            &self.resource,
            message,
            Some(status),
        ))
    }
}

#[async_trait]
impl ResourceHandler for ComputeInstanceHandler {
    fn resource(&self) -> &DiscoveredResource {
        &self.resource
    }

    async fn get_status(&self) -> Result<ResourceStatus, HandlerError> {
        let state = self.state().await?;
        let is_stopped = state == STOPPED;
        Ok(ResourceStatus::new(state, is_stopped))
    }

    async fn start(&self) -> HandlerResult {
        finish(Action::Start, &self.resource, self.try_start().await)
    }

    async fn stop(&self) -> HandlerResult {
        finish(Action::Stop, &self.resource, self.try_stop().await)
    }

    /// Settled in either end state
    async fn is_ready(&self) -> bool {
        match self.state().await {
            Ok(state) => state == RUNNING || state == STOPPED,
            Err(e) => {
                debug!(resource_id = %self.resource.resource_id, error = %e, "Readiness check failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LightsOutConfig;
    use crate::control_plane::InMemoryControlPlane;
    use crate::models::resource_types;

    fn handler(plane: &Arc<InMemoryControlPlane>, id: &str) -> ComputeInstanceHandler {
        ComputeInstanceHandler::new(HandlerContext {
            resource: DiscoveredResource::new(
                resource_types::EC2_INSTANCE,
                format!("arn:aws:ec2:us-east-1:123456789012:instance/{}", id),
                id,
            ),
            config: Arc::new(LightsOutConfig::default()),
            control_plane: plane.clone(),
        })
    }

    #[tokio::test]
    async fn test_stop_then_stop_again() {
        let plane = Arc::new(InMemoryControlPlane::new());
        plane.add_instance("i-1", "running");
        let h = handler(&plane, "i-1");

        let first = h.stop().await;
        assert!(first.success);
        assert_eq!(plane.instance("i-1").unwrap().state, "stopped");

        let second = h.stop().await;
        assert!(second.success);
        assert_eq!(second.message, "Instance already stopped");
        assert!(second.previous_state.unwrap().is_stopped);
        assert_eq!(plane.mutation_count(), 1);
    }

    #[tokio::test]
    async fn test_transitional_state_counts_as_moving() {
        let plane = Arc::new(InMemoryControlPlane::new());
        plane.add_instance("i-2", "pending");
        let h = handler(&plane, "i-2");

        let result = h.start().await;
        assert!(result.success);
        assert_eq!(result.message, "Instance already pending");
        assert_eq!(plane.mutation_count(), 0);
        assert!(!h.is_ready().await);
    }

    #[tokio::test]
    async fn test_start_stopped_instance() {
        let plane = Arc::new(InMemoryControlPlane::new());
        plane.add_instance("i-3", "stopped");
        let h = handler(&plane, "i-3");

        let result = h.start().await;
        assert!(result.success);
        assert_eq!(result.message, "Instance start initiated (was stopped)");
        assert_eq!(plane.instance("i-3").unwrap().state, "running");
    }

    #[tokio::test]
    async fn test_rejected_call_fails_result() {
        let plane = Arc::new(InMemoryControlPlane::new());
        plane.add_instance("i-4", "running");
        plane.fail_resource("i-4", ControlPlaneError::Rejected("unauthorized".into()));
        let h = handler(&plane, "i-4");

        let result = h.stop().await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("unauthorized"));
    }

    #[tokio::test]
    async fn test_invalid_identifier() {
        let plane = Arc::new(InMemoryControlPlane::new());
        let h = handler(&plane, "");
        assert!(matches!(
            h.get_status().await,
            Err(HandlerError::InvalidIdentifier { .. })
        ));
    }
}
