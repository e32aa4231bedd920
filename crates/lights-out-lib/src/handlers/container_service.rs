//! Container service handler
//!
//! Stop scales the service's desired count to zero; start scales it to the
//! configured `default_desired_count` (1 when unset). Both are idempotent
//! against the desired count. With `wait_for_stable` enabled the handler
//! polls until the running count matches the desired count.

use super::{
    async_trait, finish, wait_for_stable, HandlerContext, ResourceHandler, StabilizationSettings,
};
use crate::config::ResourceDefaults;
use crate::control_plane::{ControlPlane, ServiceDescription};
use crate::discovery::identity::CLUSTER_NAME_KEY;
use crate::error::{ControlPlaneError, HandlerError};
use crate::models::{Action, DiscoveredResource, HandlerResult, ResourceStatus};
use std::sync::Arc;
use tracing::debug;

const DEFAULT_CLUSTER: &str = "default";
const DEFAULT_DESIRED_COUNT: u32 = 1;

pub struct ContainerServiceHandler {
    resource: DiscoveredResource,
    cluster: String,
    service: String,
    defaults: ResourceDefaults,
    stabilization: StabilizationSettings,
    control_plane: Arc<dyn ControlPlane>,
}

impl ContainerServiceHandler {
    pub fn new(ctx: HandlerContext) -> Self {
        let (cluster, service) = split_service_id(&ctx.resource);
        let defaults = ctx.defaults();
        Self {
            stabilization: StabilizationSettings::from_defaults(&defaults),
            defaults,
            cluster,
            service,
            resource: ctx.resource,
            control_plane: ctx.control_plane,
        }
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Desired count restored on start
    pub fn target_desired_count(&self) -> u32 {
        self.defaults
            .get_u32("default_desired_count")
            .unwrap_or(DEFAULT_DESIRED_COUNT)
    }

    async fn describe(&self) -> Result<ServiceDescription, HandlerError> {
        self.control_plane
            .describe_service(&self.cluster, &self.service)
            .await?
            .ok_or_else(|| {
                HandlerError::ControlPlane(ControlPlaneError::NotFound {
                    kind: "service".to_string(),
                    id: self.resource.resource_id.clone(),
                })
            })
    }

    async fn scale(&self, desired_count: u32) -> Result<(), HandlerError> {
        debug!(
            cluster = %self.cluster,
            service = %self.service,
            desired_count,
            "Updating service desired count"
        );
        self.control_plane
            .update_service_desired_count(&self.cluster, &self.service, desired_count)
            .await?;

        if self.stabilization.wait_for_stable {
            wait_for_stable(self, &self.stabilization).await?;
        }
        Ok(())
    }

    async fn try_stop(&self) -> Result<HandlerResult, HandlerError> {
        let status = self.get_status().await?;
        if status.is_stopped {
            return Ok(HandlerResult::succeeded(
                Action::Stop,
                &self.resource,
                "Service already stopped",
                Some(status),
            ));
        }

        let was = status.detail_u64("desired_count").unwrap_or_default();
        self.scale(0).await?;
        Ok(HandlerResult::succeeded(
            Action::Stop,
            &self.resource,
            format!("Service scaled to 0 (was {})", was),
            Some(status),
        ))
    }

    async fn try_start(&self) -> Result<HandlerResult, HandlerError> {
        let status = self.get_status().await?;
        let target = self.target_desired_count();

        if status.detail_u64("desired_count") == Some(u64::from(target)) {
            return Ok(HandlerResult::succeeded(
                Action::Start,
                &self.resource,
                format!("Service already at desired count {}", target),
                Some(status),
            ));
        }

        self.scale(target).await?;
        Ok(HandlerResult::succeeded(
            Action::Start,
            &self.resource,
            format!("Service scaled to {}", target),
            Some(status),
        ))
    }
}

/// Split "cluster/service" or a bare service name, falling back to the
/// cluster carried in metadata
fn split_service_id(resource: &DiscoveredResource) -> (String, String) {
    match resource.resource_id.split_once('/') {
        Some((cluster, service)) => (cluster.to_string(), service.to_string()),
        None => (
            resource
                .metadata_str(CLUSTER_NAME_KEY)
                .unwrap_or(DEFAULT_CLUSTER)
                .to_string(),
            resource.resource_id.clone(),
        ),
    }
}

#[async_trait]
impl ResourceHandler for ContainerServiceHandler {
    fn resource(&self) -> &DiscoveredResource {
        &self.resource
    }

    async fn get_status(&self) -> Result<ResourceStatus, HandlerError> {
        let service = self.describe().await?;
        Ok(ResourceStatus::new(service.status, service.desired_count == 0)
            .with_detail("desired_count", service.desired_count)
            .with_detail("running_count", service.running_count))
    }

    async fn start(&self) -> HandlerResult {
        finish(Action::Start, &self.resource, self.try_start().await)
    }

    async fn stop(&self) -> HandlerResult {
        finish(Action::Stop, &self.resource, self.try_stop().await)
    }

    async fn is_ready(&self) -> bool {
        match self.describe().await {
            Ok(service) => service.desired_count == service.running_count,
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
    use serde_json::json;

    const ARN: &str = "arn:aws:ecs:us-east-1:123456789012:service/main/api";

    fn handler(
        plane: &Arc<InMemoryControlPlane>,
        defaults: serde_json::Value,
    ) -> ContainerServiceHandler {
        let config = LightsOutConfig::from_json_str(
            &json!({ "resource_defaults": { "ecs-service": defaults } }).to_string(),
        )
        .unwrap();
        ContainerServiceHandler::new(HandlerContext {
            resource: DiscoveredResource::new(resource_types::ECS_SERVICE, ARN, "main/api"),
            config: Arc::new(config),
            control_plane: plane.clone(),
        })
    }

    #[test]
    fn test_split_service_id() {
        let bare = DiscoveredResource::new(resource_types::ECS_SERVICE, ARN, "api");
        assert_eq!(split_service_id(&bare), ("default".to_string(), "api".to_string()));

        let with_meta = bare.clone().with_metadata(CLUSTER_NAME_KEY, "edge");
        assert_eq!(split_service_id(&with_meta), ("edge".to_string(), "api".to_string()));

        let nested = DiscoveredResource::new(resource_types::ECS_SERVICE, ARN, "main/api");
        assert_eq!(split_service_id(&nested), ("main".to_string(), "api".to_string()));
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let plane = Arc::new(InMemoryControlPlane::new());
        plane.add_service("main", "api", 2, 2);
        let h = handler(&plane, json!({}));

        let first = h.stop().await;
        assert!(first.success);
        assert_eq!(first.message, "Service scaled to 0 (was 2)");
        assert!(!first.previous_state.unwrap().is_stopped);
        assert_eq!(plane.service("main", "api").unwrap().desired_count, 0);

        let second = h.stop().await;
        assert!(second.success);
        assert!(second.message.contains("already stopped"));
        assert!(second.previous_state.unwrap().is_stopped);
        assert_eq!(plane.mutation_count(), 1);
    }

    #[tokio::test]
    async fn test_start_uses_configured_count() {
        let plane = Arc::new(InMemoryControlPlane::new());
        plane.add_service("main", "api", 0, 0);
        let h = handler(&plane, json!({ "default_desired_count": 3 }));

        let result = h.start().await;
        assert!(result.success);
        assert_eq!(result.message, "Service scaled to 3");
        assert_eq!(plane.service("main", "api").unwrap().desired_count, 3);
    }

    #[tokio::test]
    async fn test_start_at_target_issues_no_mutation() {
        let plane = Arc::new(InMemoryControlPlane::new());
        plane.add_service("main", "api", 1, 1);
        let h = handler(&plane, json!({}));

        let result = h.start().await;
        assert!(result.success);
        assert!(result.message.contains("already at desired count"));
        assert_eq!(plane.mutation_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_service_fails() {
        let plane = Arc::new(InMemoryControlPlane::new());
        let h = handler(&plane, json!({}));

        assert!(h.get_status().await.is_err());
        let result = h.stop().await;
        assert!(!result.success);
        assert_eq!(result.message, "Stop operation failed");
        assert!(result.error.unwrap().contains("not found"));
        assert!(!h.is_ready().await);
    }

    #[tokio::test]
    async fn test_waits_for_stable() {
        let plane = Arc::new(InMemoryControlPlane::new().with_settle_delay(2));
        plane.add_service("main", "api", 0, 0);
        let h = handler(
            &plane,
            json!({ "wait_for_stable": true, "stable_timeout_seconds": 1, "stable_poll_interval_ms": 5 }),
        );

        let result = h.start().await;
        assert!(result.success, "{:?}", result.error);
        assert_eq!(plane.service("main", "api").unwrap().running_count, 1);
    }

    #[tokio::test]
    async fn test_stabilization_timeout_fails_result() {
        let plane = Arc::new(InMemoryControlPlane::new().with_settle_delay(1_000));
        plane.add_service("main", "api", 0, 0);
        let h = handler(
            &plane,
            json!({ "wait_for_stable": true, "stable_timeout_seconds": 0, "stable_poll_interval_ms": 1 }),
        );

        let result = h.start().await;
        assert!(!result.success);
        assert_eq!(result.message, "Start operation failed");
        assert!(result.error.unwrap().contains("did not stabilize"));
    }
}
