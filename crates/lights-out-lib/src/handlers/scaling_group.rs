//! Scaling group handler
//!
//! Stop sets min size and desired capacity to zero and keeps the max size.
//! Start restores `default_min_size`, `default_desired_capacity` and
//! `default_max_size` (1, 1 and the current max when unset).

use super::{
    async_trait, finish, wait_for_stable, HandlerContext, ResourceHandler, StabilizationSettings,
};
use crate::config::ResourceDefaults;
use crate::control_plane::{ControlPlane, ScalingGroupDescription};
use crate::discovery::identity::GROUP_NAME_KEY;
use crate::error::{ControlPlaneError, HandlerError};
use crate::models::{Action, DiscoveredResource, HandlerResult, ResourceStatus};
use std::sync::Arc;
use tracing::debug;

pub struct ScalingGroupHandler {
    resource: DiscoveredResource,
    name: String,
    defaults: ResourceDefaults,
    stabilization: StabilizationSettings,
    control_plane: Arc<dyn ControlPlane>,
}

/// Capacity restored on start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Capacity {
    min_size: u32,
    max_size: u32,
    desired_capacity: u32,
}

impl ScalingGroupHandler {
    pub fn new(ctx: HandlerContext) -> Self {
        let name = ctx
            .resource
            .metadata_str(GROUP_NAME_KEY)
            .unwrap_or(ctx.resource.resource_id.as_str())
            .to_string();
        let defaults = ctx.defaults();

        Self {
            stabilization: StabilizationSettings::from_defaults(&defaults),
            defaults,
            name,
            resource: ctx.resource,
            control_plane: ctx.control_plane,
        }
    }

    pub fn group_name(&self) -> &str {
        &self.name
    }

    fn start_capacity(&self, current: &ScalingGroupDescription) -> Capacity {
        let desired_capacity = self.defaults.get_u32("default_desired_capacity").unwrap_or(1);
        let min_size = self
            .defaults
            .get_u32("default_min_size")
            .unwrap_or(1)
            .min(desired_capacity);
        let max_size = self
            .defaults
            .get_u32("default_max_size")
            .unwrap_or(current.max_size)
            .max(desired_capacity);

        Capacity {
            min_size,
            max_size,
            desired_capacity,
        }
    }

    async fn describe(&self) -> Result<ScalingGroupDescription, HandlerError> {
        self.control_plane
            .describe_scaling_group(&self.name)
            .await?
            .ok_or_else(|| {
                HandlerError::ControlPlane(ControlPlaneError::NotFound {
                    kind: "scaling group".to_string(),
                    id: self.name.clone(),
                })
            })
    }

    async fn apply(&self, capacity: Capacity) -> Result<(), HandlerError> {
        debug!(
            group = %self.name,
            min_size = capacity.min_size,
            max_size = capacity.max_size,
            desired_capacity = capacity.desired_capacity,
            "Updating scaling group"
        );
        self.control_plane
            .update_scaling_group(
                &self.name,
                capacity.min_size,
                capacity.max_size,
                capacity.desired_capacity,
            )
            .await?;

        if self.stabilization.wait_for_stable {
            wait_for_stable(self, &self.stabilization).await?;
        }
        Ok(())
    }

    async fn try_stop(&self) -> Result<HandlerResult, HandlerError> {
        let group = self.describe().await?;
        let status = status_of(&group);
        if group.desired_capacity == 0 && group.min_size == 0 {
            return Ok(HandlerResult::succeeded(
                Action::Stop,
                &self.resource,
                "Scaling group already stopped",
                Some(status),
            ));
        }

        self.apply(Capacity {
            min_size: 0,
            max_size: group.max_size,
            desired_capacity: 0,
        })
        .await?;

        Ok(HandlerResult::succeeded(
            Action::Stop,
            &self.resource,
            format!("Scaling group scaled to 0 (was {})", group.desired_capacity),
            Some(status),
        ))
    }

    async fn try_start(&self) -> Result<HandlerResult, HandlerError> {
        let group = self.describe().await?;
        let status = status_of(&group);
        let target = self.start_capacity(&group);

        if group.desired_capacity == target.desired_capacity && group.min_size == target.min_size {
            return Ok(HandlerResult::succeeded(
                Action::Start,
                &self.resource,
                format!(
                    "Scaling group already at desired capacity {}",
                    target.desired_capacity
                ),
                Some(status),
            ));
        }

        self.apply(target).await?;
        Ok(HandlerResult::succeeded(
            Action::Start,
            &self.resource,
            format!("Scaling group scaled to {}", target.desired_capacity),
            Some(status),
        ))
    }
}

fn status_of(group: &ScalingGroupDescription) -> ResourceStatus {
    let stopped = group.desired_capacity == 0;
    ResourceStatus::new(if stopped { "stopped" } else { "running" }, stopped)
        .with_detail("min_size", group.min_size)
        .with_detail("max_size", group.max_size)
        .with_detail("desired_capacity", group.desired_capacity)
        .with_detail("in_service", group.in_service)
}

#[async_trait]
impl ResourceHandler for ScalingGroupHandler {
    fn resource(&self) -> &DiscoveredResource {
        &self.resource
    }

    async fn get_status(&self) -> Result<ResourceStatus, HandlerError> {
        Ok(status_of(&self.describe().await?))
    }

    async fn start(&self) -> HandlerResult {
        finish(Action::Start, &self.resource, self.try_start().await)
    }

    async fn stop(&self) -> HandlerResult {
        finish(Action::Stop, &self.resource, self.try_stop().await)
    }

    async fn is_ready(&self) -> bool {
        match self.describe().await {
            Ok(group) => group.in_service == group.desired_capacity,
            Err(e) => {
                debug!(resource_id = %self.resource.resource_id, error = %e, "Readiness check failed");
                false
            }
        }
    }
}
