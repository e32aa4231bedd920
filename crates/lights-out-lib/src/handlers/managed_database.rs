//! Managed database handler, for both database instances and clusters

use super::{
    async_trait, finish, wait_for_stable, HandlerContext, ResourceHandler, StabilizationSettings,
};
use crate::control_plane::{ControlPlane, DatabaseKind};
use crate::error::{ControlPlaneError, HandlerError};
use crate::models::{resource_types, Action, DiscoveredResource, HandlerResult, ResourceStatus};
use std::sync::Arc;
use tracing::debug;

const AVAILABLE: &str = "available";
const STARTING: &str = "starting";
const STOPPED: &str = "stopped";
const STOPPING: &str = "stopping";

pub struct ManagedDatabaseHandler {
    resource: DiscoveredResource,
    kind: DatabaseKind,
    stabilization: StabilizationSettings,
    control_plane: Arc<dyn ControlPlane>,
}

impl ManagedDatabaseHandler {
    pub fn new(ctx: HandlerContext) -> Self {
        let kind = if ctx.resource.resource_type == resource_types::RDS_CLUSTER {
            DatabaseKind::Cluster
        } else {
            DatabaseKind::Instance
        };

        Self {
            stabilization: StabilizationSettings::from_defaults(&ctx.defaults()),
            kind,
            resource: ctx.resource,
            control_plane: ctx.control_plane,
        }
    }

    pub fn kind(&self) -> DatabaseKind {
        self.kind
    }

    fn identifier(&self) -> &str {
        &self.resource.resource_id
    }

    async fn db_status(&self) -> Result<String, HandlerError> {
        let db = self
            .control_plane
            .describe_database(self.kind, self.identifier())
            .await?
            .ok_or_else(|| {
                HandlerError::ControlPlane(ControlPlaneError::NotFound {
                    kind: "database".to_string(),
                    id: self.identifier().to_string(),
                })
            })?;
        Ok(db.status)
    }

    async fn transition(&self, action: Action) -> Result<HandlerResult, HandlerError> {
        let status = self.get_status().await?;
        let (settled, moving) = match action {
            Action::Stop => (STOPPED, STOPPING),
            _ => (AVAILABLE, STARTING),
        };

        if status.state == settled || status.state == moving {
            let message = format!("Database already {}", status.state);
            return Ok(HandlerResult::succeeded(action, &self.resource, message, Some(status)));
        }

        match action {
            Action::Stop => {
                self.control_plane
                    .stop_database(self.kind, self.identifier())
                    .await?
            }
            _ => {
                self.control_plane
                    .start_database(self.kind, self.identifier())
                    .await?
            }
        }

        if self.stabilization.wait_for_stable {
            wait_for_stable(self, &self.stabilization).await?;
        }

        let message = format!("Database {} initiated (was {})", action, status.state);
        Ok(HandlerResult::succeeded(action, &self.resource, message, Some(status)))
    }
}

#[async_trait]
impl ResourceHandler for ManagedDatabaseHandler {
    fn resource(&self) -> &DiscoveredResource {
        &self.resource
    }

    async fn get_status(&self) -> Result<ResourceStatus, HandlerError> {
        let state = self.db_status().await?;
        let is_stopped = state == STOPPED;
        Ok(ResourceStatus::new(state, is_stopped))
    }

    async fn start(&self) -> HandlerResult {
        finish(Action::Start, &self.resource, self.transition(Action::Start).await)
    }

    async fn stop(&self) -> HandlerResult {
        finish(Action::Stop, &self.resource, self.transition(Action::Stop).await)
    }

    async fn is_ready(&self) -> bool {
        match self.db_status().await {
            Ok(status) => status == AVAILABLE || status == STOPPED,
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
    use serde_json::json;

    fn handler(
        plane: &Arc<InMemoryControlPlane>,
        resource_type: &str,
        id: &str,
        config: LightsOutConfig,
    ) -> ManagedDatabaseHandler {
        ManagedDatabaseHandler::new(HandlerContext {
            resource: DiscoveredResource::new(
                resource_type,
                format!("arn:aws:rds:us-east-1:123456789012:db:{}", id),
                id,
            ),
            config: Arc::new(config),
            control_plane: plane.clone(),
        })
    }

    #[tokio::test]
    async fn test_cluster_kind_selected_by_type() {
        let plane = Arc::new(InMemoryControlPlane::new());
        plane.add_database(DatabaseKind::Cluster, "aurora", "available");
        let h = handler(&plane, resource_types::RDS_CLUSTER, "aurora", LightsOutConfig::default());
        assert_eq!(h.kind(), DatabaseKind::Cluster);

        let result = h.stop().await;
        assert!(result.success);
        assert_eq!(result.message, "Database stop initiated (was available)");
        assert_eq!(
            plane.database(DatabaseKind::Cluster, "aurora").unwrap().status,
            "stopped"
        );
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let plane = Arc::new(InMemoryControlPlane::new());
        plane.add_database(DatabaseKind::Instance, "orders", "available");
        let h = handler(&plane, resource_types::RDS_DB, "orders", LightsOutConfig::default());

        let result = h.start().await;
        assert!(result.success);
        assert_eq!(result.message, "Database already available");
        assert_eq!(plane.mutation_count(), 0);
    }

    #[tokio::test]
    async fn test_start_waits_until_available() {
        let plane = Arc::new(InMemoryControlPlane::new().with_settle_delay(3));
        plane.add_database(DatabaseKind::Instance, "orders", "stopped");
        let config = LightsOutConfig::from_json_str(
            &json!({
                "resource_defaults": {
                    "rds-db": {"wait_for_stable": true, "stable_timeout_seconds": 1, "stable_poll_interval_ms": 2}
                }
            })
            .to_string(),
        )
        .unwrap();
        let h = handler(&plane, resource_types::RDS_DB, "orders", config);

        let result = h.start().await;
        assert!(result.success, "{:?}", result.error);
        assert_eq!(
            plane.database(DatabaseKind::Instance, "orders").unwrap().status,
            "available"
        );
    }

    #[tokio::test]
    async fn test_missing_database_fails() {
        let plane = Arc::new(InMemoryControlPlane::new());
        let h = handler(&plane, resource_types::RDS_DB, "ghost", LightsOutConfig::default());
        let result = h.start().await;
        assert!(!result.success);
        assert_eq!(result.message, "Start operation failed");
    }
}
