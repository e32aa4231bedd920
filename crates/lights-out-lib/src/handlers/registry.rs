//! Handler registry
//!
//! Maps a resource type to a handler constructor. Registration happens once at
//! start-up; afterwards the registry is shared read-only.

use super::{
    ComputeInstanceHandler, ContainerServiceHandler, HandlerContext, ManagedDatabaseHandler,
    ResourceHandler, ScalingGroupHandler,
};
use crate::config::LightsOutConfig;
use crate::control_plane::ControlPlane;
use crate::models::{resource_types, DiscoveredResource};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Builds a handler bound to one resource
pub type HandlerFactory = Arc<dyn Fn(HandlerContext) -> Box<dyn ResourceHandler> + Send + Sync>;

pub struct HandlerRegistry {
    factories: HashMap<String, HandlerFactory>,
    control_plane: Arc<dyn ControlPlane>,
}

impl HandlerRegistry {
    /// Empty registry over the given control plane
    pub fn new(control_plane: Arc<dyn ControlPlane>) -> Self {
        Self {
            factories: HashMap::new(),
            control_plane,
        }
    }

    /// Registry with every built-in resource family
    pub fn with_defaults(control_plane: Arc<dyn ControlPlane>) -> Self {
        let mut registry = Self::new(control_plane);
        registry.register(resource_types::ECS_SERVICE, |ctx| {
            Box::new(ContainerServiceHandler::new(ctx))
        });
        registry.register(resource_types::EC2_INSTANCE, |ctx| {
            Box::new(ComputeInstanceHandler::new(ctx))
        });
        registry.register(resource_types::RDS_DB, |ctx| {
            Box::new(ManagedDatabaseHandler::new(ctx))
        });
        registry.register(resource_types::RDS_CLUSTER, |ctx| {
            Box::new(ManagedDatabaseHandler::new(ctx))
        });
        registry.register(resource_types::AUTOSCALING_GROUP, |ctx| {
            Box::new(ScalingGroupHandler::new(ctx))
        });
        registry
    }

    /// Register (or replace) the constructor for a resource type
    pub fn register<F>(&mut self, resource_type: impl Into<String>, factory: F)
    where
        F: Fn(HandlerContext) -> Box<dyn ResourceHandler> + Send + Sync + 'static,
    {
        let resource_type = resource_type.into();
        debug!(resource_type = %resource_type, "Registering resource handler");
        self.factories.insert(resource_type, Arc::new(factory));
    }

    pub fn contains(&self, resource_type: &str) -> bool {
        self.factories.contains_key(resource_type)
    }

    /// Registered resource types, sorted
    pub fn registered_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    pub fn control_plane(&self) -> Arc<dyn ControlPlane> {
        Arc::clone(&self.control_plane)
    }

    /// Build a handler for `resource` by exact type match; `None` when the
    /// type is not registered
    pub fn resolve(
        &self,
        resource_type: &str,
        resource: &DiscoveredResource,
        config: &Arc<LightsOutConfig>,
    ) -> Option<Box<dyn ResourceHandler>> {
        let factory = self.factories.get(resource_type)?;
        Some(factory(HandlerContext {
            resource: resource.clone(),
            config: Arc::clone(config),
            control_plane: Arc::clone(&self.control_plane),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control_plane::InMemoryControlPlane;

    fn registry() -> HandlerRegistry {
        HandlerRegistry::with_defaults(Arc::new(InMemoryControlPlane::new()))
    }

    #[test]
    fn test_default_families_registered() {
        let registry = registry();
        assert_eq!(
            registry.registered_types(),
            vec![
                "autoscaling-autoScalingGroup",
                "ec2-instance",
                "ecs-service",
                "rds-cluster",
                "rds-db"
            ]
        );
    }

    #[test]
    fn test_resolve_exact_match_only() {
        let registry = registry();
        let config = Arc::new(LightsOutConfig::default());
        let resource = DiscoveredResource::new("ecs-service", "arn", "main/api");

        let handler = registry.resolve("ecs-service", &resource, &config).unwrap();
        assert_eq!(handler.resource().resource_id, "main/api");

        assert!(registry.resolve("ECS-Service", &resource, &config).is_none());
        assert!(registry.resolve("lambda-function", &resource, &config).is_none());
    }

    #[test]
    fn test_register_new_family() {
        let mut registry = registry();
        assert!(!registry.contains("custom-thing"));
        registry.register("custom-thing", |ctx| Box::new(ComputeInstanceHandler::new(ctx)));
        assert!(registry.contains("custom-thing"));
    }
}
