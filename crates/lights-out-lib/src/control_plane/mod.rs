//! Resource control plane seam
//!
//! The cloud provider's tag query and state-changing calls are reached only
//! through the [`ControlPlane`] trait. Discovery and handlers never talk to a
//! provider SDK directly, which keeps the orchestration core testable against
//! [`InMemoryControlPlane`].

mod memory;

pub use memory::{ControlPlaneCall, InMemoryControlPlane, Inventory};

use crate::error::ControlPlaneError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

pub use async_trait::async_trait;

/// One paged tag query
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagQuery {
    /// Required tag key with its accepted values
    pub tag_filters: BTreeMap<String, Vec<String>>,
    /// Control-plane resource types, e.g. "ecs:service"; empty means all
    pub resource_type_filters: Vec<String>,
    /// Continuation token from the previous page
    pub pagination_token: Option<String>,
}

/// A resource identifier with its tags, as returned by the tag query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaggedResource {
    pub arn: String,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

/// One page of tag query results
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourcePage {
    pub resources: Vec<TaggedResource>,
    /// Absent or empty on the last page
    pub pagination_token: Option<String>,
}

impl ResourcePage {
    pub fn next_token(&self) -> Option<&str> {
        self.pagination_token
            .as_deref()
            .filter(|token| !token.is_empty())
    }
}

/// Container service capacity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescription {
    pub desired_count: u32,
    pub running_count: u32,
    pub status: String,
}

/// Compute instance state, using provider state names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceDescription {
    pub state: String,
}

/// Managed database flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseKind {
    Instance,
    Cluster,
}

/// Managed database state, using provider status names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseDescription {
    pub status: String,
}

/// Scaling group capacity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalingGroupDescription {
    pub min_size: u32,
    pub max_size: u32,
    pub desired_capacity: u32,
    /// Instances currently in service
    pub in_service: u32,
}

/// Cloud resource query and mutation API
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Fetch one page of tagged resources
    async fn get_resources(&self, query: &TagQuery) -> Result<ResourcePage, ControlPlaneError>;

    async fn describe_service(
        &self,
        cluster: &str,
        service: &str,
    ) -> Result<Option<ServiceDescription>, ControlPlaneError>;

    async fn update_service_desired_count(
        &self,
        cluster: &str,
        service: &str,
        desired_count: u32,
    ) -> Result<(), ControlPlaneError>;

    async fn describe_instance(
        &self,
        instance_id: &str,
    ) -> Result<Option<InstanceDescription>, ControlPlaneError>;

    async fn start_instance(&self, instance_id: &str) -> Result<(), ControlPlaneError>;

    async fn stop_instance(&self, instance_id: &str) -> Result<(), ControlPlaneError>;

    async fn describe_database(
        &self,
        kind: DatabaseKind,
        identifier: &str,
    ) -> Result<Option<DatabaseDescription>, ControlPlaneError>;

    async fn start_database(
        &self,
        kind: DatabaseKind,
        identifier: &str,
    ) -> Result<(), ControlPlaneError>;

    async fn stop_database(&self, kind: DatabaseKind, identifier: &str)
        -> Result<(), ControlPlaneError>;

    async fn describe_scaling_group(
        &self,
        name: &str,
    ) -> Result<Option<ScalingGroupDescription>, ControlPlaneError>;

    async fn update_scaling_group(
        &self,
        name: &str,
        min_size: u32,
        max_size: u32,
        desired_capacity: u32,
    ) -> Result<(), ControlPlaneError>;
}
