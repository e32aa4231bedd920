//! In-process control plane
//!
//! Holds resource state in memory, paginates tag queries, records every call
//! and supports fault injection. Used by the test suites and by the agent when
//! it is seeded from an inventory file.

use super::{
    async_trait, ControlPlane, DatabaseDescription, DatabaseKind, InstanceDescription,
    ResourcePage, ScalingGroupDescription, ServiceDescription, TagQuery, TaggedResource,
};
use crate::error::ControlPlaneError;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{PoisonError, RwLock};
use tracing::debug;

const DEFAULT_PAGE_SIZE: usize = 100;

/// A control plane call, recorded in order of arrival
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlPlaneCall {
    GetResources {
        pagination_token: Option<String>,
    },
    DescribeService {
        cluster: String,
        service: String,
    },
    UpdateService {
        cluster: String,
        service: String,
        desired_count: u32,
    },
    DescribeInstance(String),
    StartInstance(String),
    StopInstance(String),
    DescribeDatabase {
        kind: DatabaseKind,
        identifier: String,
    },
    StartDatabase {
        kind: DatabaseKind,
        identifier: String,
    },
    StopDatabase {
        kind: DatabaseKind,
        identifier: String,
    },
    DescribeScalingGroup(String),
    UpdateScalingGroup {
        name: String,
        min_size: u32,
        max_size: u32,
        desired_capacity: u32,
    },
}

impl ControlPlaneCall {
    /// Returns true for calls that change resource state
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            ControlPlaneCall::UpdateService { .. }
                | ControlPlaneCall::StartInstance(_)
                | ControlPlaneCall::StopInstance(_)
                | ControlPlaneCall::StartDatabase { .. }
                | ControlPlaneCall::StopDatabase { .. }
                | ControlPlaneCall::UpdateScalingGroup { .. }
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub cluster: String,
    pub service: String,
    #[serde(flatten)]
    pub description: ServiceDescription,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub instance_id: String,
    #[serde(flatten)]
    pub description: InstanceDescription,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseRecord {
    pub kind: DatabaseKind,
    pub identifier: String,
    #[serde(flatten)]
    pub description: DatabaseDescription,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalingGroupRecord {
    pub name: String,
    #[serde(flatten)]
    pub description: ScalingGroupDescription,
}

/// Seed document for [`InMemoryControlPlane`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Inventory {
    #[serde(default)]
    pub resources: Vec<TaggedResource>,
    #[serde(default)]
    pub services: Vec<ServiceRecord>,
    #[serde(default)]
    pub instances: Vec<InstanceRecord>,
    #[serde(default)]
    pub databases: Vec<DatabaseRecord>,
    #[serde(default)]
    pub scaling_groups: Vec<ScalingGroupRecord>,
}

impl Inventory {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, crate::error::ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|source| crate::error::ConfigError::Read {
                path: path.display().to_string(),
                source,
            })?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Memory-backed [`ControlPlane`]
pub struct InMemoryControlPlane {
    resources: RwLock<Vec<TaggedResource>>,
    services: DashMap<(String, String), ServiceDescription>,
    instances: DashMap<String, InstanceDescription>,
    databases: DashMap<(DatabaseKind, String), DatabaseDescription>,
    scaling_groups: DashMap<String, ScalingGroupDescription>,
    /// Describe calls remaining before a mutated resource settles, per key
    settling: DashMap<String, u32>,
    settle_after: AtomicU32,
    page_size: usize,
    calls: RwLock<Vec<ControlPlaneCall>>,
    discovery_failure: RwLock<Option<ControlPlaneError>>,
    /// Errors returned for any call naming the key
    failures: DashMap<String, ControlPlaneError>,
}

impl Default for InMemoryControlPlane {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryControlPlane {
    pub fn new() -> Self {
        Self {
            resources: RwLock::new(Vec::new()),
            services: DashMap::new(),
            instances: DashMap::new(),
            databases: DashMap::new(),
            scaling_groups: DashMap::new(),
            settling: DashMap::new(),
            settle_after: AtomicU32::new(0),
            page_size: DEFAULT_PAGE_SIZE,
            calls: RwLock::new(Vec::new()),
            discovery_failure: RwLock::new(None),
            failures: DashMap::new(),
        }
    }

    /// Build a control plane holding everything in the inventory
    pub fn from_inventory(inventory: Inventory) -> Self {
        let plane = Self::new();
        for resource in inventory.resources {
            plane.add_resource(resource.arn, resource.tags);
        }
        for record in inventory.services {
            plane.services.insert((record.cluster, record.service), record.description);
        }
        for record in inventory.instances {
            plane.instances.insert(record.instance_id, record.description);
        }
        for record in inventory.databases {
            plane.databases.insert((record.kind, record.identifier), record.description);
        }
        for record in inventory.scaling_groups {
            plane.scaling_groups.insert(record.name, record.description);
        }
        plane
    }

    /// Number of resources returned per tag query page
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Keep mutated resources in a transitional state for `polls` describe calls
    pub fn with_settle_delay(self, polls: u32) -> Self {
        self.settle_after.store(polls, Ordering::SeqCst);
        self
    }

    pub fn add_resource<I, K, V>(&self, arn: impl Into<String>, tags: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let resource = TaggedResource {
            arn: arn.into(),
            tags: tags.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        };
        write(&self.resources).push(resource);
    }

    pub fn add_service(&self, cluster: &str, service: &str, desired_count: u32, running_count: u32) {
        self.services.insert(
            (cluster.to_string(), service.to_string()),
            ServiceDescription {
                desired_count,
                running_count,
                status: "ACTIVE".to_string(),
            },
        );
    }

    pub fn add_instance(&self, instance_id: &str, state: &str) {
        self.instances.insert(
            instance_id.to_string(),
            InstanceDescription {
                state: state.to_string(),
            },
        );
    }

    pub fn add_database(&self, kind: DatabaseKind, identifier: &str, status: &str) {
        self.databases.insert(
            (kind, identifier.to_string()),
            DatabaseDescription {
                status: status.to_string(),
            },
        );
    }

    pub fn add_scaling_group(&self, name: &str, min_size: u32, max_size: u32, desired_capacity: u32) {
        self.scaling_groups.insert(
            name.to_string(),
            ScalingGroupDescription {
                min_size,
                max_size,
                desired_capacity,
                in_service: desired_capacity,
            },
        );
    }

    /// Make every tag query fail with `error`
    pub fn fail_discovery(&self, error: ControlPlaneError) {
        *write(&self.discovery_failure) = Some(error);
    }

    /// Make every call naming `key` fail with `error`
    ///
    /// The key is the service name, instance id, database identifier or
    /// scaling group name.
    pub fn fail_resource(&self, key: &str, error: ControlPlaneError) {
        self.failures.insert(key.to_string(), error);
    }

    /// Force the observed running count of a service
    pub fn set_running_count(&self, cluster: &str, service: &str, running_count: u32) {
        if let Some(mut entry) = self.services.get_mut(&(cluster.to_string(), service.to_string())) {
            entry.running_count = running_count;
        }
    }

    pub fn service(&self, cluster: &str, service: &str) -> Option<ServiceDescription> {
        self.services
            .get(&(cluster.to_string(), service.to_string()))
            .map(|r| r.clone())
    }

    pub fn instance(&self, instance_id: &str) -> Option<InstanceDescription> {
        self.instances.get(instance_id).map(|r| r.clone())
    }

    pub fn database(&self, kind: DatabaseKind, identifier: &str) -> Option<DatabaseDescription> {
        self.databases
            .get(&(kind, identifier.to_string()))
            .map(|r| r.clone())
    }

    pub fn scaling_group(&self, name: &str) -> Option<ScalingGroupDescription> {
        self.scaling_groups.get(name).map(|r| r.clone())
    }

    /// All calls received so far, in order
    pub fn calls(&self) -> Vec<ControlPlaneCall> {
        read(&self.calls).clone()
    }

    /// Number of state-changing calls received so far
    pub fn mutation_count(&self) -> usize {
        read(&self.calls).iter().filter(|c| c.is_mutating()).count()
    }

    fn record(&self, call: ControlPlaneCall) {
        debug!(call = ?call, "Control plane call");
        write(&self.calls).push(call);
    }

    fn check_failure(&self, key: &str) -> Result<(), ControlPlaneError> {
        match self.failures.get(key) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    /// Start the settle countdown for a mutated resource; true when it settles at once
    fn begin_settling(&self, key: String) -> bool {
        let polls = self.settle_after.load(Ordering::SeqCst);
        if polls == 0 {
            self.settling.remove(&key);
            true
        } else {
            self.settling.insert(key, polls);
            false
        }
    }

    /// Count one describe call; true when the resource has settled
    fn poll_settled(&self, key: &str) -> bool {
        let settled = match self.settling.get_mut(key) {
            None => return false,
            Some(mut remaining) => {
                *remaining = remaining.saturating_sub(1);
                *remaining == 0
            }
        };
        if settled {
            self.settling.remove(key);
        }
        settled
    }
}

#[async_trait]
impl ControlPlane for InMemoryControlPlane {
    async fn get_resources(&self, query: &TagQuery) -> Result<ResourcePage, ControlPlaneError> {
        self.record(ControlPlaneCall::GetResources {
            pagination_token: query.pagination_token.clone(),
        });

        if let Some(error) = read(&self.discovery_failure).clone() {
            return Err(error);
        }

        let offset = match query.pagination_token.as_deref() {
            None | Some("") => 0,
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| ControlPlaneError::Rejected(format!("invalid pagination token {}", token)))?,
        };

        let matching: Vec<TaggedResource> = read(&self.resources)
            .iter()
            .filter(|r| matches_tags(r, query) && matches_type(&r.arn, &query.resource_type_filters))
            .cloned()
            .collect();

        let end = (offset + self.page_size).min(matching.len());
        let resources = matching.get(offset..end).map(<[_]>::to_vec).unwrap_or_default();
        let pagination_token = (end < matching.len()).then(|| end.to_string());

        Ok(ResourcePage {
            resources,
            pagination_token,
        })
    }

    async fn describe_service(
        &self,
        cluster: &str,
        service: &str,
    ) -> Result<Option<ServiceDescription>, ControlPlaneError> {
        self.record(ControlPlaneCall::DescribeService {
            cluster: cluster.to_string(),
            service: service.to_string(),
        });
        self.check_failure(service)?;

        let key = (cluster.to_string(), service.to_string());
        if self.poll_settled(&format!("service:{}/{}", cluster, service)) {
            if let Some(mut entry) = self.services.get_mut(&key) {
                entry.running_count = entry.desired_count;
            }
        }
        Ok(self.services.get(&key).map(|r| r.clone()))
    }

    async fn update_service_desired_count(
        &self,
        cluster: &str,
        service: &str,
        desired_count: u32,
    ) -> Result<(), ControlPlaneError> {
        self.record(ControlPlaneCall::UpdateService {
            cluster: cluster.to_string(),
            service: service.to_string(),
            desired_count,
        });
        self.check_failure(service)?;

        let mut entry = self
            .services
            .get_mut(&(cluster.to_string(), service.to_string()))
            .ok_or_else(|| not_found("service", service))?;
        let settled = self.begin_settling(format!("service:{}/{}", cluster, service));
        entry.desired_count = desired_count;
        if settled {
            entry.running_count = desired_count;
        }
        Ok(())
    }

    async fn describe_instance(
        &self,
        instance_id: &str,
    ) -> Result<Option<InstanceDescription>, ControlPlaneError> {
        self.record(ControlPlaneCall::DescribeInstance(instance_id.to_string()));
        self.check_failure(instance_id)?;

        if self.poll_settled(&format!("instance:{}", instance_id)) {
            if let Some(mut entry) = self.instances.get_mut(instance_id) {
                entry.state = settled_instance_state(&entry.state).to_string();
            }
        }
        Ok(self.instances.get(instance_id).map(|r| r.clone()))
    }

    async fn start_instance(&self, instance_id: &str) -> Result<(), ControlPlaneError> {
        self.record(ControlPlaneCall::StartInstance(instance_id.to_string()));
        self.transition_instance(instance_id, "pending", "running")
    }

    async fn stop_instance(&self, instance_id: &str) -> Result<(), ControlPlaneError> {
        self.record(ControlPlaneCall::StopInstance(instance_id.to_string()));
        self.transition_instance(instance_id, "stopping", "stopped")
    }

    async fn describe_database(
        &self,
        kind: DatabaseKind,
        identifier: &str,
    ) -> Result<Option<DatabaseDescription>, ControlPlaneError> {
        self.record(ControlPlaneCall::DescribeDatabase {
            kind,
            identifier: identifier.to_string(),
        });
        self.check_failure(identifier)?;

        let key = (kind, identifier.to_string());
        if self.poll_settled(&format!("database:{}", identifier)) {
            if let Some(mut entry) = self.databases.get_mut(&key) {
                entry.status = settled_database_status(&entry.status).to_string();
            }
        }
        Ok(self.databases.get(&key).map(|r| r.clone()))
    }

    async fn start_database(
        &self,
        kind: DatabaseKind,
        identifier: &str,
    ) -> Result<(), ControlPlaneError> {
        self.record(ControlPlaneCall::StartDatabase {
            kind,
            identifier: identifier.to_string(),
        });
        self.transition_database(kind, identifier, "starting", "available")
    }

    async fn stop_database(
        &self,
        kind: DatabaseKind,
        identifier: &str,
    ) -> Result<(), ControlPlaneError> {
        self.record(ControlPlaneCall::StopDatabase {
            kind,
            identifier: identifier.to_string(),
        });
        self.transition_database(kind, identifier, "stopping", "stopped")
    }

    async fn describe_scaling_group(
        &self,
        name: &str,
    ) -> Result<Option<ScalingGroupDescription>, ControlPlaneError> {
        self.record(ControlPlaneCall::DescribeScalingGroup(name.to_string()));
        self.check_failure(name)?;

        if self.poll_settled(&format!("group:{}", name)) {
            if let Some(mut entry) = self.scaling_groups.get_mut(name) {
                entry.in_service = entry.desired_capacity;
            }
        }
        Ok(self.scaling_groups.get(name).map(|r| r.clone()))
    }

    async fn update_scaling_group(
        &self,
        name: &str,
        min_size: u32,
        max_size: u32,
        desired_capacity: u32,
    ) -> Result<(), ControlPlaneError> {
        self.record(ControlPlaneCall::UpdateScalingGroup {
            name: name.to_string(),
            min_size,
            max_size,
            desired_capacity,
        });
        self.check_failure(name)?;

        if min_size > desired_capacity || desired_capacity > max_size {
            return Err(ControlPlaneError::Rejected(format!(
                "desired capacity {} outside [{}, {}]",
                desired_capacity, min_size, max_size
            )));
        }

        let mut entry = self
            .scaling_groups
            .get_mut(name)
            .ok_or_else(|| not_found("scaling group", name))?;
        let settled = self.begin_settling(format!("group:{}", name));
        entry.min_size = min_size;
        entry.max_size = max_size;
        entry.desired_capacity = desired_capacity;
        if settled {
            entry.in_service = desired_capacity;
        }
        Ok(())
    }
}

impl InMemoryControlPlane {
    fn transition_instance(
        &self,
        instance_id: &str,
        transitional: &str,
        target: &str,
    ) -> Result<(), ControlPlaneError> {
        self.check_failure(instance_id)?;
        let mut entry = self
            .instances
            .get_mut(instance_id)
            .ok_or_else(|| not_found("instance", instance_id))?;
        let settled = self.begin_settling(format!("instance:{}", instance_id));
        entry.state = if settled { target } else { transitional }.to_string();
        Ok(())
    }

    fn transition_database(
        &self,
        kind: DatabaseKind,
        identifier: &str,
        transitional: &str,
        target: &str,
    ) -> Result<(), ControlPlaneError> {
        self.check_failure(identifier)?;
        let mut entry = self
            .databases
            .get_mut(&(kind, identifier.to_string()))
            .ok_or_else(|| not_found("database", identifier))?;
        let settled = self.begin_settling(format!("database:{}", identifier));
        entry.status = if settled { target } else { transitional }.to_string();
        Ok(())
    }
}

fn settled_instance_state(state: &str) -> &str {
    match state {
        "pending" => "running",
        "stopping" => "stopped",
        other => other,
    }
}

fn settled_database_status(status: &str) -> &str {
    match status {
        "starting" => "available",
        "stopping" => "stopped",
        other => other,
    }
}

fn not_found(kind: &str, id: &str) -> ControlPlaneError {
    ControlPlaneError::NotFound {
        kind: kind.to_string(),
        id: id.to_string(),
    }
}

fn matches_tags(resource: &TaggedResource, query: &TagQuery) -> bool {
    query.tag_filters.iter().all(|(key, values)| {
        resource
            .tags
            .get(key)
            .map(|value| values.is_empty() || values.contains(value))
            .unwrap_or(false)
    })
}

/// Match "service" or "service:type" filters against an arn
fn matches_type(arn: &str, filters: &[String]) -> bool {
    if filters.is_empty() {
        return true;
    }

    let parts: Vec<&str> = arn.splitn(6, ':').collect();
    if parts.len() < 6 {
        return false;
    }
    let (service, resource_part) = (parts[2], parts[5]);

    filters.iter().any(|filter| match filter.split_once(':') {
        None => filter == service,
        Some((filter_service, filter_type)) => {
            filter_service == service
                && resource_part
                    .strip_prefix(filter_type)
                    .map(|rest| rest.is_empty() || rest.starts_with('/') || rest.starts_with(':'))
                    .unwrap_or(false)
        }
    })
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
