//! Tag-based discovery

use super::identity::parse_identity;
use super::{async_trait, ResourceDiscovery};
use crate::config::{DiscoveryConfig, TAG_DISCOVERY_METHOD};
use crate::control_plane::{ControlPlane, TagQuery, TaggedResource};
use crate::error::DiscoveryError;
use crate::models::{DiscoveredResource, DEFAULT_GROUP, DEFAULT_PRIORITY, GROUP_TAG, PRIORITY_TAG};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Discovers resources carrying a required set of tags
pub struct TagDiscovery {
    tag_filters: BTreeMap<String, String>,
    resource_type_filters: Vec<String>,
    control_plane: Arc<dyn ControlPlane>,
}

impl TagDiscovery {
    pub fn new(
        tag_filters: BTreeMap<String, String>,
        resource_type_filters: Vec<String>,
        control_plane: Arc<dyn ControlPlane>,
    ) -> Self {
        Self {
            tag_filters,
            resource_type_filters,
            control_plane,
        }
    }

    pub fn from_config(config: &DiscoveryConfig, control_plane: Arc<dyn ControlPlane>) -> Self {
        Self::new(
            config.tag_filters.clone(),
            config.resource_type_filters.iter().cloned().collect(),
            control_plane,
        )
    }

    fn query(&self, pagination_token: Option<String>) -> TagQuery {
        TagQuery {
            tag_filters: self
                .tag_filters
                .iter()
                .map(|(key, value)| (key.clone(), vec![value.clone()]))
                .collect(),
            resource_type_filters: self.resource_type_filters.clone(),
            pagination_token,
        }
    }

    fn to_resource(&self, mapping: TaggedResource) -> DiscoveredResource {
        let identity = parse_identity(&mapping.arn);
        let priority = extract_priority(&mapping);
        let group = mapping
            .tags
            .get(GROUP_TAG)
            .cloned()
            .unwrap_or_else(|| DEFAULT_GROUP.to_string());

        DiscoveredResource {
            resource_type: identity.resource_type,
            arn: mapping.arn,
            resource_id: identity.resource_id,
            priority,
            group,
            tags: mapping.tags,
            metadata: identity.metadata,
        }
    }
}

/// Priority tag value, or the default when absent or not a non-negative integer
fn extract_priority(mapping: &TaggedResource) -> u32 {
    match mapping.tags.get(PRIORITY_TAG) {
        None => DEFAULT_PRIORITY,
        Some(raw) => raw.trim().parse::<u32>().unwrap_or_else(|_| {
            warn!(
                arn = %mapping.arn,
                value = %raw,
                default = DEFAULT_PRIORITY,
                "Invalid priority tag, using default"
            );
            DEFAULT_PRIORITY
        }),
    }
}

#[async_trait]
impl ResourceDiscovery for TagDiscovery {
    fn method(&self) -> &'static str {
        TAG_DISCOVERY_METHOD
    }

    async fn discover(&self) -> Result<Vec<DiscoveredResource>, DiscoveryError> {
        let mut resources = Vec::new();
        let mut seen_tokens = HashSet::new();
        let mut token: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let page = self.control_plane.get_resources(&self.query(token.clone())).await?;
            pages += 1;
            debug!(page = pages, count = page.resources.len(), "Fetched resource page");

            let next = page.next_token().map(str::to_string);
            resources.extend(page.resources.into_iter().map(|m| self.to_resource(m)));

            match next {
                None => break,
                Some(next) => {
                    if !seen_tokens.insert(next.clone()) {
                        return Err(DiscoveryError::Pagination(next));
                    }
                    token = Some(next);
                }
            }
        }

        info!(
            count = resources.len(),
            pages = pages,
            "Discovered resources by tags"
        );
        Ok(resources)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control_plane::InMemoryControlPlane;
    use crate::error::ControlPlaneError;

    fn filters() -> BTreeMap<String, String> {
        BTreeMap::from([("lights-out:managed".to_string(), "true".to_string())])
    }

    #[tokio::test]
    async fn test_discovers_every_page() {
        let plane = Arc::new(InMemoryControlPlane::new().with_page_size(2));
        for i in 0..5 {
            plane.add_resource(
                format!("arn:aws:ec2:us-east-1:123456789012:instance/i-{}", i),
                [("lights-out:managed", "true")],
            );
        }
        plane.add_resource(
            "arn:aws:ec2:us-east-1:123456789012:instance/i-unmanaged",
            [("lights-out:managed", "false")],
        );

        let discovery = TagDiscovery::new(filters(), vec![], plane.clone());
        let resources = discovery.discover().await.unwrap();

        assert_eq!(resources.len(), 5);
        assert_eq!(resources[0].resource_id, "i-0");
        assert_eq!(resources[4].resource_id, "i-4");
        assert_eq!(plane.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_priority_and_group_tags() {
        let plane = Arc::new(InMemoryControlPlane::new());
        plane.add_resource(
            "arn:aws:rds:us-east-1:123456789012:db:orders",
            [
                ("lights-out:managed", "true"),
                ("lights-out:priority", "10"),
                ("lights-out:group", "data"),
            ],
        );
        plane.add_resource(
            "arn:aws:ecs:us-east-1:123456789012:service/main/api",
            [("lights-out:managed", "true"), ("lights-out:priority", "high")],
        );

        let discovery = TagDiscovery::new(filters(), vec![], plane);
        let resources = discovery.discover().await.unwrap();

        assert_eq!(resources[0].priority, 10);
        assert_eq!(resources[0].group, "data");
        assert_eq!(resources[1].priority, DEFAULT_PRIORITY);
        assert_eq!(resources[1].group, DEFAULT_GROUP);
        assert_eq!(resources[1].metadata_str("cluster_name"), Some("main"));
    }

    #[tokio::test]
    async fn test_query_failure_is_discovery_error() {
        let plane = Arc::new(InMemoryControlPlane::new());
        plane.fail_discovery(ControlPlaneError::Throttled("rate exceeded".into()));

        let discovery = TagDiscovery::new(filters(), vec![], plane);
        assert!(matches!(
            discovery.discover().await,
            Err(DiscoveryError::Query(ControlPlaneError::Throttled(_)))
        ));
    }

    #[test]
    fn test_negative_priority_uses_default() {
        let mapping = TaggedResource {
            arn: "arn:aws:ec2:us-east-1:123456789012:instance/i-1".into(),
            tags: [(PRIORITY_TAG.to_string(), "-3".to_string())].into(),
        };
        assert_eq!(extract_priority(&mapping), DEFAULT_PRIORITY);
    }
}
