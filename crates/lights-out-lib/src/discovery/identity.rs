//! Resource identity parsing
//!
//! Control-plane identifiers have the shape
//! `arn:partition:service:region:account:resource`, where the resource part
//! may itself contain `/` or `:` separators. The family is `service:type`
//! and the human id is derived per family.

use crate::models::resource_types;
use serde_json::Value;
use std::collections::BTreeMap;

/// Metadata key carrying the parent cluster of a container service
pub const CLUSTER_NAME_KEY: &str = "cluster_name";

/// Metadata key carrying the scaling group name
pub const GROUP_NAME_KEY: &str = "group_name";

const MIN_SEGMENTS: usize = 6;

/// Identity parsed out of one identifier
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceIdentity {
    /// e.g. "ecs:service", or "unknown"
    pub family: String,
    /// e.g. "ecs-service"
    pub resource_type: String,
    pub resource_id: String,
    pub metadata: BTreeMap<String, Value>,
}

/// Parse the `service:type` family of an identifier
pub fn parse_family(arn: &str) -> String {
    let parts: Vec<&str> = arn.split(':').collect();
    if parts.len() < MIN_SEGMENTS {
        return resource_types::UNKNOWN.to_string();
    }

    let service = parts[2];
    let kind = parts[5].split('/').next().unwrap_or_default();
    format!("{}:{}", service, kind)
}

/// Resource type discriminator for a family
pub fn resource_type_for(family: &str) -> String {
    family.replace(':', "-")
}

/// Parse family, resource type, human id and metadata
pub fn parse_identity(arn: &str) -> ResourceIdentity {
    let family = parse_family(arn);
    let (resource_id, metadata) = human_id_and_metadata(arn, &family);
    ResourceIdentity {
        resource_type: resource_type_for(&family),
        family,
        resource_id,
        metadata,
    }
}

/// Derive the human id and family metadata; malformed identifiers fall back
/// to the raw identifier with no metadata
pub fn human_id_and_metadata(arn: &str, family: &str) -> (String, BTreeMap<String, Value>) {
    let mut metadata = BTreeMap::new();
    let parts: Vec<&str> = arn.split(':').collect();
    if parts.len() < MIN_SEGMENTS {
        return (arn.to_string(), metadata);
    }

    // Everything after the account segment; rds identifiers keep ':' inside it
    let resource_part = parts[5..].join(":");

    let resource_id = match family {
        "ecs:service" => {
            let segments: Vec<&str> = resource_part.split('/').collect();
            match segments.as_slice() {
                [_, .., cluster, service] => {
                    metadata.insert(CLUSTER_NAME_KEY.to_string(), Value::from(*cluster));
                    format!("{}/{}", cluster, service)
                }
                [_, service] => {
                    metadata.insert(CLUSTER_NAME_KEY.to_string(), Value::from("default"));
                    service.to_string()
                }
                _ => {
                    metadata.insert(CLUSTER_NAME_KEY.to_string(), Value::from("default"));
                    resource_part.clone()
                }
            }
        }
        "ec2:instance" => match resource_part.split_once('/') {
            Some((_, id)) => id.to_string(),
            None => resource_part.clone(),
        },
        "rds:db" | "rds:cluster" => resource_part
            .rsplit(':')
            .next()
            .unwrap_or(resource_part.as_str())
            .to_string(),
        "autoscaling:autoScalingGroup" => {
            let name = resource_part
                .rsplit('/')
                .next()
                .unwrap_or(resource_part.as_str())
                .to_string();
            metadata.insert(GROUP_NAME_KEY.to_string(), Value::from(name.as_str()));
            name
        }
        _ => arn.to_string(),
    };

    (resource_id, metadata)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ecs_service_three_part() {
        let id = parse_identity("arn:aws:ecs:us-east-1:123456789012:service/prod-cluster/api");
        assert_eq!(id.family, "ecs:service");
        assert_eq!(id.resource_type, resource_types::ECS_SERVICE);
        assert_eq!(id.resource_id, "prod-cluster/api");
        assert_eq!(id.metadata[CLUSTER_NAME_KEY], "prod-cluster");
    }

    #[test]
    fn test_ecs_service_cluster_is_second_to_last() {
        let id = parse_identity("arn:aws:ecs:us-east-1:123456789012:service/a/b/c");
        assert_eq!(id.resource_id, "b/c");
        assert_eq!(id.metadata[CLUSTER_NAME_KEY], "b");
    }

    #[test]
    fn test_ecs_service_two_part() {
        let id = parse_identity("arn:aws:ecs:us-east-1:123456789012:service/api");
        assert_eq!(id.resource_id, "api");
        assert_eq!(id.metadata[CLUSTER_NAME_KEY], "default");
    }

    #[test]
    fn test_ec2_instance() {
        let id = parse_identity("arn:aws:ec2:us-east-1:123456789012:instance/i-0abc123");
        assert_eq!(id.resource_type, resource_types::EC2_INSTANCE);
        assert_eq!(id.resource_id, "i-0abc123");
        assert!(id.metadata.is_empty());
    }

    #[test]
    fn test_rds_db_and_cluster() {
        let id = parse_identity("arn:aws:rds:us-east-1:123456789012:db:orders-db");
        assert_eq!(id.resource_type, resource_types::RDS_DB);
        assert_eq!(id.resource_id, "orders-db");

        let id = parse_identity("arn:aws:rds:us-east-1:123456789012:cluster:aurora-main");
        assert_eq!(id.resource_type, resource_types::RDS_CLUSTER);
        assert_eq!(id.resource_id, "aurora-main");
    }

    #[test]
    fn test_autoscaling_group() {
        let id = parse_identity(
            "arn:aws:autoscaling:us-east-1:123456789012:autoScalingGroup:5f3e:autoScalingGroupName/workers",
        );
        assert_eq!(id.resource_type, resource_types::AUTOSCALING_GROUP);
        assert_eq!(id.resource_id, "workers");
        assert_eq!(id.metadata[GROUP_NAME_KEY], "workers");
    }

    #[test]
    fn test_malformed_identifier_degrades() {
        let id = parse_identity("not-an-arn");
        assert_eq!(id.family, resource_types::UNKNOWN);
        assert_eq!(id.resource_type, resource_types::UNKNOWN);
        assert_eq!(id.resource_id, "not-an-arn");
        assert!(id.metadata.is_empty());

        let id = parse_identity("arn:aws:ecs:us-east-1:123");
        assert_eq!(id.family, resource_types::UNKNOWN);
    }

    #[test]
    fn test_unrecognized_family_keeps_raw_identifier() {
        let arn = "arn:aws:lambda:us-east-1:123456789012:function:resize";
        let id = parse_identity(arn);
        assert_eq!(id.resource_type, "lambda-function");
        assert_eq!(id.resource_id, arn);
    }
}
