//! Resource discovery strategies
//!
//! Discovery produces the set of in-scope resources for one run. It never
//! filters by schedule; that is left to the orchestrator.

pub mod identity;
mod tag;

pub use identity::{parse_identity, ResourceIdentity};
pub use tag::TagDiscovery;

use crate::config::{LightsOutConfig, TAG_DISCOVERY_METHOD};
use crate::control_plane::ControlPlane;
use crate::error::DiscoveryError;
use crate::models::DiscoveredResource;
use std::sync::Arc;
use tracing::warn;

pub use async_trait::async_trait;

/// A strategy enumerating resources for one run
#[async_trait]
pub trait ResourceDiscovery: Send + Sync {
    /// Discriminator this strategy is selected by
    fn method(&self) -> &'static str;

    /// Enumerate every in-scope resource, consuming all result pages
    async fn discover(&self) -> Result<Vec<DiscoveredResource>, DiscoveryError>;
}

/// Build the strategy named by `discovery.method`
///
/// Returns `None` (and logs a warning) when the method is missing or unknown.
pub fn create_discovery(
    config: &LightsOutConfig,
    control_plane: Arc<dyn ControlPlane>,
) -> Option<Box<dyn ResourceDiscovery>> {
    match config.discovery.method.as_deref() {
        Some(TAG_DISCOVERY_METHOD) => Some(Box::new(TagDiscovery::from_config(
            &config.discovery,
            control_plane,
        ))),
        Some(other) => {
            warn!(method = %other, "Unknown discovery method");
            None
        }
        None => {
            warn!("No discovery method configured");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control_plane::InMemoryControlPlane;

    fn config(method: Option<&str>) -> LightsOutConfig {
        let mut config = LightsOutConfig::default();
        config.discovery.method = method.map(str::to_string);
        config
    }

    #[test]
    fn test_create_tag_discovery() {
        let plane = Arc::new(InMemoryControlPlane::new());
        let discovery = create_discovery(&config(Some("tags")), plane).unwrap();
        assert_eq!(discovery.method(), TAG_DISCOVERY_METHOD);
    }

    #[test]
    fn test_unknown_or_missing_method() {
        let plane = Arc::new(InMemoryControlPlane::new());
        assert!(create_discovery(&config(Some("unknown")), plane.clone()).is_none());
        assert!(create_discovery(&config(None), plane).is_none());
    }
}
