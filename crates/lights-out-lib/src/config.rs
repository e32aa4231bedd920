//! Lights-out configuration model
//!
//! The configuration document is JSON, normally fetched from a parameter store
//! or mounted as a file. Only the options the orchestration core recognizes
//! are modelled; unknown keys are ignored.

use crate::error::{ConfigError, SchedulerError};
use crate::scheduler::WorkScheduler;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Default tag naming the work window of a resource
pub const DEFAULT_SCHEDULE_TAG: &str = "lights-out:schedule";

/// Discovery strategy discriminator for tag-based discovery
pub const TAG_DISCOVERY_METHOD: &str = "tags";

/// Root configuration document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LightsOutConfig {
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    #[serde(default)]
    pub settings: Settings,

    /// Handler options keyed by resource type
    #[serde(default, alias = "resourceDefaults")]
    pub resource_defaults: BTreeMap<String, ResourceDefaults>,
}

/// How candidate resources are found
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Strategy discriminator, currently only "tags"
    #[serde(default)]
    pub method: Option<String>,

    /// Required tag key/value pairs
    #[serde(default, alias = "tagFilters")]
    pub tag_filters: BTreeMap<String, String>,

    /// Control-plane resource types to query, e.g. "ecs:service"
    #[serde(default, alias = "resourceTypeFilters", alias = "resource_types")]
    pub resource_type_filters: BTreeSet<String>,
}

/// Run-wide settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_schedule_tag", alias = "scheduleTag")]
    pub schedule_tag: String,

    /// Read status instead of mutating resources
    #[serde(default, alias = "dryRun")]
    pub dry_run: bool,

    #[serde(default, alias = "workWindow")]
    pub work_window: Option<WorkWindowConfig>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            schedule_tag: default_schedule_tag(),
            dry_run: false,
            work_window: None,
        }
    }
}

fn default_schedule_tag() -> String {
    DEFAULT_SCHEDULE_TAG.to_string()
}

/// Working hours used by the schedule loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkWindowConfig {
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// 0 = Monday through 6 = Sunday
    #[serde(default = "default_work_days", alias = "workDays")]
    pub work_days: Vec<u8>,

    /// "HH:MM"
    #[serde(default = "default_work_start", alias = "workStart")]
    pub work_start: String,

    /// "HH:MM", exclusive
    #[serde(default = "default_work_end", alias = "workEnd")]
    pub work_end: String,
}

impl Default for WorkWindowConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            work_days: default_work_days(),
            work_start: default_work_start(),
            work_end: default_work_end(),
        }
    }
}

fn default_timezone() -> String {
    "America/Los_Angeles".to_string()
}

fn default_work_days() -> Vec<u8> {
    vec![0, 1, 2, 3, 4]
}

fn default_work_start() -> String {
    "09:00".to_string()
}

fn default_work_end() -> String {
    "17:00".to_string()
}

impl WorkWindowConfig {
    /// Build the scheduler described by this window
    pub fn scheduler(&self) -> Result<WorkScheduler, SchedulerError> {
        WorkScheduler::from_strings(
            &self.timezone,
            &self.work_days,
            &self.work_start,
            &self.work_end,
        )
    }
}

/// Handler options for one resource type
///
/// Kept as an open JSON object since each family reads its own keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceDefaults(pub serde_json::Map<String, Value>);

impl ResourceDefaults {
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(Value::as_bool)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.0.get(key).and_then(Value::as_u64)
    }

    pub fn get_u32(&self, key: &str) -> Option<u32> {
        self.get_u64(key).and_then(|v| u32::try_from(v).ok())
    }

    pub fn insert(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }
}

impl LightsOutConfig {
    /// Parse a JSON configuration document
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: LightsOutConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration document from disk
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&content)
    }

    /// Check invariants serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.settings.schedule_tag.trim().is_empty() {
            return Err(ConfigError::Invalid("settings.schedule_tag must not be empty".into()));
        }

        if let Some(window) = &self.settings.work_window {
            window
                .scheduler()
                .map_err(|e| ConfigError::Invalid(format!("settings.work_window: {}", e)))?;
        }

        Ok(())
    }

    /// Handler options for a resource type, empty when not configured
    pub fn defaults_for(&self, resource_type: &str) -> ResourceDefaults {
        self.resource_defaults
            .get(resource_type)
            .cloned()
            .unwrap_or_default()
    }
}
