//! Agent configuration

use anyhow::Result;
use serde::Deserialize;

/// Process-level configuration, read from `LIGHTS_OUT_*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Name attached to structured log events
    #[serde(default = "default_instance_name")]
    pub instance_name: String,

    /// API server port for invoke/health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Lights-out JSON configuration document
    #[serde(default = "default_config_path")]
    pub config_path: String,

    /// Optional inventory used to seed the in-memory control plane
    #[serde(default)]
    pub inventory_path: Option<String>,

    /// Run the work-window loop
    #[serde(default)]
    pub schedule_enabled: bool,

    /// Seconds between work-window ticks
    #[serde(default = "default_schedule_interval")]
    pub schedule_interval_secs: u64,

    /// Overrides `settings.dry_run` of the configuration document when set
    #[serde(default)]
    pub dry_run: Option<bool>,
}

fn default_instance_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "lights-out".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_config_path() -> String {
    "/etc/lights-out/config.json".to_string()
}

fn default_schedule_interval() -> u64 {
    300
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            instance_name: default_instance_name(),
            api_port: default_api_port(),
            config_path: default_config_path(),
            inventory_path: None,
            schedule_enabled: false,
            schedule_interval_secs: default_schedule_interval(),
            dry_run: None,
        }
    }
}

impl AgentConfig {
    /// Load configuration from the environment
    ///
    /// `DRY_RUN` takes precedence over `LIGHTS_OUT_DRY_RUN`.
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("LIGHTS_OUT").try_parsing(true))
            .build()?;

        let mut agent: AgentConfig = config.try_deserialize().unwrap_or_default();
        if let Some(dry_run) = env_flag(std::env::var("DRY_RUN").ok().as_deref()) {
            agent.dry_run = Some(dry_run);
        }
        Ok(agent)
    }

    /// Effective dry run: the override when present, else the document's setting
    pub fn resolve_dry_run(&self, document_dry_run: bool) -> bool {
        self.dry_run.unwrap_or(document_dry_run)
    }
}

/// Interpret an environment flag
///
/// `true`/`1`/`yes` and `false`/`0`/`no` (any case) are recognised; anything
/// else leaves the flag unset.
pub fn env_flag(value: Option<&str>) -> Option<bool> {
    let value = value?.trim().to_ascii_lowercase();
    match value.as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AgentConfig::default();
        assert_eq!(config.api_port, 8080);
        assert_eq!(config.config_path, "/etc/lights-out/config.json");
        assert_eq!(config.schedule_interval_secs, 300);
        assert!(!config.schedule_enabled);
        assert!(config.inventory_path.is_none());
    }

    #[test]
    fn test_env_flag() {
        assert_eq!(env_flag(Some("true")), Some(true));
        assert_eq!(env_flag(Some("TRUE")), Some(true));
        assert_eq!(env_flag(Some("1")), Some(true));
        assert_eq!(env_flag(Some(" Yes ")), Some(true));
        assert_eq!(env_flag(Some("false")), Some(false));
        assert_eq!(env_flag(Some("0")), Some(false));
        assert_eq!(env_flag(Some("NO")), Some(false));
        assert_eq!(env_flag(Some("maybe")), None);
        assert_eq!(env_flag(None), None);
    }

    #[test]
    fn test_dry_run_override_both_directions() {
        let mut agent = AgentConfig::default();
        assert!(agent.resolve_dry_run(true));
        assert!(!agent.resolve_dry_run(false));

        agent.dry_run = env_flag(Some("false"));
        assert!(!agent.resolve_dry_run(true));

        agent.dry_run = env_flag(Some("yes"));
        assert!(agent.resolve_dry_run(false));
    }
}
