//! API client for the lights-out invoke and health endpoints

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use url::Url;

/// Header carrying the caller's correlation id
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// API client for a lights-out server
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

/// Decoded `POST /invoke` reply
#[derive(Debug, Clone)]
pub enum InvokeOutcome {
    Run(RunResponse),
    Discover(DiscoverResponse),
    Error { status: StatusCode, body: ErrorResponse },
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            // Runs wait for every handler, including stabilization polling
            .timeout(std::time::Duration::from_secs(900))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// Make a GET request; non-success statuses still decode when the body parses
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<(StatusCode, T)> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        let status = response.status();
        let body = response.text().await.context("Failed to read response")?;
        let parsed = serde_json::from_str(&body)
            .with_context(|| format!("API error ({}): {}", status, body))?;
        Ok((status, parsed))
    }

    /// Run one action through `POST /invoke`
    pub async fn invoke(&self, action: &str, request_id: Option<&str>) -> Result<InvokeOutcome> {
        let url = self.base_url.join("invoke").context("Invalid path")?;

        let mut request = self.client.post(url).json(&InvokeRequest {
            action: action.to_string(),
        });
        if let Some(id) = request_id {
            request = request.header(REQUEST_ID_HEADER, id);
        }

        let response = request.send().await.context("Failed to send request")?;
        let status = response.status();
        let body: Value = response.json().await.context("Failed to parse response")?;

        if !status.is_success() {
            let body: ErrorResponse = serde_json::from_value(body)
                .with_context(|| format!("API error ({})", status))?;
            return Ok(InvokeOutcome::Error { status, body });
        }

        if body.get("discovered_count").is_some() {
            Ok(InvokeOutcome::Discover(
                serde_json::from_value(body).context("Failed to parse discover response")?,
            ))
        } else {
            Ok(InvokeOutcome::Run(
                serde_json::from_value(body).context("Failed to parse run response")?,
            ))
        }
    }
}

// API request/response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvokeRequest {
    pub action: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResponse {
    pub action: String,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    #[serde(default)]
    pub dry_run: bool,
    pub results: Vec<ResourceResult>,
    pub timestamp: String,
    pub request_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceResult {
    pub success: bool,
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_state: Option<ResourceState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_state: Option<ResourceState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub dry_run: bool,
}

/// Family-specific status snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceState {
    pub state: String,
    pub is_stopped: bool,
    #[serde(flatten)]
    pub details: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoverResponse {
    pub action: String,
    pub discovered_count: usize,
    pub resources: Vec<DiscoveredResource>,
    pub timestamp: String,
    pub request_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredResource {
    pub resource_type: String,
    pub resource_id: String,
    pub arn: String,
    pub priority: u32,
    pub group: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    pub error: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub request_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub components: std::collections::BTreeMap<String, ComponentHealth>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}
