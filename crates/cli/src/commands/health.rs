//! Server health and readiness

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use tabled::Tabled;

use crate::client::{ApiClient, HealthResponse, ReadinessResponse};
use crate::output::{color_status, print_json, print_table, OutputFormat};

#[derive(Tabled)]
struct ComponentRow {
    #[tabled(rename = "Component")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Message")]
    message: String,
}

#[derive(Serialize)]
struct HealthReport {
    health: HealthResponse,
    readiness: ReadinessResponse,
}

/// Show health and readiness; returns false when the server is not ready
pub async fn show_health(client: &ApiClient, format: OutputFormat) -> Result<bool> {
    let (_, health): (_, HealthResponse) = client.get("healthz").await?;
    let (_, readiness): (_, ReadinessResponse) = client.get("readyz").await?;
    let ready = readiness.ready;

    match format {
        OutputFormat::Json => print_json(&HealthReport { health, readiness })?,
        OutputFormat::Table => {
            println!("{}", "Server Health".bold());
            println!("{}", "=".repeat(50));
            println!("Status:    {}", color_status(&health.status));
            let readiness_text = if ready { "ready" } else { "not ready" };
            match &readiness.reason {
                Some(reason) => println!("Readiness: {} ({})", color_status(readiness_text), reason),
                None => println!("Readiness: {}", color_status(readiness_text)),
            }
            println!();

            let rows: Vec<ComponentRow> = health
                .components
                .iter()
                .map(|(name, component)| ComponentRow {
                    name: name.clone(),
                    status: color_status(&component.status),
                    message: component.message.clone().unwrap_or_default(),
                })
                .collect();
            print_table(&rows);
        }
    }

    Ok(ready)
}
