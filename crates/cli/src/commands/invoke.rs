//! Action commands: start, stop, status and discover

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{ApiClient, DiscoverResponse, InvokeOutcome, RunResponse};
use crate::output::{
    color_status, format_state, print_error, print_info, print_json, print_success, print_table,
    print_warning, OutputFormat,
};

/// Row for per-resource results
#[derive(Tabled)]
struct ResultRow {
    #[tabled(rename = "Type")]
    resource_type: String,
    #[tabled(rename = "Resource")]
    resource_id: String,
    #[tabled(rename = "Outcome")]
    outcome: String,
    #[tabled(rename = "Message")]
    message: String,
    #[tabled(rename = "State")]
    state: String,
}

/// Row for discovered resources
#[derive(Tabled)]
struct DiscoveredRow {
    #[tabled(rename = "Priority")]
    priority: u32,
    #[tabled(rename = "Group")]
    group: String,
    #[tabled(rename = "Type")]
    resource_type: String,
    #[tabled(rename = "Resource")]
    resource_id: String,
}

/// Run an action; returns false when the server rejected it or any resource failed
pub async fn run_action(
    client: &ApiClient,
    action: &str,
    request_id: Option<&str>,
    format: OutputFormat,
) -> Result<bool> {
    match client.invoke(action, request_id).await? {
        InvokeOutcome::Run(response) => {
            let ok = response.failed == 0;
            match format {
                OutputFormat::Json => print_json(&response)?,
                OutputFormat::Table => print_run(&response),
            }
            Ok(ok)
        }
        InvokeOutcome::Discover(response) => {
            match format {
                OutputFormat::Json => print_json(&response)?,
                OutputFormat::Table => print_discovered(&response),
            }
            Ok(true)
        }
        InvokeOutcome::Error { status, body } => {
            match format {
                OutputFormat::Json => print_json(&body)?,
                OutputFormat::Table => {
                    print_error(&format!("{} ({})", body.error, status));
                    if !body.request_id.is_empty() {
                        eprintln!("  request id: {}", body.request_id);
                    }
                }
            }
            Ok(false)
        }
    }
}

fn print_run(response: &RunResponse) {
    let title = format!("{} run", response.action).bold();
    if response.dry_run {
        println!("{} {}", title, "(dry run)".yellow());
    } else {
        println!("{}", title);
    }
    println!("{}", "=".repeat(60));

    let rows: Vec<ResultRow> = response
        .results
        .iter()
        .map(|r| ResultRow {
            resource_type: r.resource_type.clone(),
            resource_id: r.resource_id.clone(),
            outcome: color_status(if r.success { "ok" } else { "failed" }),
            message: match &r.error {
                Some(error) => format!("{}: {}", r.message, error),
                None => r.message.clone(),
            },
            state: format_state(r.current_state.as_ref().or(r.previous_state.as_ref())),
        })
        .collect();
    print_table(&rows);
    println!();

    let summary = format!(
        "{} total, {} succeeded, {} failed, {} skipped",
        response.total, response.succeeded, response.failed, response.skipped
    );
    if response.failed > 0 {
        print_warning(&summary);
    } else {
        print_success(&summary);
    }
    print_info(&format!("request id: {}", response.request_id));
}

fn print_discovered(response: &DiscoverResponse) {
    println!("{}", "Discovered resources".bold());
    println!("{}", "=".repeat(60));

    let rows: Vec<DiscoveredRow> = response
        .resources
        .iter()
        .map(|r| DiscoveredRow {
            priority: r.priority,
            group: r.group.clone(),
            resource_type: r.resource_type.clone(),
            resource_id: r.resource_id.clone(),
        })
        .collect();
    print_table(&rows);
    println!();
    print_info(&format!(
        "{} resources, request id: {}",
        response.discovered_count, response.request_id
    ));
}
