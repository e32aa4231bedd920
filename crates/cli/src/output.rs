//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use crate::client::ResourceState;

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a table from a list of rows
pub fn print_table<T: Tabled>(rows: &[T]) {
    if rows.is_empty() {
        println!("{}", "No items found".yellow());
        return;
    }
    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{}", table);
}

/// Print any response as pretty JSON
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Short "state (k=v, ...)" rendering of a status snapshot
pub fn format_state(state: Option<&ResourceState>) -> String {
    let Some(state) = state else {
        return "-".to_string();
    };
    if state.details.is_empty() {
        return state.state.clone();
    }
    let details: Vec<String> = state
        .details
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect();
    format!("{} ({})", state.state, details.join(", "))
}

/// Color an outcome or health status
pub fn color_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "ok" | "healthy" | "ready" | "running" | "active" | "available" => {
            status.green().to_string()
        }
        "degraded" | "skipped" | "dry-run" | "stopping" | "pending" | "starting" => {
            status.yellow().to_string()
        }
        "failed" | "unhealthy" | "not ready" => status.red().to_string(),
        "stopped" => status.blue().to_string(),
        _ => status.to_string(),
    }
}
