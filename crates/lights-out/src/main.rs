//! Lights-out - scheduled start/stop of tagged cloud resources
//!
//! Serves the action contract over HTTP and, when enabled, runs the
//! work-window loop that starts resources during working hours and stops
//! them outside.

use anyhow::{Context, Result};
use lights_out::{api, config::AgentConfig};
use lights_out_lib::{
    control_plane::Inventory, ControlPlane, HandlerRegistry, HealthRegistry, InMemoryControlPlane,
    Invoker, LightsOutConfig, Orchestrator, ScheduleRunner, StructuredLogger,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting lights-out");

    let agent = AgentConfig::load()?;
    info!(
        instance = %agent.instance_name,
        config_path = %agent.config_path,
        "Agent configured"
    );

    let config = LightsOutConfig::from_file(&agent.config_path)
        .with_context(|| format!("loading configuration from {}", agent.config_path))?;
    let config = Arc::new(config);

    let control_plane: Arc<dyn ControlPlane> = match &agent.inventory_path {
        Some(path) => {
            let inventory = Inventory::from_file(path)
                .with_context(|| format!("loading inventory from {}", path))?;
            Arc::new(InMemoryControlPlane::from_inventory(inventory))
        }
        None => {
            warn!("No inventory configured, control plane starts empty");
            Arc::new(InMemoryControlPlane::new())
        }
    };

    let health_registry = HealthRegistry::new();
    health_registry.register_all().await;

    let registry = Arc::new(HandlerRegistry::with_defaults(control_plane));
    let logger = StructuredLogger::new(&agent.instance_name);
    let dry_run = agent.resolve_dry_run(config.settings.dry_run);

    let orchestrator = Arc::new(
        Orchestrator::new(config.clone(), registry)
            .with_dry_run(dry_run)
            .with_health(health_registry.clone())
            .with_logger(logger.clone()),
    );

    logger.log_startup(
        VERSION,
        orchestrator.discovery_method().unwrap_or("none"),
        dry_run,
    );

    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        Invoker::new(orchestrator.clone()),
    ));

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let api_handle = tokio::spawn(api::serve(
        agent.api_port,
        app_state,
        shutdown_tx.subscribe(),
    ));

    let schedule_handle = if agent.schedule_enabled {
        let scheduler = config
            .settings
            .work_window
            .clone()
            .unwrap_or_default()
            .scheduler()
            .context("building work-window scheduler")?;
        let runner = ScheduleRunner::new(orchestrator.clone(), scheduler)
            .with_interval(Duration::from_secs(agent.schedule_interval_secs));
        Some(tokio::spawn(runner.run(shutdown_tx.subscribe())))
    } else {
        None
    };

    // Mark ready after initialization
    health_registry.set_ready(true).await;

    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    health_registry.set_ready(false).await;
    let _ = shutdown_tx.send(());

    if let Some(handle) = schedule_handle {
        if let Err(e) = handle.await {
            error!(error = %e, "Work-window loop terminated abnormally");
        }
    }
    match api_handle.await {
        Ok(Err(e)) => error!(error = %e, "API server failed"),
        Err(e) => error!(error = %e, "API server task terminated abnormally"),
        Ok(Ok(())) => {}
    }

    info!("Shutdown complete");
    Ok(())
}
