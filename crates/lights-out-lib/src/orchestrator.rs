//! Orchestration run
//!
//! One run discovers resources, orders them by priority, skips resources with
//! no schedule tag, resolves a handler per resource and dispatches the
//! requested action. Resources are processed one at a time. A failure on one
//! resource is recorded and the run moves on; only a discovery failure aborts
//! the run.

use crate::config::LightsOutConfig;
use crate::discovery::{create_discovery, ResourceDiscovery};
use crate::error::DiscoveryError;
use crate::handlers::{HandlerRegistry, ResourceHandler};
use crate::health::{components, HealthRegistry};
use crate::models::{Action, DiscoveredResource, HandlerResult, OrchestrationSummary};
use crate::observability::{OrchestratorMetrics, StructuredLogger};
use crate::scheduler::schedule_for;
use futures::FutureExt;
use std::any::Any;
use std::cmp::Reverse;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

pub struct Orchestrator {
    config: Arc<LightsOutConfig>,
    registry: Arc<HandlerRegistry>,
    discovery: Option<Box<dyn ResourceDiscovery>>,
    dry_run: bool,
    metrics: OrchestratorMetrics,
    logger: StructuredLogger,
    health: Option<HealthRegistry>,
}

impl Orchestrator {
    /// Build an orchestrator whose discovery strategy follows `discovery.method`
    pub fn new(config: Arc<LightsOutConfig>, registry: Arc<HandlerRegistry>) -> Self {
        let discovery = create_discovery(&config, registry.control_plane());
        Self {
            dry_run: config.settings.dry_run,
            config,
            registry,
            discovery,
            metrics: OrchestratorMetrics::new(),
            logger: StructuredLogger::new("lights-out"),
            health: None,
        }
    }

    /// Replace the discovery strategy
    pub fn with_discovery(mut self, discovery: Box<dyn ResourceDiscovery>) -> Self {
        self.discovery = Some(discovery);
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Report component health to `health` after each run
    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn config(&self) -> &LightsOutConfig {
        &self.config
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Name of the configured discovery strategy, if any
    pub fn discovery_method(&self) -> Option<&'static str> {
        self.discovery.as_ref().map(|d| d.method())
    }

    /// Enumerate in-scope resources
    ///
    /// An unknown or missing discovery method yields an empty list.
    pub async fn discover_resources(&self) -> Result<Vec<DiscoveredResource>, DiscoveryError> {
        let Some(discovery) = &self.discovery else {
            warn!(
                method = ?self.config.discovery.method,
                "No usable discovery method, nothing to manage"
            );
            return Ok(Vec::new());
        };

        match discovery.discover().await {
            Ok(resources) => {
                self.metrics.set_discovered(resources.len());
                self.report(components::DISCOVERY, None).await;
                Ok(resources)
            }
            Err(e) => {
                self.metrics.inc_discovery_failures();
                self.report(components::DISCOVERY, Some(e.to_string())).await;
                Err(e)
            }
        }
    }

    pub async fn start_resources(&self) -> Result<OrchestrationSummary, DiscoveryError> {
        self.run(Action::Start, "").await
    }

    pub async fn stop_resources(&self) -> Result<OrchestrationSummary, DiscoveryError> {
        self.run(Action::Stop, "").await
    }

    pub async fn get_status(&self) -> Result<OrchestrationSummary, DiscoveryError> {
        self.run(Action::Status, "").await
    }

    /// Run one full discover-then-act pass
    ///
    /// `Discover` performs no handler work; every resource is counted as skipped.
    pub async fn run(
        &self,
        action: Action,
        request_id: &str,
    ) -> Result<OrchestrationSummary, DiscoveryError> {
        let started = Instant::now();
        self.logger.log_run_started(action, request_id, self.dry_run);

        let mut resources = match self.discover_resources().await {
            Ok(resources) => resources,
            Err(e) => {
                self.logger.log_discovery_failed(request_id, &e.to_string());
                return Err(e);
            }
        };
        order_for(action, &mut resources);

        let mut summary = OrchestrationSummary::new(action, resources.len());
        for resource in &resources {
            if action == Action::Discover {
                summary.record_skip();
                continue;
            }
            self.process(action, resource, &mut summary).await;
        }

        let elapsed = started.elapsed();
        self.metrics.observe_run(&summary, elapsed.as_secs_f64());
        self.logger
            .log_run_completed(&summary, request_id, elapsed.as_millis());
        let orchestrator_issue = (summary.failed > 0).then(|| {
            format!("{} of {} resources failed", summary.failed, summary.total)
        });
        self.report(components::ORCHESTRATOR, orchestrator_issue).await;
        let outages = summary
            .results
            .iter()
            .filter(|r| r.control_plane_fault)
            .count();
        let control_plane_issue = (outages > 0).then(|| {
            format!("control plane errors on {} of {} resources", outages, summary.total)
        });
        self.report(components::CONTROL_PLANE, control_plane_issue).await;

        Ok(summary)
    }

    async fn process(
        &self,
        action: Action,
        resource: &DiscoveredResource,
        summary: &mut OrchestrationSummary,
    ) {
        if schedule_for(resource, &self.config.settings.schedule_tag).is_none() {
            self.logger.log_resource_skipped(resource, "no schedule tag");
            summary.record_skip();
            return;
        }

        let Some(handler) = self
            .registry
            .resolve(&resource.resource_type, resource, &self.config)
        else {
            let result = HandlerResult::failed(
                action,
                resource,
                "No handler for resource type",
                format!("no handler registered for resource type '{}'", resource.resource_type),
            );
            self.logger.log_resource_failed(&result);
            summary.record(result);
            return;
        };

        debug!(
            action = %action,
            resource_type = %resource.resource_type,
            resource_id = %resource.resource_id,
            priority = resource.priority,
            "Dispatching resource"
        );

        let result = match AssertUnwindSafe(self.dispatch(action, handler.as_ref()))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                error!(
                    action = %action,
                    resource_id = %resource.resource_id,
                    panic = %reason,
                    "Handler panicked"
                );
                HandlerResult::failed(action, resource, "Unexpected handler failure", reason)
            }
        };

        if !result.success {
            self.logger.log_resource_failed(&result);
        }
        summary.record(result);
    }

    async fn dispatch(&self, action: Action, handler: &dyn ResourceHandler) -> HandlerResult {
        let resource = handler.resource();
        match action {
            Action::Start | Action::Stop if self.dry_run => {
                let previous = match handler.get_status().await {
                    Ok(status) => Some(status),
                    Err(e) => {
                        warn!(resource_id = %resource.resource_id, error = %e, "Dry run status read failed");
                        None
                    }
                };
                info!(action = %action, resource_id = %resource.resource_id, "Dry run, skipping mutation");
                HandlerResult::succeeded(
                    action,
                    resource,
                    format!("DRY RUN: would {} resource", action),
                    previous,
                )
                .as_dry_run()
            }
            Action::Start => handler.start().await,
            Action::Stop => handler.stop().await,
            Action::Status | Action::Discover => match handler.get_status().await {
                Ok(status) => HandlerResult::status(resource, status),
                Err(e) => {
                    HandlerResult::from_error(Action::Status, resource, "Status query failed", &e)
                }
            },
        }
    }

    async fn report(&self, component: &str, issue: Option<String>) {
        if let Some(health) = &self.health {
            health.report(component, issue).await;
        }
    }
}

/// Ascending priority for start, descending for stop; ties keep discovery order
pub fn order_for(action: Action, resources: &mut [DiscoveredResource]) {
    match action {
        Action::Start => resources.sort_by_key(|r| r.priority),
        Action::Stop => resources.sort_by_key(|r| Reverse(r.priority)),
        Action::Status | Action::Discover => {}
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}
