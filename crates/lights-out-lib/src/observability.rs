//! Observability infrastructure for lights-out orchestration
//!
//! Provides:
//! - Prometheus metrics (run latency, per-outcome resource counts, discovery failures)
//! - Structured JSON event logging with tracing

use crate::models::{Action, DiscoveredResource, HandlerResult, OrchestrationSummary};
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge,
    register_int_gauge_vec, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for run latency (in seconds)
const RUN_LATENCY_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 300.0, 900.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<OrchestratorMetricsInner> = OnceLock::new();

struct OrchestratorMetricsInner {
    run_duration_seconds: HistogramVec,
    runs: IntCounterVec,
    resources_discovered: IntGauge,
    resource_outcomes: IntCounterVec,
    discovery_failures: IntCounter,
    last_run_timestamp: IntGaugeVec,
}

impl OrchestratorMetricsInner {
    fn new() -> Self {
        Self {
            run_duration_seconds: register_histogram_vec!(
                "lights_out_run_duration_seconds",
                "Time spent on one orchestration run",
                &["action"],
                RUN_LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register run_duration_seconds"),

            runs: register_int_counter_vec!(
                "lights_out_runs_total",
                "Orchestration runs by action",
                &["action"]
            )
            .expect("Failed to register runs_total"),

            resources_discovered: register_int_gauge!(
                "lights_out_resources_discovered",
                "Resources returned by the most recent discovery"
            )
            .expect("Failed to register resources_discovered"),

            resource_outcomes: register_int_counter_vec!(
                "lights_out_resource_outcomes_total",
                "Per-resource outcomes by action and outcome",
                &["action", "outcome"]
            )
            .expect("Failed to register resource_outcomes_total"),

            discovery_failures: register_int_counter!(
                "lights_out_discovery_failures_total",
                "Runs aborted because discovery failed"
            )
            .expect("Failed to register discovery_failures_total"),

            last_run_timestamp: register_int_gauge_vec!(
                "lights_out_last_run_timestamp_seconds",
                "Unix time of the last completed run by action",
                &["action"]
            )
            .expect("Failed to register last_run_timestamp_seconds"),
        }
    }
}

/// Orchestrator metrics for Prometheus exposition
///
/// A lightweight handle to the global metrics instance; clones share the
/// same underlying metrics.
#[derive(Clone)]
pub struct OrchestratorMetrics {
    _private: (),
}

impl Default for OrchestratorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl OrchestratorMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(OrchestratorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &OrchestratorMetricsInner {
        GLOBAL_METRICS.get_or_init(OrchestratorMetricsInner::new)
    }

    pub fn set_discovered(&self, count: usize) {
        self.inner()
            .resources_discovered
            .set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    pub fn inc_discovery_failures(&self) {
        self.inner().discovery_failures.inc();
    }

    /// Record a completed run and its per-resource outcomes
    pub fn observe_run(&self, summary: &OrchestrationSummary, duration_secs: f64) {
        let inner = self.inner();
        let action = summary.action.as_str();

        inner
            .run_duration_seconds
            .with_label_values(&[action])
            .observe(duration_secs);
        inner.runs.with_label_values(&[action]).inc();

        for (outcome, count) in [
            ("succeeded", summary.succeeded),
            ("failed", summary.failed),
            ("skipped", summary.skipped),
        ] {
            inner
                .resource_outcomes
                .with_label_values(&[action, outcome])
                .inc_by(count as u64);
        }

        inner
            .last_run_timestamp
            .with_label_values(&[action])
            .set(chrono::Utc::now().timestamp());
    }
}

/// Structured logger for orchestration events
///
/// Every event carries an `event` field so log pipelines can select on it.
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn log_run_started(&self, action: Action, request_id: &str, dry_run: bool) {
        info!(
            event = "run_started",
            instance = %self.instance,
            action = %action,
            request_id = %request_id,
            dry_run = dry_run,
            "Orchestration run started"
        );
    }

    pub fn log_run_completed(&self, summary: &OrchestrationSummary, request_id: &str, duration_ms: u128) {
        info!(
            event = "run_completed",
            instance = %self.instance,
            action = %summary.action,
            request_id = %request_id,
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            duration_ms = duration_ms as u64,
            "Orchestration run completed"
        );
    }

    pub fn log_resource_skipped(&self, resource: &DiscoveredResource, reason: &str) {
        info!(
            event = "resource_skipped",
            instance = %self.instance,
            resource_type = %resource.resource_type,
            resource_id = %resource.resource_id,
            reason = %reason,
            "Resource skipped"
        );
    }

    pub fn log_resource_failed(&self, result: &HandlerResult) {
        warn!(
            event = "resource_failed",
            instance = %self.instance,
            action = %result.action,
            resource_type = %result.resource_type,
            resource_id = %result.resource_id,
            message = %result.message,
            error = result.error.as_deref().unwrap_or_default(),
            "Resource operation failed"
        );
    }

    pub fn log_discovery_failed(&self, request_id: &str, error: &str) {
        warn!(
            event = "discovery_failed",
            instance = %self.instance,
            request_id = %request_id,
            error = %error,
            "Discovery failed, aborting run"
        );
    }

    pub fn log_startup(&self, version: &str, discovery_method: &str, dry_run: bool) {
        info!(
            event = "agent_started",
            instance = %self.instance,
            version = %version,
            discovery_method = %discovery_method,
            dry_run = dry_run,
            "Lights-out agent started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Lights-out agent shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_observe_run() {
        let metrics = OrchestratorMetrics::new();
        let mut summary = OrchestrationSummary::new(Action::Stop, 3);
        summary.record_skip();
        metrics.set_discovered(3);
        metrics.observe_run(&summary, 0.25);
        metrics.inc_discovery_failures();

        let families = prometheus::gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "lights_out_resource_outcomes_total"));
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("lights-out-test");
        assert_eq!(logger.instance, "lights-out-test");
    }
}
