//! End-to-end orchestration runs against the in-memory control plane

use lights_out_lib::control_plane::{ControlPlaneCall, DatabaseKind, Inventory};
use lights_out_lib::discovery::{async_trait, ResourceDiscovery};
use lights_out_lib::handlers::{HandlerContext, ResourceHandler};
use lights_out_lib::health::components;
use lights_out_lib::{
    Action, ComponentStatus, ControlPlaneError, DiscoveredResource, DiscoveryError, HandlerError,
    HandlerRegistry, HandlerResult, HealthRegistry, InMemoryControlPlane, Invoker,
    LightsOutConfig, Orchestrator, ResourceStatus,
};
use serde_json::json;
use std::io::Write;
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};

const MANAGED: (&str, &str) = ("lights-out:managed", "true");
const SCHEDULED: (&str, &str) = ("lights-out:schedule", "office-hours");

fn config() -> LightsOutConfig {
    LightsOutConfig::from_json_str(
        &json!({
            "discovery": {
                "method": "tags",
                "tag_filters": {"lights-out:managed": "true"}
            },
            "settings": {"schedule_tag": "lights-out:schedule"}
        })
        .to_string(),
    )
    .unwrap()
}

fn orchestrator(plane: &Arc<InMemoryControlPlane>, config: LightsOutConfig) -> Orchestrator {
    let registry = HandlerRegistry::with_defaults(plane.clone());
    Orchestrator::new(Arc::new(config), Arc::new(registry))
}

/// db (priority 1), app service (2), worker group (3)
fn three_tier() -> Arc<InMemoryControlPlane> {
    let plane = Arc::new(InMemoryControlPlane::new());
    plane.add_resource(
        "arn:aws:autoscaling:us-east-1:123456789012:autoScalingGroup:77aa:autoScalingGroupName/workers",
        [MANAGED, SCHEDULED, ("lights-out:priority", "3")],
    );
    plane.add_resource(
        "arn:aws:ecs:us-east-1:123456789012:service/main/app",
        [MANAGED, SCHEDULED, ("lights-out:priority", "2")],
    );
    plane.add_resource(
        "arn:aws:rds:us-east-1:123456789012:db:orders",
        [MANAGED, SCHEDULED, ("lights-out:priority", "1")],
    );
    plane.add_scaling_group("workers", 1, 4, 2);
    plane.add_service("main", "app", 2, 2);
    plane.add_database(DatabaseKind::Instance, "orders", "available");
    plane
}

fn processed(results: &[HandlerResult]) -> Vec<&str> {
    results.iter().map(|r| r.resource_id.as_str()).collect()
}

fn mutations(plane: &InMemoryControlPlane) -> Vec<ControlPlaneCall> {
    plane.calls().into_iter().filter(|c| c.is_mutating()).collect()
}

#[tokio::test]
async fn stop_runs_in_descending_priority() {
    let plane = three_tier();
    let orchestrator = orchestrator(&plane, config());

    let summary = assert_ok!(orchestrator.stop_resources().await);

    assert_eq!(summary.total, 3);
    assert_eq!(summary.succeeded, 3);
    assert_eq!(processed(&summary.results), vec!["workers", "main/app", "orders"]);

    let calls = mutations(&plane);
    assert!(matches!(calls[0], ControlPlaneCall::UpdateScalingGroup { desired_capacity: 0, .. }));
    assert!(matches!(calls[1], ControlPlaneCall::UpdateService { desired_count: 0, .. }));
    assert!(matches!(calls[2], ControlPlaneCall::StopDatabase { .. }));
}

#[tokio::test]
async fn start_runs_in_ascending_priority() {
    let plane = three_tier();
    let orchestrator = orchestrator(&plane, config());
    assert_ok!(orchestrator.stop_resources().await);

    let summary = assert_ok!(orchestrator.start_resources().await);

    assert_eq!(summary.succeeded, 3);
    assert_eq!(processed(&summary.results), vec!["orders", "main/app", "workers"]);
    assert_eq!(plane.service("main", "app").unwrap().desired_count, 1);
    assert_eq!(
        plane.database(DatabaseKind::Instance, "orders").unwrap().status,
        "available"
    );
}

#[tokio::test]
async fn second_stop_reports_already_stopped() {
    let plane = three_tier();
    let orchestrator = orchestrator(&plane, config());

    assert_ok!(orchestrator.stop_resources().await);
    let before = plane.mutation_count();
    let summary = assert_ok!(orchestrator.stop_resources().await);

    assert_eq!(summary.succeeded, 3);
    assert_eq!(plane.mutation_count(), before);
    for result in &summary.results {
        assert!(result.message.contains("already stopped"), "{}", result.message);
        assert!(result.previous_state.as_ref().unwrap().is_stopped);
    }
}

#[tokio::test]
async fn unscheduled_resources_are_skipped_not_failed() {
    let plane = three_tier();
    plane.add_resource("arn:aws:ec2:us-east-1:123456789012:instance/i-adhoc", [MANAGED]);
    plane.add_instance("i-adhoc", "running");
    let orchestrator = orchestrator(&plane, config());

    let summary = assert_ok!(orchestrator.stop_resources().await);

    assert_eq!(summary.total, 4);
    assert_eq!(summary.succeeded, 3);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.skipped, 1);
    assert!(summary.is_complete());
    assert_eq!(plane.instance("i-adhoc").unwrap().state, "running");
}

struct StaticDiscovery(Vec<DiscoveredResource>);

#[async_trait]
impl ResourceDiscovery for StaticDiscovery {
    fn method(&self) -> &'static str {
        "static"
    }

    async fn discover(&self) -> Result<Vec<DiscoveredResource>, DiscoveryError> {
        Ok(self.0.clone())
    }
}

struct PanickingHandler(DiscoveredResource);

#[async_trait]
impl ResourceHandler for PanickingHandler {
    fn resource(&self) -> &DiscoveredResource {
        &self.0
    }

    async fn get_status(&self) -> Result<ResourceStatus, HandlerError> {
        panic!("status exploded");
    }

    async fn start(&self) -> HandlerResult {
        panic!("start exploded");
    }

    async fn stop(&self) -> HandlerResult {
        panic!("stop exploded");
    }

    async fn is_ready(&self) -> bool {
        false
    }
}

#[tokio::test]
async fn failures_are_isolated_per_resource() {
    let plane = Arc::new(InMemoryControlPlane::new());
    let mut registry = HandlerRegistry::with_defaults(plane.clone());
    registry.register("volatile-thing", |ctx: HandlerContext| {
        Box::new(PanickingHandler(ctx.resource))
    });

    let resources = vec![
        DiscoveredResource::new("volatile-thing", "arn:volatile", "v-1")
            .with_tag(SCHEDULED.0, SCHEDULED.1),
        DiscoveredResource::new("mystery-thing", "arn:mystery", "m-1")
            .with_tag(SCHEDULED.0, SCHEDULED.1),
    ];
    let orchestrator = Orchestrator::new(Arc::new(config()), Arc::new(registry))
        .with_discovery(Box::new(StaticDiscovery(resources)));

    let summary = assert_ok!(orchestrator.stop_resources().await);

    assert_eq!(summary.total, 2);
    assert_eq!(summary.succeeded, 0);
    assert_eq!(summary.failed, 2);
    assert!(summary.results[0].error.as_deref().unwrap().contains("stop exploded"));
    assert!(summary.results[1].error.as_deref().unwrap().contains("no handler"));
}

#[tokio::test]
async fn unknown_discovery_method_yields_nothing() {
    let plane = three_tier();
    let mut config = config();
    config.discovery.method = Some("unknown".to_string());
    let orchestrator = orchestrator(&plane, config);

    let resources = assert_ok!(orchestrator.discover_resources().await);
    assert!(resources.is_empty());

    let summary = assert_ok!(orchestrator.stop_resources().await);
    assert_eq!(summary.total, 0);
    assert!(plane.calls().is_empty());
}

#[tokio::test]
async fn invalid_priority_tag_uses_default() {
    let plane = Arc::new(InMemoryControlPlane::new());
    plane.add_resource(
        "arn:aws:ecs:us-east-1:123456789012:service/main/api",
        [MANAGED, SCHEDULED, ("lights-out:priority", "high")],
    );
    let orchestrator = orchestrator(&plane, config());

    let resources = assert_ok!(orchestrator.discover_resources().await);
    assert_eq!(resources.len(), 1);
    assert_eq!(resources[0].priority, 50);
}

#[tokio::test]
async fn discovery_failure_aborts_run() {
    let plane = three_tier();
    plane.fail_discovery(ControlPlaneError::Transport("connection reset".into()));
    let health = HealthRegistry::new();
    health.register_all().await;
    let orchestrator = orchestrator(&plane, config()).with_health(health.clone());

    let err = assert_err!(orchestrator.stop_resources().await);
    assert!(err.to_string().contains("connection reset"));
    assert_eq!(plane.mutation_count(), 0);

    let report = health.health().await;
    assert_eq!(
        report.components[components::DISCOVERY].status,
        ComponentStatus::Degraded
    );
}

#[tokio::test]
async fn control_plane_outage_degrades_component() {
    let plane = three_tier();
    plane.fail_resource("orders", ControlPlaneError::Transport("connection refused".into()));
    let health = HealthRegistry::new();
    health.register_all().await;
    health.set_ready(true).await;
    let orchestrator = orchestrator(&plane, config()).with_health(health.clone());

    let summary = assert_ok!(orchestrator.stop_resources().await);
    assert_eq!(summary.failed, 1);
    assert!(summary.results.iter().any(|r| r.control_plane_fault));

    let report = health.health().await;
    let control_plane = &report.components[components::CONTROL_PLANE];
    assert_eq!(control_plane.status, ComponentStatus::Degraded);
    assert!(control_plane
        .message
        .as_deref()
        .is_some_and(|m| m.contains("control plane errors on 1 of 3")));

    for _ in 0..3 {
        assert_ok!(orchestrator.stop_resources().await);
    }
    let report = health.health().await;
    assert_eq!(
        report.components[components::CONTROL_PLANE].status,
        ComponentStatus::Unhealthy
    );
    assert!(!health.readiness().await.ready);
}

#[tokio::test]
async fn missing_resource_is_not_a_control_plane_outage() {
    let plane = Arc::new(InMemoryControlPlane::new());
    plane.add_resource(
        "arn:aws:rds:us-east-1:123456789012:db:ghost",
        [MANAGED, SCHEDULED],
    );
    let health = HealthRegistry::new();
    health.register_all().await;
    let orchestrator = orchestrator(&plane, config()).with_health(health.clone());

    let summary = assert_ok!(orchestrator.stop_resources().await);
    assert_eq!(summary.failed, 1);

    let report = health.health().await;
    assert_eq!(
        report.components[components::CONTROL_PLANE].status,
        ComponentStatus::Healthy
    );
    assert_eq!(
        report.components[components::ORCHESTRATOR].status,
        ComponentStatus::Degraded
    );
}

#[tokio::test]
async fn dry_run_reads_status_without_mutating() {
    let plane = three_tier();
    let mut config = config();
    config.settings.dry_run = true;
    let orchestrator = orchestrator(&plane, config);

    let summary = assert_ok!(orchestrator.stop_resources().await);

    assert_eq!(summary.succeeded, 3);
    assert_eq!(plane.mutation_count(), 0);
    for result in &summary.results {
        assert!(result.dry_run);
        assert_eq!(result.message, "DRY RUN: would stop resource");
        assert!(result.previous_state.is_some());
    }
}

#[tokio::test]
async fn status_reports_current_state() {
    let plane = three_tier();
    let orchestrator = orchestrator(&plane, config());

    let summary = assert_ok!(orchestrator.get_status().await);

    assert_eq!(summary.action, Action::Status);
    assert_eq!(summary.succeeded, 3);
    let app = summary
        .results
        .iter()
        .find(|r| r.resource_id == "main/app")
        .unwrap();
    let state = app.current_state.as_ref().unwrap();
    assert_eq!(state.detail_u64("desired_count"), Some(2));
    assert_eq!(plane.mutation_count(), 0);
}

#[tokio::test]
async fn invoker_response_contract() {
    let plane = three_tier();
    let invoker = Invoker::new(Arc::new(orchestrator(&plane, config())));

    let invalid = invoker.handle(Some("reboot"), "req-1").await;
    assert_eq!(invalid.status_code, 400);
    assert_eq!(
        invalid.body["error"],
        "Invalid action 'reboot'. Valid actions: start, stop, status, discover"
    );
    assert_eq!(invalid.body["request_id"], "req-1");
    assert!(plane.calls().is_empty());

    let discovered = invoker.handle(Some("discover"), "req-2").await;
    assert_eq!(discovered.status_code, 200);
    assert_eq!(discovered.body["discovered_count"], 3);
    assert_eq!(discovered.body["resources"][2]["resource_type"], "rds-db");
    assert_eq!(plane.mutation_count(), 0);

    let status = invoker.handle(None, "req-3").await;
    assert_eq!(status.status_code, 200);
    assert_eq!(status.body["action"], "status");
    assert_eq!(status.body["total"], 3);
    assert!(status.body["timestamp"].as_str().unwrap().ends_with('Z'));

    plane.fail_discovery(ControlPlaneError::Throttled("slow down".into()));
    let failed = invoker.handle(Some("stop"), "req-4").await;
    assert_eq!(failed.status_code, 500);
    assert!(failed.body["error"].as_str().unwrap().contains("slow down"));
}

#[tokio::test]
async fn inventory_file_seeds_control_plane() {
    let inventory = json!({
        "resources": [
            {"arn": "arn:aws:ec2:us-east-1:123456789012:instance/i-0abc", "tags": {"lights-out:managed": "true", "lights-out:schedule": "office-hours"}},
            {"arn": "arn:aws:rds:us-east-1:123456789012:cluster:aurora", "tags": {"lights-out:managed": "true", "lights-out:schedule": "office-hours", "lights-out:priority": "1"}}
        ],
        "instances": [{"instance_id": "i-0abc", "state": "running"}],
        "databases": [{"kind": "cluster", "identifier": "aurora", "status": "available"}]
    });
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(inventory.to_string().as_bytes()).unwrap();

    let plane = Arc::new(InMemoryControlPlane::from_inventory(
        Inventory::from_file(file.path()).unwrap(),
    ));
    let orchestrator = orchestrator(&plane, config());

    let summary = assert_ok!(orchestrator.stop_resources().await);
    assert_eq!(processed(&summary.results), vec!["i-0abc", "aurora"]);
    assert_eq!(plane.instance("i-0abc").unwrap().state, "stopped");
    assert_eq!(
        plane.database(DatabaseKind::Cluster, "aurora").unwrap().status,
        "stopped"
    );
}
