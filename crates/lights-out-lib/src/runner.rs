//! Work-window loop
//!
//! Periodically runs `start` inside the work window and `stop` outside it.
//! No state is carried between ticks.

use crate::error::DiscoveryError;
use crate::models::{Action, OrchestrationSummary};
use crate::orchestrator::Orchestrator;
use crate::scheduler::WorkScheduler;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

/// Default time between ticks
pub const DEFAULT_SCHEDULE_INTERVAL: Duration = Duration::from_secs(300);

pub struct ScheduleRunner {
    orchestrator: Arc<Orchestrator>,
    scheduler: WorkScheduler,
    interval: Duration,
}

impl ScheduleRunner {
    pub fn new(orchestrator: Arc<Orchestrator>, scheduler: WorkScheduler) -> Self {
        Self {
            orchestrator,
            scheduler,
            interval: DEFAULT_SCHEDULE_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Action a tick at `now` performs
    pub fn action_at(&self, now: DateTime<Utc>) -> Action {
        if self.scheduler.is_during_work_time(now) {
            Action::Start
        } else {
            Action::Stop
        }
    }

    /// Run the action due at `now`
    pub async fn tick_at(&self, now: DateTime<Utc>) -> Result<OrchestrationSummary, DiscoveryError> {
        let action = self.action_at(now);
        let request_id = uuid::Uuid::new_v4().to_string();
        info!(
            action = %action,
            request_id = %request_id,
            timezone = %self.scheduler.timezone(),
            "Scheduled run"
        );
        self.orchestrator.run(action, &request_id).await
    }

    /// Tick until a shutdown signal arrives
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.interval.as_secs(),
            timezone = %self.scheduler.timezone(),
            "Starting work-window loop"
        );

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.tick_at(Utc::now()).await {
                        Ok(summary) => info!(
                            action = %summary.action,
                            total = summary.total,
                            succeeded = summary.succeeded,
                            failed = summary.failed,
                            skipped = summary.skipped,
                            "Scheduled run complete"
                        ),
                        Err(e) => error!(error = %e, "Scheduled run aborted"),
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutting down work-window loop");
                    break;
                }
            }
        }
    }
}
