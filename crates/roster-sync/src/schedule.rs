//! Fixed-interval trigger that runs download cycles in the background.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

use crate::{DownloadSummary, SyncEngine};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Reschedule {
    #[default]
    Always,
    UntilFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulePolicy {
    pub interval: Duration,
    pub reschedule: Reschedule,
}

impl SchedulePolicy {
    pub fn every(interval: Duration) -> Self {
        Self {
            interval,
            reschedule: Reschedule::default(),
        }
    }

    pub fn until_failure(mut self) -> Self {
        self.reschedule = Reschedule::UntilFailure;
        self
    }

    pub fn should_continue(&self, outcome: &CycleOutcome) -> bool {
        !matches!(
            (self.reschedule, outcome),
            (Reschedule::UntilFailure, CycleOutcome::Failed(_))
        )
    }
}

#[derive(Debug, Clone)]
pub enum CycleOutcome {
    Published(DownloadSummary),
    Failed(String),
    /// The previous cycle was still running when the trigger fired.
    Busy,
}

pub struct SyncTask {
    engine: Arc<SyncEngine>,
    policy: SchedulePolicy,
    running: Mutex<()>,
}

impl SyncTask {
    pub fn new(engine: Arc<SyncEngine>, policy: SchedulePolicy) -> Self {
        Self {
            engine,
            policy,
            running: Mutex::new(()),
        }
    }

    pub fn policy(&self) -> SchedulePolicy {
        self.policy
    }

    pub async fn run_cycle(&self) -> CycleOutcome {
        let Ok(_guard) = self.running.try_lock() else {
            warn!("previous sync cycle still running; skipping this tick");
            return CycleOutcome::Busy;
        };
        match self.engine.download().await {
            Ok(summary) => CycleOutcome::Published(summary),
            Err(err) => {
                error!(error = %err, "sync cycle failed");
                CycleOutcome::Failed(err.to_string())
            }
        }
    }

    /// Register the task as a repeated job and start the scheduler. The caller
    /// keeps the returned handle alive for as long as cycles should run.
    pub async fn start(self: Arc<Self>) -> Result<JobScheduler> {
        let sched = JobScheduler::new().await.context("creating scheduler")?;
        let interval = self.policy.interval;
        let task = Arc::clone(&self);
        let job = Job::new_repeated_async(interval, move |job_id, sched| {
            let task = Arc::clone(&task);
            Box::pin(async move {
                let outcome = task.run_cycle().await;
                if !task.policy.should_continue(&outcome) {
                    warn!("sync cycle failed; removing scheduled job");
                    if let Err(err) = sched.remove(&job_id).await {
                        error!(error = %err, "failed to remove scheduled sync job");
                    }
                }
            })
        })
        .context("creating repeated sync job")?;
        sched.add(job).await.context("adding sync job")?;
        sched.start().await.context("starting scheduler")?;
        info!(interval_secs = interval.as_secs(), reschedule = ?self.policy.reschedule, "sync scheduler started");
        Ok(sched)
    }
}
