//! Background execution of migration jobs.
//!
//! The runner owns a job from `Pending` until a terminal state.  Every
//! exit path ends in `Completed` or `Failed`: the work body runs in its
//! own task so that even a panic surfaces as a join error that gets
//! recorded on the job.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use super::{Job, JobPatch, JobStatus, JobStore, StoreError};
use crate::executor::ActionExecutor;

/// What a job should do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobWork {
    /// Executor action run once per application on a real run.
    pub action: String,
    /// Applications to process, in order.
    pub applications: Vec<String>,
    pub dry_run: bool,
}

/// Failure inside a job body.
#[derive(Debug, Error)]
enum RunError {
    #[error("{target}: {reason}")]
    Action { target: String, reason: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Runs jobs detached from the request that submitted them.
#[derive(Clone)]
pub struct JobRunner {
    store: Arc<dyn JobStore>,
    executor: Arc<dyn ActionExecutor>,
    phase_delay: Duration,
    tracker: TaskTracker,
}

impl JobRunner {
    pub fn new(
        store: Arc<dyn JobStore>,
        executor: Arc<dyn ActionExecutor>,
        phase_delay: Duration,
    ) -> Self {
        Self {
            store,
            executor,
            phase_delay,
            tracker: TaskTracker::new(),
        }
    }

    /// Start `work` for `job_id` in the background and return immediately.
    pub fn spawn(&self, job_id: String, work: JobWork) -> JoinHandle<()> {
        let runner = self.clone();
        self.tracker.spawn(async move {
            runner.run(&job_id, work).await;
        })
    }

    /// Number of jobs currently executing.
    pub fn active_jobs(&self) -> usize {
        self.tracker.len()
    }

    /// Wait up to `timeout` for running jobs to finish.
    ///
    /// Returns `true` when every job reached a terminal state in time.
    pub async fn drain(&self, timeout: Duration) -> bool {
        self.tracker.close();
        let drained = tokio::time::timeout(timeout, self.tracker.wait())
            .await
            .is_ok();
        self.tracker.reopen();
        drained
    }

    /// Drive one job to a terminal state.  Never returns early with the
    /// job left `Pending` or `Running` unless the store itself is down.
    pub async fn run(&self, job_id: &str, work: JobWork) {
        info!(
            job_id,
            action = %work.action,
            applications = work.applications.len(),
            dry_run = work.dry_run,
            "job started"
        );

        let body = {
            let runner = self.clone();
            let id = job_id.to_string();
            tokio::spawn(async move { runner.execute(&id, &work).await })
        };

        let outcome = match body.await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(e)) => Err(e.to_string()),
            Err(join_err) if join_err.is_panic() => {
                Err(format!("job worker panicked: {}", panic_message(join_err)))
            }
            Err(_) => Err("job worker was cancelled".to_string()),
        };

        let cause = match outcome {
            Ok(result) => {
                let done = JobPatch::default()
                    .status(JobStatus::Completed)
                    .progress(100)
                    .message("Migration completed successfully")
                    .result(result);
                match self.store.update(job_id, done).await {
                    Ok(_) => {
                        info!(job_id, "job completed");
                        return;
                    }
                    Err(e) => format!("could not record completion: {e}"),
                }
            }
            Err(cause) => cause,
        };

        warn!(job_id, error = %cause, "job failed");
        self.record_failure(job_id, &cause).await;
    }

    async fn record_failure(&self, job_id: &str, cause: &str) {
        let failed = JobPatch::default()
            .status(JobStatus::Failed)
            .message("Migration failed")
            .error(cause);
        if let Err(e) = self.store.update(job_id, failed).await {
            // Nobody is waiting on this task; the log is the only trace.
            error!(
                job_id,
                cause,
                store_error = %e,
                "unable to record job failure; job state is stale"
            );
        }
    }

    async fn execute(&self, job_id: &str, work: &JobWork) -> Result<Value, RunError> {
        self.store
            .update(
                job_id,
                JobPatch::default()
                    .status(JobStatus::Running)
                    .progress(10)
                    .message("Starting migration"),
            )
            .await?;

        let total = work.applications.len();
        let verb = if work.dry_run { "Simulated" } else { "Moved" };
        let mut moved = Vec::with_capacity(total);

        for (i, app) in work.applications.iter().enumerate() {
            if !self.phase_delay.is_zero() {
                tokio::time::sleep(self.phase_delay).await;
            }

            // A dry run only walks the phases; nothing is executed.
            if !work.dry_run {
                let out = self.executor.run(&work.action, std::slice::from_ref(app)).await;
                if out.failed {
                    return Err(RunError::Action {
                        target: app.clone(),
                        reason: out.failure_reason(),
                    });
                }
            }
            moved.push(app.clone());

            let progress = 10 + (80 * (i + 1) / total) as u8;
            self.store
                .update(
                    job_id,
                    JobPatch::default()
                        .progress(progress)
                        .message(format!("{verb} {app} ({}/{total})", i + 1)),
                )
                .await?;
        }

        Ok(json!({ "moved": moved, "dryRun": work.dry_run }))
    }
}

fn panic_message(err: tokio::task::JoinError) -> String {
    let payload = err.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Poll `store` until `job_id` is terminal or `timeout` elapses.
pub async fn wait_for_terminal(
    store: &dyn JobStore,
    job_id: &str,
    poll: Duration,
    timeout: Duration,
) -> Result<Job, StoreError> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let job = store.get(job_id).await?;
        if job.status.is_terminal() || tokio::time::Instant::now() >= deadline {
            return Ok(job);
        }
        tokio::time::sleep(poll).await;
    }
}
