//! Request dispatch.
//!
//! [`Dispatcher::dispatch`] is the single entry point used by every
//! transport: it validates the request against the tool registry, runs
//! the matching handler (or submits a background job), and folds every
//! outcome into an [`Envelope`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::{Config, JobStoreKind};
use crate::envelope::{DispatchError, Envelope};
use crate::executor::{ActionExecutor, SystemExecutor};
use crate::jobs::{
    next_job_id, FileJobStore, Job, JobRunner, JobStore, JobWork, MemoryJobStore, StoreError,
};
use crate::tools::builtins::{cleanup, disk, jobs, migrate, recommend, state};
use crate::tools::{registry, ToolCall, ToolRegistry};

/// Attempts at finding an unused job id before giving up.
const MAX_ID_ATTEMPTS: usize = 5;

/// Settings the handlers need from the configuration.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub migration_state_path: PathBuf,
    pub disks: Vec<String>,
    pub migration_action: String,
}

impl DispatchSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            migration_state_path: cfg.migration_state_path(),
            disks: cfg.disks.clone(),
            migration_action: cfg.runner.action.clone(),
        }
    }
}

/// Routes validated requests to handlers.
#[derive(Clone)]
pub struct Dispatcher {
    registry: &'static ToolRegistry,
    executor: Arc<dyn ActionExecutor>,
    store: Arc<dyn JobStore>,
    runner: JobRunner,
    settings: DispatchSettings,
}

impl Dispatcher {
    pub fn new(
        executor: Arc<dyn ActionExecutor>,
        store: Arc<dyn JobStore>,
        phase_delay: Duration,
        settings: DispatchSettings,
    ) -> Self {
        let runner = JobRunner::new(store.clone(), executor.clone(), phase_delay);
        Self {
            registry: registry(),
            executor,
            store,
            runner,
            settings,
        }
    }

    /// Wire up the production executor and the configured job store.
    pub fn from_config(cfg: &Config) -> Self {
        let executor: Arc<dyn ActionExecutor> =
            Arc::new(SystemExecutor::new(cfg.scripts_dir.clone(), &cfg.executor));
        let store: Arc<dyn JobStore> = match cfg.job_store {
            JobStoreKind::File => Arc::new(FileJobStore::new(cfg.jobs_dir())),
            JobStoreKind::Memory => Arc::new(MemoryJobStore::new()),
        };
        Self::new(
            executor,
            store,
            Duration::from_millis(cfg.runner.phase_delay_ms),
            DispatchSettings::from_config(cfg),
        )
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    pub fn runner(&self) -> &JobRunner {
        &self.runner
    }

    pub fn registry(&self) -> &'static ToolRegistry {
        self.registry
    }

    /// Validate and execute one request.  Never fails: errors come back
    /// as error envelopes.
    pub async fn dispatch(&self, tool_name: &str, raw_args: Value) -> Envelope {
        match self.try_dispatch(tool_name, raw_args).await {
            Ok(env) => env,
            Err(err) => {
                warn!(tool = tool_name, kind = ?err.kind(), error = %err, "dispatch failed");
                err.into()
            }
        }
    }

    async fn try_dispatch(
        &self,
        tool_name: &str,
        raw_args: Value,
    ) -> Result<Envelope, DispatchError> {
        let args = self.registry.validate(tool_name, raw_args)?;
        let call = ToolCall::decode(tool_name, args)
            .map_err(|e| DispatchError::InvalidArguments(e.to_string()))?;
        debug!(tool = tool_name, "dispatching");

        let exec = self.executor.as_ref();
        let text = match call {
            ToolCall::AnalyzeDiskUsage(args) => disk::analyze_disk_usage(exec, &args).await?,
            ToolCall::MigrateUserData(args) => migrate::migrate_user_data(exec, &args).await?,
            ToolCall::CleanupSystem(args) => cleanup::cleanup_system(exec, &args).await?,
            ToolCall::CheckDiskStatus(args) => {
                disk::check_disk_status(
                    exec,
                    &self.settings.disks,
                    &self.settings.migration_state_path,
                    &args,
                )
                .await?
            }
            ToolCall::GetMigrationStatus(_) => {
                state::get_migration_status(&self.settings.migration_state_path).await
            }
            ToolCall::StartAppMigrationJob(args) => {
                let id = self
                    .submit(JobWork {
                        action: self.settings.migration_action.clone(),
                        applications: args.applications,
                        dry_run: args.dry_run,
                    })
                    .await?;
                return Ok(Envelope::JobAccepted(id));
            }
            ToolCall::GetJobStatus(args) => {
                jobs::get_job_status(self.store.as_ref(), &args).await?
            }
            ToolCall::RestoreApplications(args) => {
                migrate::restore_applications(exec, &args).await?
            }
            ToolCall::GetRecommendations(args) => {
                recommend::get_recommendations(exec, &args).await?
            }
        };
        Ok(Envelope::Text(text))
    }

    /// Persist a `Pending` record, then start its runner detached.
    async fn submit(&self, work: JobWork) -> Result<String, DispatchError> {
        let mut last_err = None;
        for _ in 0..MAX_ID_ATTEMPTS {
            let job = Job::pending(next_job_id(), "Job created, waiting to start");
            match self.store.create(&job).await {
                Ok(()) => {
                    info!(job_id = %job.id, applications = work.applications.len(), "job submitted");
                    self.runner.spawn(job.id.clone(), work);
                    return Ok(job.id);
                }
                Err(StoreError::DuplicateId(id)) => {
                    debug!(job_id = %id, "job id taken, retrying");
                    last_err = Some(StoreError::DuplicateId(id));
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(last_err
            .map(DispatchError::from)
            .unwrap_or_else(|| DispatchError::StoreFailure("could not allocate a job id".into())))
    }
}
