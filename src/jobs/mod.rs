//! Asynchronous job subsystem.
//!
//! A [`Job`] is the durable, pollable record of one background migration.
//! Records live in a [`JobStore`]; the [`runner::JobRunner`] that owns a
//! job is its only writer after creation.

pub mod file_store;
pub mod memory_store;
pub mod runner;

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use file_store::FileJobStore;
pub use memory_store::MemoryJobStore;
pub use runner::{JobRunner, JobWork};

/// Lifecycle state of a job.
///
/// `Pending -> Running -> {Completed | Failed}`; the last two are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether a job in `self` may move to `next`.
    ///
    /// `Pending -> Running -> Completed`, with `Failed` reachable from
    /// either live state.  Staying put is always allowed for live states.
    pub fn can_enter(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Pending)
                | (Pending, Running)
                | (Pending, Failed)
                | (Running, Running)
                | (Running, Completed)
                | (Running, Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Running => "RUNNING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted job record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub status: JobStatus,
    /// Percentage, 0–100, never decreasing.
    pub progress: u8,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// A fresh `Pending` record at progress 0.
    pub fn pending(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: JobStatus::Pending,
            progress: 0,
            message: message.into(),
            result: None,
            error: None,
            updated_at: Utc::now(),
        }
    }

    /// Merge `patch` into a copy of this record.
    ///
    /// Progress only moves forward and is capped at 100.  Completing a job
    /// pins progress to 100 and drops any error; failing drops any result.
    /// Fails with [`StoreError::Terminal`] once the job is terminal, and
    /// with [`StoreError::InvalidTransition`] for a status change the
    /// lifecycle does not allow or a failure without a cause.
    pub fn merged(&self, patch: JobPatch) -> Result<Job, StoreError> {
        if self.status.is_terminal() {
            return Err(StoreError::Terminal(self.id.clone()));
        }
        let mut next = self.clone();
        if let Some(status) = patch.status {
            if !self.status.can_enter(status) {
                return Err(StoreError::InvalidTransition {
                    id: self.id.clone(),
                    reason: format!("cannot move from {} to {status}", self.status),
                });
            }
            next.status = status;
        }
        if let Some(progress) = patch.progress {
            next.progress = next.progress.max(progress.min(100));
        }
        if let Some(message) = patch.message {
            next.message = message;
        }
        if let Some(result) = patch.result {
            next.result = Some(result);
        }
        if let Some(error) = patch.error {
            next.error = Some(error);
        }
        match next.status {
            JobStatus::Completed => {
                next.progress = 100;
                next.error = None;
            }
            JobStatus::Failed => {
                if next.error.is_none() {
                    return Err(StoreError::InvalidTransition {
                        id: self.id.clone(),
                        reason: "a failed job needs an error".to_string(),
                    });
                }
                next.result = None;
            }
            JobStatus::Pending | JobStatus::Running => {}
        }
        next.updated_at = Utc::now();
        Ok(next)
    }
}

/// Partial update applied by [`JobStore::update`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub progress: Option<u8>,
    pub message: Option<String>,
    pub result: Option<Value>,
    pub error: Option<String>,
}

impl JobPatch {
    pub fn status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn result(mut self, result: Value) -> Self {
        self.result = Some(result);
        self
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Errors raised by a [`JobStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("job already exists: {0}")]
    DuplicateId(String),
    #[error("job not found: {0}")]
    NotFound(String),
    #[error("job {0} is already in a terminal state")]
    Terminal(String),
    #[error("job {id}: {reason}")]
    InvalidTransition { id: String, reason: String },
    #[error("job storage failure: {0}")]
    Storage(String),
}

/// Durable mapping from job id to job record.
///
/// Each id is an independent unit of storage; there are no multi-job
/// transactions.  `update` is a full read-modify-write of one record.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create(&self, job: &Job) -> Result<(), StoreError>;
    async fn get(&self, id: &str) -> Result<Job, StoreError>;
    async fn update(&self, id: &str, patch: JobPatch) -> Result<Job, StoreError>;
}

static LAST_JOB_MILLIS: AtomicU64 = AtomicU64::new(0);

/// Generate a fresh `job-<unix-millis>` id.
///
/// Ids are strictly increasing within the process, so two submissions in
/// the same millisecond still get distinct ids.
pub fn next_job_id() -> String {
    let now = Utc::now().timestamp_millis().max(0) as u64;
    let mut last = LAST_JOB_MILLIS.load(Ordering::Relaxed);
    loop {
        let candidate = now.max(last + 1);
        match LAST_JOB_MILLIS.compare_exchange_weak(
            last,
            candidate,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => return format!("job-{candidate}"),
            Err(actual) => last = actual,
        }
    }
}

/// True for ids that are safe to use as file stems.
pub fn is_valid_job_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
