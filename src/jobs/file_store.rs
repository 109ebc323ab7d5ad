//! File-backed job store: one pretty-printed JSON file per job.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{is_valid_job_id, Job, JobPatch, JobStore, StoreError};

/// Stores each job at `<dir>/<id>.json`.
///
/// Records are always written to a sibling temp file first.  Creation
/// hard-links the temp file into place (failing if the id exists) and
/// updates rename it over the record, so a concurrent reader sees either
/// no record, the old one, or the new one, never a torn one.  Same-id
/// updates are serialized by a per-id async lock that lives only while
/// someone holds or waits for it.
pub struct FileJobStore {
    dir: PathBuf,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl FileJobStore {
    /// Create a store rooted at `dir`.  The directory is created lazily.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    fn lock_for(&self, id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().expect("job lock map poisoned");
        locks.entry(id.to_string()).or_default().clone()
    }

    /// Forget the lock for `id` once `held` is its only user besides the map.
    fn release_lock(&self, id: &str, held: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.locks.lock().expect("job lock map poisoned");
        if Arc::strong_count(&held) == 2 {
            locks.remove(id);
        }
    }

    /// Number of per-id locks currently tracked.
    pub fn tracked_locks(&self) -> usize {
        self.locks.lock().expect("job lock map poisoned").len()
    }

    /// A temp path next to the record, unique per process and call.
    fn temp_path(&self, id: &str) -> PathBuf {
        static SEQ: AtomicU64 = AtomicU64::new(0);
        let seq = SEQ.fetch_add(1, Ordering::Relaxed);
        self.dir
            .join(format!(".{id}.{}.{seq}.tmp", std::process::id()))
    }

    async fn write_temp(&self, id: &str, job: &Job) -> Result<PathBuf, StoreError> {
        let json = serde_json::to_string_pretty(job)
            .map_err(|e| storage("serialize job".to_string(), e))?;
        let tmp = self.temp_path(id);
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| storage(format!("write {}", tmp.display()), e))?;
        Ok(tmp)
    }

    async fn discard(tmp: &Path) {
        if let Err(e) = tokio::fs::remove_file(tmp).await {
            warn!(path = %tmp.display(), error = %e, "could not remove temp job file");
        }
    }

    async fn ensure_dir(&self) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| storage(format!("create {}", self.dir.display()), e))
    }

    async fn read(&self, id: &str) -> Result<Job, StoreError> {
        if !is_valid_job_id(id) {
            return Err(StoreError::NotFound(id.to_string()));
        }
        let path = self.record_path(id);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(id.to_string()));
            }
            Err(e) => return Err(storage(format!("read {}", path.display()), e)),
        };
        serde_json::from_str(&raw).map_err(|e| storage(format!("parse {}", path.display()), e))
    }
}

fn storage(what: String, err: impl std::fmt::Display) -> StoreError {
    StoreError::Storage(format!("{what}: {err}"))
}

#[async_trait]
impl JobStore for FileJobStore {
    async fn create(&self, job: &Job) -> Result<(), StoreError> {
        if !is_valid_job_id(&job.id) {
            return Err(StoreError::Storage(format!("invalid job id: {}", job.id)));
        }
        self.ensure_dir().await?;
        let path = self.record_path(&job.id);
        let tmp = self.write_temp(&job.id, job).await?;

        // The link appears complete or not at all, and refuses to clobber.
        let linked = tokio::fs::hard_link(&tmp, &path).await;
        Self::discard(&tmp).await;
        match linked {
            Ok(()) => {
                debug!(job_id = %job.id, path = %path.display(), "job record created");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(StoreError::DuplicateId(job.id.clone()))
            }
            Err(e) => Err(storage(format!("link {}", path.display()), e)),
        }
    }

    async fn get(&self, id: &str) -> Result<Job, StoreError> {
        self.read(id).await
    }

    async fn update(&self, id: &str, patch: JobPatch) -> Result<Job, StoreError> {
        if !is_valid_job_id(id) {
            return Err(StoreError::NotFound(id.to_string()));
        }
        let lock = self.lock_for(id);
        let outcome = {
            let _guard = lock.lock().await;
            self.update_locked(id, patch).await
        };
        self.release_lock(id, lock);
        outcome
    }
}

impl FileJobStore {
    async fn update_locked(&self, id: &str, patch: JobPatch) -> Result<Job, StoreError> {
        let current = self.read(id).await?;
        let next = current.merged(patch)?;

        let path = self.record_path(id);
        let tmp = self.write_temp(id, &next).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            Self::discard(&tmp).await;
            return Err(storage(format!("rename onto {}", path.display()), e));
        }

        debug!(job_id = %id, status = %next.status, progress = next.progress, "job record updated");
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::JobStatus;

    #[tokio::test]
    async fn locks_are_dropped_after_updates() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileJobStore::new(dir.path()));
        store.create(&Job::pending("job-1", "created")).await.unwrap();

        let mut handles = Vec::new();
        for p in 1..=10u8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .update("job-1", JobPatch::default().progress(p * 5))
                    .await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        store
            .update("job-missing", JobPatch::default().progress(1))
            .await
            .unwrap_err();

        assert_eq!(store.tracked_locks(), 0);
    }

    #[tokio::test]
    async fn create_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileJobStore::new(dir.path());
        let job = Job::pending("job-2", "created");
        store.create(&job).await.unwrap();
        assert!(matches!(store.create(&job).await, Err(StoreError::DuplicateId(_))));
        store
            .update("job-2", JobPatch::default().status(JobStatus::Running))
            .await
            .unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["job-2.json".to_string()]);
    }
}
