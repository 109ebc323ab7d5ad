//! Integration tests for the job stores.

mod common;

use std::sync::Arc;

use common::tmp;
use disk_assistant::jobs::{
    FileJobStore, Job, JobPatch, JobStatus, JobStore, MemoryJobStore, StoreError,
};
use serde_json::json;

fn stores(dir: &tempfile::TempDir) -> Vec<(&'static str, Arc<dyn JobStore>)> {
    let file: Arc<dyn JobStore> = Arc::new(FileJobStore::new(dir.path().join("jobs")));
    let memory: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
    vec![("file", file), ("memory", memory)]
}

// ── Create / get ────────────────────────────────────────────

#[tokio::test]
async fn create_twice_is_duplicate() {
    let dir = tmp();
    for (name, store) in stores(&dir) {
        let job = Job::pending("job-1", "created");
        store.create(&job).await.unwrap();
        let err = store.create(&job).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateId(ref id) if id == "job-1"), "{name}: {err}");
    }
}

#[tokio::test]
async fn get_unknown_is_not_found() {
    let dir = tmp();
    for (name, store) in stores(&dir) {
        let err = store.get("job-404").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)), "{name}: {err}");
        let err = store
            .update("job-404", JobPatch::default().progress(5))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)), "{name}: {err}");
    }
}

#[tokio::test]
async fn written_record_reads_back_unchanged() {
    let dir = tmp();
    for (name, store) in stores(&dir) {
        store.create(&Job::pending("job-7", "created")).await.unwrap();
        let written = store
            .update(
                "job-7",
                JobPatch::default()
                    .status(JobStatus::Running)
                    .progress(40)
                    .message("Moved Foo.app (1/2)"),
            )
            .await
            .unwrap();
        let read = store.get("job-7").await.unwrap();
        assert_eq!(read, written, "{name}");
    }
}

// ── Update rules ────────────────────────────────────────────

#[tokio::test]
async fn progress_never_goes_backwards() {
    let dir = tmp();
    for (name, store) in stores(&dir) {
        store.create(&Job::pending("job-2", "created")).await.unwrap();
        store
            .update("job-2", JobPatch::default().progress(50))
            .await
            .unwrap();
        let job = store
            .update("job-2", JobPatch::default().progress(20).message("late"))
            .await
            .unwrap();
        assert_eq!(job.progress, 50, "{name}");
        assert_eq!(job.message, "late", "{name}");
    }
}

#[tokio::test]
async fn terminal_jobs_reject_updates() {
    let dir = tmp();
    for (name, store) in stores(&dir) {
        store.create(&Job::pending("job-3", "created")).await.unwrap();
        store
            .update("job-3", JobPatch::default().status(JobStatus::Running))
            .await
            .unwrap();
        let done = store
            .update(
                "job-3",
                JobPatch::default()
                    .status(JobStatus::Completed)
                    .result(json!({ "moved": [], "dryRun": true })),
            )
            .await
            .unwrap();
        assert_eq!(done.progress, 100, "{name}");

        let err = store
            .update("job-3", JobPatch::default().status(JobStatus::Running))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Terminal(_)), "{name}: {err}");
        assert_eq!(store.get("job-3").await.unwrap(), done, "{name}");
    }
}

#[tokio::test]
async fn failed_jobs_carry_error_not_result() {
    let dir = tmp();
    for (name, store) in stores(&dir) {
        store.create(&Job::pending("job-4", "created")).await.unwrap();
        let job = store
            .update(
                "job-4",
                JobPatch::default()
                    .status(JobStatus::Failed)
                    .result(json!({ "moved": ["half"] }))
                    .error("disk full"),
            )
            .await
            .unwrap();
        assert_eq!(job.error.as_deref(), Some("disk full"), "{name}");
        assert!(job.result.is_none(), "{name}");
    }
}

#[tokio::test]
async fn lifecycle_violations_are_rejected_and_leave_the_record() {
    let dir = tmp();
    for (name, store) in stores(&dir) {
        store.create(&Job::pending("job-8", "created")).await.unwrap();
        let err = store
            .update("job-8", JobPatch::default().status(JobStatus::Completed))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }), "{name}: {err}");

        store
            .update("job-8", JobPatch::default().status(JobStatus::Running))
            .await
            .unwrap();
        let err = store
            .update("job-8", JobPatch::default().status(JobStatus::Failed))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }), "{name}: {err}");
        assert_eq!(store.get("job-8").await.unwrap().status, JobStatus::Running, "{name}");
    }
}

// ── File store specifics ────────────────────────────────────

#[tokio::test]
async fn file_records_use_camel_case_and_uppercase_status() {
    let dir = tmp();
    let store = FileJobStore::new(dir.path().join("jobs"));
    store.create(&Job::pending("job-5", "created")).await.unwrap();

    let raw = std::fs::read_to_string(dir.path().join("jobs").join("job-5.json")).unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(value["status"], "PENDING");
    assert_eq!(value["progress"], 0);
    assert!(value.get("updatedAt").is_some());
    assert!(value.get("result").is_none());
}

#[tokio::test]
async fn path_like_ids_are_never_found() {
    let dir = tmp();
    let store = FileJobStore::new(dir.path().join("jobs"));
    let err = store.get("../config").await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

#[tokio::test]
async fn concurrent_updates_to_one_job_are_serialized() {
    let dir = tmp();
    let store = Arc::new(FileJobStore::new(dir.path().join("jobs")));
    store.create(&Job::pending("job-6", "created")).await.unwrap();

    let mut handles = Vec::new();
    for p in 1..=20u8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .update("job-6", JobPatch::default().progress(p * 5))
                .await
        }));
    }
    for h in handles {
        h.await.unwrap().unwrap();
    }
    assert_eq!(store.get("job-6").await.unwrap().progress, 100);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn readers_racing_creation_never_see_a_partial_record() {
    let dir = tmp();
    let store = Arc::new(FileJobStore::new(dir.path().join("jobs")));
    let message = "x".repeat(256 * 1024);

    let mut handles = Vec::new();
    for n in 0..16 {
        let id = format!("job-{}", 100 + n);
        let job = Job::pending(id.clone(), message.clone());

        let reader = {
            let store = store.clone();
            let id = id.clone();
            tokio::spawn(async move {
                for _ in 0..200 {
                    match store.get(&id).await {
                        Ok(job) => {
                            assert_eq!(job.message.len(), 256 * 1024);
                            return;
                        }
                        Err(StoreError::NotFound(_)) => tokio::task::yield_now().await,
                        Err(e) => panic!("{id}: {e}"),
                    }
                }
            })
        };
        let writer = {
            let store = store.clone();
            tokio::spawn(async move { store.create(&job).await })
        };
        handles.push((reader, writer));
    }

    for (reader, writer) in handles {
        writer.await.unwrap().unwrap();
        reader.await.unwrap();
    }
}

#[tokio::test]
async fn duplicate_create_keeps_the_first_record() {
    let dir = tmp();
    let store = FileJobStore::new(dir.path().join("jobs"));
    store.create(&Job::pending("job-9", "first")).await.unwrap();
    let err = store.create(&Job::pending("job-9", "second")).await.unwrap_err();
    assert!(matches!(err, StoreError::DuplicateId(_)));
    assert_eq!(store.get("job-9").await.unwrap().message, "first");
}
