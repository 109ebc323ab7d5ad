//! End-to-end job tests through the process-backed executor, with a
//! scripts directory holding only the maintenance scripts that ship with
//! the assistant.

mod common;

use std::path::Path;
use std::time::Duration;

use common::tmp;
use disk_assistant::config::{Config, JobStoreKind};
use disk_assistant::dispatch::Dispatcher;
use disk_assistant::jobs::runner::wait_for_terminal;
use disk_assistant::jobs::JobStatus;
use serde_json::json;

const POLL: Duration = Duration::from_millis(20);
const TIMEOUT: Duration = Duration::from_secs(20);

const SHIPPED_SCRIPTS: [&str; 3] = [
    "manage_user_data.sh",
    "clean_system_caches.sh",
    "restore_apps_from_external.sh",
];

fn config_in(root: &Path) -> Config {
    let scripts = root.join("scripts");
    std::fs::create_dir_all(&scripts).unwrap();
    for name in SHIPPED_SCRIPTS {
        std::fs::write(scripts.join(name), "echo \"$0 $*\"\n").unwrap();
    }
    let mut cfg = Config::default();
    cfg.scripts_dir = scripts;
    cfg.state_dir = root.join("state");
    cfg.logs_dir = root.join("logs");
    cfg.job_store = JobStoreKind::File;
    cfg
}

async fn submit_and_wait(d: &Dispatcher, args: serde_json::Value) -> disk_assistant::jobs::Job {
    let env = d.dispatch("start_app_migration_job", args).await;
    let id = env.job_id().expect("job accepted").to_string();
    wait_for_terminal(d.store().as_ref(), &id, POLL, TIMEOUT)
        .await
        .unwrap()
}

#[tokio::test]
async fn default_config_dry_run_completes() {
    let dir = tmp();
    let d = Dispatcher::from_config(&config_in(dir.path()));

    let job = submit_and_wait(&d, json!({ "applications": ["Foo.app"], "dryRun": true })).await;

    assert_eq!(job.status, JobStatus::Completed, "error: {:?}", job.error);
    assert_eq!(job.progress, 100);
    assert_eq!(
        job.result,
        Some(json!({ "moved": ["Foo.app"], "dryRun": true }))
    );
}

#[tokio::test]
async fn real_run_uses_the_configured_action() {
    let dir = tmp();
    let mut cfg = config_in(dir.path());
    std::fs::write(cfg.scripts_dir.join("move_app.sh"), "echo \"moving $1\"\n").unwrap();
    cfg.runner.action = "move_app.sh".to_string();
    let d = Dispatcher::from_config(&cfg);

    let job = submit_and_wait(&d, json!({ "applications": ["Foo.app"], "dryRun": false })).await;

    assert_eq!(job.status, JobStatus::Completed, "error: {:?}", job.error);
    assert_eq!(job.result.unwrap()["moved"], json!(["Foo.app"]));
}

#[tokio::test]
async fn real_run_without_the_action_script_fails() {
    let dir = tmp();
    let d = Dispatcher::from_config(&config_in(dir.path()));

    let job = submit_and_wait(&d, json!({ "applications": ["Foo.app"], "dryRun": false })).await;

    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.result.is_none());
    let error = job.error.unwrap();
    assert!(error.starts_with("Foo.app:"), "got: {error}");
}
