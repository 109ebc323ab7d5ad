//! Integration tests for the command-line entry point.

mod common;

use std::path::Path;
use std::process::{Command, Output};

use common::tmp;
use disk_assistant::config::Config;

fn disk_assistant(home: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_disk-assistant"))
        .args(args)
        .env("DISK_ASSISTANT_HOME", home)
        .env("RUST_LOG", "warn")
        .output()
        .expect("failed to run disk-assistant")
}

// ── init ────────────────────────────────────────────────────

#[test]
fn init_writes_a_loadable_config_without_reading_one() {
    let dir = tmp();
    let path = dir.path().join("nested/config.yaml");
    let path_arg = path.to_str().unwrap();

    // The explicit config does not exist yet; init must not try to load it.
    let out = disk_assistant(dir.path(), &["--config", path_arg, "init"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert!(String::from_utf8_lossy(&out.stdout).contains("Wrote default config"));

    let raw = std::fs::read_to_string(&path).unwrap();
    Config::parse(&raw).unwrap();

    let out = disk_assistant(dir.path(), &["--config", path_arg, "init"]);
    assert!(out.status.success());
    assert!(String::from_utf8_lossy(&out.stdout).contains("already exists"));
}

// ── Commands that load the config ───────────────────────────

#[test]
fn tools_lists_the_catalogue() {
    let dir = tmp();
    let out = disk_assistant(dir.path(), &["tools"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let tools: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    let names: Vec<&str> = tools
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"start_app_migration_job"));
    assert!(names.contains(&"get_job_status"));
}

#[test]
fn missing_explicit_config_is_an_error() {
    let dir = tmp();
    let path = dir.path().join("absent.yaml");
    let out = disk_assistant(dir.path(), &["--config", path.to_str().unwrap(), "tools"]);
    assert!(!out.status.success());
}

#[test]
fn showing_an_unknown_job_fails() {
    let dir = tmp();
    let out = disk_assistant(dir.path(), &["jobs", "show", "job-404"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("job-404"));
}
