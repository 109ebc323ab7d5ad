//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use disk_assistant::dispatch::{DispatchSettings, Dispatcher};
use disk_assistant::executor::{ActionExecutor, ActionOutput};
use disk_assistant::jobs::{JobStore, MemoryJobStore};
use tempfile::TempDir;

/// Create a fresh temporary directory for a test.
pub fn tmp() -> TempDir {
    tempfile::tempdir().expect("failed to create temp dir")
}

/// One recorded executor invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub action: String,
    pub args: Vec<String>,
}

/// In-test executor: records every call and answers from a script of
/// canned outputs keyed by action name.
#[derive(Default)]
pub struct ScriptedExecutor {
    calls: Mutex<Vec<Call>>,
    outputs: Mutex<HashMap<String, ActionOutput>>,
    panic_on: Mutex<Option<String>>,
}

impl ScriptedExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Answer `action` with `output` from now on.
    pub fn respond(&self, action: &str, output: ActionOutput) {
        self.outputs
            .lock()
            .expect("outputs lock poisoned")
            .insert(action.to_string(), output);
    }

    /// Panic whenever `action` is run.
    pub fn panic_on(&self, action: &str) {
        *self.panic_on.lock().expect("panic lock poisoned") = Some(action.to_string());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().expect("calls lock poisoned").clone()
    }

    pub fn calls_to(&self, action: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.action == action)
            .collect()
    }
}

#[async_trait]
impl ActionExecutor for ScriptedExecutor {
    async fn run(&self, action: &str, args: &[String]) -> ActionOutput {
        self.calls.lock().expect("calls lock poisoned").push(Call {
            action: action.to_string(),
            args: args.to_vec(),
        });
        let should_panic = self
            .panic_on
            .lock()
            .expect("panic lock poisoned")
            .as_deref()
            == Some(action);
        if should_panic {
            panic!("scripted panic in {action}");
        }
        self.outputs
            .lock()
            .expect("outputs lock poisoned")
            .get(action)
            .cloned()
            .unwrap_or_else(|| ActionOutput::ok(""))
    }
}

/// Settings pointing the migration state file into `dir`.
pub fn settings(dir: &std::path::Path) -> DispatchSettings {
    DispatchSettings {
        migration_state_path: dir.join("migration_state.json"),
        disks: vec!["BLACK2T".to_string(), "8TbSeries".to_string()],
        migration_action: "migrate_applications.sh".to_string(),
    }
}

/// A dispatcher over a memory store and the given executor.
pub fn dispatcher(exec: Arc<ScriptedExecutor>, dir: &std::path::Path) -> Dispatcher {
    let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
    Dispatcher::new(exec, store, Duration::ZERO, settings(dir))
}

/// A dispatcher over the given store.
pub fn dispatcher_with_store(
    exec: Arc<ScriptedExecutor>,
    store: Arc<dyn JobStore>,
    dir: &std::path::Path,
) -> Dispatcher {
    Dispatcher::new(exec, store, Duration::ZERO, settings(dir))
}

pub fn jobs_dir(dir: &TempDir) -> PathBuf {
    dir.path().join("jobs")
}
