//! Action executor: runs external programs and captures their output.
//!
//! Handlers never spawn processes themselves; they go through the
//! [`ActionExecutor`] trait so tests can substitute a scripted fake.
//! A non-zero exit is *not* an error at this layer: it is reported via
//! [`ActionOutput::failed`] together with whatever the program wrote to
//! stderr, so every caller can still produce a user-facing message.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::ExecutorConfig;

/// Captured result of one action invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionOutput {
    pub stdout: String,
    pub stderr: String,
    /// True when the program exited non-zero, could not be started,
    /// or was killed by the timeout.
    pub failed: bool,
}

impl ActionOutput {
    /// Successful output with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            failed: false,
        }
    }

    /// Failed output carrying `stderr` as the reason.
    pub fn failure(stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            failed: true,
        }
    }

    /// Best available description of a failure: stderr, else stdout.
    pub fn failure_reason(&self) -> String {
        if !self.stderr.trim().is_empty() {
            self.stderr.trim().to_string()
        } else if !self.stdout.trim().is_empty() {
            self.stdout.trim().to_string()
        } else {
            "action failed without output".to_string()
        }
    }
}

/// Capability to run a named external action.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    /// Run `action` with `args` and capture its output.
    async fn run(&self, action: &str, args: &[String]) -> ActionOutput;
}

/// Process-backed executor.
///
/// Actions ending in `.sh` are resolved inside the scripts directory and
/// run through `bash`; anything else is looked up on `PATH`.
#[derive(Debug, Clone)]
pub struct SystemExecutor {
    scripts_dir: PathBuf,
    timeout: Duration,
    max_output: usize,
}

impl SystemExecutor {
    pub fn new(scripts_dir: impl Into<PathBuf>, cfg: &ExecutorConfig) -> Self {
        Self {
            scripts_dir: scripts_dir.into(),
            timeout: Duration::from_secs(cfg.timeout_secs),
            max_output: cfg.max_output_bytes,
        }
    }

    pub fn scripts_dir(&self) -> &Path {
        &self.scripts_dir
    }

    fn command_for(&self, action: &str, args: &[String]) -> Result<tokio::process::Command, String> {
        if action.ends_with(".sh") {
            if action.contains('/') || action.contains("..") {
                return Err(format!("script name must be a bare file name: {action}"));
            }
            let script = self.scripts_dir.join(action);
            if !script.is_file() {
                return Err(format!("script not found: {}", script.display()));
            }
            let mut cmd = tokio::process::Command::new("bash");
            cmd.arg(script).args(args);
            Ok(cmd)
        } else {
            let mut cmd = tokio::process::Command::new(action);
            cmd.args(args);
            Ok(cmd)
        }
    }
}

#[async_trait]
impl ActionExecutor for SystemExecutor {
    async fn run(&self, action: &str, args: &[String]) -> ActionOutput {
        let mut cmd = match self.command_for(action, args) {
            Ok(cmd) => cmd,
            Err(reason) => {
                warn!(action, %reason, "action not runnable");
                return ActionOutput::failure(reason);
            }
        };

        let child = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();
        let child = match child {
            Ok(c) => c,
            Err(e) => {
                warn!(action, error = %e, "spawn failed");
                return ActionOutput::failure(format!("{action}: spawn failed: {e}"));
            }
        };

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(out)) => out,
            Ok(Err(e)) => return ActionOutput::failure(format!("{action}: {e}")),
            Err(_elapsed) => {
                warn!(action, timeout_secs = self.timeout.as_secs(), "action timed out");
                return ActionOutput::failure(format!(
                    "{action}: timed out after {}s (child killed)",
                    self.timeout.as_secs()
                ));
            }
        };

        let code = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        debug!(action, exit_code = code, stdout_len = stdout.len(), "action finished");

        ActionOutput {
            stdout: truncate_utf8_owned(stdout, self.max_output),
            stderr: truncate_utf8_owned(stderr, self.max_output),
            failed: !output.status.success(),
        }
    }
}

/// Run `script` through `sh -c`, passing `params` as positional
/// parameters (`$1`, `$2`, ...) so they are never spliced into the
/// command text.
pub async fn run_pipeline(
    executor: &dyn ActionExecutor,
    script: &str,
    params: &[&str],
) -> ActionOutput {
    let mut args = vec!["-c".to_string(), script.to_string(), "sh".to_string()];
    args.extend(params.iter().map(|p| p.to_string()));
    executor.run("sh", &args).await
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_home(raw: &str) -> String {
    if raw == "~" || raw.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{}", home.display(), &raw[1..]);
        }
    }
    raw.to_string()
}

/// Truncate a UTF-8 `String` to at most `max_bytes` on a char boundary.
pub(crate) fn truncate_utf8_owned(mut s: String, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s.truncate(end);
    s
}
