//! disk_assistant: tool dispatch and background jobs for disk maintenance.
//!
//! This library crate re-exports modules so integration tests
//! (under `tests/`) can access them.

pub mod config;
pub mod dispatch;
pub mod envelope;
pub mod executor;
pub mod jobs;
pub mod logs;
pub mod server;
pub mod tools;

/// Return the assistant home directory.
///
/// Resolution order:
/// 1. `DISK_ASSISTANT_HOME` environment variable
/// 2. `$HOME/.disk-assistant`
pub fn assistant_home() -> std::path::PathBuf {
    if let Ok(p) = std::env::var("DISK_ASSISTANT_HOME") {
        std::path::PathBuf::from(p)
    } else {
        dirs::home_dir()
            .unwrap_or_else(|| std::path::PathBuf::from("."))
            .join(".disk-assistant")
    }
}
