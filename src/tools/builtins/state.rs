//! Migration state written by the maintenance scripts, and the
//! `get_migration_status` tool that reports it.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::tools::{ToolKind, ToolMeta};

/// Contents of `migration_state.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MigrationState {
    #[serde(default)]
    pub migrated_directories: Vec<String>,
    #[serde(default)]
    pub migrated_applications: Vec<String>,
    #[serde(default)]
    pub last_migration: Option<String>,
}

/// Arguments for tools that take none.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NoArgs {}

/// Load the migration state.
///
/// A missing file is the empty state.  An unparseable or unreadable one
/// also reads as empty, with a warning.
pub async fn read_migration_state(path: &Path) -> MigrationState {
    match tokio::fs::read_to_string(path).await {
        Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "unparseable migration state, using empty");
            MigrationState::default()
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no migration state yet");
            MigrationState::default()
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "unreadable migration state, using empty");
            MigrationState::default()
        }
    }
}

pub async fn get_migration_status(path: &Path) -> String {
    format_migration_state(&read_migration_state(path).await)
}

pub fn format_migration_state(state: &MigrationState) -> String {
    let list = |items: &[String], empty: &str| {
        if items.is_empty() {
            format!("  ({empty})")
        } else {
            items
                .iter()
                .map(|i| format!("  • {i}"))
                .collect::<Vec<_>>()
                .join("\n")
        }
    };
    format!(
        "**MIGRATION STATUS**\n\n\
         **Migrated directories:** {}\n{}\n\n\
         **Migrated applications:** {}\n{}\n\n\
         **Last migration:** {}",
        state.migrated_directories.len(),
        list(&state.migrated_directories, "none"),
        state.migrated_applications.len(),
        list(&state.migrated_applications, "none"),
        state.last_migration.as_deref().unwrap_or("Never"),
    )
}

pub(super) fn register(tools: &mut Vec<ToolMeta>) {
    tools.push(ToolMeta {
        name: "get_migration_status".into(),
        description: "Report the migrations performed so far".into(),
        input_schema: json!({
            "type": "object",
            "properties": {},
            "additionalProperties": false
        }),
        kind: ToolKind::Sync,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_reads_as_empty_state() {
        let dir = tempfile::tempdir().unwrap();
        let state = read_migration_state(&dir.path().join("migration_state.json")).await;
        assert_eq!(state, MigrationState::default());
    }

    #[tokio::test]
    async fn unreadable_path_reads_as_empty_state() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the file should be fails with something other
        // than NotFound.
        let path = dir.path().join("migration_state.json");
        std::fs::create_dir(&path).unwrap();
        let state = read_migration_state(&path).await;
        assert_eq!(state, MigrationState::default());
    }

    #[tokio::test]
    async fn stored_state_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("migration_state.json");
        std::fs::write(
            &path,
            r#"{"migrated_applications":["Foo.app"],"last_migration":"2024-05-01"}"#,
        )
        .unwrap();
        let state = read_migration_state(&path).await;
        assert_eq!(state.migrated_applications, vec!["Foo.app".to_string()]);
        assert!(state.migrated_directories.is_empty());
        assert_eq!(state.last_migration.as_deref(), Some("2024-05-01"));
    }

    #[test]
    fn format_lists_entries_and_last_migration() {
        let state = MigrationState {
            migrated_directories: vec!["~/Downloads".into()],
            migrated_applications: vec![],
            last_migration: Some("2024-05-01".into()),
        };
        let text = format_migration_state(&state);
        assert!(text.contains("**Migrated directories:** 1\n  • ~/Downloads"));
        assert!(text.contains("**Migrated applications:** 0\n  (none)"));
        assert!(text.ends_with("**Last migration:** 2024-05-01"));
    }
}
