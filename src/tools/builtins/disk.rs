//! `analyze_disk_usage` and `check_disk_status`.

use std::path::Path;

use serde::Deserialize;
use serde_json::json;

use super::recommend::auto_recommendations;
use super::state::read_migration_state;
use crate::executor::{expand_home, run_pipeline, ActionExecutor};
use crate::tools::{ToolError, ToolKind, ToolMeta};

/// Arguments for `analyze_disk_usage`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnalyzeArgs {
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default)]
    pub detailed: bool,
}

fn default_path() -> String {
    "/".to_string()
}

/// Arguments for `check_disk_status`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiskStatusArgs {
    #[serde(default)]
    pub disk: Option<String>,
}

const LARGEST_ENTRIES: &str = "du -sh \"$1\"/* 2>/dev/null | sort -hr | head -20";
const LARGE_DIRS: &str =
    "find \"$1\" -type d -exec du -sm {} + 2>/dev/null | awk '$1 >= 100' | sort -nr | head -10";
const APP_SYMLINKS: &str =
    "find /Applications -maxdepth 1 -name '*.app' -type l 2>/dev/null | wc -l";

/// Largest entries under `path`, optionally with free space, the biggest
/// directories, and automatic recommendations.
pub async fn analyze_disk_usage(
    exec: &dyn ActionExecutor,
    args: &AnalyzeArgs,
) -> Result<String, ToolError> {
    let target = expand_home(&args.path);
    let largest = run_pipeline(exec, LARGEST_ENTRIES, &[&target]).await;
    if largest.failed {
        return Err(ToolError::Executor(format!(
            "disk analysis of {target} failed: {}",
            largest.failure_reason()
        )));
    }

    if !args.detailed {
        return Ok(format!("**Largest directories:**\n{}", largest.stdout));
    }

    let free = exec.run("df", &["-h".to_string(), "/".to_string()]).await;
    if free.failed {
        return Err(ToolError::Executor(format!("df failed: {}", free.failure_reason())));
    }
    let large_dirs = run_pipeline(exec, LARGE_DIRS, &[&target]).await;
    let recommendations = auto_recommendations(exec).await;

    Ok(format!(
        "**DETAILED DISK ANALYSIS**\n\n\
         **Overall disk usage:**\n{}\n\n\
         **Largest directories (top 20):**\n{}\n\n\
         **Directories over 100MB:**\n{}\n\n\
         **Automatic recommendations:**\n{}",
        free.stdout, largest.stdout, large_dirs.stdout, recommendations
    ))
}

/// Mounted volumes, symlinked applications, migration counters, and
/// optionally `diskutil info` for one disk.
pub async fn check_disk_status(
    exec: &dyn ActionExecutor,
    disks: &[String],
    state_path: &Path,
    args: &DiskStatusArgs,
) -> Result<String, ToolError> {
    let pattern = mount_pattern(disks);
    let mounted = run_pipeline(exec, "df -h | grep -E \"$1\"", &[&pattern]).await;
    // grep exits 1 when nothing matches, which is an answer, not an error.
    let mounted_text = if mounted.stdout.trim().is_empty() {
        "(no matching volumes mounted)".to_string()
    } else {
        mounted.stdout.clone()
    };

    let symlinks = run_pipeline(exec, APP_SYMLINKS, &[]).await;
    if symlinks.failed {
        return Err(ToolError::Executor(format!(
            "symlink scan failed: {}",
            symlinks.failure_reason()
        )));
    }

    let state = read_migration_state(state_path).await;

    let mut lines = vec![
        "**Mounted disks:**".to_string(),
        mounted_text,
        format!("\n**Symlinks in /Applications:** {}", symlinks.stdout.trim()),
        format!("\n**Migrated directories:** {}", state.migrated_directories.len()),
        format!("**Migrated applications:** {}", state.migrated_applications.len()),
    ];

    if let Some(disk) = args.disk.as_deref() {
        let info = run_pipeline(
            exec,
            "diskutil info \"$1\" 2>/dev/null || echo \"Disk not found\"",
            &[disk],
        )
        .await;
        lines.push(format!("\n**Info for {disk}:**"));
        lines.push(info.stdout);
    }

    Ok(lines.join("\n"))
}

/// Extended regex matching any configured volume name or the root mount.
fn mount_pattern(disks: &[String]) -> String {
    let mut alternatives: Vec<String> = disks.iter().map(|d| regex_escape(d)).collect();
    alternatives.push("/$".to_string());
    format!("({})", alternatives.join("|"))
}

fn regex_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if "\\^$.|?*+()[]{}".contains(c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

pub(super) fn register_analyze(tools: &mut Vec<ToolMeta>) {
    tools.push(ToolMeta {
        name: "analyze_disk_usage".into(),
        description: "Analyze disk usage and identify optimization opportunities".into(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to analyze (default: /)",
                    "default": "/"
                },
                "detailed": {
                    "type": "boolean",
                    "description": "Include free space, large directories and recommendations",
                    "default": false
                }
            },
            "additionalProperties": false
        }),
        kind: ToolKind::Sync,
    });
}

pub(super) fn register_status(tools: &mut Vec<ToolMeta>) {
    tools.push(ToolMeta {
        name: "check_disk_status".into(),
        description: "Check external disks, application symlinks and migration counters".into(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "disk": {
                    "type": "string",
                    "description": "Specific disk to inspect (e.g. BLACK2T)"
                }
            },
            "additionalProperties": false
        }),
        kind: ToolKind::Sync,
    });
}
