//! `cleanup_system`: clears caches, logs and temp files via script.

use serde::Deserialize;
use serde_json::json;

use super::render_script_output;
use crate::executor::ActionExecutor;
use crate::tools::{ToolError, ToolKind, ToolMeta};

const CLEANUP_SCRIPT: &str = "clean_system_caches.sh";

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CleanupType {
    Cache,
    Logs,
    Temp,
    All,
}

impl CleanupType {
    fn flag(self) -> &'static str {
        match self {
            CleanupType::Cache => "--cache-only",
            CleanupType::Logs => "--logs-only",
            CleanupType::Temp => "--temp-only",
            CleanupType::All => "--all",
        }
    }
}

/// Arguments for `cleanup_system`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CleanupArgs {
    #[serde(rename = "type")]
    pub kind: CleanupType,
    #[serde(default)]
    pub aggressive: bool,
}

/// Script arguments for a cleanup request.
pub fn cleanup_flags(args: &CleanupArgs) -> Vec<String> {
    let mut flags = vec![args.kind.flag().to_string()];
    if args.aggressive {
        flags.push("--aggressive".to_string());
    }
    flags
}

pub async fn cleanup_system(
    exec: &dyn ActionExecutor,
    args: &CleanupArgs,
) -> Result<String, ToolError> {
    let out = exec.run(CLEANUP_SCRIPT, &cleanup_flags(args)).await;
    render_script_output("SYSTEM CLEANUP COMPLETED", CLEANUP_SCRIPT, &out)
}

pub(super) fn register(tools: &mut Vec<ToolMeta>) {
    tools.push(ToolMeta {
        name: "cleanup_system".into(),
        description: "Clean temporary files, caches and system logs".into(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "type": {
                    "type": "string",
                    "enum": ["cache", "logs", "temp", "all"],
                    "description": "What to clean"
                },
                "aggressive": {
                    "type": "boolean",
                    "description": "Aggressive cleanup (more space, more risk)",
                    "default": false
                }
            },
            "required": ["type"],
            "additionalProperties": false
        }),
        kind: ToolKind::Sync,
    });
}
