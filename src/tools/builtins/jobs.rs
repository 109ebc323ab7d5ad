//! `start_app_migration_job` and `get_job_status`.
//!
//! Submission itself is handled by the dispatcher (it needs the runner);
//! this module owns the argument types, the status query, and the text
//! rendering of a job record.

use serde::Deserialize;
use serde_json::json;

use crate::jobs::{Job, JobStore};
use crate::tools::{ToolError, ToolKind, ToolMeta};

/// Arguments for `start_app_migration_job`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct AppMigrationArgs {
    pub applications: Vec<String>,
    #[serde(default = "default_true")]
    pub dry_run: bool,
}

fn default_true() -> bool {
    true
}

/// Arguments for `get_job_status`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct JobStatusArgs {
    pub job_id: String,
}

pub async fn get_job_status(
    store: &dyn JobStore,
    args: &JobStatusArgs,
) -> Result<String, ToolError> {
    let job = store.get(&args.job_id).await?;
    Ok(format_job_status(&job))
}

/// Human-readable rendering of a job record.
pub fn format_job_status(job: &Job) -> String {
    let mut text = format!(
        "**JOB STATUS: {}**\n\n\
         **Status:** {}\n\
         **Progress:** {}%\n\
         **Message:** {}\n\
         **Updated:** {}",
        job.id,
        job.status,
        job.progress,
        job.message,
        job.updated_at.to_rfc3339(),
    );
    if let Some(error) = &job.error {
        text.push_str(&format!("\n\n**Error:** {error}"));
    }
    if let Some(result) = &job.result {
        let pretty = serde_json::to_string_pretty(result).unwrap_or_else(|_| result.to_string());
        text.push_str(&format!("\n\n**Result:** {pretty}"));
    }
    text
}

pub(super) fn register(tools: &mut Vec<ToolMeta>) {
    tools.push(ToolMeta {
        name: "start_app_migration_job".into(),
        description: "Start a background job that safely moves applications; returns a job id"
            .into(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "applications": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Applications to move. When empty, the migration script picks them."
                },
                "dryRun": {
                    "type": "boolean",
                    "description": "Only simulate",
                    "default": true
                }
            },
            "required": ["applications"],
            "additionalProperties": false
        }),
        kind: ToolKind::Async,
    });
    tools.push(ToolMeta {
        name: "get_job_status".into(),
        description: "Get the status of an asynchronous migration job".into(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "jobId": {
                    "type": "string",
                    "description": "The id returned by start_app_migration_job"
                }
            },
            "required": ["jobId"],
            "additionalProperties": false
        }),
        kind: ToolKind::Sync,
    });
}
