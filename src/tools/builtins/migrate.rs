//! `migrate_user_data` and `restore_applications`.

use serde::Deserialize;
use serde_json::json;

use super::render_script_output;
use crate::executor::{expand_home, run_pipeline, ActionExecutor};
use crate::tools::{ToolError, ToolKind, ToolMeta};

const MIGRATE_SCRIPT: &str = "manage_user_data.sh";
const RESTORE_SCRIPT: &str = "restore_apps_from_external.sh";

/// What kind of data is being migrated.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MigrationType {
    Directory,
    Application,
    Cache,
}

impl MigrationType {
    pub fn as_str(self) -> &'static str {
        match self {
            MigrationType::Directory => "directory",
            MigrationType::Application => "application",
            MigrationType::Cache => "cache",
        }
    }
}

/// Arguments for `migrate_user_data`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct MigrateArgs {
    pub source: String,
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(rename = "type")]
    pub kind: MigrationType,
    #[serde(default = "default_true")]
    pub dry_run: bool,
}

fn default_true() -> bool {
    true
}

/// Arguments for `restore_applications`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RestoreArgs {
    #[serde(default)]
    pub applications: Vec<String>,
}

/// Migrate a user directory to external storage, or simulate it.
///
/// A missing source is reported as text rather than an error, matching
/// how the scripts themselves describe a no-op.
pub async fn migrate_user_data(
    exec: &dyn ActionExecutor,
    args: &MigrateArgs,
) -> Result<String, ToolError> {
    let source = expand_home(&args.source);
    let destination = args.destination.as_deref().unwrap_or("auto");

    if !std::path::Path::new(&source).exists() {
        return Ok(format!("Error: source directory does not exist: {source}"));
    }

    if args.dry_run {
        let size = run_pipeline(exec, "du -sh \"$1\"", &[&source]).await;
        if size.failed {
            return Err(ToolError::Executor(format!(
                "could not size {source}: {}",
                size.failure_reason()
            )));
        }
        let size = size.stdout.split('\t').next().unwrap_or("").trim().to_string();
        return Ok(format!(
            "**MIGRATION DRY RUN**\n\n\
             **Source:** {source}\n\
             **Destination:** {destination}\n\
             **Size:** {size}\n\
             **Type:** {}\n\n\
             The migration would succeed.\n\
             To run it for real, use `dryRun: false`",
            args.kind.as_str()
        ));
    }

    let out = exec
        .run(MIGRATE_SCRIPT, &[source.clone(), destination.to_string()])
        .await;
    render_script_output("MIGRATION COMPLETED", MIGRATE_SCRIPT, &out)
}

/// Move applications back from external storage.
pub async fn restore_applications(
    exec: &dyn ActionExecutor,
    args: &RestoreArgs,
) -> Result<String, ToolError> {
    let out = exec.run(RESTORE_SCRIPT, &args.applications).await;
    render_script_output("APPLICATION RESTORE", RESTORE_SCRIPT, &out)
}

pub(super) fn register_migrate(tools: &mut Vec<ToolMeta>) {
    tools.push(ToolMeta {
        name: "migrate_user_data".into(),
        description: "Safely migrate user data to an external disk".into(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "source": {
                    "type": "string",
                    "description": "Source directory to migrate (e.g. ~/Downloads, ~/Library/Caches)"
                },
                "destination": {
                    "type": "string",
                    "description": "Destination directory (optional, computed automatically)"
                },
                "type": {
                    "type": "string",
                    "enum": ["directory", "application", "cache"],
                    "description": "Migration type"
                },
                "dryRun": {
                    "type": "boolean",
                    "description": "Only simulate the migration",
                    "default": true
                }
            },
            "required": ["source", "type"],
            "additionalProperties": false
        }),
        kind: ToolKind::Sync,
    });
}

pub(super) fn register_restore(tools: &mut Vec<ToolMeta>) {
    tools.push(ToolMeta {
        name: "restore_applications".into(),
        description: "Restore applications from the external disk to the internal disk".into(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "applications": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Specific applications to restore",
                    "default": []
                }
            },
            "additionalProperties": false
        }),
        kind: ToolKind::Sync,
    });
}
