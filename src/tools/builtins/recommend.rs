//! `get_recommendations` plus the automatic hints used by detailed analysis.

use serde::Deserialize;
use serde_json::json;

use super::disk::{analyze_disk_usage, AnalyzeArgs};
use crate::executor::{expand_home, run_pipeline, ActionExecutor};
use crate::tools::{ToolError, ToolKind, ToolMeta};

/// Cache size (MB) above which cleaning is suggested.
const CACHE_HINT_MB: u64 = 1_000;
/// Downloads size (MB) above which migration is suggested.
const DOWNLOADS_HINT_MB: u64 = 5_000;

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Space,
    #[default]
    Safety,
    Performance,
}

/// Arguments for `get_recommendations`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecommendationArgs {
    #[serde(default)]
    pub priority: Priority,
}

fn advice(priority: Priority) -> &'static [&'static str] {
    match priority {
        Priority::Space => &[
            "**RECOMMENDATIONS TO FREE SPACE:**",
            "",
            "1. **HIGH PRIORITY** - Clean system caches",
            "2. **MEDIUM PRIORITY** - Migrate Downloads if >5GB",
            "3. **LOW PRIORITY** - Migrate Library/Caches",
            "4. **OPTIONAL** - Move large non-critical applications",
        ],
        Priority::Performance => &[
            "**RECOMMENDATIONS FOR PERFORMANCE:**",
            "",
            "1. Keep frequently used applications on the internal disk",
            "2. Migrate only non-critical data",
            "3. Use external SSDs for migrated applications",
            "4. Monitor performance regularly",
        ],
        Priority::Safety => &[
            "**SAFE RECOMMENDATIONS:**",
            "",
            "1. **START** - Clean caches (no risk)",
            "2. **CONTINUE** - Migrate Downloads and Documents",
            "3. **ADVANCED** - Only non-critical third-party applications",
            "4. **NEVER** - System or Apple-signed applications",
            "",
            "**Always run with dryRun: true first**",
        ],
    }
}

/// Priority-specific advice followed by a detailed analysis of `/`.
pub async fn get_recommendations(
    exec: &dyn ActionExecutor,
    args: &RecommendationArgs,
) -> Result<String, ToolError> {
    let analysis = analyze_disk_usage(
        exec,
        &AnalyzeArgs {
            path: "/".to_string(),
            detailed: true,
        },
    )
    .await?;
    Ok(format!("{}\n\n{}", advice(args.priority).join("\n"), analysis))
}

/// Size-based hints.  Individual probes that fail are skipped; the
/// result is advisory.
pub async fn auto_recommendations(exec: &dyn ActionExecutor) -> String {
    let mut hints = Vec::new();

    if let Some(mb) = size_mb(exec, "~/Library/Caches").await {
        if mb > CACHE_HINT_MB {
            hints.push(format!("• Clean caches ({mb}MB reclaimable)"));
        }
    }
    if let Some(mb) = size_mb(exec, "~/Downloads").await {
        if mb > DOWNLOADS_HINT_MB {
            hints.push(format!("• Migrate Downloads ({mb}MB reclaimable)"));
        }
    }

    let apps = run_pipeline(
        exec,
        "du -sm /Applications/*.app 2>/dev/null | sort -nr | head -5",
        &[],
    )
    .await;
    if apps.failed {
        hints.push("• Could not list the largest applications".to_string());
    } else {
        hints.push("\n**Largest applications:**".to_string());
        hints.push(apps.stdout);
    }

    hints.join("\n")
}

async fn size_mb(exec: &dyn ActionExecutor, path: &str) -> Option<u64> {
    let out = run_pipeline(exec, "du -sm \"$1\" 2>/dev/null", &[&expand_home(path)]).await;
    if out.failed {
        return None;
    }
    parse_du_mb(&out.stdout)
}

/// First field of `du -sm` output.
fn parse_du_mb(stdout: &str) -> Option<u64> {
    stdout.split_whitespace().next()?.parse().ok()
}

pub(super) fn register(tools: &mut Vec<ToolMeta>) {
    tools.push(ToolMeta {
        name: "get_recommendations".into(),
        description: "Personalized recommendations based on an analysis of the system".into(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "priority": {
                    "type": "string",
                    "enum": ["space", "safety", "performance"],
                    "description": "What the recommendations should optimize for",
                    "default": "safety"
                }
            },
            "additionalProperties": false
        }),
        kind: ToolKind::Sync,
    });
}
