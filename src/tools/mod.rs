//! Tool registry.
//!
//! A **tool metadata registry** tracks every available tool's name,
//! description, JSON-Schema for its arguments, and whether it runs
//! synchronously or as a background job.  The registry is built once on
//! first use and is read-only afterwards; use [`registry()`] to reach it
//! and [`list_tools()`] to retrieve the catalogue.
//!
//! Validated arguments are decoded into a typed [`ToolCall`], one variant
//! per tool, which is what the dispatcher actually matches on.

pub mod builtins;

use jsonschema::JSONSchema;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::jobs::StoreError;

// ── Tool metadata ───────────────────────────────────────────

/// Whether a tool answers in the same request or hands back a job id.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
    Sync,
    Async,
}

/// Metadata describing a tool available to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolMeta {
    /// Short machine-friendly name (e.g. `"cleanup_system"`).
    pub name: String,
    /// Human-readable one-liner describing what the tool does.
    pub description: String,
    /// JSON Schema object describing the expected arguments.
    pub input_schema: Value,
    pub kind: ToolKind,
}

/// Failure inside a tool handler.
#[derive(Debug, Error)]
pub enum ToolError {
    /// An external action failed or could not be started.
    #[error("{0}")]
    Executor(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

// ── Registry ────────────────────────────────────────────────

struct ToolEntry {
    meta: ToolMeta,
    schema: JSONSchema,
}

/// Immutable catalogue of tools with their compiled argument schemas.
pub struct ToolRegistry {
    entries: Vec<ToolEntry>,
}

/// Why a set of arguments was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    UnknownTool(String),
    InvalidArguments(String),
}

impl ToolRegistry {
    /// Build a registry, compiling every schema up front.
    ///
    /// Duplicate names are ignored (first registration wins).
    pub fn new(metas: Vec<ToolMeta>) -> Result<Self, String> {
        let mut entries: Vec<ToolEntry> = Vec::with_capacity(metas.len());
        for meta in metas {
            if entries.iter().any(|e| e.meta.name == meta.name) {
                continue;
            }
            let schema = JSONSchema::compile(&meta.input_schema)
                .map_err(|e| format!("{}: invalid input schema: {e}", meta.name))?;
            entries.push(ToolEntry { meta, schema });
        }
        Ok(Self { entries })
    }

    /// The built-in disk assistant catalogue.
    pub fn builtin() -> Result<Self, String> {
        let mut metas = Vec::new();
        builtins::register(&mut metas);
        Self::new(metas)
    }

    pub fn get(&self, name: &str) -> Option<&ToolMeta> {
        self.entry(name).map(|e| &e.meta)
    }

    pub fn list(&self) -> Vec<ToolMeta> {
        self.entries.iter().map(|e| e.meta.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry(&self, name: &str) -> Option<&ToolEntry> {
        self.entries.iter().find(|e| e.meta.name == name)
    }

    /// Apply declared defaults to `args` and validate the result against
    /// the tool's schema.  Returns the normalized arguments.
    pub fn validate(&self, name: &str, args: Value) -> Result<Value, Rejection> {
        let entry = self
            .entry(name)
            .ok_or_else(|| Rejection::UnknownTool(name.to_string()))?;

        let mut args = if args.is_null() { json!({}) } else { args };
        apply_defaults(&entry.meta.input_schema, &mut args);

        if let Err(errors) = entry.schema.validate(&args) {
            let diagnostics: Vec<String> = errors
                .map(|e| {
                    let path = e.instance_path.to_string();
                    if path.is_empty() {
                        e.to_string()
                    } else {
                        format!("{path}: {e}")
                    }
                })
                .collect();
            return Err(Rejection::InvalidArguments(diagnostics.join("; ")));
        }
        Ok(args)
    }
}

/// Fill in `default` values for omitted top-level properties.
fn apply_defaults(schema: &Value, args: &mut Value) {
    let (Some(props), Some(obj)) = (
        schema.get("properties").and_then(Value::as_object),
        args.as_object_mut(),
    ) else {
        return;
    };
    for (key, prop) in props {
        if let Some(default) = prop.get("default") {
            obj.entry(key.clone()).or_insert_with(|| default.clone());
        }
    }
}

static REGISTRY: Lazy<ToolRegistry> =
    Lazy::new(|| ToolRegistry::builtin().expect("builtin tool schemas must compile"));

/// The process-wide built-in registry.
pub fn registry() -> &'static ToolRegistry {
    &REGISTRY
}

/// Return metadata for every registered tool.
pub fn list_tools() -> Vec<ToolMeta> {
    registry().list()
}

// ── Typed calls ─────────────────────────────────────────────

/// A validated request, one variant per tool.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "tool", content = "arguments", rename_all = "snake_case")]
pub enum ToolCall {
    AnalyzeDiskUsage(builtins::disk::AnalyzeArgs),
    MigrateUserData(builtins::migrate::MigrateArgs),
    CleanupSystem(builtins::cleanup::CleanupArgs),
    CheckDiskStatus(builtins::disk::DiskStatusArgs),
    GetMigrationStatus(builtins::state::NoArgs),
    StartAppMigrationJob(builtins::jobs::AppMigrationArgs),
    GetJobStatus(builtins::jobs::JobStatusArgs),
    RestoreApplications(builtins::migrate::RestoreArgs),
    GetRecommendations(builtins::recommend::RecommendationArgs),
}

impl ToolCall {
    /// Decode already-validated arguments for tool `name`.
    pub fn decode(name: &str, args: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(json!({ "tool": name, "arguments": args }))
    }
}
