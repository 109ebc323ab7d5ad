//! Built-in tool implementations.
//!
//! Each sub-module implements one small family of tools and registers
//! their metadata.  Handlers only talk to the outside world through the
//! [`ActionExecutor`](crate::executor::ActionExecutor).

pub mod cleanup;
pub mod disk;
pub mod jobs;
pub mod migrate;
pub mod recommend;
pub mod state;

use crate::executor::ActionOutput;
use crate::tools::{ToolError, ToolMeta};

/// Register every built-in tool, in catalogue order.
pub fn register(tools: &mut Vec<ToolMeta>) {
    disk::register_analyze(tools);
    migrate::register_migrate(tools);
    cleanup::register(tools);
    disk::register_status(tools);
    state::register(tools);
    jobs::register(tools);
    migrate::register_restore(tools);
    recommend::register(tools);
}

/// Render a maintenance script's output under `title`.
///
/// A failed script becomes a [`ToolError::Executor`] naming the script;
/// stderr from a successful run is shown as warnings.
pub(crate) fn render_script_output(
    title: &str,
    script: &str,
    out: &ActionOutput,
) -> Result<String, ToolError> {
    if out.failed {
        return Err(ToolError::Executor(format!(
            "{script} failed: {}",
            out.failure_reason()
        )));
    }
    let mut text = format!("**{title}**\n\n{}", out.stdout);
    if !out.stderr.trim().is_empty() {
        text.push_str(&format!("\n\n**Warnings:**\n{}", out.stderr));
    }
    Ok(text.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_warnings_only_when_present() {
        let clean = render_script_output("T", "s.sh", &ActionOutput::ok("done")).unwrap();
        assert_eq!(clean, "**T**\n\ndone");

        let noisy = ActionOutput {
            stdout: "done".into(),
            stderr: "careful".into(),
            failed: false,
        };
        let text = render_script_output("T", "s.sh", &noisy).unwrap();
        assert!(text.ends_with("**Warnings:**\ncareful"));
    }

    #[test]
    fn render_turns_failure_into_executor_error() {
        let err = render_script_output("T", "s.sh", &ActionOutput::failure("nope")).unwrap_err();
        assert_eq!(err.to_string(), "s.sh failed: nope");
    }
}
