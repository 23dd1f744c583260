use anyhow::Result;
use serde::Deserialize;
use serde_json::{json, Value};

use super::spec::{ParamSpec, ParamType, ToolSpec};
use super::{Tool, ToolContext, ToolResult};

/// Tool that moves the session's current directory.
pub struct ChangeDirectoryTool;

#[derive(Deserialize)]
struct ChangeDirectoryInput {
    path: String,
}

#[async_trait::async_trait]
impl Tool for ChangeDirectoryTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "change_directory",
            description: "Change the working directory used by every later tool call.",
            params: vec![ParamSpec::required("path", ParamType::String, "Target directory")],
        }
    }

    async fn execute(&self, input: Value, ctx: &mut ToolContext) -> Result<ToolResult> {
        let input: ChangeDirectoryInput = serde_json::from_value(input)?;
        let path = ctx.resolve(&input.path);
        if !path.exists() {
            return Ok(ToolResult::error(format!("Not found: {}", input.path)));
        }
        if !path.is_dir() {
            return Ok(ToolResult::error(format!("Not a directory: {}", input.path)));
        }
        if let Some(denied) = ctx.guard(&path, &format!("change directory to {}", path.display()), false) {
            return Ok(denied);
        }

        tracing::debug!(from = %ctx.cwd.display(), to = %path.display(), "cwd changed");
        ctx.cwd = path;
        Ok(ToolResult::success(json!({ "cwd": ctx.cwd.display().to_string() })))
    }
}
