use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};

use super::spec::{ParamSpec, ParamType, ToolSpec};
use super::{Tool, ToolContext, ToolResult};

/// Tool that deletes a file or a directory tree. Refused in safe mode.
pub struct DeleteFileTool;

#[derive(Deserialize)]
struct DeleteFileInput {
    path: String,
}

#[async_trait::async_trait]
impl Tool for DeleteFileTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "delete_file",
            description: "Delete a file, or a directory and everything in it.",
            params: vec![ParamSpec::required("path", ParamType::String, "Path to delete")],
        }
    }

    async fn execute(&self, input: Value, ctx: &mut ToolContext) -> Result<ToolResult> {
        let input: DeleteFileInput = serde_json::from_value(input)?;
        if ctx.settings.safe_mode {
            return Ok(ToolResult::error("Blocked by safe_mode. Disable with /set safe_mode false."));
        }
        let path = ctx.resolve(&input.path);
        if let Some(denied) = ctx.guard(&path, &format!("delete {}", path.display()), true) {
            return Ok(denied);
        }

        let meta = match tokio::fs::symlink_metadata(&path).await {
            Ok(m) => m,
            Err(_) => return Ok(ToolResult::error(format!("Not found: {}", input.path))),
        };
        if meta.is_dir() {
            tokio::fs::remove_dir_all(&path).await
        } else {
            tokio::fs::remove_file(&path).await
        }
        .with_context(|| format!("Failed to delete {}", path.display()))?;

        Ok(ToolResult::success(json!({ "path": path.display().to_string() })))
    }
}
