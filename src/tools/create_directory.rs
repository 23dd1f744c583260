use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};

use super::spec::{ParamSpec, ParamType, ToolSpec};
use super::{Tool, ToolContext, ToolResult};

pub struct CreateDirectoryTool;

#[derive(Deserialize)]
struct CreateDirectoryInput {
    path: String,
}

#[async_trait::async_trait]
impl Tool for CreateDirectoryTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "create_directory",
            description: "Create a directory, including any missing parents.",
            params: vec![ParamSpec::required("path", ParamType::String, "Directory to create")],
        }
    }

    async fn execute(&self, input: Value, ctx: &mut ToolContext) -> Result<ToolResult> {
        let input: CreateDirectoryInput = serde_json::from_value(input)?;
        let path = ctx.resolve(&input.path);
        if let Some(denied) = ctx.guard(&path, &format!("create directory {}", path.display()), true) {
            return Ok(denied);
        }
        tokio::fs::create_dir_all(&path)
            .await
            .with_context(|| format!("Failed to create {}", path.display()))?;
        Ok(ToolResult::success(json!({ "path": path.display().to_string() })))
    }
}
