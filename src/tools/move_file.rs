use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};

use super::spec::{ParamSpec, ParamType, ToolSpec};
use super::{Tool, ToolContext, ToolResult};

/// Tool that moves or renames a file or directory. Both ends are gated.
pub struct MoveFileTool;

#[derive(Deserialize)]
struct MoveFileInput {
    source: String,
    destination: String,
}

#[async_trait::async_trait]
impl Tool for MoveFileTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "move_file",
            description: "Move or rename a file or directory.",
            params: vec![
                ParamSpec::required("source", ParamType::String, "Existing path"),
                ParamSpec::required("destination", ParamType::String, "New path"),
            ],
        }
    }

    async fn execute(&self, input: Value, ctx: &mut ToolContext) -> Result<ToolResult> {
        let input: MoveFileInput = serde_json::from_value(input)?;
        let source = ctx.resolve(&input.source);
        let destination = ctx.resolve(&input.destination);

        if let Some(denied) = ctx.guard(&source, &format!("move source {}", source.display()), true) {
            return Ok(denied);
        }
        if let Some(denied) = ctx.guard(&destination, &format!("move destination {}", destination.display()), true) {
            return Ok(denied);
        }
        if tokio::fs::symlink_metadata(&source).await.is_err() {
            return Ok(ToolResult::error(format!("Source not found: {}", input.source)));
        }

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        tokio::fs::rename(&source, &destination)
            .await
            .with_context(|| format!("Failed to move {} to {}", source.display(), destination.display()))?;

        Ok(ToolResult::success(json!({
            "source": source.display().to_string(),
            "destination": destination.display().to_string(),
        })))
    }
}
