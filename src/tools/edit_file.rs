use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};

use super::spec::{ParamSpec, ParamType, ToolSpec};
use super::{Tool, ToolContext, ToolResult};

/// Tool that replaces the first occurrence of a string in a file.
pub struct EditFileTool;

#[derive(Deserialize)]
struct EditFileInput {
    path: String,
    old_str: String,
    new_str: String,
}

#[async_trait::async_trait]
impl Tool for EditFileTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "edit_file",
            description: "Replace the first occurrence of old_str with new_str in a file. Use for small, targeted changes.",
            params: vec![
                ParamSpec::required("path", ParamType::String, "File path, relative to the current directory"),
                ParamSpec::required("old_str", ParamType::String, "Exact text to find"),
                ParamSpec::required("new_str", ParamType::String, "Replacement text"),
            ],
        }
    }

    async fn execute(&self, input: Value, ctx: &mut ToolContext) -> Result<ToolResult> {
        let input: EditFileInput = serde_json::from_value(input)?;
        let path = ctx.resolve(&input.path);
        if let Some(denied) = ctx.guard(&path, &format!("edit file {}", path.display()), true) {
            return Ok(denied);
        }
        if !path.is_file() {
            return Ok(ToolResult::error(format!("Not found: {}", input.path)));
        }

        let original = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        if input.old_str.is_empty() || !original.contains(&input.old_str) {
            return Ok(ToolResult::error("old_str not found in file - no replacement made."));
        }

        let updated = original.replacen(&input.old_str, &input.new_str, 1);
        tokio::fs::write(&path, updated)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;

        Ok(ToolResult::success(json!({ "path": path.display().to_string() })))
    }
}
