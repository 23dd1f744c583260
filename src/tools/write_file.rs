use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};

use super::spec::{ParamSpec, ParamType, ToolSpec};
use super::{Tool, ToolContext, ToolResult};

/// Tool that creates or overwrites a file, creating parent directories.
pub struct WriteFileTool;

#[derive(Deserialize)]
struct WriteFileInput {
    path: String,
    content: String,
    #[serde(default = "default_overwrite")]
    overwrite: bool,
}

fn default_overwrite() -> bool {
    true
}

#[async_trait::async_trait]
impl Tool for WriteFileTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "write_file",
            description: "Write content to a file, creating parent directories. Use for new files or full rewrites.",
            params: vec![
                ParamSpec::required("path", ParamType::String, "File path, relative to the current directory"),
                ParamSpec::required("content", ParamType::String, "Full file content"),
                ParamSpec::optional("overwrite", ParamType::Boolean, "Replace an existing file (default true)"),
            ],
        }
    }

    async fn execute(&self, input: Value, ctx: &mut ToolContext) -> Result<ToolResult> {
        let input: WriteFileInput = serde_json::from_value(input)?;
        let path = ctx.resolve(&input.path);
        if let Some(denied) = ctx.guard(&path, &format!("write file {}", path.display()), true) {
            return Ok(denied);
        }
        if path.exists() && !input.overwrite {
            return Ok(ToolResult::error("File exists. Set overwrite=true."));
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        tokio::fs::write(&path, &input.content)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;

        Ok(ToolResult::success(json!({
            "path": path.display().to_string(),
            "size_bytes": input.content.len(),
        })))
    }
}
