use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};

use super::spec::{ParamSpec, ParamType, ToolSpec};
use super::{Tool, ToolContext, ToolResult};

/// Tool that lists one directory level, optionally filtered by a glob.
pub struct ListDirectoryTool;

#[derive(Deserialize)]
struct ListDirectoryInput {
    #[serde(default = "default_path")]
    path: String,
    pattern: Option<String>,
}

fn default_path() -> String {
    ".".to_string()
}

#[async_trait::async_trait]
impl Tool for ListDirectoryTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "list_directory",
            description: "List the entries of a directory with their type and size.",
            params: vec![
                ParamSpec::optional("path", ParamType::String, "Directory to list (default: current directory)"),
                ParamSpec::optional("pattern", ParamType::String, "Glob filter on entry names, e.g. '*.rs'"),
            ],
        }
    }

    async fn execute(&self, input: Value, ctx: &mut ToolContext) -> Result<ToolResult> {
        let input: ListDirectoryInput = serde_json::from_value(input)?;
        let path = ctx.resolve(&input.path);
        if let Some(denied) = ctx.guard(&path, &format!("list directory {}", path.display()), false) {
            return Ok(denied);
        }
        if !path.exists() {
            return Ok(ToolResult::error(format!("Not found: {}", input.path)));
        }

        let filter = match input.pattern.as_deref() {
            None | Some("") | Some("*") => None,
            Some(p) => Some(glob::Pattern::new(p).with_context(|| format!("Invalid pattern: {p}"))?),
        };

        let mut items = Vec::new();
        let mut dir = tokio::fs::read_dir(&path)
            .await
            .with_context(|| format!("Failed to read directory {}", path.display()))?;
        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if filter.as_ref().is_some_and(|f| !f.matches(&name)) {
                continue;
            }
            let meta = entry.metadata().await?;
            items.push((name, meta));
        }
        items.sort_by(|a, b| a.0.cmp(&b.0));

        let entries: Vec<Value> = items
            .into_iter()
            .map(|(name, meta)| {
                if meta.is_dir() {
                    json!({"name": name, "type": "directory"})
                } else {
                    json!({"name": name, "type": "file", "size_bytes": meta.len()})
                }
            })
            .collect();

        Ok(ToolResult::success(json!({
            "path": path.display().to_string(),
            "entries": entries,
        })))
    }
}
