use anyhow::Result;
use serde::Deserialize;
use serde_json::{json, Value};

use super::spec::{ParamSpec, ParamType, ToolSpec};
use super::{Tool, ToolContext, ToolResult};

use crate::constants::{BINARY_DETECTION_BYTES, READ_FILE_MAX_SIZE};

pub struct ReadFileTool;

#[derive(Deserialize)]
struct ReadFileInput {
    path: String,
    start_line: Option<u64>,
    end_line: Option<u64>,
}

#[async_trait::async_trait]
impl Tool for ReadFileTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "read_file",
            description: "Read a text file. Optionally restrict to a 1-based line range.",
            params: vec![
                ParamSpec::required("path", ParamType::String, "File path, relative to the current directory"),
                ParamSpec::optional("start_line", ParamType::Integer, "First line to return (default 1)"),
                ParamSpec::optional("end_line", ParamType::Integer, "Last line to return (0 or omitted = end of file)"),
            ],
        }
    }

    async fn execute(&self, input: Value, ctx: &mut ToolContext) -> Result<ToolResult> {
        let input: ReadFileInput = serde_json::from_value(input)?;
        let path = ctx.resolve(&input.path);
        if let Some(denied) = ctx.guard(&path, &format!("read file {}", path.display()), false) {
            return Ok(denied);
        }

        let metadata = match tokio::fs::metadata(&path).await {
            Ok(m) => m,
            Err(_) => return Ok(ToolResult::error(format!("Not found: {}", input.path))),
        };
        if !metadata.is_file() {
            return Ok(ToolResult::error(format!("Not a file: {}", input.path)));
        }
        if metadata.len() > READ_FILE_MAX_SIZE {
            return Ok(ToolResult::error("File too large (>5 MB). Use run_command."));
        }

        let bytes = tokio::fs::read(&path).await?;
        // Null bytes early on mean binary content.
        let check_len = bytes.len().min(BINARY_DETECTION_BYTES);
        if bytes[..check_len].contains(&0) {
            return Ok(ToolResult::error("Binary file detected. Cannot display binary content."));
        }
        let text = String::from_utf8_lossy(&bytes);

        let lines: Vec<&str> = text.lines().collect();
        let total = lines.len();
        let start = input.start_line.unwrap_or(1).max(1) as usize;
        let end = match input.end_line.unwrap_or(0) as usize {
            0 => total,
            n => n.min(total),
        };
        let content = if start > end {
            String::new()
        } else {
            lines[start - 1..end].join("\n")
        };

        Ok(ToolResult::success(json!({
            "content": content,
            "total_lines": total,
            "path": path.display().to_string(),
        })))
    }
}
