//! Recursive file search by glob, with an optional content filter.

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;

use super::spec::{ParamSpec, ParamType, ToolSpec};
use super::{Tool, ToolContext, ToolResult};

use crate::constants::{BINARY_DETECTION_BYTES, SEARCH_CONTENT_MAX_SIZE, SEARCH_MAX_MATCHES};

pub struct SearchFilesTool;

#[derive(Deserialize)]
struct SearchFilesInput {
    path: String,
    pattern: String,
    #[serde(default)]
    content_search: String,
}

/// Whether the file's text contains `needle` (already lowercased).
///
/// Oversized files never match.
fn file_contains(path: &Path, needle: &str) -> bool {
    match std::fs::metadata(path) {
        Ok(meta) if meta.len() <= SEARCH_CONTENT_MAX_SIZE => {}
        _ => return false,
    }
    let Ok(bytes) = std::fs::read(path) else {
        return false;
    };
    if bytes[..bytes.len().min(BINARY_DETECTION_BYTES)].contains(&0) {
        return false;
    }
    String::from_utf8_lossy(&bytes).to_lowercase().contains(needle)
}

#[async_trait::async_trait]
impl Tool for SearchFilesTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "search_files",
            description: "Recursively find files whose names match a glob, optionally only those containing some text (case-insensitive).",
            params: vec![
                ParamSpec::required("path", ParamType::String, "Directory to search under"),
                ParamSpec::required("pattern", ParamType::String, "File name glob, e.g. '*.py'"),
                ParamSpec::optional("content_search", ParamType::String, "Only keep files containing this text"),
            ],
        }
    }

    async fn execute(&self, input: Value, ctx: &mut ToolContext) -> Result<ToolResult> {
        let input: SearchFilesInput = serde_json::from_value(input)?;
        let root = ctx.resolve(&input.path);
        if let Some(denied) = ctx.guard(&root, &format!("search files under {}", root.display()), false) {
            return Ok(denied);
        }
        if !root.is_dir() {
            return Ok(ToolResult::error(format!("Not a directory: {}", input.path)));
        }

        let full_pattern = format!(
            "{}/**/{}",
            glob::Pattern::escape(&root.to_string_lossy()),
            input.pattern
        );
        let needle = input.content_search.to_lowercase();

        let mut matches: Vec<String> = Vec::new();
        for entry in glob::glob(&full_pattern).with_context(|| format!("Invalid pattern: {}", input.pattern))? {
            if matches.len() >= SEARCH_MAX_MATCHES {
                break;
            }
            // Unreadable entries are skipped.
            let Ok(path) = entry else { continue };
            if !path.is_file() {
                continue;
            }
            if !needle.is_empty() && !file_contains(&path, &needle) {
                continue;
            }
            matches.push(path.display().to_string());
        }

        Ok(ToolResult::success(json!({
            "count": matches.len(),
            "matches": matches,
        })))
    }
}
