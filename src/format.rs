use colored::Colorize;
use serde_json::{Map, Value};

use crate::message::{ConversationEntry, Part, Role};

/// Longest argument or error preview shown on a tool line.
const PREVIEW_CHARS: usize = 120;

/// Format an entry for terminal display with role label and colors.
pub fn format_entry(entry: &ConversationEntry) -> String {
    let mut lines = vec![format_role_label(entry)];
    for part in &entry.parts {
        match part {
            Part::Text(text) => lines.push(format_body(text, entry.role)),
            Part::FunctionCall(call) => lines.push(format_tool_call(&call.name, &call.args)),
            Part::FunctionResponse(resp) => lines.push(format_tool_result(&resp.name, &resp.result)),
        }
    }
    lines.join("\n")
}

fn format_role_label(entry: &ConversationEntry) -> String {
    match entry.role {
        Role::User if entry.has_responses() => format!("{}", "tools:".yellow()),
        Role::User => format!("{}", "you:".green().bold()),
        Role::Model => format!("{}", "gantry:".cyan().bold()),
    }
}

fn format_body(text: &str, role: Role) -> String {
    match role {
        Role::User => text.to_string(),
        Role::Model => render_markdown_lite(text),
    }
}

/// One-line summary of a tool invocation.
pub fn format_tool_call(name: &str, args: &Map<String, Value>) -> String {
    if name == "run_command" {
        let command = args.get("command").and_then(Value::as_str).unwrap_or_default();
        let tag = if args.get("background").and_then(Value::as_bool).unwrap_or(false) {
            " (background)".dimmed().to_string()
        } else {
            String::new()
        };
        return format!("{}{} {}", "$".yellow().bold(), tag, command.yellow());
    }
    let rendered: Vec<String> = args
        .iter()
        .map(|(k, v)| {
            let value = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            format!("{}={}", k, preview(&value))
        })
        .collect();
    format!("{} {}", format!("{name}:").dimmed(), rendered.join(" ").cyan())
}

/// One-line summary of a tool result.
pub fn format_tool_result(name: &str, result: &Value) -> String {
    let success = result.get("success").and_then(Value::as_bool).unwrap_or(false);
    if !success {
        let error = result
            .get("error")
            .or_else(|| result.get("stderr"))
            .and_then(Value::as_str)
            .unwrap_or("failed");
        return format!("{} {}", "✗".red(), preview(error));
    }
    let detail = match name {
        "run_command" => format!(
            "exit {}",
            result.get("exit_code").and_then(Value::as_i64).unwrap_or_default()
        ),
        "list_directory" => count_of(result, "entries", "entries"),
        "search_files" => count_of(result, "matches", "file(s)"),
        "read_file" => format!(
            "{} lines",
            result.get("total_lines").and_then(Value::as_u64).unwrap_or_default()
        ),
        "write_file" => format!(
            "{} bytes",
            result.get("size_bytes").and_then(Value::as_u64).unwrap_or_default()
        ),
        "change_directory" => result.get("cwd").and_then(Value::as_str).unwrap_or_default().to_string(),
        _ => "ok".to_string(),
    };
    format!("{} {}", "✓".green(), detail.dimmed())
}

fn count_of(result: &Value, key: &str, noun: &str) -> String {
    let n = result.get(key).and_then(Value::as_array).map_or(0, Vec::len);
    format!("{n} {noun}")
}

/// First line of `text`, cut to [`PREVIEW_CHARS`].
fn preview(text: &str) -> String {
    let line = text.lines().next().unwrap_or_default();
    if line.chars().count() > PREVIEW_CHARS || text.contains('\n') {
        let cut: String = line.chars().take(PREVIEW_CHARS).collect();
        format!("{cut}…")
    } else {
        line.to_string()
    }
}

/// Minimal markdown renderer for terminal output.
/// Handles bold, inline code, and fenced code blocks.
pub fn render_markdown_lite(text: &str) -> String {
    let mut output = Vec::new();
    let mut in_code_block = false;

    for line in text.lines() {
        if let Some(lang) = line.strip_prefix("```") {
            in_code_block = !in_code_block;
            if in_code_block && !lang.is_empty() {
                output.push(format!("  {}", lang.dimmed()));
            }
            continue;
        }
        if in_code_block {
            output.push(format!("  {}", line.dimmed()));
        } else {
            output.push(render_inline(line));
        }
    }
    output.join("\n")
}

/// Handle **bold** and `inline code` within a single line.
fn render_inline(line: &str) -> String {
    let mut result = String::new();
    let mut rest = line;

    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix("**") {
            if let Some(end) = after.find("**") {
                result.push_str(&after[..end].bold().to_string());
                rest = &after[end + 2..];
                continue;
            }
        }
        if let Some(after) = rest.strip_prefix('`') {
            if let Some(end) = after.find('`') {
                result.push_str(&after[..end].dimmed().to_string());
                rest = &after[end + 1..];
                continue;
            }
        }
        let mut chars = rest.chars();
        if let Some(c) = chars.next() {
            result.push(c);
        }
        rest = chars.as_str();
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_markdown_plain_text_passes_through() {
        colored::control::set_override(false);
        assert_eq!(render_markdown_lite("hello **world** and `code`"), "hello world and code");
        assert_eq!(render_markdown_lite("```rust\nfn main() {}\n```"), "  rust\n  fn main() {}");
    }

    #[test]
    fn test_tool_result_summaries() {
        colored::control::set_override(false);
        let ok = json!({"success": true, "entries": [1, 2, 3]});
        assert_eq!(format_tool_result("list_directory", &ok), "✓ 3 entries");
        let failed = json!({"success": false, "error": "Not found: x\nmore"});
        assert_eq!(format_tool_result("read_file", &failed), "✗ Not found: x…");
    }
}
