//! LLM-based context compaction for gantry.
//!
//! Compaction summarizes the older part of a conversation through the active
//! provider and replaces that contiguous prefix with two entries: the summary
//! as a user entry and a short model acknowledgement. The most recent entries
//! are kept verbatim, starting at an operator-typed message so tool calls and
//! their responses are never split apart.

use anyhow::{Context, Result};

use crate::constants::COMPACTION_PROMPT;
use crate::message::{ConversationEntry, Part};
use crate::provider::Provider;

/// Characters of each tool result carried into the summary transcript.
const RESULT_PREVIEW_CHARS: usize = 500;

const ACKNOWLEDGEMENT: &str = "Understood. I have the summary of our earlier conversation and will continue from there.";

/// Result of a compaction attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum CompactionResult {
    /// Not enough history before the kept tail.
    NothingToCompact,
    Compacted {
        /// Entries replaced by the summary pair.
        entries_removed: usize,
        /// Entries kept verbatim after the summary.
        entries_kept: usize,
    },
}

/// Index where the kept tail starts, or `None` when nothing would be removed.
///
/// Starts `keep_recent` entries from the end, then moves back to the nearest
/// user text entry.
pub fn split_point(history: &[ConversationEntry], keep_recent: usize) -> Option<usize> {
    let start = history.len().checked_sub(keep_recent)?;
    let split = (0..=start.min(history.len().saturating_sub(1)))
        .rev()
        .find(|&i| history[i].is_user_text())?;
    (split > 0).then_some(split)
}

/// Plain-text rendering of `entries` for the summarizer.
fn transcript(entries: &[ConversationEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        for part in &entry.parts {
            match part {
                Part::Text(text) => out.push_str(&format!("[{}]: {}\n\n", entry.role, text)),
                Part::FunctionCall(call) => out.push_str(&format!(
                    "[{}] called {}({})\n\n",
                    entry.role,
                    call.name,
                    serde_json::Value::Object(call.args.clone())
                )),
                Part::FunctionResponse(response) => {
                    let result = response.result.to_string();
                    let preview: String = result.chars().take(RESULT_PREVIEW_CHARS).collect();
                    out.push_str(&format!("[tool {}] returned {}\n\n", response.name, preview));
                }
            }
        }
    }
    out
}

/// Compacts `history` in place by summarizing everything before the kept tail.
///
/// # Errors
///
/// Returns an error if the provider fails or returns an empty summary. The
/// history is left untouched in that case.
pub async fn compact(
    history: &mut Vec<ConversationEntry>,
    provider: &Provider,
    keep_recent: usize,
    temperature: f64,
) -> Result<CompactionResult> {
    let Some(split) = split_point(history, keep_recent) else {
        return Ok(CompactionResult::NothingToCompact);
    };

    let summary = provider
        .complete(COMPACTION_PROMPT.trim_end(), &transcript(&history[..split]), temperature)
        .await
        .context("Failed to generate compaction summary")?;
    let summary = summary.trim();
    anyhow::ensure!(!summary.is_empty(), "The model returned an empty summary");

    history.splice(
        ..split,
        [
            ConversationEntry::user_text(format!("[Previous context summary]\n{summary}")),
            ConversationEntry::model_text(ACKNOWLEDGEMENT),
        ],
    );
    tracing::info!(removed = split, kept = history.len() - 2, "history compacted");

    Ok(CompactionResult::Compacted {
        entries_removed: split,
        entries_kept: history.len() - 2,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::FunctionResponse;
    use crate::provider::scripted::{call, ScriptedAdapter, Step};
    use crate::provider::ProviderError;
    use serde_json::json;

    fn tool_round(id: &str) -> [ConversationEntry; 2] {
        [
            ConversationEntry::model("", vec![call("read_file", id, json!({"path": "a.txt"}))]),
            ConversationEntry::responses(vec![FunctionResponse {
                name: "read_file".into(),
                id: Some(id.into()),
                result: json!({"success": true, "content": "hello"}),
            }]),
        ]
    }

    fn long_history() -> Vec<ConversationEntry> {
        let mut history = vec![ConversationEntry::user_text("first")];
        history.extend(tool_round("c1"));
        history.push(ConversationEntry::model_text("done one"));
        history.push(ConversationEntry::user_text("second"));
        history.extend(tool_round("c2"));
        history.push(ConversationEntry::model_text("done two"));
        history
    }

    #[test]
    fn test_split_snaps_back_to_user_text() {
        let history = long_history();
        assert_eq!(split_point(&history, 4), Some(4));
        // Index 5 is a model call; the split moves back to "second".
        assert_eq!(split_point(&history, 3), Some(4));
        assert_eq!(split_point(&history, 2), Some(4));
        assert_eq!(split_point(&history, 8), None);
        assert_eq!(split_point(&history, 20), None);
        assert_eq!(split_point(&[], 4), None);
    }

    #[tokio::test]
    async fn test_compact_replaces_prefix() {
        let adapter = ScriptedAdapter::new(vec![Step::text("User read a.txt twice.")]);
        let provider = adapter.provider();
        let mut history = long_history();

        let result = compact(&mut history, &provider, 4, 0.3).await.unwrap();
        assert_eq!(
            result,
            CompactionResult::Compacted {
                entries_removed: 4,
                entries_kept: 4
            }
        );
        assert_eq!(history.len(), 6);
        assert!(history[0].text().contains("User read a.txt twice."));
        assert_eq!(history[1], ConversationEntry::model_text(ACKNOWLEDGEMENT));
        assert_eq!(history[2], ConversationEntry::user_text("second"));

        let requests = adapter.requests();
        let request = &requests[0];
        assert!(request.tools.is_empty());
        assert!(request.history[0].text().contains("called read_file"));
    }

    #[tokio::test]
    async fn test_failed_summary_leaves_history() {
        let adapter = ScriptedAdapter::new(vec![Step::Reject(ProviderError::Malformed("bad".into()))]);
        let provider = adapter.provider();
        let mut history = long_history();
        let before = history.clone();
        assert!(compact(&mut history, &provider, 4, 0.3).await.is_err());
        assert_eq!(history, before);
    }

    #[tokio::test]
    async fn test_short_history_is_left_alone() {
        let adapter = ScriptedAdapter::new(vec![]);
        let provider = adapter.provider();
        let mut history = vec![ConversationEntry::user_text("hi"), ConversationEntry::model_text("hello")];
        let result = compact(&mut history, &provider, 4, 0.3).await.unwrap();
        assert_eq!(result, CompactionResult::NothingToCompact);
        assert_eq!(adapter.remaining(), 0);
        assert!(adapter.requests().is_empty());
    }
}
