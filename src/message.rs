//! Conversation model shared by every provider.
//!
//! A conversation is an ordered list of [`ConversationEntry`] values, each a
//! [`Role`] plus a list of [`Part`]s. Provider adapters translate this model
//! to and from their wire formats; nothing provider-specific lives here
//! except the opaque continuation token some providers attach to calls.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Who produced an entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub args: Map<String, Value>,
    /// Correlation id echoed by the matching [`FunctionResponse`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Opaque continuation token, round-tripped verbatim and never inspected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<Value>,
}

/// The structured output of one tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionResponse {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub result: Value,
}

/// One piece of an entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum Part {
    Text(String),
    FunctionCall(FunctionCall),
    FunctionResponse(FunctionResponse),
}

/// A single turn in the conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationEntry {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl ConversationEntry {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![Part::Text(text.into())],
        }
    }

    pub fn model_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            parts: vec![Part::Text(text.into())],
        }
    }

    /// Builds a model entry: the text part (if non-empty) first, then the calls
    /// in the order they were emitted.
    pub fn model(text: &str, calls: Vec<FunctionCall>) -> Self {
        let mut parts = Vec::with_capacity(calls.len() + 1);
        if !text.is_empty() {
            parts.push(Part::Text(text.to_string()));
        }
        parts.extend(calls.into_iter().map(Part::FunctionCall));
        Self {
            role: Role::Model,
            parts,
        }
    }

    /// Builds the user entry that answers one round of tool calls.
    pub fn responses(responses: Vec<FunctionResponse>) -> Self {
        Self {
            role: Role::User,
            parts: responses.into_iter().map(Part::FunctionResponse).collect(),
        }
    }

    /// Concatenated text of all text parts.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn function_calls(&self) -> impl Iterator<Item = &FunctionCall> {
        self.parts.iter().filter_map(|p| match p {
            Part::FunctionCall(c) => Some(c),
            _ => None,
        })
    }

    pub fn function_responses(&self) -> impl Iterator<Item = &FunctionResponse> {
        self.parts.iter().filter_map(|p| match p {
            Part::FunctionResponse(r) => Some(r),
            _ => None,
        })
    }

    pub fn has_calls(&self) -> bool {
        self.function_calls().next().is_some()
    }

    pub fn has_responses(&self) -> bool {
        self.function_responses().next().is_some()
    }

    /// True for a user entry typed by the operator (text, no tool responses).
    pub fn is_user_text(&self) -> bool {
        self.role == Role::User && !self.has_responses()
    }
}

/// Whether `responses` answer `calls` one-for-one.
///
/// Calls carrying an id must be answered by a response with the same id.
/// Calls without an id are matched to the first unused id-less response with
/// the same name.
fn answers(calls: &[&FunctionCall], responses: &[&FunctionResponse]) -> bool {
    if calls.len() != responses.len() {
        return false;
    }
    let mut used = vec![false; responses.len()];
    for call in calls {
        let slot = responses.iter().enumerate().position(|(i, r)| {
            !used[i]
                && match &call.id {
                    Some(id) => r.id.as_deref() == Some(id.as_str()),
                    None => r.id.is_none() && r.name == call.name,
                }
        });
        match slot {
            Some(i) => used[i] = true,
            None => return false,
        }
    }
    true
}

/// Returns the subset of `history` that is safe to encode for a provider.
///
/// A model entry with calls is kept only together with the following entry
/// when that entry answers every call exactly once. Model entries with
/// unanswered calls and user entries whose responses answer no preceding call
/// are skipped and logged. Order is preserved.
pub fn paired_view(history: &[ConversationEntry]) -> Vec<&ConversationEntry> {
    let mut view = Vec::with_capacity(history.len());
    let mut i = 0;
    while i < history.len() {
        let entry = &history[i];
        if entry.role == Role::Model && entry.has_calls() {
            let calls: Vec<&FunctionCall> = entry.function_calls().collect();
            let answered = history.get(i + 1).is_some_and(|next| {
                next.role == Role::User && {
                    let responses: Vec<&FunctionResponse> = next.function_responses().collect();
                    answers(&calls, &responses)
                }
            });
            if answered {
                view.push(entry);
                view.push(&history[i + 1]);
                i += 2;
                continue;
            }
            tracing::warn!(index = i, calls = calls.len(), "skipping model entry with unanswered tool calls");
        } else if entry.role == Role::User && entry.has_responses() {
            tracing::warn!(index = i, "skipping tool responses with no matching call");
        } else {
            view.push(entry);
        }
        i += 1;
    }
    view
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "you"),
            Role::Model => write!(f, "gantry"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(name: &str, id: Option<&str>) -> FunctionCall {
        FunctionCall {
            name: name.into(),
            args: Map::new(),
            id: id.map(String::from),
            signature: None,
        }
    }

    fn response(name: &str, id: Option<&str>) -> FunctionResponse {
        FunctionResponse {
            name: name.into(),
            id: id.map(String::from),
            result: json!({"success": true}),
        }
    }

    #[test]
    fn test_part_serialization_shape() {
        let entry = ConversationEntry::model("hi", vec![call("read_file", Some("c1"))]);
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["role"], "model");
        assert_eq!(value["parts"][0]["text"], "hi");
        assert_eq!(value["parts"][1]["functionCall"]["name"], "read_file");
        assert_eq!(value["parts"][1]["functionCall"]["id"], "c1");
        assert!(value["parts"][1]["functionCall"].get("signature").is_none());

        let back: ConversationEntry = serde_json::from_value(value).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn test_model_entry_orders_text_before_calls() {
        let entry = ConversationEntry::model("", vec![call("a", None), call("b", None)]);
        assert_eq!(entry.parts.len(), 2);
        assert!(matches!(entry.parts[0], Part::FunctionCall(ref c) if c.name == "a"));
        assert_eq!(entry.text(), "");
    }

    #[test]
    fn test_paired_view_keeps_answered_rounds() {
        let history = vec![
            ConversationEntry::user_text("list files"),
            ConversationEntry::model("", vec![call("list_directory", Some("c1"))]),
            ConversationEntry::responses(vec![response("list_directory", Some("c1"))]),
            ConversationEntry::model_text("done"),
        ];
        assert_eq!(paired_view(&history).len(), 4);
    }

    #[test]
    fn test_paired_view_drops_unanswered_calls() {
        let history = vec![
            ConversationEntry::user_text("go"),
            ConversationEntry::model("", vec![call("a", Some("c1")), call("b", Some("c2"))]),
            ConversationEntry::responses(vec![response("a", Some("c1"))]),
            ConversationEntry::user_text("again"),
        ];
        let view = paired_view(&history);
        assert_eq!(view.len(), 2);
        assert_eq!(view[0].text(), "go");
        assert_eq!(view[1].text(), "again");
    }

    #[test]
    fn test_paired_view_drops_orphan_responses() {
        let history = vec![
            ConversationEntry::user_text("go"),
            ConversationEntry::responses(vec![response("a", Some("c9"))]),
            ConversationEntry::model_text("ok"),
        ];
        let view = paired_view(&history);
        assert_eq!(view.len(), 2);
        assert!(!view.iter().any(|e| e.has_responses()));
    }

    #[test]
    fn test_paired_view_matches_idless_calls_by_name() {
        let history = vec![
            ConversationEntry::model("", vec![call("a", None), call("b", None)]),
            ConversationEntry::responses(vec![response("b", None), response("a", None)]),
        ];
        assert_eq!(paired_view(&history).len(), 2);

        let mismatched = vec![
            ConversationEntry::model("", vec![call("a", None), call("a", None)]),
            ConversationEntry::responses(vec![response("a", None), response("b", None)]),
        ];
        assert!(paired_view(&mismatched).is_empty());
    }
}
