//! The adapter contract every provider implements.
//!
//! An adapter turns a [`ChatRequest`] into an [`EventStream`]: a lazy, finite,
//! non-restartable sequence of [`StreamEvent`]s for one model turn.

use futures::stream::BoxStream;

use super::error::ProviderError;
use crate::message::{ConversationEntry, FunctionCall, Part};
use crate::tools::spec::ToolSpec;

/// A normalized event from a provider stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    TextDelta(String),
    ToolCall(FunctionCall),
}

/// Event sequence for one model turn.
pub type EventStream = BoxStream<'static, Result<StreamEvent, ProviderError>>;

/// Everything an adapter needs to produce one turn.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub system_prompt: String,
    pub history: Vec<ConversationEntry>,
    pub tools: Vec<ToolSpec>,
    pub temperature: f64,
}

/// A provider's wire protocol.
#[async_trait::async_trait]
pub trait ChatAdapter: Send + Sync {
    /// Opens a streaming completion for `request`.
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderError`] if the request cannot be sent or the
    /// provider rejects it before streaming starts.
    async fn stream(&self, request: &ChatRequest) -> Result<EventStream, ProviderError>;
}

/// Pure per-turn payload decoder, fed one SSE data payload at a time.
pub trait StreamDecoder: Send + 'static {
    /// Decodes one payload into zero or more events.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Malformed`] for payloads that are not JSON and
    /// [`ProviderError::Stream`] for errors the provider reports in-stream.
    fn decode(&mut self, payload: &str) -> Result<Vec<StreamEvent>, ProviderError>;

    /// Flushes whatever the decoder was still accumulating when the stream ended.
    fn finish(&mut self) -> Vec<StreamEvent>;
}

/// Short random token that keeps synthesized call ids unique across turns.
pub(super) fn turn_nonce() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// Correlation ids for every call and response part in `view`, indexed
/// `[entry][part]`.
///
/// Ids already present are kept. Calls without one get `{prefix}_{entry}_{part}`;
/// responses without one take the id of the first unclaimed call with the same
/// name in the preceding entry.
pub(super) fn correlation_ids(view: &[&ConversationEntry], prefix: &str) -> Vec<Vec<Option<String>>> {
    let mut ids: Vec<Vec<Option<String>>> = Vec::with_capacity(view.len());
    for (hi, entry) in view.iter().enumerate() {
        let mut claimed: Vec<bool> = Vec::new();
        let previous: Vec<(&str, String)> = match hi.checked_sub(1) {
            Some(prev) => view[prev]
                .parts
                .iter()
                .zip(&ids[prev])
                .filter_map(|(part, id)| match (part, id) {
                    (Part::FunctionCall(c), Some(id)) => Some((c.name.as_str(), id.clone())),
                    _ => None,
                })
                .collect(),
            None => Vec::new(),
        };
        claimed.resize(previous.len(), false);

        // Ids explicitly echoed by responses are claimed first.
        for part in &entry.parts {
            if let Part::FunctionResponse(r) = part {
                if let Some(id) = &r.id {
                    if let Some(i) = previous.iter().position(|(_, pid)| pid == id) {
                        claimed[i] = true;
                    }
                }
            }
        }

        let row = entry
            .parts
            .iter()
            .enumerate()
            .map(|(pi, part)| match part {
                Part::Text(_) => None,
                Part::FunctionCall(c) => Some(
                    c.id.clone()
                        .unwrap_or_else(|| format!("{prefix}_{hi}_{pi}")),
                ),
                Part::FunctionResponse(r) => Some(match &r.id {
                    Some(id) => id.clone(),
                    None => {
                        let found = previous
                            .iter()
                            .enumerate()
                            .position(|(i, (name, _))| !claimed[i] && *name == r.name);
                        match found {
                            Some(i) => {
                                claimed[i] = true;
                                previous[i].1.clone()
                            }
                            None => format!("{prefix}_{hi}_{pi}"),
                        }
                    }
                }),
            })
            .collect();
        ids.push(row);
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::FunctionResponse;
    use serde_json::{json, Map};

    #[test]
    fn test_correlation_ids_fill_gaps_by_name() {
        let model = ConversationEntry::model(
            "",
            vec![
                FunctionCall {
                    name: "a".into(),
                    args: Map::new(),
                    id: None,
                    signature: None,
                },
                FunctionCall {
                    name: "b".into(),
                    args: Map::new(),
                    id: Some("x1".into()),
                    signature: None,
                },
            ],
        );
        let responses = ConversationEntry::responses(vec![
            FunctionResponse {
                name: "b".into(),
                id: None,
                result: json!(1),
            },
            FunctionResponse {
                name: "a".into(),
                id: None,
                result: json!(2),
            },
        ]);
        let view = vec![&model, &responses];
        let ids = correlation_ids(&view, "call");
        assert_eq!(ids[0], vec![Some("call_0_0".to_string()), Some("x1".to_string())]);
        assert_eq!(ids[1], vec![Some("x1".to_string()), Some("call_0_0".to_string())]);
    }
}
