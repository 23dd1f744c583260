//! OpenAI-compatible Chat Completions adapter (OpenAI, OpenRouter, Ollama).
//!
//! Tool calls stream as fragments keyed by a small integer slot; names and
//! argument JSON both accumulate per slot and are emitted when the turn ends.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};

use super::adapter::{
    correlation_ids, turn_nonce, ChatAdapter, ChatRequest, EventStream, StreamDecoder, StreamEvent,
};
use super::error::ProviderError;
use super::http::post_sse;
use crate::message::{paired_view, ConversationEntry, FunctionCall, Part, Role};
use crate::tools::spec::openai_tools;

/// Adapter for any endpoint speaking the Chat Completions streaming protocol.
pub struct OpenAiAdapter {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAiAdapter {
    /// `api_key` is `None` for local servers that take no auth (Ollama).
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }
}

#[async_trait::async_trait]
impl ChatAdapter for OpenAiAdapter {
    async fn stream(&self, request: &ChatRequest) -> Result<EventStream, ProviderError> {
        let body = request_body(request);
        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        post_sse(builder, &request.model, OpenAiDecoder::default()).await
    }
}

/// Builds the JSON request body for a streaming completion.
pub(crate) fn request_body(request: &ChatRequest) -> Value {
    let mut body = json!({
        "model": request.model,
        "messages": encode_messages(&request.system_prompt, &request.history),
        "stream": true,
        "temperature": request.temperature,
    });
    if !request.tools.is_empty() {
        body["tools"] = json!(openai_tools(&request.tools));
        body["tool_choice"] = json!("auto");
    }
    body
}

/// Encodes the paired view of `history` as Chat Completions messages.
pub(crate) fn encode_messages(system_prompt: &str, history: &[ConversationEntry]) -> Vec<Value> {
    let view = paired_view(history);
    let ids = correlation_ids(&view, "call");
    let mut messages = Vec::with_capacity(view.len() + 1);
    if !system_prompt.is_empty() {
        messages.push(json!({"role": "system", "content": system_prompt}));
    }

    for (entry, entry_ids) in view.iter().zip(&ids) {
        match entry.role {
            Role::User => {
                let text = entry.text();
                if !text.is_empty() {
                    messages.push(json!({"role": "user", "content": text}));
                }
                for (part, id) in entry.parts.iter().zip(entry_ids) {
                    if let Part::FunctionResponse(r) = part {
                        messages.push(json!({
                            "role": "tool",
                            "tool_call_id": id,
                            "content": r.result.to_string(),
                        }));
                    }
                }
            }
            Role::Model => {
                let text = entry.text();
                let tool_calls: Vec<Value> = entry
                    .parts
                    .iter()
                    .zip(entry_ids)
                    .filter_map(|(part, id)| match part {
                        Part::FunctionCall(c) => Some(json!({
                            "id": id,
                            "type": "function",
                            "function": {
                                "name": c.name,
                                "arguments": Value::Object(c.args.clone()).to_string(),
                            }
                        })),
                        _ => None,
                    })
                    .collect();
                if text.is_empty() && tool_calls.is_empty() {
                    continue;
                }
                let mut message = json!({
                    "role": "assistant",
                    "content": if text.is_empty() { Value::Null } else { Value::String(text) },
                });
                if !tool_calls.is_empty() {
                    message["tool_calls"] = Value::Array(tool_calls);
                }
                messages.push(message);
            }
        }
    }
    messages
}

#[derive(Debug, Default)]
struct Slot {
    id: Option<String>,
    name: String,
    arguments: String,
}

/// Per-turn decoder buffering tool-call fragments by slot index.
#[derive(Debug)]
pub(crate) struct OpenAiDecoder {
    slots: BTreeMap<u64, Slot>,
    nonce: String,
}

impl Default for OpenAiDecoder {
    fn default() -> Self {
        Self {
            slots: BTreeMap::new(),
            nonce: turn_nonce(),
        }
    }
}

impl StreamDecoder for OpenAiDecoder {
    fn decode(&mut self, payload: &str) -> Result<Vec<StreamEvent>, ProviderError> {
        let value: Value = serde_json::from_str(payload)
            .map_err(|e| ProviderError::Malformed(format!("{e}: {payload}")))?;

        if let Some(error) = value.get("error") {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .map(String::from)
                .unwrap_or_else(|| error.to_string());
            return Err(ProviderError::Stream(message));
        }

        let mut events = Vec::new();
        let Some(delta) = value.pointer("/choices/0/delta") else {
            return Ok(events);
        };

        if let Some(text) = delta.get("content").and_then(Value::as_str) {
            if !text.is_empty() {
                events.push(StreamEvent::TextDelta(text.to_string()));
            }
        }

        if let Some(calls) = delta.get("tool_calls").and_then(Value::as_array) {
            for (position, fragment) in calls.iter().enumerate() {
                let index = fragment
                    .get("index")
                    .and_then(Value::as_u64)
                    .unwrap_or(position as u64);
                let slot = self.slots.entry(index).or_default();
                if let Some(id) = fragment.get("id").and_then(Value::as_str) {
                    if slot.id.is_none() && !id.is_empty() {
                        slot.id = Some(id.to_string());
                    }
                }
                if let Some(function) = fragment.get("function") {
                    if let Some(name) = function.get("name").and_then(Value::as_str) {
                        slot.name.push_str(name);
                    }
                    if let Some(args) = function.get("arguments").and_then(Value::as_str) {
                        slot.arguments.push_str(args);
                    }
                }
            }
        }
        Ok(events)
    }

    fn finish(&mut self) -> Vec<StreamEvent> {
        std::mem::take(&mut self.slots)
            .into_iter()
            .filter(|(_, slot)| !slot.name.is_empty())
            .map(|(index, slot)| {
                let args = parse_arguments(&slot.arguments, &slot.name);
                StreamEvent::ToolCall(FunctionCall {
                    name: slot.name,
                    args,
                    id: Some(
                        slot.id
                            .unwrap_or_else(|| format!("call_{}_{}", self.nonce, index)),
                    ),
                    signature: None,
                })
            })
            .collect()
    }
}

/// Parses accumulated argument JSON, degrading to an empty object.
pub(super) fn parse_arguments(raw: &str, tool: &str) -> Map<String, Value> {
    if raw.trim().is_empty() {
        return Map::new();
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            tracing::warn!(tool, value = %other, "tool arguments were not an object");
            Map::new()
        }
        Err(e) => {
            tracing::warn!(tool, error = %e, "unparseable tool arguments, using {{}}");
            Map::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::FunctionResponse;
    use crate::provider::http::test_support::run;

    fn chunk(delta: Value) -> String {
        format!("data: {}\n\n", json!({"choices": [{"index": 0, "delta": delta}]}))
    }

    #[tokio::test]
    async fn test_text_fragments_concatenate() {
        let chunks = [
            chunk(json!({"role": "assistant", "content": "Hel"})),
            chunk(json!({"content": "lo, "})),
            chunk(json!({"content": "world"})),
            "data: [DONE]\n\n".to_string(),
        ];
        let refs: Vec<&str> = chunks.iter().map(String::as_str).collect();
        let events = run(&refs, OpenAiDecoder::default()).await;
        let text: String = events
            .into_iter()
            .map(|e| match e.unwrap() {
                StreamEvent::TextDelta(t) => t,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(text, "Hello, world");
    }

    #[tokio::test]
    async fn test_tool_call_fragments_accumulate_per_slot() {
        let chunks = [
            chunk(json!({"tool_calls": [{"index": 0, "id": "call_a", "function": {"name": "read_", "arguments": ""}}]})),
            chunk(json!({"tool_calls": [{"index": 1, "id": "call_b", "function": {"name": "list_directory", "arguments": "{\"pa"}}]})),
            chunk(json!({"tool_calls": [{"index": 0, "function": {"name": "file", "arguments": "{\"path\": "}}]})),
            chunk(json!({"tool_calls": [{"index": 0, "function": {"arguments": "\"a.txt\"}"}}]})),
            chunk(json!({"tool_calls": [{"index": 1, "function": {"arguments": "th\": \".\"}"}}]})),
        ];
        let refs: Vec<&str> = chunks.iter().map(String::as_str).collect();
        let events: Vec<StreamEvent> = run(&refs, OpenAiDecoder::default())
            .await
            .into_iter()
            .map(Result::unwrap)
            .collect();
        assert_eq!(events.len(), 2);
        match (&events[0], &events[1]) {
            (StreamEvent::ToolCall(a), StreamEvent::ToolCall(b)) => {
                assert_eq!(a.name, "read_file");
                assert_eq!(a.id.as_deref(), Some("call_a"));
                assert_eq!(a.args["path"], "a.txt");
                assert_eq!(b.name, "list_directory");
                assert_eq!(b.args["path"], ".");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_arguments_degrade_to_empty() {
        let chunks = [chunk(
            json!({"tool_calls": [{"index": 0, "function": {"name": "run_command", "arguments": "{\"command\": \"ls"}}]}),
        )];
        let refs: Vec<&str> = chunks.iter().map(String::as_str).collect();
        let events = run(&refs, OpenAiDecoder::default()).await;
        match events[0].as_ref().unwrap() {
            StreamEvent::ToolCall(call) => {
                assert!(call.args.is_empty());
                assert!(call.id.as_deref().unwrap().starts_with("call_"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_in_stream_error_and_garbage() {
        let events = run(
            &["data: {\"error\": {\"message\": \"Rate limit reached\"}}\n\n"],
            OpenAiDecoder::default(),
        )
        .await;
        assert!(matches!(&events[0], Err(ProviderError::Stream(m)) if m.contains("Rate limit")));

        let events = run(&["data: not json\n\n"], OpenAiDecoder::default()).await;
        assert!(matches!(&events[0], Err(ProviderError::Malformed(_))));
    }

    #[test]
    fn test_encode_messages_round_trip_ids() {
        let history = vec![
            ConversationEntry::user_text("list files"),
            ConversationEntry::model(
                "Looking.",
                vec![FunctionCall {
                    name: "list_directory".into(),
                    args: json!({"path": "."}).as_object().unwrap().clone(),
                    id: Some("call_1".into()),
                    signature: None,
                }],
            ),
            ConversationEntry::responses(vec![FunctionResponse {
                name: "list_directory".into(),
                id: Some("call_1".into()),
                result: json!({"success": true, "entries": []}),
            }]),
        ];
        let messages = encode_messages("sys", &history);
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[2]["tool_calls"][0]["id"], "call_1");
        assert_eq!(messages[2]["tool_calls"][0]["function"]["arguments"], "{\"path\":\".\"}");
        assert_eq!(messages[3]["role"], "tool");
        assert_eq!(messages[3]["tool_call_id"], "call_1");
        let content: Value =
            serde_json::from_str(messages[3]["content"].as_str().unwrap()).unwrap();
        assert_eq!(content["success"], true);
    }

    #[test]
    fn test_request_body_includes_tools() {
        let request = ChatRequest {
            model: "gpt-4.1".into(),
            system_prompt: String::new(),
            history: vec![ConversationEntry::user_text("hi")],
            tools: crate::tools::ToolRegistry::builtin_specs(),
            temperature: 0.3,
        };
        let body = request_body(&request);
        assert_eq!(body["stream"], true);
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert!(body["tools"].as_array().unwrap().len() >= 10);
    }
}
