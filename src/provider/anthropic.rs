//! Anthropic Messages API adapter.
//!
//! A turn streams as a sequence of content blocks. Text blocks produce
//! deltas as they arrive; tool-use blocks carry their id and name at
//! `content_block_start`, accumulate argument JSON across deltas, and are
//! emitted at `content_block_stop`.

use std::collections::BTreeMap;

use serde_json::{json, Value};

use super::adapter::{
    correlation_ids, turn_nonce, ChatAdapter, ChatRequest, EventStream, StreamDecoder, StreamEvent,
};
use super::error::ProviderError;
use super::http::post_sse;
use super::openai::parse_arguments;
use crate::constants::{ANTHROPIC_API_VERSION, ANTHROPIC_MAX_TOKENS};
use crate::message::{paired_view, ConversationEntry, FunctionCall, Part, Role};
use crate::tools::spec::anthropic_tools;

pub struct AnthropicAdapter {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl AnthropicAdapter {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, api_key: String) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }
}

#[async_trait::async_trait]
impl ChatAdapter for AnthropicAdapter {
    async fn stream(&self, request: &ChatRequest) -> Result<EventStream, ProviderError> {
        let builder = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_API_VERSION)
            .json(&request_body(request));
        post_sse(builder, &request.model, AnthropicDecoder::default()).await
    }
}

pub(crate) fn request_body(request: &ChatRequest) -> Value {
    let mut body = json!({
        "model": request.model,
        "max_tokens": ANTHROPIC_MAX_TOKENS,
        "messages": encode_messages(&request.history),
        "stream": true,
        "temperature": request.temperature.min(1.0),
    });
    if !request.system_prompt.is_empty() {
        body["system"] = json!(request.system_prompt);
    }
    if !request.tools.is_empty() {
        body["tools"] = json!(anthropic_tools(&request.tools));
    }
    body
}

/// Encodes the paired view of `history` as Messages API turns.
pub(crate) fn encode_messages(history: &[ConversationEntry]) -> Vec<Value> {
    let view = paired_view(history);
    let ids = correlation_ids(&view, "toolu");
    let mut messages = Vec::with_capacity(view.len());

    for (entry, entry_ids) in view.iter().zip(&ids) {
        let blocks: Vec<Value> = entry
            .parts
            .iter()
            .zip(entry_ids)
            .filter_map(|(part, id)| match part {
                Part::Text(text) if text.is_empty() => None,
                Part::Text(text) => Some(json!({"type": "text", "text": text})),
                Part::FunctionCall(c) => Some(json!({
                    "type": "tool_use",
                    "id": id,
                    "name": c.name,
                    "input": c.args,
                })),
                Part::FunctionResponse(r) => {
                    let failed = r.result.get("success") == Some(&Value::Bool(false));
                    Some(json!({
                        "type": "tool_result",
                        "tool_use_id": id,
                        "content": r.result.to_string(),
                        "is_error": failed,
                    }))
                }
            })
            .collect();
        if blocks.is_empty() {
            continue;
        }
        let role = match entry.role {
            Role::User => "user",
            Role::Model => "assistant",
        };
        messages.push(json!({"role": role, "content": blocks}));
    }
    messages
}

#[derive(Debug)]
struct ToolBlock {
    id: Option<String>,
    name: String,
    input_json: String,
}

/// Per-turn decoder tracking open tool-use blocks by block index.
#[derive(Debug)]
pub(crate) struct AnthropicDecoder {
    blocks: BTreeMap<u64, ToolBlock>,
    nonce: String,
    emitted: usize,
}

impl Default for AnthropicDecoder {
    fn default() -> Self {
        Self {
            blocks: BTreeMap::new(),
            nonce: turn_nonce(),
            emitted: 0,
        }
    }
}

impl AnthropicDecoder {
    fn close(&mut self, block: ToolBlock) -> StreamEvent {
        let args = parse_arguments(&block.input_json, &block.name);
        let id = block
            .id
            .unwrap_or_else(|| format!("toolu_{}_{}", self.nonce, self.emitted));
        self.emitted += 1;
        StreamEvent::ToolCall(FunctionCall {
            name: block.name,
            args,
            id: Some(id),
            signature: None,
        })
    }
}

impl StreamDecoder for AnthropicDecoder {
    fn decode(&mut self, payload: &str) -> Result<Vec<StreamEvent>, ProviderError> {
        let value: Value = serde_json::from_str(payload)
            .map_err(|e| ProviderError::Malformed(format!("{e}: {payload}")))?;
        let index = value.get("index").and_then(Value::as_u64).unwrap_or(0);

        match value.get("type").and_then(Value::as_str).unwrap_or_default() {
            "content_block_start" => {
                let block = value.get("content_block").cloned().unwrap_or_default();
                match block.get("type").and_then(Value::as_str) {
                    Some("tool_use") => {
                        // Some proxies send the full input up front instead of deltas.
                        let input_json = match block.get("input") {
                            Some(Value::Object(map)) if !map.is_empty() => {
                                Value::Object(map.clone()).to_string()
                            }
                            _ => String::new(),
                        };
                        self.blocks.insert(
                            index,
                            ToolBlock {
                                id: block.get("id").and_then(Value::as_str).map(String::from),
                                name: block
                                    .get("name")
                                    .and_then(Value::as_str)
                                    .unwrap_or_default()
                                    .to_string(),
                                input_json,
                            },
                        );
                        Ok(Vec::new())
                    }
                    Some("text") => Ok(block
                        .get("text")
                        .and_then(Value::as_str)
                        .filter(|t| !t.is_empty())
                        .map(|t| vec![StreamEvent::TextDelta(t.to_string())])
                        .unwrap_or_default()),
                    _ => Ok(Vec::new()),
                }
            }
            "content_block_delta" => {
                let delta = value.get("delta").cloned().unwrap_or_default();
                match delta.get("type").and_then(Value::as_str) {
                    Some("text_delta") => Ok(delta
                        .get("text")
                        .and_then(Value::as_str)
                        .filter(|t| !t.is_empty())
                        .map(|t| vec![StreamEvent::TextDelta(t.to_string())])
                        .unwrap_or_default()),
                    Some("input_json_delta") => {
                        if let (Some(block), Some(fragment)) = (
                            self.blocks.get_mut(&index),
                            delta.get("partial_json").and_then(Value::as_str),
                        ) {
                            block.input_json.push_str(fragment);
                        }
                        Ok(Vec::new())
                    }
                    _ => Ok(Vec::new()),
                }
            }
            "content_block_stop" => Ok(self
                .blocks
                .remove(&index)
                .map(|block| vec![self.close(block)])
                .unwrap_or_default()),
            "error" => {
                let error = value.get("error").cloned().unwrap_or_default();
                let kind = error.get("type").and_then(Value::as_str).unwrap_or("error");
                let message = error.get("message").and_then(Value::as_str).unwrap_or("");
                Err(ProviderError::Stream(format!("{kind}: {message}")))
            }
            // message_start, message_delta, message_stop, ping
            _ => Ok(Vec::new()),
        }
    }

    fn finish(&mut self) -> Vec<StreamEvent> {
        let open = std::mem::take(&mut self.blocks);
        if !open.is_empty() {
            tracing::debug!(count = open.len(), "flushing tool blocks left open at end of stream");
        }
        open.into_values().map(|block| self.close(block)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::FunctionResponse;
    use crate::provider::http::test_support::run;

    fn frame(event: &str, data: Value) -> String {
        format!("event: {event}\ndata: {data}\n\n")
    }

    #[tokio::test]
    async fn test_interleaved_text_and_tool_blocks() {
        let chunks = [
            frame("message_start", json!({"type": "message_start", "message": {"id": "msg_1"}})),
            frame("content_block_start", json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}})),
            frame("content_block_delta", json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "Let me "}})),
            frame("content_block_delta", json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "look."}})),
            frame("content_block_stop", json!({"type": "content_block_stop", "index": 0})),
            frame("content_block_start", json!({"type": "content_block_start", "index": 1, "content_block": {"type": "tool_use", "id": "toolu_01", "name": "read_file", "input": {}}})),
            frame("content_block_delta", json!({"type": "content_block_delta", "index": 1, "delta": {"type": "input_json_delta", "partial_json": "{\"path\":"}})),
            frame("content_block_delta", json!({"type": "content_block_delta", "index": 1, "delta": {"type": "input_json_delta", "partial_json": " \"src/main.rs\"}"}})),
            frame("content_block_stop", json!({"type": "content_block_stop", "index": 1})),
            frame("message_delta", json!({"type": "message_delta", "delta": {"stop_reason": "tool_use"}})),
            frame("message_stop", json!({"type": "message_stop"})),
        ];
        let refs: Vec<&str> = chunks.iter().map(String::as_str).collect();
        let events: Vec<StreamEvent> = run(&refs, AnthropicDecoder::default())
            .await
            .into_iter()
            .map(Result::unwrap)
            .collect();

        assert_eq!(events.len(), 3);
        assert_eq!(events[0], StreamEvent::TextDelta("Let me ".into()));
        assert_eq!(events[1], StreamEvent::TextDelta("look.".into()));
        match &events[2] {
            StreamEvent::ToolCall(call) => {
                assert_eq!(call.id.as_deref(), Some("toolu_01"));
                assert_eq!(call.name, "read_file");
                assert_eq!(call.args["path"], "src/main.rs");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_tool_block_without_input_has_empty_args() {
        let chunks = [
            frame("content_block_start", json!({"type": "content_block_start", "index": 0, "content_block": {"type": "tool_use", "id": "toolu_02", "name": "list_directory", "input": {}}})),
            frame("content_block_stop", json!({"type": "content_block_stop", "index": 0})),
        ];
        let refs: Vec<&str> = chunks.iter().map(String::as_str).collect();
        let events = run(&refs, AnthropicDecoder::default()).await;
        match events[0].as_ref().unwrap() {
            StreamEvent::ToolCall(call) => assert!(call.args.is_empty()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_overloaded_error_event_is_transient() {
        let chunks = [frame(
            "error",
            json!({"type": "error", "error": {"type": "overloaded_error", "message": "Overloaded"}}),
        )];
        let refs: Vec<&str> = chunks.iter().map(String::as_str).collect();
        let events = run(&refs, AnthropicDecoder::default()).await;
        let err = events[0].as_ref().unwrap_err();
        assert!(err.is_transient());
        assert!(err.to_string().contains("overloaded_error"));
    }

    #[test]
    fn test_encode_tool_round() {
        let history = vec![
            ConversationEntry::user_text("read it"),
            ConversationEntry::model(
                "",
                vec![FunctionCall {
                    name: "read_file".into(),
                    args: json!({"path": "a"}).as_object().unwrap().clone(),
                    id: Some("toolu_9".into()),
                    signature: None,
                }],
            ),
            ConversationEntry::responses(vec![FunctionResponse {
                name: "read_file".into(),
                id: Some("toolu_9".into()),
                result: json!({"success": false, "error": "Not found: a"}),
            }]),
        ];
        let messages = encode_messages(&history);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1]["role"], "assistant");
        assert_eq!(messages[1]["content"][0]["type"], "tool_use");
        assert_eq!(messages[1]["content"][0]["input"]["path"], "a");
        assert_eq!(messages[2]["content"][0]["tool_use_id"], "toolu_9");
        assert_eq!(messages[2]["content"][0]["is_error"], true);
    }
}
