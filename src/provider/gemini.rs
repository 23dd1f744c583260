//! Gemini `streamGenerateContent` adapter.
//!
//! Every SSE payload is a complete `GenerateContentResponse` whose parts are
//! already whole. Gemini issues no call ids, so the decoder assigns
//! `gemini-<nonce>-<n>` ids that are unique per turn; they stay in local
//! history for correlation and are never sent back on the wire.

use serde_json::{json, Map, Value};

use super::adapter::{turn_nonce, ChatAdapter, ChatRequest, EventStream, StreamDecoder, StreamEvent};
use super::error::ProviderError;
use super::http::post_sse;
use crate::message::{paired_view, ConversationEntry, FunctionCall, Part, Role};
use crate::tools::spec::gemini_tools;

pub struct GeminiAdapter {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GeminiAdapter {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, api_key: String) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }
}

#[async_trait::async_trait]
impl ChatAdapter for GeminiAdapter {
    async fn stream(&self, request: &ChatRequest) -> Result<EventStream, ProviderError> {
        let url = format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.base_url, request.model
        );
        let builder = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request_body(request));
        post_sse(builder, &request.model, GeminiDecoder::default()).await
    }
}

pub(crate) fn request_body(request: &ChatRequest) -> Value {
    let mut body = json!({
        "contents": encode_contents(&request.history),
        "generationConfig": {"temperature": request.temperature},
    });
    if !request.system_prompt.is_empty() {
        body["systemInstruction"] = json!({"parts": [{"text": request.system_prompt}]});
    }
    let tools = gemini_tools(&request.tools);
    if !tools.is_empty() {
        body["tools"] = json!(tools);
        body["toolConfig"] = json!({"functionCallingConfig": {"mode": "AUTO"}});
    }
    body
}

/// Encodes the paired view of `history` as Gemini `contents`.
pub(crate) fn encode_contents(history: &[ConversationEntry]) -> Vec<Value> {
    paired_view(history)
        .into_iter()
        .filter(|entry| !entry.parts.is_empty())
        .map(|entry| {
            let parts: Vec<Value> = entry
                .parts
                .iter()
                .map(|part| match part {
                    Part::Text(text) => json!({"text": text}),
                    Part::FunctionCall(c) => {
                        let mut value = json!({"functionCall": {"name": c.name, "args": c.args}});
                        if let Some(signature) = &c.signature {
                            value["thoughtSignature"] = signature.clone();
                        }
                        value
                    }
                    Part::FunctionResponse(r) => json!({
                        "functionResponse": {"name": r.name, "response": {"result": r.result}}
                    }),
                })
                .collect();
            let role = match entry.role {
                Role::User => "user",
                Role::Model => "model",
            };
            json!({"role": role, "parts": parts})
        })
        .collect()
}

/// Per-turn decoder; assigns synthesized ids in arrival order.
#[derive(Debug)]
pub(crate) struct GeminiDecoder {
    nonce: String,
    calls: usize,
}

impl Default for GeminiDecoder {
    fn default() -> Self {
        Self {
            nonce: turn_nonce(),
            calls: 0,
        }
    }
}

impl StreamDecoder for GeminiDecoder {
    fn decode(&mut self, payload: &str) -> Result<Vec<StreamEvent>, ProviderError> {
        let value: Value = serde_json::from_str(payload)
            .map_err(|e| ProviderError::Malformed(format!("{e}: {payload}")))?;

        if let Some(error) = value.get("error") {
            let status = error.get("status").and_then(Value::as_str).unwrap_or("ERROR");
            let message = error.get("message").and_then(Value::as_str).unwrap_or("");
            return Err(ProviderError::Stream(format!("{status}: {message} {error}")));
        }

        if let Some(reason) = value.pointer("/promptFeedback/blockReason").and_then(Value::as_str) {
            tracing::warn!(reason, "gemini blocked the prompt");
        }

        let mut events = Vec::new();
        let Some(parts) = value
            .pointer("/candidates/0/content/parts")
            .and_then(Value::as_array)
        else {
            return Ok(events);
        };

        for part in parts {
            if part.get("thought").and_then(Value::as_bool) == Some(true) {
                continue;
            }
            if let Some(call) = part.get("functionCall") {
                let name = call
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let args = match call.get("args") {
                    Some(Value::Object(map)) => map.clone(),
                    _ => Map::new(),
                };
                let id = format!("gemini-{}-{}", self.nonce, self.calls);
                self.calls += 1;
                events.push(StreamEvent::ToolCall(FunctionCall {
                    name,
                    args,
                    id: Some(id),
                    signature: part.get("thoughtSignature").cloned(),
                }));
            } else if let Some(text) = part.get("text").and_then(Value::as_str) {
                if !text.is_empty() {
                    events.push(StreamEvent::TextDelta(text.to_string()));
                }
            }
        }
        Ok(events)
    }

    fn finish(&mut self) -> Vec<StreamEvent> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::FunctionResponse;
    use crate::provider::http::test_support::run;

    fn frame(parts: Value) -> String {
        format!(
            "data: {}\r\n\r\n",
            json!({"candidates": [{"content": {"role": "model", "parts": parts}}]})
        )
    }

    #[tokio::test]
    async fn test_parts_and_signature_capture() {
        let chunks = [
            frame(json!([{"text": "thinking", "thought": true}, {"text": "On it. "}])),
            frame(json!([
                {"functionCall": {"name": "list_directory", "args": {"path": "."}}, "thoughtSignature": "c2lnbmF0dXJl"},
                {"functionCall": {"name": "list_directory", "args": {"path": "src"}}}
            ])),
        ];
        let refs: Vec<&str> = chunks.iter().map(String::as_str).collect();
        let events: Vec<StreamEvent> = run(&refs, GeminiDecoder::default())
            .await
            .into_iter()
            .map(Result::unwrap)
            .collect();

        assert_eq!(events.len(), 3);
        assert_eq!(events[0], StreamEvent::TextDelta("On it. ".into()));
        let (StreamEvent::ToolCall(first), StreamEvent::ToolCall(second)) = (&events[1], &events[2]) else {
            panic!("expected two calls");
        };
        assert_eq!(first.signature, Some(json!("c2lnbmF0dXJl")));
        assert_eq!(second.signature, None);
        assert_ne!(first.id, second.id);
        assert!(first.id.as_deref().unwrap().starts_with("gemini-"));
        assert!(first.id.as_deref().unwrap().ends_with("-0"));
        assert_eq!(second.args["path"], "src");
    }

    #[tokio::test]
    async fn test_error_payload_carries_retry_delay() {
        let payload = json!({"error": {"code": 429, "status": "RESOURCE_EXHAUSTED", "message": "Quota exceeded",
            "details": [{"@type": "type.googleapis.com/google.rpc.RetryInfo", "retryDelay": "17s"}]}});
        let chunk = format!("data: {payload}\n\n");
        let events = run(&[chunk.as_str()], GeminiDecoder::default()).await;
        let err = events[0].as_ref().unwrap_err();
        assert!(err.is_transient());
        assert_eq!(err.retry_hint(), Some(std::time::Duration::from_secs(17)));
    }

    #[test]
    fn test_signature_round_trips_and_ids_stay_local() {
        let history = vec![
            ConversationEntry::user_text("look"),
            ConversationEntry::model(
                "",
                vec![FunctionCall {
                    name: "list_directory".into(),
                    args: Map::new(),
                    id: Some("gemini-abc-0".into()),
                    signature: Some(json!("opaque==")),
                }],
            ),
            ConversationEntry::responses(vec![FunctionResponse {
                name: "list_directory".into(),
                id: Some("gemini-abc-0".into()),
                result: json!({"success": true}),
            }]),
        ];
        let contents = encode_contents(&history);
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[1]["parts"][0]["thoughtSignature"], "opaque==");
        assert!(contents[1]["parts"][0]["functionCall"].get("id").is_none());
        assert_eq!(
            contents[2]["parts"][0]["functionResponse"]["response"]["result"]["success"],
            true
        );
    }

    #[test]
    fn test_request_body_shape() {
        let request = ChatRequest {
            model: "gemini-2.5-pro".into(),
            system_prompt: "be brief".into(),
            history: vec![ConversationEntry::user_text("hi")],
            tools: crate::tools::ToolRegistry::builtin_specs(),
            temperature: 0.3,
        };
        let body = request_body(&request);
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "be brief");
        assert_eq!(body["toolConfig"]["functionCallingConfig"]["mode"], "AUTO");
        assert!(body["tools"][0]["functionDeclarations"].is_array());
    }
}
