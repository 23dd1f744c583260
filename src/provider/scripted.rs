//! In-memory adapter that replays canned turns, for tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use futures::stream;
use futures::StreamExt;
use serde_json::{Map, Value};

use super::adapter::{ChatAdapter, ChatRequest, EventStream, StreamEvent};
use super::client::Provider;
use super::error::ProviderError;
use super::kind::ProviderKind;
use crate::message::FunctionCall;

/// One scripted reply to a `stream` call.
pub enum Step {
    /// Fail before any event is produced.
    Reject(ProviderError),
    /// Stream these items in order.
    Reply(Vec<Result<StreamEvent, ProviderError>>),
    /// Stream these events, then stay open without ending.
    Hang(Vec<StreamEvent>),
}

impl Step {
    pub fn text(text: &str) -> Self {
        Self::Reply(vec![Ok(StreamEvent::TextDelta(text.to_string()))])
    }

    pub fn calls(calls: Vec<FunctionCall>) -> Self {
        Self::Reply(calls.into_iter().map(|c| Ok(StreamEvent::ToolCall(c))).collect())
    }
}

/// Builds a call with an id and JSON-object args.
pub fn call(name: &str, id: &str, args: Value) -> FunctionCall {
    FunctionCall {
        name: name.to_string(),
        args: match args {
            Value::Object(map) => map,
            _ => Map::new(),
        },
        id: Some(id.to_string()),
        signature: None,
    }
}

pub fn rate_limited() -> ProviderError {
    ProviderError::Http {
        status: 429,
        message: "Too Many Requests".into(),
        retry_after: None,
    }
}

#[derive(Default)]
pub struct ScriptedAdapter {
    steps: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedAdapter {
    pub fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn remaining(&self) -> usize {
        self.steps.lock().unwrap().len()
    }

    pub fn provider(self: &Arc<Self>) -> Provider {
        Provider::with_adapter(ProviderKind::Gemini, "scripted", Arc::clone(self) as Arc<dyn ChatAdapter>)
    }
}

#[async_trait::async_trait]
impl ChatAdapter for ScriptedAdapter {
    async fn stream(&self, request: &ChatRequest) -> Result<EventStream, ProviderError> {
        self.requests.lock().unwrap().push(request.clone());
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(Step::Reject(err)) => Err(err),
            Some(Step::Reply(items)) => Ok(stream::iter(items).boxed()),
            Some(Step::Hang(events)) => Ok(stream::iter(events.into_iter().map(Ok))
                .chain(stream::pending())
                .boxed()),
            None => Err(ProviderError::Malformed("script exhausted".into())),
        }
    }
}
