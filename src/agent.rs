//! The agent round loop.
//!
//! [`run_turn`] handles one operator submission: it streams a model turn
//! through the retry controller, records it, executes any requested tools,
//! feeds the results back and repeats until the model stops calling tools,
//! the round budget runs out, or the operator interrupts.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::Notify;

use crate::message::{ConversationEntry, FunctionResponse};
use crate::output::Renderer;
use crate::provider::{Provider, ProviderError, StreamEvent};
use crate::retry::{with_retry, RetryHooks, RetryPolicy};
use crate::tools::{ToolContext, ToolRegistry};

/// Operator interrupt shared between the signal listener and the loop.
#[derive(Clone, Default)]
pub struct Interrupt {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    /// Resolves once the interrupt has been triggered.
    pub async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_triggered() {
                return;
            }
            notified.await;
        }
    }

    /// Triggers on every Ctrl-C for the rest of the process.
    pub fn listen_ctrl_c(&self) {
        let interrupt = self.clone();
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                tracing::debug!("interrupt received");
                interrupt.trigger();
            }
        });
    }
}

/// Knobs for one run of the loop.
#[derive(Clone)]
pub struct LoopOptions {
    pub system_prompt: String,
    pub max_rounds: u32,
    pub temperature: f64,
    pub retry: RetryPolicy,
    pub hooks: Arc<dyn RetryHooks>,
}

/// How a turn ended.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// The model answered without calling tools. `text` joins the text of
    /// every model entry produced during the turn.
    Completed { rounds: u32, text: String },
    /// The round budget ran out with tool calls still being issued.
    MaxRoundsReached { rounds: u32 },
    Interrupted { rounds: u32 },
}

/// What one streamed model turn produced.
struct RoundOutput {
    text: String,
    calls: Vec<crate::message::FunctionCall>,
}

enum StreamEnd {
    Finished,
    Interrupted,
    Failed(ProviderError),
}

/// Drains one retried stream, rendering text as it arrives.
async fn stream_round(
    provider: &Provider,
    history: &[ConversationEntry],
    specs: &[crate::tools::spec::ToolSpec],
    renderer: &mut dyn Renderer,
    options: &LoopOptions,
    interrupt: &Interrupt,
) -> (RoundOutput, StreamEnd) {
    let request = provider.request(&options.system_prompt, history, specs.to_vec(), options.temperature);
    let opener = provider.clone();
    let mut stream = with_retry(
        move || opener.open(request.clone()),
        options.retry,
        Arc::clone(&options.hooks),
    );

    let mut output = RoundOutput {
        text: String::new(),
        calls: Vec::new(),
    };
    let end = loop {
        tokio::select! {
            biased;
            _ = interrupt.wait() => break StreamEnd::Interrupted,
            item = stream.next() => match item {
                None => break StreamEnd::Finished,
                Some(Ok(StreamEvent::TextDelta(delta))) => {
                    renderer.render_token(&delta);
                    output.text.push_str(&delta);
                }
                Some(Ok(StreamEvent::ToolCall(call))) => output.calls.push(call),
                Some(Err(e)) => break StreamEnd::Failed(e),
            },
        }
    };
    (output, end)
}

/// Runs one operator submission to completion.
///
/// Appends the user entry, then alternates model turns and tool turns.
/// Every completed round leaves the history paired: one model entry, plus
/// one responses entry when the model called tools.
///
/// # Errors
///
/// Returns the provider error that ended the turn. If the turn had not yet
/// recorded any model output, the user entry is removed first so the
/// history is exactly as it was before the call.
#[allow(clippy::too_many_arguments)]
pub async fn run_turn(
    provider: &Provider,
    history: &mut Vec<ConversationEntry>,
    user_text: &str,
    tools: &ToolRegistry,
    ctx: &mut ToolContext,
    renderer: &mut dyn Renderer,
    options: &LoopOptions,
    interrupt: &Interrupt,
) -> Result<TurnOutcome> {
    let start_len = history.len();
    history.push(ConversationEntry::user_text(user_text));
    let specs = tools.specs();
    let mut texts: Vec<String> = Vec::new();

    // History length while nothing but the user entry is recorded.
    let untouched = start_len + 1;

    for round in 1..=options.max_rounds {
        if interrupt.is_triggered() {
            if history.len() == untouched {
                history.truncate(start_len);
            }
            renderer.render_notice("interrupted");
            return Ok(TurnOutcome::Interrupted { rounds: round - 1 });
        }

        let (output, end) = stream_round(provider, history, &specs, renderer, options, interrupt).await;
        match end {
            StreamEnd::Finished => {}
            StreamEnd::Interrupted => {
                // Partial text is kept; unanswered calls are not.
                if !output.text.is_empty() {
                    history.push(ConversationEntry::model_text(output.text));
                } else if history.len() == untouched {
                    history.truncate(start_len);
                }
                renderer.render_notice("interrupted");
                return Ok(TurnOutcome::Interrupted { rounds: round - 1 });
            }
            StreamEnd::Failed(e) => {
                if history.len() == untouched {
                    history.truncate(start_len);
                }
                tracing::warn!(round, error = %e, "turn failed");
                return Err(e.into());
            }
        }

        history.push(ConversationEntry::model(&output.text, output.calls.clone()));
        if !output.text.is_empty() {
            texts.push(output.text);
        }

        if output.calls.is_empty() {
            renderer.render_done();
            return Ok(TurnOutcome::Completed {
                rounds: round,
                text: texts.join("\n"),
            });
        }

        let mut responses = Vec::with_capacity(output.calls.len());
        for call in output.calls {
            renderer.render_tool_start(&call.name, &call.args);
            let result = tools
                .dispatch(&call.name, Value::Object(call.args.clone()), ctx)
                .await;
            renderer.render_tool_result(&call.name, &result);
            responses.push(FunctionResponse {
                name: call.name,
                id: call.id,
                result,
            });
        }
        history.push(ConversationEntry::responses(responses));
    }

    renderer.render_notice(&format!(
        "Max rounds ({}) reached. Send another message to continue.",
        options.max_rounds
    ));
    Ok(TurnOutcome::MaxRoundsReached {
        rounds: options.max_rounds,
    })
}
