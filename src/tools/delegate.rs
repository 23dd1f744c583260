//! Delegation of an isolated sub-task to a nested agent.

use anyhow::Result;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::spec::{ParamSpec, ParamType, ToolSpec};
use super::{Tool, ToolContext, ToolRegistry, ToolResult};

use crate::agent::{self, Interrupt, LoopOptions, TurnOutcome};
use crate::constants::DEFAULT_SUB_AGENT_MODEL;
use crate::message::Role;
use crate::output::{Renderer, SubAgentRenderer};
use crate::provider::{Provider, ProviderError};

/// Builds a provider for a model id chosen by the delegating model.
pub type ProviderFactory = Arc<dyn Fn(&str) -> Result<Provider, ProviderError> + Send + Sync>;

pub fn spec() -> ToolSpec {
    ToolSpec {
        name: "delegate_task",
        description: "Hand an isolated sub-task to a sub-agent with its own conversation. Returns the sub-agent's summary. Only available when the user has enabled handoff.",
        params: vec![
            ParamSpec::required("task", ParamType::String, "Complete, self-contained description of the task"),
            ParamSpec::optional("model", ParamType::String, "Model id for the sub-agent (default gemini-2.5-flash)"),
        ],
    }
}

/// Runs the agent loop recursively with a fresh history, the sub-agent
/// round cap and every tool except itself.
pub struct DelegateTool {
    factory: ProviderFactory,
    options: LoopOptions,
    interrupt: Interrupt,
}

impl DelegateTool {
    pub fn new(factory: ProviderFactory, options: LoopOptions, interrupt: Interrupt) -> Self {
        Self {
            factory,
            options,
            interrupt,
        }
    }
}

#[derive(Deserialize)]
struct DelegateInput {
    task: String,
    model: Option<String>,
}

fn sub_agent_prompt(task: &str) -> String {
    format!(
        "You are a sub-agent executing a delegated task. Focus entirely on completing this task, \
         and return a summary of results. The task is:\n\n{task}"
    )
}

#[async_trait::async_trait]
impl Tool for DelegateTool {
    fn spec(&self) -> ToolSpec {
        spec()
    }

    async fn execute(&self, input: Value, ctx: &mut ToolContext) -> Result<ToolResult> {
        let input: DelegateInput = serde_json::from_value(input)?;
        if !ctx.settings.handoff {
            return Ok(ToolResult::error(
                "Handoff is disabled. The user must type /handoff to enable it.",
            ));
        }

        let model = input.model.unwrap_or_else(|| DEFAULT_SUB_AGENT_MODEL.to_string());
        let provider = (self.factory)(&model)?;
        let tools = ToolRegistry::without_delegate();
        let options = LoopOptions {
            max_rounds: ctx.settings.sub_agent_max_rounds,
            ..self.options.clone()
        };

        let mut renderer = SubAgentRenderer::new(provider.model());
        renderer.render_notice(&format!("delegating to {}: {}", provider.model(), input.task));
        tracing::info!(model = %provider.model(), rounds = options.max_rounds, "sub-agent started");

        let mut history = Vec::new();
        let outcome = agent::run_turn(
            &provider,
            &mut history,
            &sub_agent_prompt(&input.task),
            &tools,
            ctx,
            &mut renderer,
            &options,
            &self.interrupt,
        )
        .await?;
        if let TurnOutcome::Interrupted { .. } = outcome {
            return Ok(ToolResult::error("Sub-agent interrupted."));
        }

        let response = history
            .iter()
            .filter(|e| e.role == Role::Model)
            .map(|e| e.text())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        Ok(ToolResult::success(json!({ "sub_agent_response": response })))
    }
}
