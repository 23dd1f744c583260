//! Command-line interface definition and dispatch for gantry.
//!
//! Uses [`clap`] for argument parsing with derive macros. Each subcommand is
//! routed to its handler: session operations live in the [`session`]
//! submodule and permission management in [`perm`].

mod perm;
mod session;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::sync::Arc;

use crate::agent::{self, Interrupt, LoopOptions, TurnOutcome};
use crate::chat;
use crate::config::Config;
use crate::constants::DEFAULT_SYSTEM_PROMPT;
use crate::output::StdoutRenderer;
use crate::permissions::{NonInteractive, PermissionGate, Prompter, StdinPrompter};
use crate::provider::{self, ModelSelection, Provider};
use crate::retry::{ConsoleRetryHooks, RetryPolicy};
use crate::tools::delegate::{DelegateTool, ProviderFactory};
use crate::tools::{ToolContext, ToolRegistry};

/// Top-level CLI structure for gantry.
///
/// Parsed from command-line arguments via [`clap::Parser`]. `--provider` and
/// `--model` are global so they can follow any subcommand.
#[derive(Parser)]
#[command(name = "gantry", version, about = "An autonomous coding agent for the terminal")]
pub struct Cli {
    /// Provider to use (gemini, openai, anthropic, ollama, openrouter)
    #[arg(long, global = true)]
    pub provider: Option<String>,
    /// Model to use (overrides config; accepts provider/model shorthand)
    #[arg(short, long, global = true)]
    pub model: Option<String>,
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands for the gantry CLI.
///
/// The `///` doc comments on variants double as `--help` text rendered by clap.
#[derive(Subcommand)]
pub enum Commands {
    /// Run one prompt to completion without interactive permission prompts
    Ask {
        /// The prompt
        prompt: Vec<String>,
    },
    /// Start an interactive chat session
    Chat {
        /// Resume a saved session by name
        #[arg(short, long)]
        session: Option<String>,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Manage saved sessions
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },
    /// Manage filesystem permissions
    Perm {
        #[command(subcommand)]
        action: PermAction,
    },
}

/// Subcommands for the `config` command.
///
/// Controls reading and writing gantry's TOML configuration file
/// stored at the XDG config path (`~/.config/gantry/config.toml`).
#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show the effective config with API keys masked
    Show,
    /// Set a config value (model, default_provider, system_prompt, or a setting)
    Set { key: String, value: String },
}

/// Subcommands for the `session` command.
#[derive(Subcommand)]
pub enum SessionAction {
    /// List saved sessions
    List,
    /// Delete a saved session by name
    Delete { name: String },
}

/// Subcommands for the `perm` command.
#[derive(Subcommand)]
pub enum PermAction {
    /// Show the permission mode, trusted roots and allow-once scopes
    Show,
    /// Trust a directory and everything below it
    Trust { path: String },
    /// Remove a trusted directory
    Untrust { path: String },
    /// Set the permission mode (prompt or allow-all)
    Mode { mode: String },
    /// Forget every allow-once scope
    ClearOnce,
}

/// Parses command-line arguments into a [`Cli`] struct.
pub fn parse() -> Cli {
    Cli::parse()
}

/// Everything a turn needs, built once per process.
pub(crate) struct Runtime {
    pub config: Config,
    pub selection: ModelSelection,
    pub provider: Provider,
    pub factory: ProviderFactory,
    pub tools: ToolRegistry,
    pub ctx: ToolContext,
    pub options: LoopOptions,
    pub interrupt: Interrupt,
}

/// Loop options derived from the `[settings]` table.
pub(crate) fn loop_options(config: &Config) -> LoopOptions {
    let system_prompt = config
        .system_prompt
        .clone()
        .filter(|p| !p.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());
    LoopOptions {
        system_prompt,
        max_rounds: config.settings.max_rounds,
        temperature: config.settings.temperature,
        retry: RetryPolicy::with_max_attempts(config.settings.max_retry_attempts),
        hooks: Arc::new(ConsoleRetryHooks),
    }
}

/// Every built-in tool, with a delegate that runs sub-agents under `options`.
pub(crate) fn builtin_tools(factory: &ProviderFactory, options: &LoopOptions, interrupt: &Interrupt) -> ToolRegistry {
    ToolRegistry::with_builtins(DelegateTool::new(
        Arc::clone(factory),
        options.clone(),
        interrupt.clone(),
    ))
}

impl Runtime {
    /// Resolves the model, builds the provider and opens the permission gate.
    ///
    /// # Errors
    ///
    /// Fails when the provider client cannot be constructed (for example a
    /// missing API key) or the permission state cannot be read.
    pub(crate) fn build(cli: &Cli, config: Config, prompter: Box<dyn Prompter>) -> Result<Self> {
        let selection = provider::resolve_model(cli.provider.as_deref(), cli.model.as_deref(), &config)?;
        let provider = Provider::from_config(&config, &selection)?;

        let factory_config = config.clone();
        let factory: ProviderFactory = Arc::new(move |model: &str| {
            Provider::from_config(&factory_config, &ModelSelection::from_model_id(model))
        });

        let cwd = std::env::current_dir()?;
        let gate = PermissionGate::load(Config::permissions_path()?, &cwd, prompter)?;
        let ctx = ToolContext::new(cwd, gate, config.settings.tool_settings());

        let options = loop_options(&config);
        let interrupt = Interrupt::new();
        let tools = builtin_tools(&factory, &options, &interrupt);

        tracing::info!(provider = %selection.provider, model = %selection.model, "runtime ready");
        Ok(Self {
            config,
            selection,
            provider,
            factory,
            tools,
            ctx,
            options,
            interrupt,
        })
    }
}

/// Dispatches the parsed CLI command to its handler.
pub async fn run(cli: Cli) -> Result<()> {
    Config::ensure_dirs()?;
    match &cli.command {
        Commands::Ask { prompt } => {
            let prompt = prompt.join(" ");
            if prompt.trim().is_empty() {
                anyhow::bail!("No prompt provided. Usage: gantry ask \"your request here\"");
            }
            let config = Config::load()?;
            let runtime = Runtime::build(&cli, config, Box::new(NonInteractive))?;
            run_ask(runtime, &prompt).await
        }
        Commands::Chat { session } => {
            let config = Config::load()?;
            let runtime = Runtime::build(&cli, config, Box::new(StdinPrompter))?;
            chat::run_chat(runtime, session.clone()).await
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let config = Config::load()?;
                let path = Config::config_path()?;
                println!("{} {}", "Config path:".bold(), path.display());
                println!();
                println!("{}", config.render_masked()?);
                Ok(())
            }
            ConfigAction::Set { key, value } => {
                let stored = Config::set_value(key, value)?;
                println!("{} {} = {}", "set".green(), key.bold(), stored);
                Ok(())
            }
        },
        Commands::Session { action } => session::handle_session(action),
        Commands::Perm { action } => perm::handle_perm(action),
    }
}

/// One-shot prompt: a single turn with a non-interactive gate.
async fn run_ask(mut runtime: Runtime, prompt: &str) -> Result<()> {
    println!(
        "{} [model: {}]",
        "gantry".bold().cyan(),
        runtime.selection.model.yellow(),
    );
    println!();

    runtime.interrupt.listen_ctrl_c();
    let mut history = Vec::new();
    let mut renderer = StdoutRenderer::new();
    let outcome = agent::run_turn(
        &runtime.provider,
        &mut history,
        prompt,
        &runtime.tools,
        &mut runtime.ctx,
        &mut renderer,
        &runtime.options,
        &runtime.interrupt,
    )
    .await;

    match outcome {
        Ok(TurnOutcome::Completed { rounds, .. }) => {
            tracing::debug!(rounds, "ask completed");
            Ok(())
        }
        Ok(TurnOutcome::MaxRoundsReached { .. }) => Ok(()),
        Ok(TurnOutcome::Interrupted { .. }) => anyhow::bail!("Interrupted"),
        Err(e) => Err(e),
    }
}
