//! Interactive chat REPL for gantry.
//!
//! Provides a multi-turn conversation loop using [`rustyline`] for readline
//! support (history, line editing). Each submitted line runs one agent turn
//! against the shared [`ChatSession`]; slash commands live in [`commands`].

mod commands;

use anyhow::Result;
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::collections::VecDeque;

use crate::agent::{self, TurnOutcome};
use crate::cli::{builtin_tools, loop_options, Runtime};
use crate::config::Config;
use crate::constants::UNDO_STACK_CAP;
use crate::format;
use crate::message::ConversationEntry;
use crate::output::{describe_error, Renderer, StdoutRenderer};
use crate::provider::ModelSelection;
use crate::session::{new_session_id, SessionDocument, SessionStore};

/// State of one interactive session.
pub(crate) struct ChatSession {
    rt: Runtime,
    history: Vec<ConversationEntry>,
    /// Snapshots taken before each history mutation, newest last.
    undo: VecDeque<Vec<ConversationEntry>>,
    store: SessionStore,
    session_id: String,
}

impl ChatSession {
    fn new(rt: Runtime, store: SessionStore) -> Self {
        Self {
            rt,
            history: Vec::new(),
            undo: VecDeque::new(),
            store,
            session_id: new_session_id(),
        }
    }

    /// `provider/model`, the form stored in session files.
    fn model_id(&self) -> String {
        format!("{}/{}", self.rt.provider.kind().name(), self.rt.provider.model())
    }

    fn push_undo(&mut self) {
        self.push_snapshot(self.history.clone());
    }

    /// Records `snapshot` as the newest undo point, dropping the oldest past the cap.
    fn push_snapshot(&mut self, snapshot: Vec<ConversationEntry>) {
        self.undo.push_back(snapshot);
        while self.undo.len() > UNDO_STACK_CAP {
            self.undo.pop_front();
        }
    }

    /// Switches the active provider and model.
    fn switch_model(&mut self, model_id: &str) -> Result<()> {
        let provider = (self.rt.factory)(model_id)?;
        self.rt.selection = ModelSelection {
            provider: provider.kind(),
            model: provider.model().to_string(),
        };
        self.rt.provider = provider;
        tracing::info!(model = %self.model_id(), "model switched");
        Ok(())
    }

    /// Re-derives tool settings and loop options after a settings change.
    ///
    /// The tools are rebuilt too, so sub-agents pick up the new options.
    fn apply_settings(&mut self) {
        self.rt.ctx.settings = self.rt.config.settings.tool_settings();
        self.rt.options = loop_options(&self.rt.config);
        self.rt.tools = builtin_tools(&self.rt.factory, &self.rt.options, &self.rt.interrupt);
    }

    /// Replaces the live session with a saved document.
    fn restore(&mut self, doc: SessionDocument) {
        if !doc.session_id.is_empty() {
            self.session_id = doc.session_id.clone();
        }
        let restored = doc.restore(&mut self.history, &mut self.rt.ctx);
        if let Some(model_id) = restored.model_id.filter(|m| *m != self.model_id()) {
            if let Err(e) = self.switch_model(&model_id) {
                eprintln!(
                    "{} could not restore model {}: {}",
                    "warning:".yellow().bold(),
                    model_id,
                    describe_error(&e)
                );
            }
        }
        if restored.cwd_restored == Some(false) {
            eprintln!(
                "{} saved working directory was not restored; staying in {}",
                "warning:".yellow().bold(),
                self.rt.ctx.cwd.display()
            );
        }
        println!(
            "{} {} entries [model: {}] [cwd: {}]",
            "restored".bold().cyan(),
            restored.entries,
            self.model_id().yellow(),
            self.rt.ctx.cwd.display()
        );
    }

    fn autosave(&self) {
        if !self.rt.config.settings.auto_save_session {
            return;
        }
        let doc = SessionDocument::capture(&self.session_id, &self.model_id(), &self.history, &self.rt.ctx);
        // Detached: the handle is dropped on purpose.
        let _ = self.store.autosave(&doc);
    }

    /// Runs one operator prompt through the agent loop.
    async fn submit(&mut self, line: &str) {
        self.push_undo();
        let before = self.history.len();
        self.rt.interrupt.reset();
        self.rt.ctx.stats.prompt_count += 1;
        self.rt.ctx.stats.last_prompt = line.to_string();

        let mut renderer = StdoutRenderer::new();
        let outcome = agent::run_turn(
            &self.rt.provider,
            &mut self.history,
            line,
            &self.rt.tools,
            &mut self.rt.ctx,
            &mut renderer,
            &self.rt.options,
            &self.rt.interrupt,
        )
        .await;

        match outcome {
            Ok(TurnOutcome::Completed { rounds, text }) => {
                tracing::debug!(rounds, "turn completed");
                self.rt.ctx.stats.last_response = text;
            }
            Ok(TurnOutcome::MaxRoundsReached { .. }) | Ok(TurnOutcome::Interrupted { .. }) => {}
            Err(e) => renderer.render_error(&describe_error(&e)),
        }

        // A rolled-back turn leaves nothing to undo.
        if self.history.len() == before {
            self.undo.pop_back();
        }
        self.autosave();
    }
}

/// Runs the interactive chat REPL.
///
/// # Readline behavior
///
/// - **Ctrl+C** at the prompt: cancels current input, stays in REPL
/// - **Ctrl+C** during a turn: interrupts the turn, keeping any partial text
/// - **Ctrl+D**: exits cleanly with "goodbye."
/// - Readline history is persisted to `~/.cache/gantry/chat_history.txt`
pub async fn run_chat(rt: Runtime, resume: Option<String>) -> Result<()> {
    let store = SessionStore::open()?;
    let mut chat = ChatSession::new(rt, store);

    if let Some(name) = resume {
        let doc = chat.store.load(&name)?;
        chat.restore(doc);
        for entry in &chat.history {
            println!("{}", format::format_entry(entry));
        }
        println!();
    }

    println!(
        "{} [model: {}] [cwd: {}] (/help for commands, Ctrl+D to exit)",
        "gantry chat".bold().cyan(),
        chat.model_id().yellow(),
        chat.rt.ctx.cwd.display(),
    );
    println!();

    chat.rt.interrupt.listen_ctrl_c();

    let mut rl = DefaultEditor::new()?;
    let history_path = Config::history_path()?;
    if history_path.exists() {
        let _ = rl.load_history(&history_path);
    }

    loop {
        match rl.readline(&format!("{} ", ">".green().bold())) {
            Ok(line) => {
                let line = line.trim().to_string();
                if line.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(&line);

                if line.starts_with('/') {
                    match commands::handle_slash_command(&line, &mut chat).await {
                        commands::CommandAction::Continue => {}
                        commands::CommandAction::Exit => break,
                        commands::CommandAction::Unknown(cmd) => {
                            println!("{} Unknown command: {} (try /help)", "?".yellow(), cmd);
                        }
                    }
                    continue;
                }

                println!();
                chat.submit(&line).await;
                println!();
            }
            Err(ReadlineError::Interrupted) => {
                println!("{}", "^C".dimmed());
            }
            Err(ReadlineError::Eof) => {
                println!("{}", "goodbye.".dimmed());
                break;
            }
            Err(e) => {
                eprintln!("{} {}", "error:".red().bold(), e);
                break;
            }
        }
    }

    if let Some(parent) = history_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let _ = rl.save_history(&history_path);
    Ok(())
}

#[cfg(test)]
pub(crate) fn test_session(
    root: &std::path::Path,
    steps: Vec<crate::provider::scripted::Step>,
) -> (ChatSession, std::sync::Arc<crate::provider::scripted::ScriptedAdapter>) {
    use crate::agent::Interrupt;
    use crate::provider::scripted::ScriptedAdapter;
    use crate::provider::ProviderError;
    use crate::tools::delegate::ProviderFactory;
    use crate::tools::ToolRegistry;
    use std::sync::Arc;

    let adapter = ScriptedAdapter::new(steps);
    let provider = adapter.provider();
    let shared = provider.clone();
    let factory: ProviderFactory = Arc::new(move |_model: &str| Ok::<_, ProviderError>(shared.clone()));
    let config = Config::default();
    let options = loop_options(&config);
    let rt = Runtime {
        selection: ModelSelection {
            provider: provider.kind(),
            model: provider.model().to_string(),
        },
        config,
        provider,
        factory,
        tools: ToolRegistry::without_delegate(),
        ctx: crate::tools::context::test_context(root),
        options,
        interrupt: Interrupt::new(),
    };
    (ChatSession::new(rt, SessionStore::at(root.join("sessions"))), adapter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::AUTOSAVE_SESSION_NAME;
    use crate::provider::scripted::Step;
    use crate::provider::ProviderError;

    #[tokio::test]
    async fn test_submit_records_stats_and_autosaves() {
        let dir = tempfile::tempdir().unwrap();
        let (mut chat, _) = test_session(dir.path(), vec![Step::text("All done.")]);

        chat.submit("tidy up").await;
        assert_eq!(chat.history.len(), 2);
        assert_eq!(chat.rt.ctx.stats.prompt_count, 1);
        assert_eq!(chat.rt.ctx.stats.last_prompt, "tidy up");
        assert_eq!(chat.rt.ctx.stats.last_response, "All done.");
        assert_eq!(chat.undo.len(), 1);
        assert!(chat.undo[0].is_empty());

        // Autosave runs on a detached thread; wait for the file to appear.
        let path = chat.store.path_for(AUTOSAVE_SESSION_NAME);
        for _ in 0..100 {
            if path.exists() {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_failed_submit_leaves_nothing_to_undo() {
        let dir = tempfile::tempdir().unwrap();
        let (mut chat, _) = test_session(
            dir.path(),
            vec![Step::Reject(ProviderError::Auth {
                status: 401,
                message: "bad key".into(),
            })],
        );
        chat.submit("hello").await;
        assert!(chat.history.is_empty());
        assert!(chat.undo.is_empty());
    }

    #[tokio::test]
    async fn test_settings_change_reaches_sub_agents() {
        use crate::provider::scripted::call;
        use serde_json::json;

        let dir = tempfile::tempdir().unwrap();
        let (mut chat, adapter) = test_session(
            dir.path(),
            vec![
                Step::calls(vec![call("delegate_task", "d1", json!({"task": "count files"}))]),
                Step::text("sub-agent finished"),
                Step::text("main finished"),
            ],
        );
        chat.rt.config.settings.set("handoff", "on").unwrap();
        chat.rt.config.settings.set("temperature", "0.3").unwrap();
        chat.apply_settings();

        chat.submit("delegate it").await;
        let requests = adapter.requests();
        assert_eq!(requests.len(), 3);
        // The middle request came from the sub-agent.
        assert!(requests[1].tools.iter().all(|t| t.name != "delegate_task"));
        assert_eq!(requests[1].temperature, 0.3);
        assert_eq!(chat.rt.ctx.stats.last_response, "main finished");
    }

    #[test]
    fn test_undo_stack_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let (mut chat, _) = test_session(dir.path(), vec![]);
        for _ in 0..UNDO_STACK_CAP + 5 {
            chat.push_undo();
        }
        assert_eq!(chat.undo.len(), UNDO_STACK_CAP);
    }
}
