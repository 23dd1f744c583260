//! Slash command handlers for the chat REPL.
//!
//! Returns a [`CommandAction`] so the REPL loop can decide how to proceed.
//! Command failures are printed here and never end the session.

use anyhow::Result;
use colored::Colorize;

use super::ChatSession;
use crate::compaction::{self, CompactionResult};
use crate::config::SETTING_KEYS;
use crate::format;
use crate::output::describe_error;
use crate::session::SessionDocument;

/// Action returned by slash command handling.
#[derive(Debug, PartialEq)]
pub(crate) enum CommandAction {
    /// Command was handled; continue the REPL loop.
    Continue,
    /// Leave the REPL.
    Exit,
    /// Unknown command was entered.
    Unknown(String),
}

/// Shell commands shown by `/stats`.
const STATS_SHELL_TAIL: usize = 5;

fn print_help() {
    let rows = [
        ("/help", "show this help"),
        ("/history", "show the conversation"),
        ("/clear", "clear the conversation"),
        ("/undo", "restore the conversation from before the last change"),
        ("/save <name>", "save the session"),
        ("/load <name>", "load a saved session"),
        ("/model [id]", "show or switch the model (provider/model shorthand works)"),
        ("/handoff [on|off]", "allow or forbid delegate_task"),
        ("/compact", "summarize older context"),
        ("/stats", "show session counters"),
        ("/pin [text]", "pin a note, or list pinned notes"),
        ("/set <key> <value>", "change a setting for this session"),
        ("/exit", "leave (or Ctrl+D)"),
    ];
    println!("{}", "Commands:".bold());
    for (cmd, text) in rows {
        println!("  {} {}", format!("{cmd:<20}").cyan(), text);
    }
}

/// Dispatch and handle a slash command.
pub(crate) async fn handle_slash_command(line: &str, chat: &mut ChatSession) -> CommandAction {
    let (command, arg) = match line.split_once(char::is_whitespace) {
        Some((command, arg)) => (command, arg.trim()),
        None => (line, ""),
    };

    let result = match command {
        "/help" => {
            print_help();
            Ok(())
        }
        "/exit" | "/quit" => return CommandAction::Exit,
        "/history" => {
            show_history(chat);
            Ok(())
        }
        "/clear" => {
            chat.push_undo();
            chat.history.clear();
            println!("{}", "History cleared.".dimmed());
            Ok(())
        }
        "/undo" => {
            match chat.undo.pop_back() {
                Some(snapshot) => {
                    chat.history = snapshot;
                    println!("{}", format!("Restored {} entries.", chat.history.len()).dimmed());
                }
                None => println!("{}", "Nothing to undo.".dimmed()),
            }
            Ok(())
        }
        "/save" => save(chat, arg),
        "/load" => load(chat, arg),
        "/model" => model(chat, arg),
        "/handoff" => handoff(chat, arg),
        "/compact" => compact(chat).await,
        "/stats" => {
            show_stats(chat);
            Ok(())
        }
        "/pin" => {
            pin(chat, arg);
            Ok(())
        }
        "/set" => set(chat, arg),
        _ => return CommandAction::Unknown(command.to_string()),
    };

    if let Err(e) = result {
        eprintln!("{} {}", "error:".red().bold(), describe_error(&e));
    }
    CommandAction::Continue
}

fn show_history(chat: &ChatSession) {
    if chat.history.is_empty() {
        println!("{}", "No history yet.".dimmed());
        return;
    }
    for entry in &chat.history {
        println!("{}", format::format_entry(entry));
    }
}

fn save(chat: &ChatSession, name: &str) -> Result<()> {
    let name = if name.is_empty() { chat.session_id.as_str() } else { name };
    let doc = SessionDocument::capture(&chat.session_id, &chat.model_id(), &chat.history, &chat.rt.ctx);
    let path = chat.store.save(name, &doc)?;
    println!("{} {}", "Saved".green(), path.display());
    Ok(())
}

fn load(chat: &mut ChatSession, name: &str) -> Result<()> {
    anyhow::ensure!(!name.is_empty(), "Usage: /load <name>");
    let doc = chat.store.load(name)?;
    chat.push_undo();
    chat.restore(doc);
    Ok(())
}

fn model(chat: &mut ChatSession, model_id: &str) -> Result<()> {
    if model_id.is_empty() {
        println!("{} {}", "model:".bold(), chat.model_id().yellow());
        return Ok(());
    }
    chat.switch_model(model_id)?;
    println!("{} {}", "Switched to".green(), chat.model_id().yellow());
    Ok(())
}

fn handoff(chat: &mut ChatSession, arg: &str) -> Result<()> {
    if !arg.is_empty() {
        chat.rt.config.settings.set("handoff", arg)?;
        chat.apply_settings();
    }
    let state = if chat.rt.ctx.settings.handoff { "on".green() } else { "off".red() };
    println!("{} {}", "handoff:".bold(), state);
    Ok(())
}

async fn compact(chat: &mut ChatSession) -> Result<()> {
    let snapshot = chat.history.clone();
    let result = compaction::compact(
        &mut chat.history,
        &chat.rt.provider,
        chat.rt.config.compaction_keep_recent(),
        chat.rt.options.temperature,
    )
    .await?;
    match result {
        CompactionResult::NothingToCompact => println!("{}", "Nothing to compact.".dimmed()),
        CompactionResult::Compacted {
            entries_removed,
            entries_kept,
        } => {
            chat.push_snapshot(snapshot);
            println!(
                "{}",
                format!("Compacted {entries_removed} entries into a summary; kept {entries_kept}.").dimmed()
            );
            chat.autosave();
        }
    }
    Ok(())
}

fn show_stats(chat: &ChatSession) {
    let stats = &chat.rt.ctx.stats;
    println!("{} {}", "session:".bold(), chat.session_id);
    println!("{} {}", "model:".bold(), chat.model_id().yellow());
    println!("{} {}", "cwd:".bold(), chat.rt.ctx.cwd.display());
    println!("{} {}", "entries:".bold(), chat.history.len());
    println!("{} {}", "prompts:".bold(), stats.prompt_count);
    println!("{} {}", "tool calls:".bold(), stats.tool_call_count);
    for (tool, count) in &stats.tool_counts {
        println!("  {} {}", format!("{tool:<18}").cyan(), count);
    }
    println!("{} {}", "pinned:".bold(), stats.pinned.len());
    let skip = stats.shell_history.len().saturating_sub(STATS_SHELL_TAIL);
    for record in stats.shell_history.iter().skip(skip) {
        println!(
            "  {} {} {}",
            format!("[{}]", record.exit_code).dimmed(),
            record.command,
            format!("({:.1}s)", record.elapsed_sec).dimmed()
        );
    }
}

fn pin(chat: &mut ChatSession, note: &str) {
    if note.is_empty() {
        if chat.rt.ctx.stats.pinned.is_empty() {
            println!("{}", "Nothing pinned.".dimmed());
        }
        for (i, note) in chat.rt.ctx.stats.pinned.iter().enumerate() {
            println!("  {} {}", format!("{}.", i + 1).dimmed(), note);
        }
        return;
    }
    chat.rt.ctx.stats.pin(note);
    println!("{}", "Pinned.".dimmed());
}

fn set(chat: &mut ChatSession, arg: &str) -> Result<()> {
    let Some((key, value)) = arg.split_once(char::is_whitespace) else {
        anyhow::bail!("Usage: /set <key> <value>. Keys: {}", SETTING_KEYS.join(", "));
    };
    let stored = chat.rt.config.settings.set(key, value.trim())?;
    chat.apply_settings();
    println!(
        "{} {} = {} {}",
        "set".green(),
        key.bold(),
        stored,
        "(this session; `gantry config set` persists it)".dimmed()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::test_session;
    use crate::constants::UNDO_STACK_CAP;
    use crate::message::ConversationEntry;
    use crate::provider::scripted::Step;

    #[tokio::test]
    async fn test_clear_then_undo() {
        let dir = tempfile::tempdir().unwrap();
        let (mut chat, _) = test_session(dir.path(), vec![]);
        chat.history.push(ConversationEntry::user_text("hello"));
        chat.history.push(ConversationEntry::model_text("hi"));

        assert_eq!(handle_slash_command("/clear", &mut chat).await, CommandAction::Continue);
        assert!(chat.history.is_empty());
        handle_slash_command("/undo", &mut chat).await;
        assert_eq!(chat.history.len(), 2);
        // Stack is empty now; a second undo is a no-op.
        handle_slash_command("/undo", &mut chat).await;
        assert_eq!(chat.history.len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_and_exit() {
        let dir = tempfile::tempdir().unwrap();
        let (mut chat, _) = test_session(dir.path(), vec![]);
        assert_eq!(
            handle_slash_command("/frobnicate now", &mut chat).await,
            CommandAction::Unknown("/frobnicate".into())
        );
        assert_eq!(handle_slash_command("/exit", &mut chat).await, CommandAction::Exit);
    }

    #[tokio::test]
    async fn test_set_and_handoff_update_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let (mut chat, _) = test_session(dir.path(), vec![]);

        handle_slash_command("/set max_rounds 42", &mut chat).await;
        assert_eq!(chat.rt.options.max_rounds, 42);
        handle_slash_command("/set safe_mode off", &mut chat).await;
        assert!(!chat.rt.ctx.settings.safe_mode);
        // Out of range: rejected, previous value kept.
        handle_slash_command("/set max_rounds 9000", &mut chat).await;
        assert_eq!(chat.rt.options.max_rounds, 42);

        assert!(!chat.rt.ctx.settings.handoff);
        handle_slash_command("/handoff on", &mut chat).await;
        assert!(chat.rt.ctx.settings.handoff);
        handle_slash_command("/handoff off", &mut chat).await;
        assert!(!chat.rt.ctx.settings.handoff);
    }

    #[tokio::test]
    async fn test_pin_and_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let (mut chat, _) = test_session(dir.path(), vec![]);
        handle_slash_command("/pin remember the tests", &mut chat).await;
        assert_eq!(chat.rt.ctx.stats.pinned, vec!["remember the tests".to_string()]);

        chat.history.push(ConversationEntry::user_text("saved prompt"));
        handle_slash_command("/save work", &mut chat).await;
        assert!(chat.store.path_for("work").exists());

        handle_slash_command("/clear", &mut chat).await;
        chat.rt.ctx.stats.pinned.clear();
        handle_slash_command("/load work", &mut chat).await;
        assert_eq!(chat.history, vec![ConversationEntry::user_text("saved prompt")]);
        assert_eq!(chat.rt.ctx.stats.pinned.len(), 1);
    }

    #[tokio::test]
    async fn test_compact_is_undoable() {
        let dir = tempfile::tempdir().unwrap();
        let (mut chat, adapter) = test_session(dir.path(), vec![Step::text("earlier work summarized")]);
        for i in 0..4 {
            chat.history.push(ConversationEntry::user_text(format!("prompt {i}")));
            chat.history.push(ConversationEntry::model_text(format!("answer {i}")));
        }
        handle_slash_command("/compact", &mut chat).await;
        assert_eq!(adapter.remaining(), 0);
        assert_eq!(chat.history.len(), 6);
        assert!(chat.history[0].text().contains("earlier work summarized"));

        handle_slash_command("/undo", &mut chat).await;
        assert_eq!(chat.history.len(), 8);
    }

    #[tokio::test]
    async fn test_compact_respects_undo_cap() {
        let dir = tempfile::tempdir().unwrap();
        let (mut chat, _) = test_session(dir.path(), vec![Step::text("summary")]);
        for i in 0..4 {
            chat.history.push(ConversationEntry::user_text(format!("prompt {i}")));
            chat.history.push(ConversationEntry::model_text(format!("answer {i}")));
        }
        for _ in 0..UNDO_STACK_CAP {
            chat.push_undo();
        }
        handle_slash_command("/compact", &mut chat).await;
        assert_eq!(chat.history.len(), 6);
        assert_eq!(chat.undo.len(), UNDO_STACK_CAP);
        assert_eq!(chat.undo.back().map(Vec::len), Some(8));
    }
}
