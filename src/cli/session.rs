//! Session management CLI operations for gantry.
//!
//! Handles listing and deleting saved sessions through the `gantry session`
//! subcommand family. Resuming goes through `gantry chat --session <name>`.

use anyhow::Result;
use colored::Colorize;

use super::SessionAction;
use crate::session::{sanitize_name, SessionMeta, SessionStore};

/// Dispatches a session subcommand to its handler.
pub(crate) fn handle_session(action: &SessionAction) -> Result<()> {
    let store = SessionStore::open()?;
    match action {
        SessionAction::List => session_list(&store),
        SessionAction::Delete { name } => session_delete(&store, name),
    }
}

/// Formats an RFC 3339 timestamp as `YYYY-MM-DD HH:MM`.
fn short_time(saved_at: &str) -> String {
    chrono::DateTime::parse_from_rfc3339(saved_at)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|_| saved_at.chars().take(16).collect())
}

/// Lists saved sessions in a table sized to the terminal.
fn session_list(store: &SessionStore) -> Result<()> {
    let sessions = store.list()?;
    if sessions.is_empty() {
        println!("{}", format!("No sessions in {}.", store.dir().display()).dimmed());
        println!("Save one from chat with: {}", "/save <name>".cyan());
        return Ok(());
    }

    let term_width = terminal_size::terminal_size()
        .map(|(w, _)| w.0 as usize)
        .unwrap_or(80);

    // ENTRIES=8, SAVED=18, MODEL~20
    let fixed_cols = 8 + 18 + 20;
    let max_name_len = sessions.iter().map(|s| s.name.chars().count()).max().unwrap_or(4);
    let name_width = max_name_len.max(4).min(term_width.saturating_sub(fixed_cols).clamp(8, 40));

    println!(
        "{} {} {} {}",
        format!("{:<nw$}", "NAME", nw = name_width + 2).bold(),
        format!("{:<8}", "ENTRIES").bold(),
        format!("{:<18}", "SAVED").bold(),
        "MODEL".bold(),
    );
    println!("{}", "-".repeat(term_width.min(name_width + 2 + fixed_cols)));

    for s in &sessions {
        println!("{}", format_row(s, name_width));
    }
    println!();
    println!(
        "{} {} sessions. Resume with: {}",
        "total:".dimmed(),
        sessions.len(),
        "gantry chat --session <name>".cyan()
    );
    Ok(())
}

fn format_row(s: &SessionMeta, name_width: usize) -> String {
    let name = if s.name.chars().count() > name_width {
        let truncated: String = s.name.chars().take(name_width.saturating_sub(3)).collect();
        format!("{truncated}...")
    } else {
        s.name.clone()
    };
    // Pad first, then colorize so ANSI codes don't skew the columns.
    let name_col = format!("{:<nw$}", name, nw = name_width + 2);
    let entries_col = format!("{:<8}", s.entries);
    let saved_col = format!("{:<18}", short_time(&s.saved_at));
    format!(
        "{} {} {} {}",
        name_col.cyan(),
        entries_col.yellow(),
        saved_col.dimmed(),
        s.model_id.dimmed()
    )
}

fn session_delete(store: &SessionStore, name: &str) -> Result<()> {
    if store.delete(name)? {
        println!("{} {}", "Deleted session".green(), sanitize_name(name).cyan());
        Ok(())
    } else {
        anyhow::bail!("Session '{}' not found", sanitize_name(name))
    }
}
