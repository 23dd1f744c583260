//! `gantry perm`: inspect and edit the permission state file.

use anyhow::Result;
use colored::Colorize;
use std::path::Path;

use super::PermAction;
use crate::config::Config;
use crate::permissions::{NonInteractive, PermissionGate, PermissionMode, PermissionState};

/// Dispatches a permission subcommand to its handler.
pub(crate) fn handle_perm(action: &PermAction) -> Result<()> {
    let cwd = std::env::current_dir()?;
    let mut gate = PermissionGate::load(Config::permissions_path()?, &cwd, Box::new(NonInteractive))?;
    match action {
        PermAction::Show => print_state(gate.state()),
        PermAction::Trust { path } => {
            let root = gate.trust(Path::new(path), &cwd)?;
            println!("{} {}", "Trusted".green(), root.display());
        }
        PermAction::Untrust { path } => {
            if gate.untrust(Path::new(path), &cwd)? {
                println!("{} {}", "Untrusted".green(), path);
            } else {
                println!("{}", format!("{path} was not a trusted root.").dimmed());
            }
        }
        PermAction::Mode { mode } => {
            let mode = PermissionMode::from_str(mode)?;
            gate.set_mode(mode)?;
            println!("{} {}", "Permission mode:".bold(), mode);
        }
        PermAction::ClearOnce => {
            let cleared = gate.clear_once()?;
            println!("{} {} allow-once scopes", "Cleared".green(), cleared);
        }
    }
    Ok(())
}

fn print_state(state: &PermissionState) {
    println!("{} {}", "mode:".bold(), state.mode.to_string().yellow());
    println!("{}", "trusted roots:".bold());
    for root in &state.trusted_roots {
        println!("  {}", root.display().to_string().cyan());
    }
    if state.allow_once.is_empty() {
        println!("{} {}", "allow-once:".bold(), "(none)".dimmed());
    } else {
        println!("{}", "allow-once:".bold());
        for scope in &state.allow_once {
            println!("  {}", scope.display());
        }
    }
}
