//! Entry point for gantry, an autonomous coding agent for the terminal.
//!
//! This binary loads environment variables, initialises logging, parses CLI
//! arguments via [`cli`], and dispatches to the appropriate subcommand
//! handler.

mod agent;
mod chat;
mod cli;
mod compaction;
mod config;
mod constants;
mod format;
mod message;
mod output;
mod permissions;
mod provider;
mod retry;
mod session;
mod tools;

use colored::Colorize;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Logs go to stderr so they never interleave with streamed model text.
fn init_tracing() {
    let filter = EnvFilter::try_from_env(constants::LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Runs the gantry CLI.
///
/// Loads `.env` files (silently ignored if absent), parses command-line
/// arguments into a [`cli::Cli`] struct, and dispatches the chosen
/// subcommand via [`cli::run`].
#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_tracing();
    let cli = cli::parse();
    match cli::run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), output::describe_error(&e));
            ExitCode::FAILURE
        }
    }
}
