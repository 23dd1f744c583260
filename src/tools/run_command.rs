//! Shell command execution with a timeout, output cap and safe mode.

use anyhow::Result;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use super::spec::{ParamSpec, ParamType, ToolSpec};
use super::{ShellRecord, Tool, ToolContext, ToolResult};

use crate::constants::{
    COMMAND_DEFAULT_TIMEOUT_SECS, COMMAND_OUTPUT_CAP, COMMAND_OUTPUT_KEEP, COMMAND_STRIPPED_ENV_VARS,
    TRUNCATION_MARKER,
};

/// Tool that executes shell commands in the session's current directory.
///
/// Commands run with a timeout that hard-kills the child, provider API keys
/// stripped from the environment, and destructive patterns refused while
/// `safe_mode` is on.
pub struct RunCommandTool;

#[derive(Deserialize)]
struct RunCommandInput {
    command: String,
    timeout: Option<u64>,
    #[serde(default)]
    background: bool,
}

fn dangerous_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?ix)
            \brm\s+(-[a-z]*r[a-z]*f|-[a-z]*f[a-z]*r)\b
            | \bremove-item\b.*-recurse
            | \b(del|erase)\b.*\s/s\b
            | \brmdir\b.*\s/s\b
            | \bformat\s+[a-z]:
            | \bdiskpart\b
            | \bshutdown\b
            | \brestart-computer\b
            | \breg\s+delete\b
            | \bsc\s+delete\b
            | \btaskkill\b.*\s/f\b
            | \bmkfs(\.\w+)?\b
            | \bdd\s+if=
            ",
        )
        .expect("dangerous command pattern must compile")
    })
}

/// Whether `command` matches a destructive pattern blocked by safe mode.
pub fn is_dangerous(command: &str) -> bool {
    dangerous_pattern().is_match(command)
}

/// Keeps the head and tail of `output` when it exceeds the cap.
pub fn truncate_output(output: &str) -> String {
    if output.chars().count() <= COMMAND_OUTPUT_CAP {
        return output.to_string();
    }
    let head: String = output.chars().take(COMMAND_OUTPUT_KEEP).collect();
    let tail: Vec<char> = output.chars().rev().take(COMMAND_OUTPUT_KEEP).collect();
    let tail: String = tail.into_iter().rev().collect();
    format!("{head}{TRUNCATION_MARKER}{tail}")
}

fn shell_command(command: &str) -> tokio::process::Command {
    let mut cmd = if cfg!(windows) {
        let mut cmd = tokio::process::Command::new("powershell");
        cmd.args(["-NoLogo", "-NoProfile", "-NonInteractive", "-Command", command]);
        cmd
    } else {
        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-c").arg(command);
        cmd
    };
    for var in COMMAND_STRIPPED_ENV_VARS {
        cmd.env_remove(var);
    }
    cmd
}

fn failed(stderr: &str, exit_code: i32) -> ToolResult {
    ToolResult::failure(json!({
        "stdout": "",
        "stderr": stderr,
        "error": stderr,
        "exit_code": exit_code,
    }))
}

#[async_trait::async_trait]
impl Tool for RunCommandTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "run_command",
            description: "Run a shell command in the current working directory and return stdout, stderr and the exit code.",
            params: vec![
                ParamSpec::required("command", ParamType::String, "Shell command to execute"),
                ParamSpec::optional("timeout", ParamType::Integer, "Timeout in seconds (default 120)"),
                ParamSpec::optional(
                    "background",
                    ParamType::Boolean,
                    "Start detached and return immediately, for servers and long-running processes",
                ),
            ],
        }
    }

    async fn execute(&self, input: Value, ctx: &mut ToolContext) -> Result<ToolResult> {
        let input: RunCommandInput = serde_json::from_value(input)?;
        let cwd = ctx.cwd.clone();
        let mut record = ShellRecord {
            time: chrono::Local::now().to_rfc3339(),
            cwd: cwd.display().to_string(),
            command: input.command.clone(),
            exit_code: 0,
            elapsed_sec: 0.0,
            background: input.background,
        };

        let decision = ctx
            .gate
            .authorize(&cwd, "execute command in current directory", true);
        if !decision.allowed {
            return Ok(failed(&decision.reason, -3));
        }

        if ctx.settings.safe_mode && is_dangerous(&input.command) {
            tracing::warn!(command = %input.command, "command blocked by safe_mode");
            record.exit_code = -2;
            ctx.stats.record_shell(record);
            return Ok(failed(
                "Blocked by safe_mode. Disable via '/set safe_mode false' if intentional.",
                -2,
            ));
        }

        let mut cmd = shell_command(&input.command);
        cmd.current_dir(&cwd);

        if input.background {
            cmd.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null());
            return match cmd.spawn() {
                Ok(child) => {
                    tracing::debug!(pid = ?child.id(), "background command spawned");
                    ctx.stats.record_shell(record);
                    Ok(ToolResult::success(json!({
                        "stdout": "Spawned detached window successfully.",
                        "stderr": "",
                        "exit_code": 0,
                    })))
                }
                Err(e) => {
                    record.exit_code = -1;
                    ctx.stats.record_shell(record);
                    Ok(failed(&format!("Failed to execute command: {e}"), -1))
                }
            };
        }

        cmd.stdout(Stdio::piped()).stderr(Stdio::piped()).kill_on_drop(true);
        let child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => {
                record.exit_code = -1;
                ctx.stats.record_shell(record);
                return Ok(failed(&format!("Failed to execute command: {e}"), -1));
            }
        };

        let timeout_secs = input.timeout.unwrap_or(COMMAND_DEFAULT_TIMEOUT_SECS);
        let start = Instant::now();
        let result = tokio::time::timeout(Duration::from_secs(timeout_secs), child.wait_with_output()).await;
        record.elapsed_sec = start.elapsed().as_secs_f64();

        let outcome = match result {
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let stderr = String::from_utf8_lossy(&output.stderr);
                let code = output.status.code().unwrap_or(-1);
                record.exit_code = code;
                let data = json!({
                    "stdout": truncate_output(stdout.trim()),
                    "stderr": truncate_output(stderr.trim()),
                    "exit_code": code,
                });
                if code == 0 {
                    ToolResult::success(data)
                } else {
                    ToolResult::failure(data)
                }
            }
            Ok(Err(e)) => {
                record.exit_code = -1;
                failed(&format!("Failed to execute command: {e}"), -1)
            }
            Err(_) => {
                record.exit_code = -1;
                record.elapsed_sec = timeout_secs as f64;
                failed(&format!("Timed out after {timeout_secs}s"), -1)
            }
        };
        ctx.stats.record_shell(record);
        Ok(outcome)
    }
}
