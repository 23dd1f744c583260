//! Per-session state threaded through every tool call.

use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::ToolResult;
use crate::constants::{PINNED_CAP, SHELL_HISTORY_CAP};
use crate::permissions::{normalize_path, PermissionGate};

/// Settings the tools consult at call time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToolSettings {
    pub safe_mode: bool,
    pub handoff: bool,
    pub sub_agent_max_rounds: u32,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            safe_mode: true,
            handoff: false,
            sub_agent_max_rounds: crate::constants::SUB_AGENT_MAX_ROUNDS_DEFAULT,
        }
    }
}

/// One `run_command` invocation, kept for `/stats`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShellRecord {
    pub time: String,
    pub cwd: String,
    pub command: String,
    pub exit_code: i32,
    pub elapsed_sec: f64,
    pub background: bool,
}

/// Counters and notes persisted with a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeStats {
    pub prompt_count: u64,
    pub tool_call_count: u64,
    pub tool_counts: BTreeMap<String, u64>,
    pub pinned: Vec<String>,
    pub last_prompt: String,
    pub last_response: String,
    #[serde(skip)]
    pub shell_history: VecDeque<ShellRecord>,
}

impl RuntimeStats {
    pub fn record_tool(&mut self, name: &str) {
        self.tool_call_count += 1;
        *self.tool_counts.entry(name.to_string()).or_default() += 1;
    }

    pub fn record_shell(&mut self, record: ShellRecord) {
        self.shell_history.push_back(record);
        while self.shell_history.len() > SHELL_HISTORY_CAP {
            self.shell_history.pop_front();
        }
    }

    /// Pins a note, dropping the oldest past the cap.
    pub fn pin(&mut self, note: &str) {
        self.pinned.push(note.to_string());
        let excess = self.pinned.len().saturating_sub(PINNED_CAP);
        self.pinned.drain(..excess);
    }
}

/// Explicit session context: current directory, gate, settings and stats.
///
/// Owned by the agent loop's caller and lent mutably to each tool in turn.
pub struct ToolContext {
    pub cwd: PathBuf,
    pub gate: PermissionGate,
    pub settings: ToolSettings,
    pub stats: RuntimeStats,
}

impl ToolContext {
    pub fn new(cwd: PathBuf, gate: PermissionGate, settings: ToolSettings) -> Self {
        let cwd = normalize_path(&cwd, &cwd);
        Self {
            cwd,
            gate,
            settings,
            stats: RuntimeStats::default(),
        }
    }

    /// Resolves a user-supplied path against the current directory.
    pub fn resolve(&self, raw: &str) -> PathBuf {
        normalize_path(Path::new(raw), &self.cwd)
    }

    /// Runs the permission gate; `Some` holds the failure to return.
    pub fn guard(&mut self, path: &Path, action: &str, for_write: bool) -> Option<ToolResult> {
        let decision = self.gate.authorize(path, action, for_write);
        (!decision.allowed).then(|| ToolResult::error(decision.reason))
    }
}

/// A context rooted at `root`, trusting only `root`, never prompting.
#[cfg(test)]
pub fn test_context(root: &Path) -> ToolContext {
    use crate::permissions::{NonInteractive, PermissionMode, PermissionState};

    let state = PermissionState {
        mode: PermissionMode::Prompt,
        trusted_roots: vec![root.to_path_buf()],
        allow_once: Vec::new(),
    };
    let gate = PermissionGate::in_memory(state, root, Box::new(NonInteractive));
    ToolContext::new(root.to_path_buf(), gate, ToolSettings::default())
}
