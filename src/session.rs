//! Session persistence for gantry.
//!
//! A session is one JSON document under `~/.local/share/gantry/sessions/`,
//! named by the operator (`/save <name>`) or rewritten after every turn as
//! `autosave_latest.json`. Documents are written atomically and loaded
//! leniently: missing fields fall back to defaults and unknown fields are
//! ignored, but a `history` that is not a list is rejected.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::thread::JoinHandle;

use anyhow::{bail, Context, Result};
use chrono::Local;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::config::Config;
use crate::constants::{AUTOSAVE_SESSION_NAME, SESSION_FORMAT_VERSION, SESSION_NAME_MAX_LEN};
use crate::message::ConversationEntry;
use crate::permissions::{normalize_path, write_atomic};
use crate::tools::{RuntimeStats, ToolContext};

/// The persisted form of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionDocument {
    pub version: u32,
    pub saved_at: String,
    pub session_id: String,
    pub cwd: String,
    pub model_id: String,
    pub history: Vec<ConversationEntry>,
    pub runtime: RuntimeStats,
}

impl Default for SessionDocument {
    fn default() -> Self {
        Self {
            version: SESSION_FORMAT_VERSION,
            saved_at: String::new(),
            session_id: String::new(),
            cwd: String::new(),
            model_id: String::new(),
            history: Vec::new(),
            runtime: RuntimeStats::default(),
        }
    }
}

/// What [`SessionDocument::restore`] applied.
#[derive(Debug, Clone, PartialEq)]
pub struct Restored {
    pub entries: usize,
    pub model_id: Option<String>,
    /// `Some(false)` when the saved directory was refused or no longer exists.
    pub cwd_restored: Option<bool>,
}

/// Creates an id of the form `YYYYmmdd-HHMMSS-<8 hex>`.
pub fn new_session_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", Local::now().format("%Y%m%d-%H%M%S"), &suffix[..8])
}

/// Maps an operator-typed name onto a safe file stem.
pub fn sanitize_name(name: &str) -> String {
    static UNSAFE: OnceLock<Regex> = OnceLock::new();
    let unsafe_chars =
        UNSAFE.get_or_init(|| Regex::new(r"[^A-Za-z0-9._-]+").expect("session name pattern must compile"));
    let cleaned = unsafe_chars.replace_all(name.trim(), "_");
    let cleaned: String = cleaned.trim_matches(|c| c == '.' || c == '_').chars().take(SESSION_NAME_MAX_LEN).collect();
    if cleaned.is_empty() {
        "default".to_string()
    } else {
        cleaned
    }
}

impl SessionDocument {
    /// Snapshots the live session. Called on the task that owns the history.
    pub fn capture(
        session_id: &str,
        model_id: &str,
        history: &[ConversationEntry],
        ctx: &ToolContext,
    ) -> Self {
        Self {
            version: SESSION_FORMAT_VERSION,
            saved_at: Local::now().to_rfc3339(),
            session_id: session_id.to_string(),
            cwd: ctx.cwd.display().to_string(),
            model_id: model_id.to_string(),
            history: history.to_vec(),
            runtime: ctx.stats.clone(),
        }
    }

    /// Parses a document, merging present fields over defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a JSON object, `history` is not a
    /// list, or a history entry is malformed.
    pub fn from_json(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text).context("Session file is not valid JSON")?;
        let Some(object) = value.as_object() else {
            bail!("Session file must contain a JSON object");
        };
        if let Some(history) = object.get("history") {
            if !history.is_array() {
                bail!("Session history must be a list");
            }
        }
        serde_json::from_value(value).context("Session file has malformed fields")
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize session")
    }

    /// Replaces the live history and stats with this document's.
    ///
    /// The saved working directory is only restored when it still exists and
    /// the permission gate allows reading it.
    pub fn restore(self, history: &mut Vec<ConversationEntry>, ctx: &mut ToolContext) -> Restored {
        let cwd_restored = (!self.cwd.is_empty()).then(|| {
            let path = normalize_path(Path::new(&self.cwd), &ctx.cwd);
            if !path.is_dir() {
                tracing::warn!(cwd = %self.cwd, "saved session directory no longer exists");
                return false;
            }
            let decision = ctx.gate.authorize(&path, "restore session directory", false);
            if decision.allowed {
                ctx.cwd = path;
            }
            decision.allowed
        });

        *history = self.history;
        ctx.stats = self.runtime;
        Restored {
            entries: history.len(),
            model_id: (!self.model_id.is_empty()).then_some(self.model_id),
            cwd_restored,
        }
    }
}

/// Metadata shown by `gantry session list`.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionMeta {
    pub name: String,
    pub saved_at: String,
    pub model_id: String,
    pub entries: usize,
}

/// The directory of saved sessions.
#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    /// The store under the platform data directory.
    pub fn open() -> Result<Self> {
        Ok(Self::at(Config::sessions_dir()?))
    }

    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the JSON file path for a session name.
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize_name(name)))
    }

    pub fn save(&self, name: &str, doc: &SessionDocument) -> Result<PathBuf> {
        let path = self.path_for(name);
        let json = doc.to_json()?;
        write_atomic(&path, json.as_bytes())
            .with_context(|| format!("Failed to write session file {:?}", path))?;
        tracing::info!(path = %path.display(), entries = doc.history.len(), "session saved");
        Ok(path)
    }

    pub fn load(&self, name: &str) -> Result<SessionDocument> {
        let path = self.path_for(name);
        anyhow::ensure!(path.exists(), "Session '{}' not found", sanitize_name(name));
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read session file {:?}", path))?;
        SessionDocument::from_json(&contents).with_context(|| format!("Failed to load session {:?}", path))
    }

    /// Writes the autosave snapshot on a detached thread.
    ///
    /// Serialization happens here, on the caller. Write failures are logged
    /// at debug level and otherwise dropped.
    pub fn autosave(&self, doc: &SessionDocument) -> Option<JoinHandle<()>> {
        let json = match doc.to_json() {
            Ok(json) => json,
            Err(e) => {
                tracing::debug!(error = %e, "autosave skipped");
                return None;
            }
        };
        let path = self.path_for(AUTOSAVE_SESSION_NAME);
        Some(std::thread::spawn(move || {
            if let Err(e) = write_atomic(&path, json.as_bytes()) {
                tracing::debug!(error = %e, path = %path.display(), "autosave failed");
            }
        }))
    }

    /// Returns metadata for every readable session, newest first.
    pub fn list(&self) -> Result<Vec<SessionMeta>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut sessions = Vec::new();
        for entry in fs::read_dir(&self.dir).with_context(|| format!("Failed to read {:?}", self.dir))? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(name) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
                continue;
            };
            let doc = match fs::read_to_string(&path).map_err(anyhow::Error::from).and_then(|s| SessionDocument::from_json(&s)) {
                Ok(doc) => doc,
                Err(e) => {
                    tracing::debug!(path = %path.display(), error = %e, "skipping unreadable session");
                    continue;
                }
            };
            sessions.push(SessionMeta {
                name,
                saved_at: doc.saved_at,
                model_id: doc.model_id,
                entries: doc.history.len(),
            });
        }
        sessions.sort_by(|a, b| b.saved_at.cmp(&a.saved_at).then_with(|| a.name.cmp(&b.name)));
        Ok(sessions)
    }

    /// Deletes a saved session. Returns `false` if it did not exist.
    pub fn delete(&self, name: &str) -> Result<bool> {
        let path = self.path_for(name);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path).with_context(|| format!("Failed to delete session file {:?}", path))?;
        Ok(true)
    }
}
