//! Directory permission gate for tool side effects.
//!
//! Every tool that touches the filesystem or spawns a process asks
//! [`PermissionGate::authorize`] first. Access is decided per *scope*: the
//! directory an operation touches. Scopes under a trusted root (or in the
//! bounded allow-once list) pass; everything else is prompted for or denied.
//!
//! State lives in `permissions.json` under the data directory and is written
//! atomically after every mutation.

use std::fs;
use std::io::{self, IsTerminal, Write};
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use colored::Colorize;
use serde::{Deserialize, Serialize};

use crate::constants::ALLOW_ONCE_CAP;

/// Global gate mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PermissionMode {
    /// Ask for scopes outside the trusted roots.
    #[default]
    Prompt,
    /// Authorize everything.
    AllowAll,
}

impl PermissionMode {
    /// Parses `prompt` or `allow-all`.
    pub fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "prompt" => Ok(Self::Prompt),
            "allow-all" | "allow_all" | "allowall" => Ok(Self::AllowAll),
            other => anyhow::bail!("Unknown permission mode: {other}. Use prompt or allow-all"),
        }
    }
}

impl std::fmt::Display for PermissionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Prompt => write!(f, "prompt"),
            Self::AllowAll => write!(f, "allow-all"),
        }
    }
}

/// Persisted gate state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionState {
    #[serde(default)]
    pub mode: PermissionMode,
    #[serde(default)]
    pub trusted_roots: Vec<PathBuf>,
    #[serde(default)]
    pub allow_once: Vec<PathBuf>,
}

impl PermissionState {
    /// Prompt mode with the home directory and `cwd` trusted.
    pub fn with_defaults(cwd: &Path) -> Self {
        let mut trusted_roots: Vec<PathBuf> = dirs::home_dir().into_iter().collect();
        trusted_roots.push(cwd.to_path_buf());
        let mut state = Self {
            mode: PermissionMode::Prompt,
            trusted_roots,
            allow_once: Vec::new(),
        };
        state.normalize(cwd);
        state
    }

    /// Normalizes every stored path, then sorts and de-duplicates the roots.
    fn normalize(&mut self, cwd: &Path) {
        self.trusted_roots = self
            .trusted_roots
            .iter()
            .map(|p| normalize_path(p, cwd))
            .collect();
        self.trusted_roots.sort();
        self.trusted_roots.dedup();
        self.allow_once = self
            .allow_once
            .iter()
            .map(|p| normalize_path(p, cwd))
            .collect();
        self.allow_once.dedup();
        let excess = self.allow_once.len().saturating_sub(ALLOW_ONCE_CAP);
        self.allow_once.drain(..excess);
    }
}

/// Outcome of an interactive permission prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptChoice {
    AllowOnce,
    Trust,
    Deny,
}

/// Asks the operator about a scope outside every trusted root.
pub trait Prompter: Send + Sync {
    fn ask(&self, scope: &Path, action: &str) -> PromptChoice;

    /// Whether this prompter can actually reach an operator.
    fn is_interactive(&self) -> bool {
        true
    }
}

/// Prompts on stderr and reads the answer from stdin.
pub struct StdinPrompter;

impl Prompter for StdinPrompter {
    fn ask(&self, scope: &Path, action: &str) -> PromptChoice {
        eprint!(
            "\n{} {}\n  scope: {}\nAllow? [y]es once / [t]rust always / [n]o: ",
            "permission:".yellow().bold(),
            action,
            scope.display().to_string().cyan()
        );
        io::stderr().flush().ok();

        let mut response = String::new();
        if io::stdin().read_line(&mut response).is_err() {
            return PromptChoice::Deny;
        }
        match response.trim().to_lowercase().as_str() {
            "y" | "yes" => PromptChoice::AllowOnce,
            "t" | "trust" | "a" | "always" => PromptChoice::Trust,
            _ => PromptChoice::Deny,
        }
    }

    fn is_interactive(&self) -> bool {
        io::stdin().is_terminal()
    }
}

/// Never prompts; every untrusted scope is denied.
pub struct NonInteractive;

impl Prompter for NonInteractive {
    fn ask(&self, _scope: &Path, _action: &str) -> PromptChoice {
        PromptChoice::Deny
    }

    fn is_interactive(&self) -> bool {
        false
    }
}

/// Result of an authorization check.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub allowed: bool,
    /// Empty when allowed; the denial explanation otherwise.
    pub reason: String,
}

impl Decision {
    fn allow() -> Self {
        Self {
            allowed: true,
            reason: String::new(),
        }
    }

    fn deny(scope: &Path) -> Self {
        Self {
            allowed: false,
            reason: format!(
                "Permission denied for {}. Use `gantry perm trust <path>`, or `gantry perm mode allow-all`.",
                scope.display()
            ),
        }
    }
}

/// The gate: persisted state plus the prompter used for untrusted scopes.
pub struct PermissionGate {
    state: PermissionState,
    /// `None` keeps the state in memory only.
    path: Option<PathBuf>,
    prompter: Box<dyn Prompter>,
}

impl PermissionGate {
    /// Loads state from `path`, creating it with defaults if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing state file cannot be read or parsed.
    pub fn load(path: PathBuf, cwd: &Path, prompter: Box<dyn Prompter>) -> Result<Self> {
        let state = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read permission state from {:?}", path))?;
            let mut state: PermissionState = serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse permission state at {:?}", path))?;
            state.normalize(cwd);
            state
        } else {
            PermissionState::with_defaults(cwd)
        };
        let gate = Self {
            state,
            path: Some(path),
            prompter,
        };
        gate.save()?;
        Ok(gate)
    }

    /// A gate that never touches disk.
    pub fn in_memory(mut state: PermissionState, cwd: &Path, prompter: Box<dyn Prompter>) -> Self {
        state.normalize(cwd);
        Self {
            state,
            path: None,
            prompter,
        }
    }

    pub fn state(&self) -> &PermissionState {
        &self.state
    }

    /// Decides whether `action` on `path` may proceed.
    ///
    /// `path` must already be absolute (tools resolve it against their
    /// current directory first).
    pub fn authorize(&mut self, path: &Path, action: &str, for_write: bool) -> Decision {
        let scope = scope_for(&normalize_path(path, Path::new("/")), for_write);

        if self.state.mode == PermissionMode::AllowAll {
            return Decision::allow();
        }
        if self.state.trusted_roots.iter().any(|root| scope.starts_with(root))
            || self.state.allow_once.iter().any(|s| scope.starts_with(s))
        {
            tracing::debug!(scope = %scope.display(), action, "permission granted by trusted root");
            return Decision::allow();
        }

        if !self.prompter.is_interactive() {
            tracing::warn!(scope = %scope.display(), action, "permission denied (non-interactive)");
            return Decision::deny(&scope);
        }

        match self.prompter.ask(&scope, action) {
            PromptChoice::AllowOnce => {
                self.state.allow_once.push(scope.clone());
                let excess = self.state.allow_once.len().saturating_sub(ALLOW_ONCE_CAP);
                self.state.allow_once.drain(..excess);
                self.persist();
                tracing::info!(scope = %scope.display(), action, "permission granted once");
                Decision::allow()
            }
            PromptChoice::Trust => {
                self.state.trusted_roots.push(scope.clone());
                self.state.trusted_roots.sort();
                self.state.trusted_roots.dedup();
                self.persist();
                tracing::info!(scope = %scope.display(), action, "scope trusted");
                Decision::allow()
            }
            PromptChoice::Deny => {
                tracing::warn!(scope = %scope.display(), action, "permission denied by operator");
                Decision::deny(&scope)
            }
        }
    }

    /// Adds `path` to the trusted roots and persists. Returns the stored form.
    pub fn trust(&mut self, path: &Path, cwd: &Path) -> Result<PathBuf> {
        let root = normalize_path(path, cwd);
        self.state.trusted_roots.push(root.clone());
        self.state.trusted_roots.sort();
        self.state.trusted_roots.dedup();
        self.save()?;
        Ok(root)
    }

    /// Removes `path` from the trusted roots. Returns whether it was present.
    pub fn untrust(&mut self, path: &Path, cwd: &Path) -> Result<bool> {
        let root = normalize_path(path, cwd);
        let before = self.state.trusted_roots.len();
        self.state.trusted_roots.retain(|r| r != &root);
        let removed = self.state.trusted_roots.len() != before;
        if removed {
            self.save()?;
        }
        Ok(removed)
    }

    pub fn set_mode(&mut self, mode: PermissionMode) -> Result<()> {
        self.state.mode = mode;
        self.save()
    }

    pub fn clear_once(&mut self) -> Result<usize> {
        let cleared = self.state.allow_once.len();
        self.state.allow_once.clear();
        self.save()?;
        Ok(cleared)
    }

    /// Saves after a gate decision; failures are logged, never fatal.
    fn persist(&self) {
        if let Err(e) = self.save() {
            tracing::warn!(error = %e, "failed to persist permission state");
        }
    }

    fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(&self.state)?;
        write_atomic(path, json.as_bytes())
            .with_context(|| format!("Failed to write permission state to {:?}", path))
    }
}

/// Writes `bytes` to a uniquely named sibling temp file, then renames it
/// over `path`.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// The directory an operation on `path` touches.
///
/// Existing directory: itself. Existing file: its parent. Missing path:
/// the parent for writes, the path itself for reads.
pub fn scope_for(path: &Path, for_write: bool) -> PathBuf {
    let parent = || path.parent().map(Path::to_path_buf).unwrap_or_else(|| path.to_path_buf());
    match fs::metadata(path) {
        Ok(meta) if meta.is_dir() => path.to_path_buf(),
        Ok(_) => parent(),
        Err(_) if for_write => parent(),
        Err(_) => path.to_path_buf(),
    }
}

/// Expands `~`, absolutizes against `cwd`, collapses `.`/`..` lexically,
/// resolves symlinks on the longest existing prefix, and case-folds on
/// Windows.
pub fn normalize_path(path: &Path, cwd: &Path) -> PathBuf {
    let expanded = expand_home(path);
    let absolute = if expanded.is_absolute() {
        expanded
    } else {
        cwd.join(expanded)
    };

    let mut lexical = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                lexical.pop();
            }
            other => lexical.push(other.as_os_str()),
        }
    }

    let resolved = canonicalize_existing(&lexical);
    if cfg!(windows) {
        PathBuf::from(resolved.to_string_lossy().to_lowercase())
    } else {
        resolved
    }
}

fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match dirs::home_dir() {
        Some(home) => home.join(rest),
        None => path.to_path_buf(),
    }
}

/// Canonicalizes the longest existing ancestor and re-appends the rest.
fn canonicalize_existing(path: &Path) -> PathBuf {
    let mut existing = path.to_path_buf();
    let mut missing = Vec::new();
    loop {
        if let Ok(canonical) = existing.canonicalize() {
            let mut out = canonical;
            for name in missing.iter().rev() {
                out.push(name);
            }
            return strip_verbatim(out);
        }
        match (existing.file_name().map(|n| n.to_os_string()), existing.parent()) {
            (Some(name), Some(parent)) => {
                missing.push(name);
                existing = parent.to_path_buf();
            }
            _ => return path.to_path_buf(),
        }
    }
}

/// Drops the `\\?\` prefix Windows canonicalization adds.
fn strip_verbatim(path: PathBuf) -> PathBuf {
    if cfg!(windows) {
        let text = path.to_string_lossy();
        if let Some(rest) = text.strip_prefix(r"\\?\") {
            return PathBuf::from(rest);
        }
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Scripted {
        choice: PromptChoice,
        asked: Arc<AtomicUsize>,
    }

    impl Prompter for Scripted {
        fn ask(&self, _scope: &Path, _action: &str) -> PromptChoice {
            self.asked.fetch_add(1, Ordering::SeqCst);
            self.choice
        }
    }

    fn state(roots: Vec<PathBuf>) -> PermissionState {
        PermissionState {
            mode: PermissionMode::Prompt,
            trusted_roots: roots,
            allow_once: Vec::new(),
        }
    }

    #[test]
    fn test_scope_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        fs::write(&file, "x").unwrap();
        let missing = dir.path().join("new/deep");

        assert_eq!(scope_for(dir.path(), false), dir.path());
        assert_eq!(scope_for(&file, false), dir.path());
        assert_eq!(scope_for(&missing, true), dir.path().join("new"));
        assert_eq!(scope_for(&missing, false), missing);
    }

    #[test]
    fn test_trusted_root_authorizes_nested_paths() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("proj");
        fs::create_dir_all(root.join("src")).unwrap();
        let mut gate = PermissionGate::in_memory(state(vec![root.clone()]), dir.path(), Box::new(NonInteractive));

        let canonical = normalize_path(&root, dir.path());
        assert!(gate.authorize(&canonical.join("src/main.rs"), "write", true).allowed);
        assert!(gate.authorize(&canonical.join("src/../src"), "read", false).allowed);
    }

    #[test]
    fn test_non_interactive_outside_roots_is_denied() {
        let dir = tempfile::tempdir().unwrap();
        let inside = dir.path().join("trusted");
        let outside = dir.path().join("elsewhere");
        fs::create_dir_all(&inside).unwrap();
        fs::create_dir_all(&outside).unwrap();
        let mut gate = PermissionGate::in_memory(state(vec![inside]), dir.path(), Box::new(NonInteractive));

        let decision = gate.authorize(&normalize_path(&outside, dir.path()), "write file", true);
        assert!(!decision.allowed);
        assert!(decision.reason.starts_with("Permission denied for"));
        assert!(decision.reason.contains("gantry perm trust"));
    }

    #[test]
    fn test_sibling_prefix_is_not_contained() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("app")).unwrap();
        fs::create_dir_all(dir.path().join("app-secrets")).unwrap();
        let mut gate = PermissionGate::in_memory(
            state(vec![dir.path().join("app")]),
            dir.path(),
            Box::new(NonInteractive),
        );
        let target = normalize_path(&dir.path().join("app-secrets"), dir.path());
        assert!(!gate.authorize(&target, "list", false).allowed);
    }

    #[test]
    fn test_allow_all_mode() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = state(Vec::new());
        s.mode = PermissionMode::AllowAll;
        let mut gate = PermissionGate::in_memory(s, dir.path(), Box::new(NonInteractive));
        assert!(gate.authorize(dir.path(), "anything", true).allowed);
    }

    #[test]
    fn test_prompt_choices_mutate_and_persist() {
        let dir = tempfile::tempdir().unwrap();
        let state_file = dir.path().join("data/permissions.json");
        let work = dir.path().join("work");
        fs::create_dir_all(&work).unwrap();
        fs::create_dir_all(dir.path().join("data")).unwrap();
        fs::write(&state_file, serde_json::to_string(&state(Vec::new())).unwrap()).unwrap();

        let asked = Arc::new(AtomicUsize::new(0));
        let mut gate = PermissionGate::load(
            state_file.clone(),
            dir.path(),
            Box::new(Scripted {
                choice: PromptChoice::Trust,
                asked: asked.clone(),
            }),
        )
        .unwrap();
        let target = normalize_path(&work.join("file.txt"), dir.path());
        assert!(gate.authorize(&target, "write", true).allowed);
        assert!(gate.authorize(&target, "write", true).allowed);
        assert_eq!(asked.load(Ordering::SeqCst), 1);

        let saved: PermissionState =
            serde_json::from_str(&fs::read_to_string(&state_file).unwrap()).unwrap();
        assert_eq!(saved.trusted_roots, vec![normalize_path(&work, dir.path())]);
    }

    #[test]
    fn test_allow_once_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let asked = Arc::new(AtomicUsize::new(0));
        let mut gate = PermissionGate::in_memory(
            state(Vec::new()),
            dir.path(),
            Box::new(Scripted {
                choice: PromptChoice::AllowOnce,
                asked,
            }),
        );
        for i in 0..(ALLOW_ONCE_CAP + 5) {
            let scope = normalize_path(&dir.path().join(format!("missing-{i}")), dir.path());
            assert!(gate.authorize(&scope, "read", false).allowed);
        }
        assert_eq!(gate.state().allow_once.len(), ALLOW_ONCE_CAP);
    }

    #[test]
    fn test_trust_untrust_and_mode() {
        let dir = tempfile::tempdir().unwrap();
        let state_file = dir.path().join("permissions.json");
        let mut gate = PermissionGate::load(state_file.clone(), dir.path(), Box::new(NonInteractive)).unwrap();

        let root = gate.trust(Path::new("extra"), dir.path()).unwrap();
        assert!(root.is_absolute());
        assert!(gate.state().trusted_roots.contains(&root));
        assert!(gate.untrust(Path::new("extra"), dir.path()).unwrap());
        assert!(!gate.untrust(Path::new("extra"), dir.path()).unwrap());

        gate.set_mode(PermissionMode::AllowAll).unwrap();
        let saved: PermissionState =
            serde_json::from_str(&fs::read_to_string(&state_file).unwrap()).unwrap();
        assert_eq!(saved.mode, PermissionMode::AllowAll);
    }

    #[test]
    fn test_state_without_mode_defaults_to_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let state_file = dir.path().join("permissions.json");
        fs::write(&state_file, r#"{"trusted_roots": [], "allow_once": []}"#).unwrap();
        let gate = PermissionGate::load(state_file, dir.path(), Box::new(NonInteractive)).unwrap();
        assert_eq!(gate.state().mode, PermissionMode::Prompt);
    }

    #[test]
    fn test_concurrent_atomic_writes_never_tear() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested/state.json");
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let target = target.clone();
                std::thread::spawn(move || {
                    let body = format!("{{\"writer\": {i}, \"pad\": \"{}\"}}", "x".repeat(4096));
                    for _ in 0..20 {
                        write_atomic(&target, body.as_bytes()).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let saved: serde_json::Value = serde_json::from_str(&fs::read_to_string(&target).unwrap()).unwrap();
        assert!(saved["writer"].is_u64());
        let leftovers = fs::read_dir(target.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_normalize_collapses_dots() {
        let dir = tempfile::tempdir().unwrap();
        let base = normalize_path(dir.path(), dir.path());
        assert_eq!(normalize_path(Path::new("a/./b/../c"), dir.path()), base.join("a/c"));
    }
}
