//! File loading and merging for gantry configuration.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use super::types::{default_model, Config};

impl Config {
    /// Reads the global config table from `~/.config/gantry/config.toml`.
    ///
    /// If no config file exists, creates one with sensible defaults
    /// (including `{env:VAR}` placeholders for API keys) and returns it.
    pub(super) fn load_global_table() -> Result<toml::Table> {
        let path = Self::config_path()?;
        if !path.exists() {
            let default_toml = default_config_toml();
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, &default_toml)
                .with_context(|| format!("Failed to write default config to {:?}", path))?;
            tracing::info!(path = %path.display(), "created default config");
            return toml::from_str(&default_toml).context("Failed to parse default config");
        }

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config from {:?}", path))?;
        toml::from_str(&contents).with_context(|| format!("Failed to parse config at {:?}", path))
    }

    /// Look for gantry.toml in `start`, then walk up to the git root.
    pub(super) fn load_project_table(start: &Path) -> Result<Option<toml::Table>> {
        let mut dir = start.to_path_buf();
        loop {
            let candidate = dir.join(crate::constants::PROJECT_CONFIG_FILENAME);
            if candidate.exists() {
                let contents = fs::read_to_string(&candidate)
                    .with_context(|| format!("Failed to read {:?}", candidate))?;
                let table: toml::Table = toml::from_str(&contents)
                    .with_context(|| format!("Failed to parse {:?}", candidate))?;
                tracing::debug!(path = %candidate.display(), "loaded project config");
                return Ok(Some(table));
            }
            // Stop at git root or filesystem root
            if dir.join(".git").exists() || !dir.pop() {
                break;
            }
        }
        Ok(None)
    }

    /// Builds a config from the global table with the project table merged over it.
    pub(super) fn from_tables(mut global: toml::Table, project: Option<toml::Table>) -> Result<Self> {
        if let Some(project) = project {
            merge_tables(&mut global, project);
        }
        toml::Value::Table(global)
            .try_into()
            .context("Invalid configuration")
    }
}

/// Deep-merges `overlay` into `base`. Nested tables merge key by key;
/// any other overlay value replaces the base value.
pub(super) fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

fn default_config_toml() -> String {
    format!(
        r#"model = "{}"

[provider]

[provider.gemini]
api_key = "{{env:GEMINI_API_KEY}}"

[provider.anthropic]
api_key = "{{env:ANTHROPIC_API_KEY}}"

[provider.openai]
api_key = "{{env:OPENAI_API_KEY}}"

[provider.openrouter]
api_key = "{{env:OPENROUTER_API_KEY}}"

[provider.ollama]
base_url = "{}"

[settings]
max_rounds = {}
temperature = {}
safe_mode = true
auto_save_session = true
handoff = false
sub_agent_max_rounds = {}
max_retry_attempts = {}
"#,
        default_model(),
        crate::constants::OLLAMA_DEFAULT_BASE_URL,
        crate::constants::MAX_ROUNDS_DEFAULT,
        crate::constants::TEMPERATURE_DEFAULT,
        crate::constants::SUB_AGENT_MAX_ROUNDS_DEFAULT,
        crate::constants::MAX_RETRY_ATTEMPTS_DEFAULT,
    )
}
