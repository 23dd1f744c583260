//! Configuration types and path resolution for gantry.
//!
//! Gantry stores its settings as TOML at the platform's XDG config path
//! (e.g. `~/.config/gantry/config.toml` on Linux) and session data under the
//! XDG data directory (`~/.local/share/gantry/`). A project-level
//! `gantry.toml` is deep-merged over the global file.

mod loader;
mod paths;
mod resolve;
mod settings;
mod types;

pub use settings::SETTING_KEYS;
use settings::coerce_setting;
pub use types::Config;

use anyhow::{bail, Context, Result};
use std::fs;

impl Config {
    /// Load config with precedence: project > global > defaults.
    /// Creates default config file if none exists.
    pub fn load() -> Result<Self> {
        let global = Self::load_global_table()?;
        let project = Self::load_project_table(&std::env::current_dir()?)?;
        let mut config = Self::from_tables(global, project)?;
        config.resolve_substitutions();
        Ok(config)
    }

    /// Sets `key` in the global config file and returns the stored value.
    ///
    /// Accepts `model`, `default_provider`, `system_prompt` and every
    /// `[settings]` key. Setting values are coerced and range-checked first.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown keys, invalid values, or I/O failures.
    pub fn set_value(key: &str, raw: &str) -> Result<toml::Value> {
        let (section, value) = match key {
            "model" | "default_provider" | "system_prompt" => (None, toml::Value::String(raw.to_string())),
            _ => (Some("settings"), coerce_setting(key, raw)?),
        };

        let path = Self::config_path()?;
        let mut table = Self::load_global_table()?;
        match section {
            Some(name) => {
                let entry = table
                    .entry(name.to_string())
                    .or_insert_with(|| toml::Value::Table(toml::Table::new()));
                let Some(inner) = entry.as_table_mut() else {
                    bail!("[{name}] in {:?} is not a table", path);
                };
                inner.insert(key.to_string(), value.clone());
            }
            None => {
                table.insert(key.to_string(), value.clone());
            }
        }

        // Validate the edited file before writing it.
        Self::from_tables(table.clone(), None)?;
        let rendered = toml::to_string_pretty(&table).context("Failed to serialize config")?;
        crate::permissions::write_atomic(&path, rendered.as_bytes())
            .with_context(|| format!("Failed to write config to {:?}", path))?;
        tracing::info!(key, path = %path.display(), "config updated");
        Ok(value)
    }

    /// Renders the effective config as TOML, with API keys masked.
    pub fn render_masked(&self) -> Result<String> {
        let mut masked = self.clone();
        let providers = &mut masked.provider;
        for entry in [
            &mut providers.gemini,
            &mut providers.openai,
            &mut providers.anthropic,
            &mut providers.ollama,
            &mut providers.openrouter,
        ]
        .into_iter()
        .flatten()
        {
            if let Some(key) = entry.api_key.as_mut().filter(|k| !k.is_empty()) {
                *key = mask_secret(key);
            }
        }
        toml::to_string_pretty(&masked).context("Failed to render config")
    }

    /// Creates the config, data and cache directories.
    pub fn ensure_dirs() -> Result<()> {
        for dir in [Self::config_dir()?, Self::data_dir()?, Self::cache_dir()?] {
            fs::create_dir_all(&dir).with_context(|| format!("Failed to create {:?}", dir))?;
        }
        Ok(())
    }
}

/// Keeps the last four characters of a secret.
fn mask_secret(secret: &str) -> String {
    let tail: String = secret.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
    format!("****{tail}")
}
