//! Struct definitions and serde defaults for gantry configuration.

use serde::{Deserialize, Serialize};

use crate::constants::{
    MAX_RETRY_ATTEMPTS_DEFAULT, MAX_ROUNDS_DEFAULT, SUB_AGENT_MAX_ROUNDS_DEFAULT, TEMPERATURE_DEFAULT,
};

/// Root configuration for gantry, deserialized from `config.toml`.
///
/// Fields use serde defaults so gantry can run with sensible defaults
/// when no config file exists.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Default model identifier (e.g. `"gemini-2.5-pro"`).
    #[serde(default = "default_model")]
    pub model: String,
    /// Default provider name (e.g., "anthropic", "openai").
    #[serde(default)]
    pub default_provider: Option<String>,
    /// System prompt sent with every request.
    #[serde(default = "default_system_prompt")]
    pub system_prompt: Option<String>,
    /// Per-provider settings.
    #[serde(default)]
    pub provider: ProviderConfig,
    /// Runtime knobs, editable with `gantry config set` and `/set`.
    #[serde(default)]
    pub settings: Settings,
    /// Context compaction settings.
    #[serde(default)]
    pub compaction: CompactionConfig,
}

pub(super) fn default_model() -> String {
    crate::constants::DEFAULT_MODEL.to_string()
}

fn default_system_prompt() -> Option<String> {
    Some(crate::constants::DEFAULT_SYSTEM_PROMPT.to_string())
}

/// Provider-specific configuration map.
///
/// Each field corresponds to a supported LLM provider. Only providers
/// the user has configured will be `Some`.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ProviderConfig {
    pub gemini: Option<ProviderEntry>,
    pub openai: Option<ProviderEntry>,
    pub anthropic: Option<ProviderEntry>,
    pub ollama: Option<ProviderEntry>,
    pub openrouter: Option<ProviderEntry>,
}

/// Connection details for a single LLM provider.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ProviderEntry {
    /// API key for authentication. Environment variables take precedence.
    pub api_key: Option<String>,
    /// Custom base URL (useful for proxies or self-hosted instances).
    pub base_url: Option<String>,
    /// Model identifier to use with this provider, overriding the global default.
    pub model: Option<String>,
}

/// Validated runtime settings.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Round budget per operator submission (10..=500).
    pub max_rounds: u32,
    /// Sampling temperature (0.0..=2.0).
    pub temperature: f64,
    /// Refuse destructive shell patterns and `delete_file`.
    pub safe_mode: bool,
    /// Write `autosave_latest.json` after every turn.
    pub auto_save_session: bool,
    /// Allow the model to call `delegate_task`.
    pub handoff: bool,
    /// Round budget for delegated sub-agents (1..=500).
    pub sub_agent_max_rounds: u32,
    /// Attempts per model turn, including the first (1..=20).
    pub max_retry_attempts: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_rounds: MAX_ROUNDS_DEFAULT,
            temperature: TEMPERATURE_DEFAULT,
            safe_mode: true,
            auto_save_session: true,
            handoff: false,
            sub_agent_max_rounds: SUB_AGENT_MAX_ROUNDS_DEFAULT,
            max_retry_attempts: MAX_RETRY_ATTEMPTS_DEFAULT,
        }
    }
}

/// Configuration for LLM-based context compaction.
#[derive(Debug, Default, Serialize, Deserialize, Clone)]
pub struct CompactionConfig {
    /// Number of most-recent entries to preserve during compaction.
    pub keep_recent: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: default_model(),
            default_provider: None,
            system_prompt: default_system_prompt(),
            provider: ProviderConfig::default(),
            settings: Settings::default(),
            compaction: CompactionConfig::default(),
        }
    }
}
