//! Provider kind enumeration and default model mapping.
//!
//! Defines [`ProviderKind`] which identifies which LLM backend to use,
//! [`ProviderKind::detect`] which infers it from a bare model id, and
//! [`default_model_for`] which returns the default model for each provider.

use anyhow::{anyhow, Result};

/// Identifies which LLM provider to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// Google Gemini (part-level streaming).
    Gemini,
    /// OpenAI (Chat Completions, index-accumulating streaming).
    OpenAI,
    /// Anthropic (Claude models, block-lifecycle streaming).
    Anthropic,
    /// Ollama (local models via the OpenAI-compatible API).
    Ollama,
    /// OpenRouter (multi-provider gateway, OpenAI-compatible API).
    OpenRouter,
}

impl ProviderKind {
    /// Parses a provider name string into a [`ProviderKind`].
    ///
    /// Matching is case-insensitive. Returns an error for unknown providers.
    pub fn from_str(s: &str) -> Result<Self> {
        Self::parse(s).ok_or_else(|| {
            anyhow!("Unknown provider: {s}. Supported: gemini, openai, anthropic, ollama, openrouter")
        })
    }

    fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "gemini" | "google" => Some(Self::Gemini),
            "openai" => Some(Self::OpenAI),
            "anthropic" | "claude" => Some(Self::Anthropic),
            "ollama" => Some(Self::Ollama),
            "openrouter" => Some(Self::OpenRouter),
            _ => None,
        }
    }

    /// Infers the provider from a model id, returning the id to send on the wire.
    ///
    /// `ollama/` and `ollama:` prefixes are stripped; unrecognised ids go to Gemini.
    pub fn detect(model: &str) -> (Self, String) {
        let lower = model.to_lowercase();
        for prefix in ["ollama/", "ollama:"] {
            if lower.starts_with(prefix) {
                return (Self::Ollama, model[prefix.len()..].to_string());
            }
        }
        let openai = ["gpt-", "o1", "o3", "o4", "chatgpt", "text-davinci"];
        let kind = if openai.iter().any(|p| lower.starts_with(p)) {
            Self::OpenAI
        } else if lower.starts_with("claude-") {
            Self::Anthropic
        } else {
            Self::Gemini
        };
        (kind, model.to_string())
    }

    /// Splits `provider/model` shorthand when the prefix names a provider.
    pub fn split_shorthand(model: &str) -> Option<(Self, String)> {
        let (prefix, rest) = model.split_once('/')?;
        Self::parse(prefix).map(|kind| (kind, rest.to_string()))
    }

    /// Lowercase name used in config tables and messages.
    pub fn name(self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::OpenAI => "openai",
            Self::Anthropic => "anthropic",
            Self::Ollama => "ollama",
            Self::OpenRouter => "openrouter",
        }
    }

    /// Environment variable checked first for this provider's API key.
    pub fn env_var(self) -> String {
        format!("{}_API_KEY", self.name().to_uppercase())
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Returns the default model identifier for a given provider.
pub fn default_model_for(provider: &ProviderKind) -> &'static str {
    match provider {
        ProviderKind::Gemini => crate::constants::DEFAULT_MODEL,
        ProviderKind::OpenAI => crate::constants::DEFAULT_OPENAI_MODEL,
        ProviderKind::Anthropic => crate::constants::DEFAULT_ANTHROPIC_MODEL,
        ProviderKind::OpenRouter => crate::constants::DEFAULT_OPENROUTER_MODEL,
        ProviderKind::Ollama => crate::constants::OLLAMA_DEFAULT_MODEL,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_from_model_prefix() {
        assert_eq!(ProviderKind::detect("gpt-4.1").0, ProviderKind::OpenAI);
        assert_eq!(ProviderKind::detect("o3-mini").0, ProviderKind::OpenAI);
        assert_eq!(ProviderKind::detect("claude-sonnet-4-5").0, ProviderKind::Anthropic);
        assert_eq!(ProviderKind::detect("gemini-2.5-flash").0, ProviderKind::Gemini);
        assert_eq!(
            ProviderKind::detect("ollama/llama3.1"),
            (ProviderKind::Ollama, "llama3.1".to_string())
        );
        assert_eq!(
            ProviderKind::detect("Ollama:qwen2.5-coder"),
            (ProviderKind::Ollama, "qwen2.5-coder".to_string())
        );
    }

    #[test]
    fn test_shorthand_requires_known_provider() {
        assert_eq!(
            ProviderKind::split_shorthand("anthropic/claude-opus-4-1"),
            Some((ProviderKind::Anthropic, "claude-opus-4-1".to_string()))
        );
        assert_eq!(ProviderKind::split_shorthand("meta-llama/llama-3"), None);
        assert!(ProviderKind::from_str("nope").is_err());
    }
}
