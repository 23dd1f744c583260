//! Environment variable substitution and per-provider lookups.

use super::types::{Config, ProviderEntry};

use crate::provider::ProviderKind;

impl Config {
    /// Resolve {env:VAR_NAME} patterns in string fields.
    pub(super) fn resolve_substitutions(&mut self) {
        self.model = Self::resolve_str(&self.model);
        if let Some(ref mut sp) = self.system_prompt {
            *sp = Self::resolve_str(sp);
        }
        if let Some(ref mut dp) = self.default_provider {
            *dp = Self::resolve_str(dp);
        }
        let providers = &mut self.provider;
        for entry in [
            &mut providers.gemini,
            &mut providers.openai,
            &mut providers.anthropic,
            &mut providers.ollama,
            &mut providers.openrouter,
        ] {
            Self::resolve_provider_entry(entry);
        }
    }

    /// Resolves `{env:VAR}` patterns in a single provider entry.
    fn resolve_provider_entry(entry: &mut Option<ProviderEntry>) {
        if let Some(ref mut e) = entry {
            for field in [&mut e.api_key, &mut e.base_url, &mut e.model] {
                if let Some(value) = field {
                    *value = Self::resolve_str(value);
                }
            }
        }
    }

    /// Replace {env:VAR} with the environment variable value.
    ///
    /// One left-to-right pass: substituted values are never rescanned.
    pub(super) fn resolve_str(s: &str) -> String {
        let mut result = String::with_capacity(s.len());
        let mut rest = s;
        while let Some(start) = rest.find("{env:") {
            let Some(end) = rest[start..].find('}') else {
                break;
            };
            result.push_str(&rest[..start]);
            let var_name = &rest[start + 5..start + end];
            result.push_str(&std::env::var(var_name).unwrap_or_default());
            rest = &rest[start + end + 1..];
        }
        result.push_str(rest);
        result
    }

    fn entry(&self, kind: ProviderKind) -> Option<&ProviderEntry> {
        let providers = &self.provider;
        match kind {
            ProviderKind::Gemini => providers.gemini.as_ref(),
            ProviderKind::OpenAI => providers.openai.as_ref(),
            ProviderKind::Anthropic => providers.anthropic.as_ref(),
            ProviderKind::Ollama => providers.ollama.as_ref(),
            ProviderKind::OpenRouter => providers.openrouter.as_ref(),
        }
    }

    /// Resolve the API key for a provider: env var first, then config value.
    ///
    /// Gemini also accepts `GOOGLE_API_KEY`. Empty values count as unset.
    pub fn resolve_api_key(&self, kind: ProviderKind) -> Option<String> {
        let mut vars = vec![kind.env_var()];
        if kind == ProviderKind::Gemini {
            vars.push("GOOGLE_API_KEY".to_string());
        }
        for var in vars {
            if let Ok(val) = std::env::var(&var) {
                if !val.is_empty() {
                    return Some(val);
                }
            }
        }

        self.entry(kind)
            .and_then(|e| e.api_key.clone())
            .filter(|k| !k.is_empty())
    }

    /// Base URL override for a provider, if configured.
    pub fn provider_base_url(&self, kind: ProviderKind) -> Option<String> {
        self.entry(kind)
            .and_then(|e| e.base_url.clone())
            .filter(|u| !u.is_empty())
    }

    /// Model configured for a provider, if any.
    pub fn provider_model(&self, kind: ProviderKind) -> Option<String> {
        self.entry(kind)
            .and_then(|e| e.model.clone())
            .filter(|m| !m.is_empty())
    }

    /// Get the configured default provider name, if any.
    pub fn provider_name(&self) -> Option<&str> {
        self.default_provider.as_deref().filter(|p| !p.is_empty())
    }

    /// Number of recent entries to keep during compaction.
    pub fn compaction_keep_recent(&self) -> usize {
        self.compaction
            .keep_recent
            .unwrap_or(crate::constants::COMPACTION_KEEP_RECENT_DEFAULT)
    }
}
