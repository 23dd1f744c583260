//! Model resolution logic for gantry.
//!
//! Resolves which provider and model to use based on CLI flags, config file,
//! and hardcoded defaults. Supports `provider/model` shorthand syntax and
//! provider detection from bare model ids.

use anyhow::Result;

use super::kind::{default_model_for, ProviderKind};
use crate::config::Config;

/// Resolved provider + model pair.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSelection {
    pub provider: ProviderKind,
    pub model: String,
}

impl ModelSelection {
    /// Selection for a model id typed at runtime (`/model`, `delegate_task`).
    pub fn from_model_id(model: &str) -> Self {
        let (provider, model) =
            ProviderKind::split_shorthand(model).unwrap_or_else(|| ProviderKind::detect(model));
        Self { provider, model }
    }
}

/// Resolve which provider and model to use.
/// Priority: CLI flags > config.toml > defaults.
///
/// Accepts these formats:
///   --model anthropic/claude-sonnet-4-5  (provider/model shorthand, only when --provider is omitted)
///   --model gpt-4.1  (provider detected from the model id)
///   --provider openrouter --model "org/model-name"  (slash preserved as model name)
///   --provider anthropic  (uses the provider entry's model, then the provider default)
///   (nothing)  (uses default_provider / model from config.toml)
pub fn resolve_model(
    cli_provider: Option<&str>,
    cli_model: Option<&str>,
    config: &Config,
) -> Result<ModelSelection> {
    if let Some(name) = cli_provider {
        let provider = ProviderKind::from_str(name)?;
        let model = cli_model
            .map(String::from)
            .or_else(|| config.provider_model(provider))
            .unwrap_or_else(|| default_model_for(&provider).to_string());
        return Ok(ModelSelection { provider, model });
    }

    if let Some(model) = cli_model {
        return Ok(ModelSelection::from_model_id(model));
    }

    if let Some(name) = config.provider_name() {
        let provider = ProviderKind::from_str(name)?;
        let model = config
            .provider_model(provider)
            .or_else(|| {
                let configured = ModelSelection::from_model_id(&config.model);
                (configured.provider == provider).then_some(configured.model)
            })
            .unwrap_or_else(|| default_model_for(&provider).to_string());
        return Ok(ModelSelection { provider, model });
    }

    Ok(ModelSelection::from_model_id(&config.model))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_flags_win() {
        let config = Config::default();
        let sel = resolve_model(Some("openrouter"), Some("meta-llama/llama-3"), &config).unwrap();
        assert_eq!(sel.provider, ProviderKind::OpenRouter);
        assert_eq!(sel.model, "meta-llama/llama-3");

        let sel = resolve_model(None, Some("anthropic/claude-opus-4-1"), &config).unwrap();
        assert_eq!(sel.provider, ProviderKind::Anthropic);
        assert_eq!(sel.model, "claude-opus-4-1");

        let sel = resolve_model(None, Some("gpt-4.1-mini"), &config).unwrap();
        assert_eq!(sel.provider, ProviderKind::OpenAI);
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::default();
        let sel = resolve_model(None, None, &config).unwrap();
        assert_eq!(sel.provider, ProviderKind::Gemini);
        assert_eq!(sel.model, crate::constants::DEFAULT_MODEL);

        let config = Config {
            default_provider: Some("anthropic".into()),
            ..Config::default()
        };
        let sel = resolve_model(None, None, &config).unwrap();
        assert_eq!(sel.provider, ProviderKind::Anthropic);
        assert_eq!(sel.model, crate::constants::DEFAULT_ANTHROPIC_MODEL);
    }
}
