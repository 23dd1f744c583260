//! Typed errors raised at the provider boundary.
//!
//! Everything past this boundary is `anyhow`; the agent loop only needs
//! [`ProviderError`] to tell transient failures (retried) from auth and
//! model-selection failures (surfaced immediately).

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use thiserror::Error;

/// A failure talking to an LLM provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("No API key for {provider}. Set {env_var} or add api_key under [provider.{provider}] in config.toml")]
    MissingApiKey { provider: String, env_var: String },

    #[error("Failed to initialise {provider} client: {message}")]
    Init { provider: String, message: String },

    #[error("Authentication rejected (HTTP {status}): {message}")]
    Auth { status: u16, message: String },

    #[error("Model '{model}' not found: {message}")]
    ModelNotFound { model: String, message: String },

    #[error("HTTP {status}: {message}")]
    Http {
        status: u16,
        message: String,
        /// Seconds from a `Retry-After` response header.
        retry_after: Option<u64>,
    },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Provider stream error: {0}")]
    Stream(String),
}

fn transient_regex() -> &'static Regex {
    static CACHED: OnceLock<Regex> = OnceLock::new();
    CACHED.get_or_init(|| {
        Regex::new(
            r"(?i)resource_exhausted|\b429\b|ratelimiterror|rate_limit_error|rate.?limit|overloaded|\b529\b|quota|too many requests",
        )
        .expect("transient regex must compile")
    })
}

fn retry_hint_regexes() -> &'static [Regex; 3] {
    static CACHED: OnceLock<[Regex; 3]> = OnceLock::new();
    CACHED.get_or_init(|| {
        [
            Regex::new(r#"(?i)retryDelay['"]?\s*:\s*['"](\d+)(?:\.\d+)?s"#),
            Regex::new(r#"(?i)retry.after['"]?\s*:\s*(\d+)"#),
            Regex::new(r"(?i)retry after (\d+)"),
        ]
        .map(|re| re.expect("retry hint regex must compile"))
    })
}

impl ProviderError {
    /// Maps a non-success HTTP status and its body to an error.
    pub fn from_status(status: u16, body: String, retry_after: Option<u64>, model: &str) -> Self {
        match status {
            401 | 403 => Self::Auth {
                status,
                message: body,
            },
            404 => Self::ModelNotFound {
                model: model.to_string(),
                message: body,
            },
            _ => Self::Http {
                status,
                message: body,
                retry_after,
            },
        }
    }

    /// Whether the failure is a rate-limit or overload signature worth retrying.
    ///
    /// Auth, model-selection, and setup failures never are, whatever their text says.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::MissingApiKey { .. }
            | Self::Init { .. }
            | Self::Auth { .. }
            | Self::ModelNotFound { .. } => false,
            Self::Http { status, .. } if matches!(status, 429 | 503 | 529) => true,
            other => transient_regex().is_match(&other.to_string()),
        }
    }

    /// An explicit wait the provider asked for, if any.
    pub fn retry_hint(&self) -> Option<Duration> {
        if let Self::Http {
            retry_after: Some(secs),
            ..
        } = self
        {
            return Some(Duration::from_secs(*secs));
        }
        let text = self.to_string();
        retry_hint_regexes().iter().find_map(|re| {
            re.captures(&text)
                .and_then(|c| c.get(1))
                .and_then(|m| m.as_str().parse::<u64>().ok())
                .map(Duration::from_secs)
        })
    }

    /// Short remediation hint shown next to the error, where one applies.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::MissingApiKey { .. } | Self::Auth { .. } => {
                Some("check your API key, then retry the prompt")
            }
            Self::ModelNotFound { .. } => Some("pick another model with /model <id>"),
            _ => None,
        }
    }
}
