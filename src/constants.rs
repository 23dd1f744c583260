//! Centralized constants for gantry.
//!
//! All magic numbers, default strings, and configuration constants live here
//! so they can be changed in one place.

/// Application name used in CLI output and directory paths.
pub const APP_NAME: &str = "gantry";

/// Default LLM model identifier.
pub const DEFAULT_MODEL: &str = "gemini-2.5-pro";

/// Default system prompt prepended to all conversations.
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are gantry, an autonomous AI coding assistant running in the terminal. \
Use the tools available to you to inspect and change the user's workspace. \
Act rather than ask: chain tool calls until the task is done, then give a brief summary. \
Use edit_file for small changes and write_file when rewriting whole files. \
If a tool fails, read the error and try another approach. \
Working directory changes persist for the rest of the session.";

/// Configuration filename.
pub const CONFIG_FILENAME: &str = "config.toml";

/// Per-project configuration filename.
pub const PROJECT_CONFIG_FILENAME: &str = "gantry.toml";

/// Readline history filename.
pub const HISTORY_FILENAME: &str = "chat_history.txt";

/// Permission state filename (under the data directory).
pub const PERMISSIONS_FILENAME: &str = "permissions.json";

/// Environment variable holding the tracing filter.
pub const LOG_ENV_VAR: &str = "GANTRY_LOG";

// --- Provider defaults ---

/// Default LLM model identifier for OpenAI.
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4.1";

/// Default LLM model identifier for Anthropic.
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-sonnet-4-5";

/// Default LLM model identifier for OpenRouter.
pub const DEFAULT_OPENROUTER_MODEL: &str = "openai/gpt-4.1-mini";

/// Default LLM model identifier for Ollama.
pub const OLLAMA_DEFAULT_MODEL: &str = "llama3.1";

/// Default model for delegated sub-agents.
pub const DEFAULT_SUB_AGENT_MODEL: &str = "gemini-2.5-flash";

/// Base URL for the OpenAI API.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Base URL for the OpenRouter API.
pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Default base URL for the local Ollama server's OpenAI-compatible API.
pub const OLLAMA_DEFAULT_BASE_URL: &str = "http://localhost:11434/v1";

/// Base URL for the Anthropic API.
pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";

/// Anthropic API version header value.
pub const ANTHROPIC_API_VERSION: &str = "2023-06-01";

/// Maximum tokens requested from Anthropic (the field is mandatory there).
pub const ANTHROPIC_MAX_TOKENS: u64 = 8192;

/// Base URL for the Gemini API.
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

// --- Settings defaults and ranges ---

/// Default round cap for one user turn.
pub const MAX_ROUNDS_DEFAULT: u32 = 150;

/// Accepted range for `max_rounds`.
pub const MAX_ROUNDS_RANGE: (u32, u32) = (10, 500);

/// Default sampling temperature.
pub const TEMPERATURE_DEFAULT: f64 = 0.3;

/// Accepted range for `temperature`.
pub const TEMPERATURE_RANGE: (f64, f64) = (0.0, 2.0);

/// Default round cap for delegated sub-agents.
pub const SUB_AGENT_MAX_ROUNDS_DEFAULT: u32 = 30;

/// Accepted range for `sub_agent_max_rounds`.
pub const SUB_AGENT_MAX_ROUNDS_RANGE: (u32, u32) = (1, 500);

/// Default number of provider attempts per round.
pub const MAX_RETRY_ATTEMPTS_DEFAULT: u32 = 6;

/// Accepted range for `max_retry_attempts`.
pub const MAX_RETRY_ATTEMPTS_RANGE: (u32, u32) = (1, 20);

// --- Retry backoff ---

/// Base delay for exponential backoff, in seconds.
pub const RETRY_BASE_SECS: u64 = 5;

/// Upper bound on the exponential part of the backoff, in seconds.
pub const RETRY_CAP_SECS: u64 = 60;

/// Maximum jitter added on top of the backoff, as a fraction of it.
pub const RETRY_JITTER_RATIO: f64 = 0.3;

/// Margin added to an explicit provider retry hint, in seconds.
pub const RETRY_HINT_MARGIN_SECS: u64 = 1;

// --- Permission gate ---

/// Maximum number of remembered allow-once scopes.
pub const ALLOW_ONCE_CAP: usize = 200;

// --- Session persistence ---

/// Version written into saved session documents.
pub const SESSION_FORMAT_VERSION: u32 = 1;

/// Name of the session file rewritten after every turn.
pub const AUTOSAVE_SESSION_NAME: &str = "autosave_latest";

/// Maximum length of a sanitized session name.
pub const SESSION_NAME_MAX_LEN: usize = 80;

/// Depth of the `/undo` snapshot stack.
pub const UNDO_STACK_CAP: usize = 40;

/// Maximum number of pinned notes kept in runtime stats.
pub const PINNED_CAP: usize = 50;

// --- Compaction defaults ---

/// Default number of recent entries to keep during compaction.
pub const COMPACTION_KEEP_RECENT_DEFAULT: usize = 4;

/// System prompt for LLM-based context compaction.
pub const COMPACTION_PROMPT: &str =
    "Summarize the following conversation context concisely. \
Preserve key decisions, code snippets, file paths, tool results and technical details mentioned. \
Do not add commentary. Return only the summary.\n\n";

// --- Tool limits ---

/// Maximum file size (bytes) the read_file tool will read.
pub const READ_FILE_MAX_SIZE: u64 = 5 * 1024 * 1024;

/// Default timeout for run_command, in seconds.
pub const COMMAND_DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Combined command output above this many bytes is truncated.
pub const COMMAND_OUTPUT_CAP: usize = 4000;

/// Bytes kept from each end of truncated command output.
pub const COMMAND_OUTPUT_KEEP: usize = 2000;

/// Marker inserted between the head and tail of truncated output.
pub const TRUNCATION_MARKER: &str = "\n...[TRUNCATED]\n";

/// Environment variables stripped from spawned shell commands.
pub const COMMAND_STRIPPED_ENV_VARS: &[&str] = &[
    "ANTHROPIC_API_KEY",
    "OPENAI_API_KEY",
    "OPENROUTER_API_KEY",
    "GEMINI_API_KEY",
    "GOOGLE_API_KEY",
];

/// Length of the bounded shell history kept in runtime stats.
pub const SHELL_HISTORY_CAP: usize = 200;

/// Maximum number of matches the search_files tool returns.
pub const SEARCH_MAX_MATCHES: usize = 50;

/// Files larger than this are skipped by the search_files content filter.
pub const SEARCH_CONTENT_MAX_SIZE: u64 = READ_FILE_MAX_SIZE;

/// Byte threshold for binary file detection (check first N bytes for null).
pub const BINARY_DETECTION_BYTES: usize = 8192;
