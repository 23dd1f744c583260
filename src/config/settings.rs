//! Validation and coercion of `[settings]` values typed by the operator.

use anyhow::{bail, Context, Result};

use super::types::Settings;
use crate::constants::{
    MAX_RETRY_ATTEMPTS_RANGE, MAX_ROUNDS_RANGE, SUB_AGENT_MAX_ROUNDS_RANGE, TEMPERATURE_RANGE,
};
use crate::tools::ToolSettings;

/// Every key accepted by [`coerce_setting`].
pub const SETTING_KEYS: &[&str] = &[
    "max_rounds",
    "temperature",
    "safe_mode",
    "auto_save_session",
    "handoff",
    "sub_agent_max_rounds",
    "max_retry_attempts",
];

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" | "enable" | "enabled" => Ok(true),
        "0" | "false" | "no" | "n" | "off" | "disable" | "disabled" => Ok(false),
        other => bail!("{key} expects a boolean (true/false, on/off, yes/no), got '{other}'"),
    }
}

fn parse_int(key: &str, raw: &str, (lo, hi): (u32, u32)) -> Result<u32> {
    let value: i64 = raw
        .trim()
        .parse()
        .with_context(|| format!("{key} expects an integer, got '{}'", raw.trim()))?;
    if value < lo as i64 || value > hi as i64 {
        bail!("{key} must be between {lo} and {hi}, got {value}");
    }
    Ok(value as u32)
}

fn parse_float(key: &str, raw: &str, (lo, hi): (f64, f64)) -> Result<f64> {
    let value: f64 = raw
        .trim()
        .parse()
        .with_context(|| format!("{key} expects a number, got '{}'", raw.trim()))?;
    if !(lo..=hi).contains(&value) {
        bail!("{key} must be between {lo} and {hi}, got {value}");
    }
    Ok(value)
}

/// Parses and range-checks `raw` for the setting `key`.
///
/// # Errors
///
/// Returns an error naming the key for unknown keys, unparsable values, and
/// values outside the allowed range.
pub fn coerce_setting(key: &str, raw: &str) -> Result<toml::Value> {
    let value = match key {
        "max_rounds" => toml::Value::Integer(parse_int(key, raw, MAX_ROUNDS_RANGE)?.into()),
        "sub_agent_max_rounds" => {
            toml::Value::Integer(parse_int(key, raw, SUB_AGENT_MAX_ROUNDS_RANGE)?.into())
        }
        "max_retry_attempts" => {
            toml::Value::Integer(parse_int(key, raw, MAX_RETRY_ATTEMPTS_RANGE)?.into())
        }
        "temperature" => toml::Value::Float(parse_float(key, raw, TEMPERATURE_RANGE)?),
        "safe_mode" | "auto_save_session" | "handoff" => toml::Value::Boolean(parse_bool(key, raw)?),
        other => bail!("Unknown setting: {other}. Known: {}", SETTING_KEYS.join(", ")),
    };
    Ok(value)
}

impl Settings {
    /// Coerces `raw` and applies it. Returns the stored value.
    pub fn set(&mut self, key: &str, raw: &str) -> Result<toml::Value> {
        let value = coerce_setting(key, raw)?;
        let mut table = match toml::Value::try_from(&*self)? {
            toml::Value::Table(table) => table,
            _ => bail!("settings did not serialize to a table"),
        };
        table.insert(key.to_string(), value.clone());
        *self = toml::Value::Table(table).try_into()?;
        Ok(value)
    }

    /// The subset the tools consult.
    pub fn tool_settings(&self) -> ToolSettings {
        ToolSettings {
            safe_mode: self.safe_mode,
            handoff: self.handoff,
            sub_agent_max_rounds: self.sub_agent_max_rounds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bool_spellings() {
        for raw in ["1", "TRUE", "yes", "y", "on", "Enabled"] {
            assert_eq!(coerce_setting("handoff", raw).unwrap(), toml::Value::Boolean(true));
        }
        for raw in ["0", "false", "No", "off", "disable"] {
            assert_eq!(coerce_setting("safe_mode", raw).unwrap(), toml::Value::Boolean(false));
        }
        assert!(coerce_setting("safe_mode", "maybe").is_err());
    }

    #[test]
    fn test_ranges_are_enforced() {
        assert_eq!(coerce_setting("max_rounds", "200").unwrap(), toml::Value::Integer(200));
        assert!(coerce_setting("max_rounds", "5").is_err());
        assert!(coerce_setting("max_rounds", "abc").is_err());
        assert!(coerce_setting("temperature", "2.5").is_err());
        assert_eq!(coerce_setting("temperature", "0.7").unwrap(), toml::Value::Float(0.7));
        assert!(coerce_setting("max_retry_attempts", "21").is_err());
        let err = coerce_setting("colour", "red").unwrap_err().to_string();
        assert!(err.starts_with("Unknown setting: colour"));
    }

    #[test]
    fn test_set_updates_in_place() {
        let mut settings = Settings::default();
        settings.set("max_rounds", "42").unwrap();
        settings.set("handoff", "on").unwrap();
        assert_eq!(settings.max_rounds, 42);
        assert!(settings.handoff);
        assert!(settings.tool_settings().handoff);
        assert!(settings.set("max_rounds", "1000").is_err());
        assert_eq!(settings.max_rounds, 42);
    }
}
