//! Tunable resolution: named values read from a [`ConfigSource`], with a
//! default for anything missing or malformed and clamping for integers.

use std::collections::HashMap;
use std::env::VarError;

/// Whether a dropped connection is retried at all.
pub const RECONNECT_ENABLED: &str = "reconnect-enabled";
/// Delay before the first retry, in milliseconds.
pub const RECONNECT_BASE_DELAY_MS: &str = "reconnect-base-delay-ms";
/// Cap on the retry delay, in milliseconds.
pub const RECONNECT_MAX_DELAY_MS: &str = "reconnect-max-delay-ms";

/// A raw value as the source holds it, before resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    Bool(bool),
    Text(String),
    /// Anything else (numbers, lists, non-UTF-8 env values).  Always
    /// resolves to the default.
    Other,
}

/// Where tunables are looked up.
pub trait ConfigSource: Send + Sync {
    fn get(&self, name: &str) -> Option<ConfigValue>;
}

// ── Sources ──────────────────────────────────────────────────────────

/// Reads the process environment.
///
/// `reconnect-base-delay-ms` is looked up as `KIOSK_RECONNECT_BASE_DELAY_MS`
/// (prefix + upper snake case).
#[derive(Debug, Clone)]
pub struct EnvSource {
    prefix: String,
}

impl EnvSource {
    pub fn new() -> Self {
        Self::with_prefix("KIOSK_")
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Environment variable name for a tunable.
    pub fn var_name(&self, name: &str) -> String {
        format!(
            "{}{}",
            self.prefix,
            name.replace('-', "_").to_ascii_uppercase()
        )
    }
}

impl Default for EnvSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigSource for EnvSource {
    fn get(&self, name: &str) -> Option<ConfigValue> {
        match std::env::var(self.var_name(name)) {
            Ok(v) => Some(ConfigValue::Text(v)),
            Err(VarError::NotUnicode(_)) => Some(ConfigValue::Other),
            Err(VarError::NotPresent) => None,
        }
    }
}

/// In-memory source, for embedders that already hold their settings.
#[derive(Debug, Clone, Default)]
pub struct MapSource {
    values: HashMap<String, ConfigValue>,
}

impl MapSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, name: impl Into<String>, value: ConfigValue) -> Self {
        self.values.insert(name.into(), value);
        self
    }

    /// Build from a JSON object.  Strings and booleans keep their kind;
    /// every other JSON value becomes [`ConfigValue::Other`].
    pub fn from_json(object: &serde_json::Map<String, serde_json::Value>) -> Self {
        let values = object
            .iter()
            .map(|(name, value)| {
                let value = match value {
                    serde_json::Value::Bool(b) => ConfigValue::Bool(*b),
                    serde_json::Value::String(s) => ConfigValue::Text(s.clone()),
                    _ => ConfigValue::Other,
                };
                (name.clone(), value)
            })
            .collect();
        Self { values }
    }
}

impl ConfigSource for MapSource {
    fn get(&self, name: &str) -> Option<ConfigValue> {
        self.values.get(name).cloned()
    }
}

// ── Resolution ───────────────────────────────────────────────────────

/// Resolve a boolean tunable.
///
/// Text is trimmed and matched case-sensitively: `"true"`/`"1"` and
/// `"false"`/`"0"`.  Anything else yields `default`.
pub fn resolve_bool(source: &dyn ConfigSource, name: &str, default: bool) -> bool {
    match source.get(name) {
        Some(ConfigValue::Bool(b)) => b,
        Some(ConfigValue::Text(raw)) => match raw.trim() {
            "true" | "1" => true,
            "false" | "0" => false,
            _ => default,
        },
        Some(ConfigValue::Other) | None => default,
    }
}

/// Resolve an integer tunable, clamped into `[min, max]`.
///
/// Only text holding a plain integer counts; empty, non-numeric and
/// fractional values yield `default` unclamped.
pub fn resolve_int(
    source: &dyn ConfigSource,
    name: &str,
    default: i64,
    min: i64,
    max: i64,
) -> i64 {
    let Some(ConfigValue::Text(raw)) = source.get(name) else {
        return default;
    };
    match raw.trim().parse::<i64>() {
        Ok(v) => v.clamp(min, max),
        Err(_) => default,
    }
}
