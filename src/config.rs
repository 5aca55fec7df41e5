use std::{fs, path::Path, time::Duration};

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

/// Debounce after a single tile finishes loading.
pub const DEFAULT_SHORT_DELAY_MS: u64 = 500;

/// Debounce after the viewport stops moving.
pub const DEFAULT_LONG_DELAY_MS: u64 = 1000;

/// Raw layer options as a host would pass them, before validation.
/// Values may be JSON numbers or numeric strings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MergeOptions {
    pub short_delay_ms: Option<Value>,
    pub long_delay_ms: Option<Value>,
    pub cleanup_delay_ms: Option<Value>,
}

/// Validated timing configuration of a seamless layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeConfig {
    pub short_delay: Duration,
    pub long_delay: Duration,
    pub cleanup_delay: Duration,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            short_delay: Duration::from_millis(DEFAULT_SHORT_DELAY_MS),
            long_delay: Duration::from_millis(DEFAULT_LONG_DELAY_MS),
            cleanup_delay: Duration::from_millis(2 * DEFAULT_SHORT_DELAY_MS),
        }
    }
}

/// Interpret an option value as a positive whole number of milliseconds.
fn positive_millis(value: &Value) -> Option<u64> {
    let ms = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    (ms.is_finite() && ms >= 1.0 && ms.fract() == 0.0 && ms <= u64::MAX as f64).then_some(ms as u64)
}

/// Resolve one option, falling back to `default` (with a warning) when it is unusable.
fn resolve(name: &str, value: Option<&Value>, default: u64) -> u64 {
    match value {
        None | Some(Value::Null) => default,
        Some(value) => positive_millis(value).unwrap_or_else(|| {
            warn!(option = name, %value, default, "invalid delay option, using default");
            default
        }),
    }
}

impl MergeConfig {
    /// Validate raw options. Invalid values fall back to their defaults.
    pub fn from_options(options: &MergeOptions) -> Self {
        let short = resolve("shortDelayMs", options.short_delay_ms.as_ref(), DEFAULT_SHORT_DELAY_MS);
        let long = resolve("longDelayMs", options.long_delay_ms.as_ref(), DEFAULT_LONG_DELAY_MS);
        let cleanup = resolve("cleanupDelayMs", options.cleanup_delay_ms.as_ref(), short.saturating_mul(2));

        Self {
            short_delay: Duration::from_millis(short),
            long_delay: Duration::from_millis(long),
            cleanup_delay: Duration::from_millis(cleanup),
        }
    }

    /// Parse options from a JSON object such as `{"shortDelayMs": 250}`.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(Self::from_options(&MergeOptions::from_json_str(json)?))
    }

    /// Read options from a JSON file.
    pub fn read_from_file(path: &Path) -> Result<Self> {
        Ok(Self::from_options(&MergeOptions::read_from_file(path)?))
    }
}

impl MergeOptions {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse merge options")
    }

    pub fn read_from_file(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_json_str(&json)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }
}
