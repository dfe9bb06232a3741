//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`BrainSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `BRAIN_*` environment overrides
//! 4. Validate
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::{BrainSettings, LogFormat};

/// Resolve the default settings file (`~/.brain/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".brain").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<BrainSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides, then validate.
///
/// A missing file yields defaults. A file with invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<BrainSettings> {
    let settings = read_settings(path)?;
    settings.validate()?;
    Ok(settings)
}

/// Like [`load_settings_from_path`] but without validation, for callers that
/// layer further overrides on top and validate the final result themselves.
pub fn read_settings(path: &Path) -> Result<BrainSettings> {
    let mut settings = read_settings_file(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

fn read_settings_file(path: &Path) -> Result<BrainSettings> {
    let defaults = serde_json::to_value(BrainSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `BRAIN_*` environment variable overrides.
pub fn apply_env_overrides(settings: &mut BrainSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`.
///
/// Invalid values are ignored with a warning and the file/default value is
/// kept.
pub fn apply_overrides<F>(settings: &mut BrainSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let read = |name: &str| lookup(name).filter(|v| !v.is_empty());

    if let Some(v) = read("BRAIN_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read("BRAIN_PORT") {
        match parse_u64_range(&v, 1, u64::from(u16::MAX)).and_then(|p| u16::try_from(p).ok()) {
            Some(port) => settings.server.port = port,
            None => warn_invalid("BRAIN_PORT", &v),
        }
    }
    if let Some(v) = read("BRAIN_ROBOT_TIMEOUT_MS") {
        match parse_u64_range(&v, 1, 600_000) {
            Some(ms) => settings.session.robot_timeout_ms = ms,
            None => warn_invalid("BRAIN_ROBOT_TIMEOUT_MS", &v),
        }
    }
    if let Some(v) = read("BRAIN_SEND_QUEUE") {
        match parse_u64_range(&v, 1, 65_536).and_then(|n| usize::try_from(n).ok()) {
            Some(n) => settings.session.send_queue = n,
            None => warn_invalid("BRAIN_SEND_QUEUE", &v),
        }
    }
    if let Some(v) = read("BRAIN_HEARTBEAT_SECS") {
        match parse_u64_range(&v, 1, 3_600) {
            Some(secs) => settings.session.heartbeat_interval_secs = secs,
            None => warn_invalid("BRAIN_HEARTBEAT_SECS", &v),
        }
    }
    if let Some(v) = read("BRAIN_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read("BRAIN_LOG_FORMAT") {
        match parse_log_format(&v) {
            Some(format) => settings.logging.format = format,
            None => warn_invalid("BRAIN_LOG_FORMAT", &v),
        }
    }
}

/// Parse a string as a `u64` within an inclusive range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse `json` / `pretty`, case-insensitively.
pub fn parse_log_format(val: &str) -> Option<LogFormat> {
    match val.trim().to_lowercase().as_str() {
        "json" => Some(LogFormat::Json),
        "pretty" | "text" => Some(LogFormat::Pretty),
        _ => None,
    }
}

fn warn_invalid(key: &str, value: &str) {
    tracing::warn!(key, value, "invalid env var, ignoring");
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
