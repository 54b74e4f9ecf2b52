//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`HarborSettings::default()`]
//! 2. If `~/.harbor/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `HARBOR_*` environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use harbor_core::LineErrorPolicy;
use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::HarborSettings;

/// Resolve the path to the settings file (`~/.harbor/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".harbor").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<HarborSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<HarborSettings> {
    let mut settings = load_file_layers(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

fn load_file_layers(path: &Path) -> Result<HarborSettings> {
    let defaults = serde_json::to_value(HarborSettings::default())?;

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

/// Apply `HARBOR_*` environment variable overrides to loaded settings.
///
/// Invalid values are logged at `warn` and ignored.
pub fn apply_env_overrides(settings: &mut HarborSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply overrides using an arbitrary variable lookup.
///
/// Split out from [`apply_env_overrides`] so tests never touch the process
/// environment.
pub fn apply_overrides_from<F>(settings: &mut HarborSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    // ── Query ───────────────────────────────────────────────────────
    if let Some(v) = env.u32_range("HARBOR_MAX_TURNS", 1, 1_000) {
        settings.query.max_turns = v;
    }
    if let Some(v) = env.string("HARBOR_MODEL") {
        settings.query.model = Some(v);
    }
    if let Some(raw) = env.string("HARBOR_LINE_ERROR_POLICY") {
        match LineErrorPolicy::from_str_loose(&raw) {
            Some(policy) => settings.query.line_error_policy = policy,
            None => {
                tracing::warn!(key = "HARBOR_LINE_ERROR_POLICY", value = %raw, "invalid policy env var, ignoring");
            }
        }
    }

    // ── Sandbox ─────────────────────────────────────────────────────
    if let Some(v) = env.u64_range("HARBOR_SANDBOX_TIMEOUT_MS", 1_000, 86_400_000) {
        settings.sandbox.timeout_ms = v;
    }
    if let Some(v) = env.string("HARBOR_SANDBOX_RUNTIME") {
        settings.sandbox.runtime = v;
    }
    if let Some(v) = env.u32_range("HARBOR_SANDBOX_VCPUS", 1, 64) {
        settings.sandbox.vcpus = v;
    }

    // ── Snapshot ────────────────────────────────────────────────────
    if let Some(v) = env.bool("HARBOR_AUTO_SNAPSHOT") {
        settings.snapshot.auto_snapshot = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("HARBOR_LOG_LEVEL") {
        settings.logging.level = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u32` within a range.
pub fn parse_u32_range(val: &str, min: u32, max: u32) -> Option<u32> {
    let n: u32 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn bool(&self, name: &str) -> Option<bool> {
        let val = (self.lookup)(name)?;
        let result = parse_bool(&val);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        result
    }

    fn u32_range(&self, name: &str, min: u32, max: u32) -> Option<u32> {
        let val = (self.lookup)(name)?;
        let result = parse_u32_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid u32 env var, ignoring");
        }
        result
    }

    fn u64_range(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        let val = (self.lookup)(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
        }
        result
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use serde_json::json;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn deep_merge_objects_recursively() {
        let target = json!({"a": {"b": 1, "c": 2}, "d": 3});
        let source = json!({"a": {"b": 10}});
        assert_eq!(deep_merge(target, source), json!({"a": {"b": 10, "c": 2}, "d": 3}));
    }

    #[test]
    fn deep_merge_replaces_arrays_and_skips_null() {
        let target = json!({"list": [1, 2], "keep": "x"});
        let source = json!({"list": [3], "keep": null});
        assert_eq!(deep_merge(target, source), json!({"list": [3], "keep": "x"}));
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_file_layers(&dir.path().join("nope.json")).unwrap();
        assert_eq!(settings.query.max_turns, 10);
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"query": {"maxTurns": 3, "lineErrorPolicy": "fail"}, "sandbox": {"vcpus": 4}}"#,
        )
        .unwrap();
        let settings = load_file_layers(&path).unwrap();
        assert_eq!(settings.query.max_turns, 3);
        assert_eq!(settings.query.line_error_policy, LineErrorPolicy::Fail);
        assert_eq!(settings.sandbox.vcpus, 4);
        assert_eq!(settings.sandbox.timeout_ms, 600_000);
    }

    #[test]
    fn snapshot_section_has_no_expiry_knob() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"snapshot": {"autoSnapshot": false, "expiryDays": 30}}"#).unwrap();
        let settings = load_file_layers(&path).unwrap();
        assert!(!settings.snapshot.auto_snapshot);

        let written = serde_json::to_value(&settings).unwrap();
        assert_eq!(written["snapshot"], json!({"autoSnapshot": false}));
    }

    #[test]
    fn invalid_json_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(load_file_layers(&path).is_err());
    }

    #[test]
    fn env_overrides_apply() {
        let mut settings = HarborSettings::default();
        apply_overrides_from(
            &mut settings,
            lookup(&[
                ("HARBOR_MAX_TURNS", "4"),
                ("HARBOR_MODEL", "claude-sonnet"),
                ("HARBOR_AUTO_SNAPSHOT", "off"),
                ("HARBOR_LINE_ERROR_POLICY", "Fail"),
                ("HARBOR_SANDBOX_TIMEOUT_MS", "5000"),
            ]),
        );
        assert_eq!(settings.query.max_turns, 4);
        assert_eq!(settings.query.model.as_deref(), Some("claude-sonnet"));
        assert!(!settings.snapshot.auto_snapshot);
        assert_eq!(settings.query.line_error_policy, LineErrorPolicy::Fail);
        assert_eq!(settings.sandbox.timeout_ms, 5000);
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let mut settings = HarborSettings::default();
        apply_overrides_from(
            &mut settings,
            lookup(&[
                ("HARBOR_MAX_TURNS", "0"),
                ("HARBOR_AUTO_SNAPSHOT", "maybe"),
                ("HARBOR_LINE_ERROR_POLICY", "explode"),
                ("HARBOR_MODEL", ""),
            ]),
        );
        assert_eq!(settings.query.max_turns, 10);
        assert!(settings.snapshot.auto_snapshot);
        assert_eq!(settings.query.line_error_policy, LineErrorPolicy::Skip);
        assert!(settings.query.model.is_none());
    }

    #[test]
    fn parse_helpers() {
        assert_eq!(parse_bool("YES"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("nah"), None);
        assert_eq!(parse_u32_range("5", 1, 10), Some(5));
        assert_eq!(parse_u32_range("11", 1, 10), None);
        assert_eq!(parse_u64_range("-1", 0, 10), None);
    }
}
