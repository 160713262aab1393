//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`LogbookSettings::default()`]
//! 2. If a settings file is present, deep-merge its values over defaults
//! 3. Apply `LOGBOOK_*` environment overrides (highest priority)
//! 4. Validate the result
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::LogbookSettings;

/// Env var naming an explicit settings file. When set, the file must exist.
pub const SETTINGS_PATH_ENV: &str = "LOGBOOK_SETTINGS";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Resolve the default settings file path (`~/.logbook/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".logbook").join("settings.json")
}

/// Load settings from `LOGBOOK_SETTINGS` if set, else from the default path.
pub fn load_settings() -> Result<LogbookSettings> {
    match read_env_string(SETTINGS_PATH_ENV) {
        Some(path) => load_settings_from_file(Path::new(&path)),
        None => load_settings_from_path(&settings_path()),
    }
}

/// Load settings from a path that may be absent (absent means defaults).
pub fn load_settings_from_path(path: &Path) -> Result<LogbookSettings> {
    load_with(path, false, env_lookup)
}

/// Load settings from a file that must exist.
pub fn load_settings_from_file(path: &Path) -> Result<LogbookSettings> {
    load_with(path, true, env_lookup)
}

fn env_lookup(name: &str) -> Option<String> {
    read_env_string(name)
}

fn load_with<F>(path: &Path, required: bool, lookup: F) -> Result<LogbookSettings>
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = serde_json::to_value(LogbookSettings::default())?;

    let merged = if required || path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: LogbookSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings, lookup)?;
    validate(&settings)?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `LOGBOOK_*` overrides read through `lookup`.
///
/// A variable that is set but does not parse is an error, not a fallback.
pub fn apply_env_overrides<F>(settings: &mut LogbookSettings, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    // ── Cluster ─────────────────────────────────────────────────────
    if let Some(v) = lookup("LOGBOOK_CONTACT_POINTS") {
        settings.cluster.contact_points = parse_list(&v);
    }
    if let Some(v) = lookup("LOGBOOK_PORT") {
        settings.cluster.port = parse_u16_range(&v, 1, 65535)
            .ok_or_else(|| invalid("LOGBOOK_PORT", &v))?;
    }
    if let Some(v) = lookup("LOGBOOK_KEYSPACE") {
        settings.cluster.keyspace = v;
    }
    if let Some(v) = lookup("LOGBOOK_USERNAME") {
        settings.cluster.username = Some(v);
    }
    if let Some(v) = lookup("LOGBOOK_PASSWORD") {
        settings.cluster.password = Some(v);
    }
    if let Some(v) = lookup("LOGBOOK_CONNECT_TIMEOUT_MS") {
        settings.cluster.connect_timeout_ms = parse_u64_range(&v, 1, 600_000)
            .ok_or_else(|| invalid("LOGBOOK_CONNECT_TIMEOUT_MS", &v))?;
    }
    if let Some(v) = lookup("LOGBOOK_CREATE_SCHEMA") {
        settings.cluster.create_schema =
            parse_bool(&v).ok_or_else(|| invalid("LOGBOOK_CREATE_SCHEMA", &v))?;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = lookup("LOGBOOK_LOG_LEVEL") {
        settings.logging.level = v.to_lowercase();
    }
    if let Some(v) = lookup("LOGBOOK_LOG_JSON") {
        settings.logging.json = parse_bool(&v).ok_or_else(|| invalid("LOGBOOK_LOG_JSON", &v))?;
    }
    Ok(())
}

/// Reject settings the connection provider could not use.
pub fn validate(settings: &LogbookSettings) -> Result<()> {
    let cluster = &settings.cluster;
    if cluster.contact_points.is_empty() || cluster.contact_points.iter().any(|h| h.trim().is_empty()) {
        return Err(SettingsError::InvalidValue(
            "cluster.contactPoints must list at least one non-empty host".into(),
        ));
    }
    if cluster.port == 0 {
        return Err(SettingsError::InvalidValue("cluster.port must be non-zero".into()));
    }
    if !is_identifier(&cluster.keyspace) {
        return Err(SettingsError::InvalidValue(format!(
            "cluster.keyspace is not a valid keyspace name: {:?}",
            cluster.keyspace
        )));
    }
    if cluster.connect_timeout_ms == 0 {
        return Err(SettingsError::InvalidValue(
            "cluster.connectTimeoutMs must be non-zero".into(),
        ));
    }
    let levels = std::iter::once(&settings.logging.level).chain(settings.logging.modules.values());
    for level in levels {
        if !LOG_LEVELS.contains(&level.to_lowercase().as_str()) {
            return Err(SettingsError::InvalidValue(format!("unknown log level: {level}")));
        }
    }
    Ok(())
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

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Split a comma-separated list, dropping blanks.
pub fn parse_list(val: &str) -> Vec<String> {
    val.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Keyspace names: a letter, then up to 47 letters, digits or underscores.
fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && name.len() <= 48
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn invalid(key: &str, value: &str) -> SettingsError {
    SettingsError::InvalidValue(format!("{key}={value:?}"))
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::collections::HashMap;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"cluster": {"port": 9142, "keyspace": "test"}});
        let source = serde_json::json!({"cluster": {"port": 9042}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["cluster"]["port"], 9042);
        assert_eq!(merged["cluster"]["keyspace"], "test");
    }

    #[test]
    fn merge_array_replace() {
        let target = serde_json::json!({"hosts": ["a", "b", "c"]});
        let source = serde_json::json!({"hosts": ["d"]});
        assert_eq!(deep_merge(target, source)["hosts"], serde_json::json!(["d"]));
    }

    #[test]
    fn merge_null_preserves_target() {
        let target = serde_json::json!({"a": 1, "b": 2});
        let source = serde_json::json!({"a": null});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    // ── file loading ────────────────────────────────────────────────

    #[test]
    fn missing_optional_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_with(&dir.path().join("absent.json"), false, no_env).unwrap();
        assert_eq!(settings, LogbookSettings::default());
    }

    #[test]
    fn missing_required_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_with(&dir.path().join("absent.json"), true, no_env);
        assert_matches!(result, Err(SettingsError::Io(_)));
    }

    #[test]
    fn file_values_merge_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"cluster": {"contactPoints": ["10.0.0.5", "10.0.0.6"], "keyspace": "logins"}}"#,
        )
        .unwrap();

        let settings = load_with(&path, true, no_env).unwrap();
        assert_eq!(settings.cluster.contact_points, vec!["10.0.0.5", "10.0.0.6"]);
        assert_eq!(settings.cluster.keyspace, "logins");
        // untouched keys keep their defaults
        assert_eq!(settings.cluster.port, 9142);
        assert_eq!(settings.logging.level, "info");
    }

    #[test]
    fn invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert_matches!(load_with(&path, false, no_env), Err(SettingsError::Json(_)));
    }

    #[test]
    fn wrong_value_type_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"cluster": {"port": "ninety"}}"#).unwrap();
        assert_matches!(load_with(&path, false, no_env), Err(SettingsError::Json(_)));
    }

    // ── env overrides ───────────────────────────────────────────────

    #[test]
    fn env_overrides_win_over_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"cluster": {"port": 9042, "keyspace": "file_ks"}}"#).unwrap();

        let env = env_from(&[
            ("LOGBOOK_PORT", "19042"),
            ("LOGBOOK_CONTACT_POINTS", "node1, node2,,"),
            ("LOGBOOK_CREATE_SCHEMA", "yes"),
            ("LOGBOOK_LOG_LEVEL", "DEBUG"),
            ("LOGBOOK_LOG_JSON", "on"),
        ]);
        let settings = load_with(&path, true, env).unwrap();
        assert_eq!(settings.cluster.port, 19042);
        assert_eq!(settings.cluster.keyspace, "file_ks");
        assert_eq!(settings.cluster.contact_points, vec!["node1", "node2"]);
        assert!(settings.cluster.create_schema);
        assert_eq!(settings.logging.level, "debug");
        assert!(settings.logging.json);
    }

    #[test]
    fn credentials_pass_through() {
        let mut settings = LogbookSettings::default();
        let env = env_from(&[("LOGBOOK_USERNAME", "app"), ("LOGBOOK_PASSWORD", "s3cret")]);
        apply_env_overrides(&mut settings, env).unwrap();
        assert_eq!(settings.cluster.credentials(), Some(("app", "s3cret")));
    }

    #[test]
    fn invalid_override_is_an_error() {
        let mut settings = LogbookSettings::default();
        let result = apply_env_overrides(&mut settings, env_from(&[("LOGBOOK_PORT", "0")]));
        assert_matches!(result, Err(SettingsError::InvalidValue(msg)) if msg.contains("LOGBOOK_PORT"));

        let result = apply_env_overrides(&mut settings, env_from(&[("LOGBOOK_LOG_JSON", "maybe")]));
        assert_matches!(result, Err(SettingsError::InvalidValue(_)));
    }

    // ── validation ──────────────────────────────────────────────────

    #[test]
    fn validate_rejects_empty_contact_points() {
        let mut settings = LogbookSettings::default();
        settings.cluster.contact_points.clear();
        assert_matches!(validate(&settings), Err(SettingsError::InvalidValue(_)));
    }

    #[test]
    fn validate_rejects_bad_keyspace() {
        for ks in ["", "1test", "my-keyspace", "drop table"] {
            let mut settings = LogbookSettings::default();
            settings.cluster.keyspace = ks.to_string();
            assert!(validate(&settings).is_err(), "accepted keyspace {ks:?}");
        }
    }

    #[test]
    fn validate_rejects_unknown_level() {
        let mut settings = LogbookSettings::default();
        settings.logging.modules.insert("scylla".into(), "loud".into());
        assert_matches!(validate(&settings), Err(SettingsError::InvalidValue(msg)) if msg.contains("loud"));
    }

    #[test]
    fn defaults_are_valid() {
        assert!(validate(&LogbookSettings::default()).is_ok());
    }

    // ── pure parsers ────────────────────────────────────────────────

    #[test]
    fn parse_bool_variants() {
        for t in ["true", "1", "YES", "On"] {
            assert_eq!(parse_bool(t), Some(true));
        }
        for f in ["false", "0", "no", "OFF"] {
            assert_eq!(parse_bool(f), Some(false));
        }
        assert_eq!(parse_bool("2"), None);
    }

    #[test]
    fn parse_ranges() {
        assert_eq!(parse_u16_range("9042", 1, 65535), Some(9042));
        assert_eq!(parse_u16_range("0", 1, 65535), None);
        assert_eq!(parse_u16_range("70000", 1, 65535), None);
        assert_eq!(parse_u64_range(" 250 ", 1, 1000), Some(250));
        assert_eq!(parse_u64_range("abc", 1, 1000), None);
    }
}
