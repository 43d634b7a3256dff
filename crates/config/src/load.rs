//! Config loading helpers (env + file + overrides).
//!
//! The loader is responsible for deterministic merge order and surfacing
//! user-facing errors as typed `ErrorEnvelope`s.

use crate::{
    HistoryKeyKind, InstrumentationConfig, InstrumentationEnv, LogLevelSetting, ValidatedConfig,
    apply_env_overrides,
};
use callmeter_shared::{ErrorCode, ErrorEnvelope};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigFormat {
    Json,
    Toml,
}

/// Load the config from sources using a deterministic precedence order.
///
/// Precedence (highest wins):
/// - env overrides (`InstrumentationEnv`)
/// - overrides JSON (partial config)
/// - config JSON (file content)
/// - defaults (`InstrumentationConfig::default()`)
pub fn load_config_from_sources(
    config_json: Option<&str>,
    overrides_json: Option<&str>,
    env: &InstrumentationEnv,
) -> Result<ValidatedConfig, ErrorEnvelope> {
    let mut config = match config_json {
        None => InstrumentationConfig::default(),
        Some(input) => parse_config_unvalidated(input, ConfigFormat::Json)?,
    };

    if let Some(input) = overrides_json {
        let overrides = parse_overrides_json(input)?;
        apply_overrides(&mut config, overrides);
    }

    // env is applied last and also validates/normalizes the resulting config.
    apply_env_overrides(config, env)
}

/// Load the config from an optional file path (`.json` or `.toml`).
pub fn load_config_from_path(
    config_path: Option<&Path>,
    overrides_json: Option<&str>,
    env: &InstrumentationEnv,
) -> Result<ValidatedConfig, ErrorEnvelope> {
    let mut config = match config_path {
        None => InstrumentationConfig::default(),
        Some(path) => {
            let config_text = read_config_file(path)?;
            let format = detect_config_format(path)?;
            parse_config_unvalidated(&config_text, format)?
        },
    };

    if let Some(input) = overrides_json {
        let overrides = parse_overrides_json(input)?;
        apply_overrides(&mut config, overrides);
    }

    let validated = apply_env_overrides(config, env)?;
    tracing::debug!(
        path = ?config_path,
        window_ms = validated.metrics.window_ms,
        sinks = validated.sinks.len(),
        "instrumentation config loaded"
    );
    Ok(validated)
}

/// Load the config from std env and an optional file path.
pub fn load_config_std_env(
    config_path: Option<&Path>,
    overrides_json: Option<&str>,
) -> Result<ValidatedConfig, ErrorEnvelope> {
    let env = InstrumentationEnv::from_std_env().map_err(ErrorEnvelope::from)?;
    load_config_from_path(config_path, overrides_json, &env)
}

/// Serialize the config as deterministic pretty JSON (with trailing newline).
pub fn to_pretty_json(config: &InstrumentationConfig) -> Result<String, ErrorEnvelope> {
    let mut output = serde_json::to_string_pretty(config).map_err(|error| {
        ErrorEnvelope::unexpected(
            ErrorCode::internal(),
            format!("failed to serialize config: {error}"),
        )
    })?;
    output.push('\n');
    Ok(output)
}

/// Serialize the config as deterministic pretty TOML (with trailing newline).
pub fn to_pretty_toml(config: &InstrumentationConfig) -> Result<String, ErrorEnvelope> {
    let mut output = toml::to_string_pretty(config).map_err(|error| {
        ErrorEnvelope::unexpected(
            ErrorCode::new("config", "serialize_toml"),
            format!("failed to serialize config TOML: {error}"),
        )
    })?;
    output.push('\n');
    Ok(output)
}

fn parse_config_unvalidated(
    input: &str,
    format: ConfigFormat,
) -> Result<InstrumentationConfig, ErrorEnvelope> {
    match format {
        ConfigFormat::Json => serde_json::from_str(input).map_err(|error| {
            ErrorEnvelope::expected(
                ErrorCode::new("config", "invalid_json"),
                format!("invalid config JSON: {error}"),
            )
            .with_metadata("source", "config")
        }),
        ConfigFormat::Toml => toml::from_str(input).map_err(|error| {
            ErrorEnvelope::expected(
                ErrorCode::new("config", "invalid_toml"),
                format!("invalid config TOML: {error}"),
            )
            .with_metadata("source", "config")
        }),
    }
}

fn parse_overrides_json(input: &str) -> Result<ConfigOverrides, ErrorEnvelope> {
    serde_json::from_str(input).map_err(|error| {
        ErrorEnvelope::expected(
            ErrorCode::new("config", "invalid_json"),
            format!("invalid overrides JSON: {error}"),
        )
        .with_metadata("source", "overrides")
    })
}

fn read_config_file(path: &Path) -> Result<String, ErrorEnvelope> {
    std::fs::read_to_string(path).map_err(|error| {
        let code = match error.kind() {
            std::io::ErrorKind::NotFound => ErrorCode::new("config", "config_file_not_found"),
            std::io::ErrorKind::PermissionDenied => {
                ErrorCode::new("config", "config_file_permission_denied")
            },
            _ => ErrorCode::new("config", "config_file_io"),
        };

        ErrorEnvelope::expected(code, format!("failed to read config file: {error}"))
            .with_metadata("path", path.to_string_lossy().to_string())
    })
}

fn detect_config_format(path: &Path) -> Result<ConfigFormat, ErrorEnvelope> {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        None | Some("json") => Ok(ConfigFormat::Json),
        Some("toml") => Ok(ConfigFormat::Toml),
        Some(other) => Err(ErrorEnvelope::expected(
            ErrorCode::new("config", "unsupported_format"),
            "unsupported config format; use .json or .toml",
        )
        .with_metadata("extension", other.to_string())),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
struct ConfigOverrides {
    version: Option<u32>,
    metrics: MetricsOverrides,
    dispatcher: DispatcherOverrides,
    caches: CacheOverrides,
    sinks: Option<Vec<String>>,
    logging: LoggingOverrides,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
struct MetricsOverrides {
    window_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
struct DispatcherOverrides {
    component_key: Option<String>,
    user_prefix: Option<String>,
    anonymous_user: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
struct CacheOverrides {
    concat_inner_cap: Option<u32>,
    history_size: Option<u32>,
    history_key: Option<HistoryKeyKind>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
struct LoggingOverrides {
    level: Option<LogLevelSetting>,
    json: Option<bool>,
}

fn set_if_some<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

fn apply_overrides(config: &mut InstrumentationConfig, overrides: ConfigOverrides) {
    set_if_some(&mut config.version, overrides.version);
    set_if_some(&mut config.metrics.window_ms, overrides.metrics.window_ms);

    let dispatcher = overrides.dispatcher;
    set_if_some(&mut config.dispatcher.component_key, dispatcher.component_key);
    set_if_some(&mut config.dispatcher.user_prefix, dispatcher.user_prefix);
    set_if_some(&mut config.dispatcher.anonymous_user, dispatcher.anonymous_user);

    let caches = overrides.caches;
    set_if_some(&mut config.caches.concat_inner_cap, caches.concat_inner_cap);
    set_if_some(&mut config.caches.history_size, caches.history_size);
    set_if_some(&mut config.caches.history_key, caches.history_key);

    set_if_some(&mut config.sinks, overrides.sinks);
    set_if_some(&mut config.logging.level, overrides.logging.level);
    set_if_some(&mut config.logging.json, overrides.logging.json);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_precedence_is_deterministic() -> Result<(), Box<dyn std::error::Error>> {
        let config_json = r#"{
          "version": 1,
          "metrics": { "windowMs": 4000 }
        }"#;

        let overrides_json = r#"{
          "metrics": { "windowMs": 5000 },
          "sinks": ["default", "audit"]
        }"#;

        let env = InstrumentationEnv {
            metrics_window_ms: Some(6000),
            ..InstrumentationEnv::default()
        };

        let config = load_config_from_sources(Some(config_json), Some(overrides_json), &env)?;
        assert_eq!(config.metrics.window_ms, 6000);
        assert_eq!(config.sinks, vec!["default".to_string(), "audit".to_string()]);
        Ok(())
    }

    #[test]
    fn invalid_file_value_overridden_by_valid_env_succeeds()
    -> Result<(), Box<dyn std::error::Error>> {
        let config_json = r#"{ "caches": { "historySize": 0 } }"#;
        let env = InstrumentationEnv {
            caches_history_size: Some(4),
            ..InstrumentationEnv::default()
        };

        let config = load_config_from_sources(Some(config_json), None, &env)?;
        assert_eq!(config.caches.history_size, 4);
        Ok(())
    }

    #[test]
    fn unknown_override_fields_are_rejected() {
        let env = InstrumentationEnv::default();
        let error =
            load_config_from_sources(None, Some(r#"{ "caches": { "size": 1 } }"#), &env).err();
        assert_eq!(
            error.as_ref().map(|error| error.code.clone()),
            Some(ErrorCode::new("config", "invalid_json"))
        );
        assert_eq!(
            error.and_then(|error| error.metadata.get("source").cloned()),
            Some("overrides".to_string())
        );
    }

    #[test]
    fn serialization_is_deterministic() -> Result<(), Box<dyn std::error::Error>> {
        let env = InstrumentationEnv::default();
        let config = load_config_from_sources(None, None, &env)?;
        let first = to_pretty_json(&config)?;
        let second = to_pretty_json(&config)?;
        assert_eq!(first, second);
        assert!(first.ends_with('\n'));

        let toml = to_pretty_toml(&config)?;
        assert!(toml.contains("windowMs = 15000"));
        Ok(())
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let env = InstrumentationEnv::default();
        let error =
            load_config_from_path(Some(Path::new("/nonexistent/callmeter.yaml")), None, &env).err();
        // The read fails before format detection.
        assert_eq!(
            error.map(|error| error.code),
            Some(ErrorCode::new("config", "config_file_not_found"))
        );
        assert!(detect_config_format(Path::new("a.yaml")).is_err());
        assert_eq!(
            detect_config_format(Path::new("a.TOML")).ok(),
            Some(ConfigFormat::Toml)
        );
    }
}
