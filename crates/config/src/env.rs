//! Environment variable parsing and env-to-config merging.
//!
//! Env parsing is strict: a variable that is present but empty or malformed
//! fails the load instead of being ignored.

use crate::schema::{HistoryKeyKind, InstrumentationConfig, LogLevelSetting, ValidatedConfig};
use callmeter_shared::{ErrorCode, ErrorEnvelope, REDACTED_VALUE, is_secret_key};
use std::collections::BTreeMap;
use std::fmt;

/// Env var: metric validity window in milliseconds.
pub const ENV_METRICS_WINDOW_MS: &str = "CALLMETER_METRICS_WINDOW_MS";
/// Env var: dispatcher component key.
pub const ENV_DISPATCHER_COMPONENT_KEY: &str = "CALLMETER_DISPATCHER_COMPONENT_KEY";
/// Env var: per-user key prefix.
pub const ENV_DISPATCHER_USER_PREFIX: &str = "CALLMETER_DISPATCHER_USER_PREFIX";
/// Env var: anonymous user marker.
pub const ENV_DISPATCHER_ANONYMOUS_USER: &str = "CALLMETER_DISPATCHER_ANONYMOUS_USER";
/// Env var: concatenation cache inner-map cap.
pub const ENV_CACHES_CONCAT_INNER_CAP: &str = "CALLMETER_CACHES_CONCAT_INNER_CAP";
/// Env var: history buffer depth.
pub const ENV_CACHES_HISTORY_SIZE: &str = "CALLMETER_CACHES_HISTORY_SIZE";
/// Env var: history key strategy (`numeric` or `lexicalTimestamp`).
pub const ENV_CACHES_HISTORY_KEY: &str = "CALLMETER_CACHES_HISTORY_KEY";
/// Env var: comma-separated timer client names.
pub const ENV_SINKS: &str = "CALLMETER_SINKS";
/// Env var: minimum log level.
pub const ENV_LOG_LEVEL: &str = "CALLMETER_LOG_LEVEL";
/// Env var: JSON log output.
pub const ENV_LOG_JSON: &str = "CALLMETER_LOG_JSON";

const ALL_ENV_VARS: [&str; 10] = [
    ENV_METRICS_WINDOW_MS,
    ENV_DISPATCHER_COMPONENT_KEY,
    ENV_DISPATCHER_USER_PREFIX,
    ENV_DISPATCHER_ANONYMOUS_USER,
    ENV_CACHES_CONCAT_INNER_CAP,
    ENV_CACHES_HISTORY_SIZE,
    ENV_CACHES_HISTORY_KEY,
    ENV_SINKS,
    ENV_LOG_LEVEL,
    ENV_LOG_JSON,
];

const SINKS_CSV_MAX: usize = 64;

/// Parsed env overrides. `None` means "not set".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstrumentationEnv {
    /// `CALLMETER_METRICS_WINDOW_MS`.
    pub metrics_window_ms: Option<u64>,
    /// `CALLMETER_DISPATCHER_COMPONENT_KEY`.
    pub dispatcher_component_key: Option<Box<str>>,
    /// `CALLMETER_DISPATCHER_USER_PREFIX`.
    pub dispatcher_user_prefix: Option<Box<str>>,
    /// `CALLMETER_DISPATCHER_ANONYMOUS_USER`.
    pub dispatcher_anonymous_user: Option<Box<str>>,
    /// `CALLMETER_CACHES_CONCAT_INNER_CAP`.
    pub caches_concat_inner_cap: Option<u32>,
    /// `CALLMETER_CACHES_HISTORY_SIZE`.
    pub caches_history_size: Option<u32>,
    /// `CALLMETER_CACHES_HISTORY_KEY`.
    pub caches_history_key: Option<HistoryKeyKind>,
    /// `CALLMETER_SINKS`.
    pub sinks: Option<Vec<Box<str>>>,
    /// `CALLMETER_LOG_LEVEL`.
    pub log_level: Option<LogLevelSetting>,
    /// `CALLMETER_LOG_JSON`.
    pub log_json: Option<bool>,
}

impl InstrumentationEnv {
    /// Parse env overrides from a key/value map (useful for tests and fixtures).
    pub fn from_map(map: &BTreeMap<String, String>) -> Result<Self, EnvParseError> {
        Ok(Self {
            metrics_window_ms: parse_optional_u64(map, ENV_METRICS_WINDOW_MS)?,
            dispatcher_component_key: parse_optional_trimmed_string(
                map,
                ENV_DISPATCHER_COMPONENT_KEY,
            )?,
            dispatcher_user_prefix: parse_optional_trimmed_string(
                map,
                ENV_DISPATCHER_USER_PREFIX,
            )?,
            dispatcher_anonymous_user: parse_optional_trimmed_string(
                map,
                ENV_DISPATCHER_ANONYMOUS_USER,
            )?,
            caches_concat_inner_cap: parse_optional_u32(map, ENV_CACHES_CONCAT_INNER_CAP)?,
            caches_history_size: parse_optional_u32(map, ENV_CACHES_HISTORY_SIZE)?,
            caches_history_key: parse_optional_enum(
                map,
                ENV_CACHES_HISTORY_KEY,
                HistoryKeyKind::parse,
            )?,
            sinks: parse_optional_csv(map, ENV_SINKS)?,
            log_level: parse_optional_enum(map, ENV_LOG_LEVEL, LogLevelSetting::parse)?,
            log_json: parse_optional_bool(map, ENV_LOG_JSON)?,
        })
    }

    /// Parse env overrides from the current process environment.
    pub fn from_std_env() -> Result<Self, EnvParseError> {
        let map: BTreeMap<String, String> = ALL_ENV_VARS
            .iter()
            .filter_map(|name| {
                std::env::var(name)
                    .ok()
                    .map(|value| ((*name).to_string(), value))
            })
            .collect();
        Self::from_map(&map)
    }
}

/// Apply env overrides to a base config (env wins over file/default values).
pub fn apply_env_overrides(
    base: InstrumentationConfig,
    env: &InstrumentationEnv,
) -> Result<ValidatedConfig, ErrorEnvelope> {
    let mut config = base;

    if let Some(window_ms) = env.metrics_window_ms {
        config.metrics.window_ms = window_ms;
    }
    if let Some(component_key) = &env.dispatcher_component_key {
        config.dispatcher.component_key = component_key.to_string();
    }
    if let Some(user_prefix) = &env.dispatcher_user_prefix {
        config.dispatcher.user_prefix = user_prefix.to_string();
    }
    if let Some(anonymous_user) = &env.dispatcher_anonymous_user {
        config.dispatcher.anonymous_user = anonymous_user.to_string();
    }
    if let Some(cap) = env.caches_concat_inner_cap {
        config.caches.concat_inner_cap = cap;
    }
    if let Some(size) = env.caches_history_size {
        config.caches.history_size = size;
    }
    if let Some(history_key) = env.caches_history_key {
        config.caches.history_key = history_key;
    }
    if let Some(sinks) = &env.sinks {
        config.sinks = sinks.iter().map(ToString::to_string).collect();
    }
    if let Some(level) = env.log_level {
        config.logging.level = level;
    }
    if let Some(json) = env.log_json {
        config.logging.json = json;
    }

    config.validate_and_normalize().map_err(Into::into)
}

/// Validation failures when parsing env variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvParseError {
    /// An env var was present but empty after trimming.
    EmptyValue {
        /// Env var name.
        var: &'static str,
    },
    /// Boolean env var had an invalid value.
    InvalidBool {
        /// Env var name.
        var: &'static str,
        /// Raw input value.
        value: String,
    },
    /// Integer env var had an invalid value.
    InvalidInt {
        /// Env var name.
        var: &'static str,
        /// Raw input value.
        value: String,
    },
    /// Enum env var had an invalid value.
    InvalidEnum {
        /// Env var name.
        var: &'static str,
        /// Raw input value.
        value: String,
    },
    /// CSV list exceeds a safety limit.
    CsvTooLarge {
        /// Env var name.
        var: &'static str,
        /// Number of parsed items.
        len: usize,
        /// Maximum allowed.
        max: usize,
    },
}

impl EnvParseError {
    fn error_code(&self) -> ErrorCode {
        match self {
            Self::EmptyValue { .. } => ErrorCode::new("config", "empty_env_var"),
            Self::InvalidBool { .. } => ErrorCode::new("config", "invalid_env_bool"),
            Self::InvalidInt { .. } => ErrorCode::new("config", "invalid_env_int"),
            Self::InvalidEnum { .. } => ErrorCode::new("config", "invalid_env_enum"),
            Self::CsvTooLarge { .. } => ErrorCode::new("config", "invalid_env_csv"),
        }
    }
}

impl fmt::Display for EnvParseError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyValue { var } => write!(formatter, "{var} must be non-empty"),
            Self::InvalidBool { var, .. } => write!(formatter, "{var} must be a boolean"),
            Self::InvalidInt { var, .. } => write!(formatter, "{var} must be an integer"),
            Self::InvalidEnum { var, .. } => write!(formatter, "{var} has an unsupported value"),
            Self::CsvTooLarge { var, len, max } => {
                write!(formatter, "{var} is too large ({len} items, max {max})")
            },
        }
    }
}

impl std::error::Error for EnvParseError {}

impl From<EnvParseError> for ErrorEnvelope {
    fn from(error: EnvParseError) -> Self {
        let code = error.error_code();
        let message = error.to_string();
        let envelope = Self::expected(code, message);

        match error {
            EnvParseError::EmptyValue { var } => envelope.with_metadata("env_var", var),
            EnvParseError::InvalidBool { var, value }
            | EnvParseError::InvalidInt { var, value }
            | EnvParseError::InvalidEnum { var, value } => envelope
                .with_metadata("env_var", var)
                .with_metadata("value", redact_value(var, &value)),
            EnvParseError::CsvTooLarge { var, len, max } => envelope
                .with_metadata("env_var", var)
                .with_metadata("len", len.to_string())
                .with_metadata("max", max.to_string()),
        }
    }
}

fn redact_value(var: &str, value: &str) -> String {
    if is_secret_key(var) {
        REDACTED_VALUE.to_string()
    } else {
        value.to_string()
    }
}

fn parse_optional_trimmed_string(
    map: &BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<Box<str>>, EnvParseError> {
    let Some(raw) = map.get(var) else {
        return Ok(None);
    };

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(EnvParseError::EmptyValue { var });
    }

    Ok(Some(trimmed.to_owned().into_boxed_str()))
}

fn parse_optional_u64(
    map: &BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<u64>, EnvParseError> {
    let Some(raw) = map.get(var) else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(EnvParseError::EmptyValue { var });
    }

    trimmed
        .parse::<u64>()
        .map(Some)
        .map_err(|_| EnvParseError::InvalidInt {
            var,
            value: raw.clone(),
        })
}

fn parse_optional_u32(
    map: &BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<u32>, EnvParseError> {
    let Some(raw) = map.get(var) else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(EnvParseError::EmptyValue { var });
    }

    trimmed
        .parse::<u32>()
        .map(Some)
        .map_err(|_| EnvParseError::InvalidInt {
            var,
            value: raw.clone(),
        })
}

fn parse_optional_bool(
    map: &BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<bool>, EnvParseError> {
    let Some(raw) = map.get(var) else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(EnvParseError::EmptyValue { var });
    }

    match trimmed.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(Some(true)),
        "false" | "0" | "no" | "off" => Ok(Some(false)),
        _ => Err(EnvParseError::InvalidBool {
            var,
            value: raw.clone(),
        }),
    }
}

fn parse_optional_enum<T>(
    map: &BTreeMap<String, String>,
    var: &'static str,
    parse: impl FnOnce(&str) -> Option<T>,
) -> Result<Option<T>, EnvParseError> {
    let Some(raw) = map.get(var) else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(EnvParseError::EmptyValue { var });
    }

    parse(trimmed).map(Some).ok_or_else(|| EnvParseError::InvalidEnum {
        var,
        value: raw.clone(),
    })
}

fn parse_optional_csv(
    map: &BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<Vec<Box<str>>>, EnvParseError> {
    let Some(raw) = map.get(var) else {
        return Ok(None);
    };

    let items: Vec<Box<str>> = raw
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(Into::into)
        .collect();
    if items.is_empty() {
        return Err(EnvParseError::EmptyValue { var });
    }
    if items.len() > SINKS_CSV_MAX {
        return Err(EnvParseError::CsvTooLarge {
            var,
            len: items.len(),
            max: SINKS_CSV_MAX,
        });
    }
    Ok(Some(items))
}
