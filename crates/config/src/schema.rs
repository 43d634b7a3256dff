//! Instrumentation configuration schema, defaults, validation, and normalization.
//!
//! - Deserialization uses `serde` (JSON or TOML).
//! - Validation is manual and returns typed errors mapped to `ErrorEnvelope`.
//! - Normalization trims string fields and sink names.

use callmeter_domain::{ComponentKey, UserId};
use callmeter_shared::{ErrorCode, ErrorEnvelope};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Current supported configuration schema version.
pub const CURRENT_CONFIG_VERSION: u32 = 1;

/// Default validity window of averaged and point metrics.
pub const DEFAULT_WINDOW_MS: u64 = 15_000;
/// Default concatenation cache inner-map cap.
pub const DEFAULT_CONCAT_INNER_CAP: u32 = 10_000;
/// Default history buffer depth.
pub const DEFAULT_HISTORY_SIZE: u32 = 10;
/// Default timer client name.
pub const DEFAULT_SINK_NAME: &str = "default";

const WINDOW_MIN_MS: u64 = 1;
const WINDOW_MAX_MS: u64 = 3_600_000;
const CONCAT_INNER_CAP_MIN: u32 = 1;
const CONCAT_INNER_CAP_MAX: u32 = 1_000_000;
const HISTORY_SIZE_MIN: u32 = 1;
const HISTORY_SIZE_MAX: u32 = 10_000;
const SINKS_MAX: usize = 64;

/// Top-level instrumentation configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct InstrumentationConfig {
    /// Schema version for forward-compatible migrations.
    pub version: u32,
    /// Windowed metric settings.
    pub metrics: MetricsConfig,
    /// Dispatcher key layout.
    pub dispatcher: DispatcherConfig,
    /// Bounded cache settings.
    pub caches: CacheConfig,
    /// Names of the timer clients to build at startup.
    pub sinks: Vec<String>,
    /// Logging settings.
    pub logging: LoggingConfig,
}

impl Default for InstrumentationConfig {
    fn default() -> Self {
        Self {
            version: CURRENT_CONFIG_VERSION,
            metrics: MetricsConfig::default(),
            dispatcher: DispatcherConfig::default(),
            caches: CacheConfig::default(),
            sinks: vec![DEFAULT_SINK_NAME.to_string()],
            logging: LoggingConfig::default(),
        }
    }
}

impl InstrumentationConfig {
    /// Validate and normalize the config.
    pub fn validate_and_normalize(mut self) -> Result<ValidatedConfig, ConfigSchemaError> {
        self.validate_version()?;
        self.metrics.validate()?;
        let (component_key, anonymous_user) = self.dispatcher.normalize_and_validate()?;
        self.caches.validate()?;
        self.sinks = normalize_sinks(self.sinks)?;

        Ok(ValidatedConfig {
            raw: self,
            component_key,
            anonymous_user,
        })
    }

    const fn validate_version(&self) -> Result<(), ConfigSchemaError> {
        if self.version != CURRENT_CONFIG_VERSION {
            return Err(ConfigSchemaError::UnsupportedVersion {
                found: self.version,
                supported: CURRENT_CONFIG_VERSION,
            });
        }
        Ok(())
    }
}

/// Validated config wrapper carrying parsed key segments.
#[derive(Debug, Clone)]
pub struct ValidatedConfig {
    raw: InstrumentationConfig,
    component_key: ComponentKey,
    anonymous_user: UserId,
}

impl ValidatedConfig {
    /// Component segment of every dispatcher key.
    #[must_use]
    pub const fn component_key(&self) -> &ComponentKey {
        &self.component_key
    }

    /// User recorded when no identity can be resolved.
    #[must_use]
    pub const fn anonymous_user(&self) -> &UserId {
        &self.anonymous_user
    }

    /// Borrow the raw config.
    #[must_use]
    pub const fn as_ref(&self) -> &InstrumentationConfig {
        &self.raw
    }

    /// Consume the wrapper and return the raw config.
    #[must_use]
    pub fn into_inner(self) -> InstrumentationConfig {
        self.raw
    }
}

impl AsRef<InstrumentationConfig> for ValidatedConfig {
    fn as_ref(&self) -> &InstrumentationConfig {
        &self.raw
    }
}

impl std::ops::Deref for ValidatedConfig {
    type Target = InstrumentationConfig;

    fn deref(&self) -> &Self::Target {
        &self.raw
    }
}

/// Windowed metric settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct MetricsConfig {
    /// Milliseconds an averaged or point reading stays valid after its last
    /// update.
    pub window_ms: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            window_ms: DEFAULT_WINDOW_MS,
        }
    }
}

impl MetricsConfig {
    const fn validate(&self) -> Result<(), ConfigSchemaError> {
        validate_range_u64(
            "metrics",
            "windowMs",
            self.window_ms,
            WINDOW_MIN_MS,
            WINDOW_MAX_MS,
        )
    }
}

/// Dispatcher key layout settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct DispatcherConfig {
    /// First segment of every operation key.
    pub component_key: String,
    /// Prefix prepended to the user id in per-user keys.
    pub user_prefix: String,
    /// User id recorded when the identity lookup fails or is not configured.
    pub anonymous_user: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            component_key: "server".to_string(),
            user_prefix: "user:".to_string(),
            anonymous_user: "anonymous".to_string(),
        }
    }
}

impl DispatcherConfig {
    fn normalize_and_validate(&mut self) -> Result<(ComponentKey, UserId), ConfigSchemaError> {
        let component_key = ComponentKey::parse(&self.component_key).map_err(|error| {
            ConfigSchemaError::InvalidField {
                section: "dispatcher",
                field: "componentKey",
                reason: error.to_string(),
            }
        })?;
        let anonymous_user = UserId::parse(&self.anonymous_user).map_err(|error| {
            ConfigSchemaError::InvalidField {
                section: "dispatcher",
                field: "anonymousUser",
                reason: error.to_string(),
            }
        })?;
        if self.user_prefix.contains('/') {
            return Err(ConfigSchemaError::InvalidField {
                section: "dispatcher",
                field: "userPrefix",
                reason: "must not contain '/'".to_string(),
            });
        }

        self.component_key = component_key.as_str().to_string();
        self.anonymous_user = anonymous_user.as_str().to_string();
        Ok((component_key, anonymous_user))
    }
}

/// Ordering key strategy for history snapshots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum HistoryKeyKind {
    /// Strictly monotonic numeric key.
    #[default]
    Numeric,
    /// Legacy formatted-timestamp key, compared as text. Can misorder.
    LexicalTimestamp,
}

impl HistoryKeyKind {
    /// Stable identifier matching the serialized form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Numeric => "numeric",
            Self::LexicalTimestamp => "lexicalTimestamp",
        }
    }

    /// Parse the serialized identifier.
    #[must_use]
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim() {
            "numeric" => Some(Self::Numeric),
            "lexicalTimestamp" | "lexical_timestamp" => Some(Self::LexicalTimestamp),
            _ => None,
        }
    }
}

/// Bounded cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct CacheConfig {
    /// Inner-map size above which the concatenation cache clears that map.
    pub concat_inner_cap: u32,
    /// Number of snapshots the history buffer retains.
    pub history_size: u32,
    /// Ordering key strategy for history snapshots.
    pub history_key: HistoryKeyKind,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            concat_inner_cap: DEFAULT_CONCAT_INNER_CAP,
            history_size: DEFAULT_HISTORY_SIZE,
            history_key: HistoryKeyKind::Numeric,
        }
    }
}

impl CacheConfig {
    fn validate(&self) -> Result<(), ConfigSchemaError> {
        validate_range_u64(
            "caches",
            "concatInnerCap",
            u64::from(self.concat_inner_cap),
            u64::from(CONCAT_INNER_CAP_MIN),
            u64::from(CONCAT_INNER_CAP_MAX),
        )?;
        validate_range_u64(
            "caches",
            "historySize",
            u64::from(self.history_size),
            u64::from(HISTORY_SIZE_MIN),
            u64::from(HISTORY_SIZE_MAX),
        )
    }
}

/// Minimum log level accepted by the configured logger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum LogLevelSetting {
    /// Debug and above.
    Debug,
    /// Info and above.
    #[default]
    Info,
    /// Warn and above.
    Warn,
    /// Errors only.
    Error,
}

impl LogLevelSetting {
    /// Lower-case level name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Parse a level name, case-insensitively.
    #[must_use]
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct LoggingConfig {
    /// Minimum level.
    pub level: LogLevelSetting,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

fn normalize_sinks(sinks: Vec<String>) -> Result<Vec<String>, ConfigSchemaError> {
    if sinks.is_empty() {
        return Err(ConfigSchemaError::EmptyList {
            section: "root",
            field: "sinks",
        });
    }
    if sinks.len() > SINKS_MAX {
        return Err(ConfigSchemaError::ListTooLarge {
            section: "root",
            field: "sinks",
            len: sinks.len(),
            max: SINKS_MAX,
        });
    }

    let mut seen = BTreeSet::new();
    let mut normalized = Vec::with_capacity(sinks.len());
    for sink in sinks {
        let trimmed = sink.trim();
        if trimmed.is_empty() {
            return Err(ConfigSchemaError::InvalidField {
                section: "root",
                field: "sinks",
                reason: "sink names must be non-empty".to_string(),
            });
        }
        if !seen.insert(trimmed.to_string()) {
            return Err(ConfigSchemaError::DuplicateEntry {
                section: "root",
                field: "sinks",
                entry: trimmed.to_string(),
            });
        }
        normalized.push(trimmed.to_string());
    }
    Ok(normalized)
}

const fn validate_range_u64(
    section: &'static str,
    field: &'static str,
    value: u64,
    min: u64,
    max: u64,
) -> Result<(), ConfigSchemaError> {
    if value < min || value > max {
        return Err(ConfigSchemaError::ValueOutOfRange {
            section,
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}

/// Parse an instrumentation config from a JSON string, applying validation and
/// normalization.
pub fn parse_config_json(input: &str) -> Result<ValidatedConfig, ErrorEnvelope> {
    let config: InstrumentationConfig = serde_json::from_str(input).map_err(|error| {
        ErrorEnvelope::expected(
            ErrorCode::new("config", "invalid_json"),
            format!("invalid config JSON: {error}"),
        )
    })?;

    config.validate_and_normalize().map_err(Into::into)
}

/// Parse an instrumentation config from a TOML string, applying validation and
/// normalization.
pub fn parse_config_toml(input: &str) -> Result<ValidatedConfig, ErrorEnvelope> {
    let config: InstrumentationConfig = toml::from_str(input).map_err(|error| {
        ErrorEnvelope::expected(
            ErrorCode::new("config", "invalid_toml"),
            format!("invalid config TOML: {error}"),
        )
    })?;

    config.validate_and_normalize().map_err(Into::into)
}

/// Validation failures for the config schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSchemaError {
    /// The config version is not supported.
    UnsupportedVersion {
        /// Version found in the input.
        found: u32,
        /// Supported version.
        supported: u32,
    },
    /// A numeric value is outside the allowed range.
    ValueOutOfRange {
        /// Schema section (e.g. `metrics`).
        section: &'static str,
        /// Field name in the config file (e.g. `windowMs`).
        field: &'static str,
        /// Provided value.
        value: u64,
        /// Minimum allowed value.
        min: u64,
        /// Maximum allowed value.
        max: u64,
    },
    /// A string field failed validation.
    InvalidField {
        /// Schema section.
        section: &'static str,
        /// Field name in the config file.
        field: &'static str,
        /// Human readable reason.
        reason: String,
    },
    /// A list field must have at least one entry.
    EmptyList {
        /// Schema section.
        section: &'static str,
        /// Field name in the config file.
        field: &'static str,
    },
    /// A list field exceeds the maximum allowed size.
    ListTooLarge {
        /// Schema section.
        section: &'static str,
        /// Field name in the config file.
        field: &'static str,
        /// Number of entries.
        len: usize,
        /// Maximum allowed number of entries.
        max: usize,
    },
    /// A list field contains the same entry twice.
    DuplicateEntry {
        /// Schema section.
        section: &'static str,
        /// Field name in the config file.
        field: &'static str,
        /// Repeated entry.
        entry: String,
    },
}

impl ConfigSchemaError {
    fn error_code(&self) -> ErrorCode {
        match self {
            Self::UnsupportedVersion { .. } => ErrorCode::new("config", "unsupported_version"),
            Self::ValueOutOfRange { .. } => ErrorCode::new("config", "invalid_limit"),
            Self::InvalidField { .. } => ErrorCode::new("config", "invalid_field"),
            Self::EmptyList { .. } => ErrorCode::new("config", "empty_list"),
            Self::ListTooLarge { .. } => ErrorCode::new("config", "list_too_large"),
            Self::DuplicateEntry { .. } => ErrorCode::new("config", "duplicate_entry"),
        }
    }
}

impl fmt::Display for ConfigSchemaError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedVersion { found, supported } => {
                write!(
                    formatter,
                    "unsupported config version: {found} (supported: {supported})"
                )
            },
            Self::ValueOutOfRange {
                section,
                field,
                value,
                min,
                max,
            } => write!(
                formatter,
                "{section}.{field} must be within [{min}, {max}] (got {value})"
            ),
            Self::InvalidField {
                section,
                field,
                reason,
            } => write!(formatter, "invalid {section}.{field}: {reason}"),
            Self::EmptyList { section, field } => {
                write!(formatter, "{section}.{field} must have at least one entry")
            },
            Self::ListTooLarge {
                section,
                field,
                len,
                max,
            } => write!(
                formatter,
                "{section}.{field} must have at most {max} entries (got {len})"
            ),
            Self::DuplicateEntry {
                section,
                field,
                entry,
            } => write!(formatter, "{section}.{field} lists `{entry}` more than once"),
        }
    }
}

impl std::error::Error for ConfigSchemaError {}

impl From<ConfigSchemaError> for ErrorEnvelope {
    fn from(error: ConfigSchemaError) -> Self {
        let code = error.error_code();
        let message = error.to_string();
        let envelope = Self::expected(code, message);

        match error {
            ConfigSchemaError::UnsupportedVersion { found, supported } => envelope
                .with_metadata("found", found.to_string())
                .with_metadata("supported", supported.to_string()),
            ConfigSchemaError::ValueOutOfRange {
                section,
                field,
                value,
                min,
                max,
            } => envelope
                .with_metadata("section", section)
                .with_metadata("field", field)
                .with_metadata("value", value.to_string())
                .with_metadata("min", min.to_string())
                .with_metadata("max", max.to_string()),
            ConfigSchemaError::InvalidField {
                section,
                field,
                reason,
            } => envelope
                .with_metadata("section", section)
                .with_metadata("field", field)
                .with_metadata("reason", reason),
            ConfigSchemaError::EmptyList { section, field } => envelope
                .with_metadata("section", section)
                .with_metadata("field", field),
            ConfigSchemaError::ListTooLarge {
                section,
                field,
                len,
                max,
            } => envelope
                .with_metadata("section", section)
                .with_metadata("field", field)
                .with_metadata("len", len.to_string())
                .with_metadata("max", max.to_string()),
            ConfigSchemaError::DuplicateEntry {
                section,
                field,
                entry,
            } => envelope
                .with_metadata("section", section)
                .with_metadata("field", field)
                .with_metadata("entry", entry),
        }
    }
}
