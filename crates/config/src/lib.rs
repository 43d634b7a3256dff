//! # callmeter-config
//!
//! Configuration schema, validation, and loading for the instrumentation
//! engine. This crate depends on `domain` and `shared` only.

/// Environment variable parsing and merging.
pub mod env;
/// JSON Schema export.
pub mod json_schema;
/// Config loading helpers (env + file + overrides).
pub mod load;
/// Configuration schema types and helpers.
pub mod schema;

pub use env::{EnvParseError, InstrumentationEnv, apply_env_overrides};
pub use json_schema::instrumentation_config_schema;
pub use load::{
    load_config_from_path, load_config_from_sources, load_config_std_env, to_pretty_json,
    to_pretty_toml,
};
pub use schema::{
    CURRENT_CONFIG_VERSION, CacheConfig, ConfigSchemaError, DEFAULT_CONCAT_INNER_CAP,
    DEFAULT_HISTORY_SIZE, DEFAULT_SINK_NAME, DEFAULT_WINDOW_MS, DispatcherConfig, HistoryKeyKind,
    InstrumentationConfig, LogLevelSetting, LoggingConfig, MetricsConfig, ValidatedConfig,
    parse_config_json, parse_config_toml,
};

/// Returns the config crate version.
#[must_use]
pub const fn config_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
