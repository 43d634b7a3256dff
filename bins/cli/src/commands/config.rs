//! Config command handlers.

use crate::error::{CliError, ExitCode};
use crate::format::{OutputMode, ndjson_line, pretty_json_line};
use crate::{CliOutput, format_error_output, log_info};
use callmeter_config::{
    InstrumentationEnv, instrumentation_config_schema, load_config_from_path, to_pretty_json,
    to_pretty_toml,
};
use std::path::Path;

/// Serialization of `config show` in text mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ConfigSyntax {
    /// Pretty JSON.
    Json,
    /// TOML.
    Toml,
}

/// Print the effective config (defaults, file, overrides, env).
pub fn run_config_show(
    mode: OutputMode,
    env: &InstrumentationEnv,
    path: Option<&Path>,
    overrides_json: Option<&str>,
    syntax: ConfigSyntax,
) -> Result<CliOutput, CliError> {
    let config = match load_config_from_path(path, overrides_json, env) {
        Ok(config) => config,
        Err(error) => return Ok(format_error_output(mode, &error)),
    };

    let mut stderr = String::new();
    log_info(&mut stderr, "config show completed", mode.no_progress);

    let stdout = if mode.is_ndjson() || mode.is_json() {
        let payload = serde_json::json!({
            "status": "ok",
            "configPath": path.map(|value| value.to_string_lossy().to_string()),
            "effectiveConfig": serde_json::to_value(config.as_ref())?,
        });
        if mode.is_ndjson() {
            ndjson_line(&payload)?
        } else {
            pretty_json_line(&payload)?
        }
    } else {
        let rendered = match syntax {
            ConfigSyntax::Json => to_pretty_json(config.as_ref())?,
            ConfigSyntax::Toml => to_pretty_toml(config.as_ref())?,
        };
        format!("status: ok\nconfig:\n{rendered}")
    };

    Ok(CliOutput {
        stdout,
        stderr,
        exit_code: ExitCode::Ok,
    })
}

/// Validate the effective config without printing it.
pub fn run_config_validate(
    mode: OutputMode,
    env: &InstrumentationEnv,
    path: Option<&Path>,
    overrides_json: Option<&str>,
) -> Result<CliOutput, CliError> {
    if let Err(error) = load_config_from_path(path, overrides_json, env) {
        return Ok(format_error_output(mode, &error));
    }

    let mut stderr = String::new();
    log_info(&mut stderr, "config validate completed", mode.no_progress);

    let payload = serde_json::json!({
        "status": "ok",
        "configPath": path.map(|value| value.to_string_lossy().to_string()),
    });
    let stdout = if mode.is_ndjson() {
        ndjson_line(&payload)?
    } else if mode.is_json() {
        pretty_json_line(&payload)?
    } else {
        path.map_or_else(
            || "status: ok\nconfig: ok\n".to_string(),
            |path| format!("status: ok\nconfig: ok\npath: {}\n", path.to_string_lossy()),
        )
    };

    Ok(CliOutput {
        stdout,
        stderr,
        exit_code: ExitCode::Ok,
    })
}

/// Print the JSON Schema of the config file format.
pub fn run_config_schema(mode: OutputMode) -> Result<CliOutput, CliError> {
    let schema = serde_json::to_value(instrumentation_config_schema())?;
    let stdout = if mode.is_ndjson() {
        ndjson_line(&schema)?
    } else {
        pretty_json_line(&schema)?
    };

    Ok(CliOutput {
        stdout,
        stderr: String::new(),
        exit_code: ExitCode::Ok,
    })
}
