//! CLI integration tests.

use std::path::{Path, PathBuf};
use std::process::Command;

fn run_cli_clean_env(args: &[&str]) -> std::io::Result<std::process::Output> {
    let mut command = Command::new(env!("CARGO_BIN_EXE_callmeter"));
    command.args(args);
    scrub_scoped_env(&mut command);
    command.output()
}

fn scrub_scoped_env(command: &mut Command) {
    for (key, _) in std::env::vars() {
        if key.starts_with("CALLMETER_") {
            command.env_remove(key);
        }
    }
    command.env_remove("RUST_LOG");
}

fn fixture_path(relative: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../../crates/testkit/fixtures")
        .join(relative)
}

fn stdout_json(output: &std::process::Output) -> Result<serde_json::Value, serde_json::Error> {
    serde_json::from_slice(&output.stdout)
}

#[test]
fn info_reports_versions() -> Result<(), Box<dyn std::error::Error>> {
    let output = run_cli_clean_env(&["--output", "json", "info"])?;
    assert!(output.status.success());

    let value = stdout_json(&output)?;
    for key in ["name", "version", "engineVersion", "adaptersVersion"] {
        assert!(value.pointer(&format!("/build/{key}")).is_some(), "missing {key}");
    }
    Ok(())
}

#[test]
fn config_validate_accepts_the_valid_fixture() -> Result<(), Box<dyn std::error::Error>> {
    let path = fixture_path("config/callmeter.valid.toml");
    let path = path.to_string_lossy();
    let output = run_cli_clean_env(&["config", "validate", "--path", &path])?;

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("config: ok"));
    Ok(())
}

#[test]
fn config_validate_rejects_duplicate_sinks() -> Result<(), Box<dyn std::error::Error>> {
    let path = fixture_path("config/callmeter.invalid.json");
    let path = path.to_string_lossy();
    let output = run_cli_clean_env(&["--output", "json", "config", "validate", "--path", &path])?;

    assert_eq!(output.status.code(), Some(2));
    let value = stdout_json(&output)?;
    assert_eq!(
        value.get("status").and_then(serde_json::Value::as_str),
        Some("error")
    );
    Ok(())
}

#[test]
fn env_overrides_reach_the_effective_config() -> Result<(), Box<dyn std::error::Error>> {
    let mut command = Command::new(env!("CARGO_BIN_EXE_callmeter"));
    scrub_scoped_env(&mut command);
    let output = command
        .args(["--output", "json", "config", "show"])
        .env("CALLMETER_DISPATCHER_COMPONENT_KEY", "billing")
        .output()?;

    assert!(output.status.success());
    let value = stdout_json(&output)?;
    assert_eq!(
        value
            .pointer("/effectiveConfig/dispatcher/componentKey")
            .and_then(serde_json::Value::as_str),
        Some("billing")
    );
    Ok(())
}

#[test]
fn invalid_env_is_reported_as_input_error() -> Result<(), Box<dyn std::error::Error>> {
    let mut command = Command::new(env!("CARGO_BIN_EXE_callmeter"));
    scrub_scoped_env(&mut command);
    let output = command
        .args(["config", "show"])
        .env("CALLMETER_METRICS_WINDOW_MS", "soon")
        .output()?;

    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stdout).starts_with("status: error"));
    Ok(())
}

#[test]
fn schema_lists_top_level_sections() -> Result<(), Box<dyn std::error::Error>> {
    let output = run_cli_clean_env(&["config", "schema"])?;
    assert!(output.status.success());

    let value = stdout_json(&output)?;
    let properties = value
        .get("properties")
        .and_then(serde_json::Value::as_object)
        .ok_or("schema has no properties")?;
    for section in ["metrics", "dispatcher", "caches", "sinks", "logging"] {
        assert!(properties.contains_key(section), "missing {section}");
    }
    Ok(())
}
