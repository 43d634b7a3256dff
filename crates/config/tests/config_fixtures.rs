//! Integration tests for parsing config fixtures from the workspace testkit.

use callmeter_config::{
    CURRENT_CONFIG_VERSION, HistoryKeyKind, LogLevelSetting, parse_config_json, parse_config_toml,
};
use callmeter_shared::ErrorCode;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

fn workspace_root() -> PathBuf {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    manifest_dir
        .parent()
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .unwrap_or_else(|| manifest_dir.to_path_buf())
}

fn read_fixture(relative: &str) -> Result<String, Box<dyn Error>> {
    let path = workspace_root()
        .join("crates")
        .join("testkit")
        .join("fixtures")
        .join(relative);
    Ok(fs::read_to_string(path)?)
}

#[test]
fn parses_valid_fixture_and_normalizes() -> Result<(), Box<dyn Error>> {
    let contents = read_fixture("config/callmeter.valid.json")?;
    let config = parse_config_json(&contents)?;

    assert_eq!(config.version, CURRENT_CONFIG_VERSION);
    assert_eq!(config.metrics.window_ms, 30_000);
    assert_eq!(config.component_key().as_str(), "gateway");
    assert_eq!(config.dispatcher.component_key, "gateway", "should be trimmed");
    assert_eq!(config.anonymous_user().as_str(), "guest");
    assert_eq!(config.caches.history_key, HistoryKeyKind::Numeric);
    assert_eq!(config.sinks, vec!["default".to_string(), "audit".to_string()]);
    assert_eq!(config.logging.level, LogLevelSetting::Debug);
    assert!(config.logging.json);
    Ok(())
}

#[test]
fn toml_fixture_matches_json_fixture() -> Result<(), Box<dyn Error>> {
    let json = parse_config_json(&read_fixture("config/callmeter.valid.json")?)?;
    let toml = parse_config_toml(&read_fixture("config/callmeter.valid.toml")?)?;
    assert_eq!(json.as_ref(), toml.as_ref());
    Ok(())
}

#[test]
fn duplicate_sinks_are_rejected() -> Result<(), Box<dyn Error>> {
    let contents = read_fixture("config/callmeter.invalid.json")?;
    let error = parse_config_json(&contents).err();
    assert_eq!(
        error.as_ref().map(|error| error.code.clone()),
        Some(ErrorCode::new("config", "duplicate_entry"))
    );
    assert_eq!(
        error.and_then(|error| error.metadata.get("entry").cloned()),
        Some("default".to_string())
    );
    Ok(())
}
