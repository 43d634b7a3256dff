//! End-to-end simulate flow through the `callmeter` binary.

use std::io;
use std::process::Command;

fn run_cli(args: &[&str], env: &[(&str, &str)]) -> io::Result<std::process::Output> {
    let mut command = Command::new(env!("CARGO_BIN_EXE_callmeter"));
    for (key, _) in std::env::vars() {
        if key.starts_with("CALLMETER_") {
            command.env_remove(key);
        }
    }
    command.env_remove("RUST_LOG");
    command.envs(env.iter().copied());
    command.args(args).output()
}

fn metric_lines(stderr: &[u8]) -> Vec<serde_json::Value> {
    String::from_utf8_lossy(stderr)
        .lines()
        .filter_map(|line| serde_json::from_str::<serde_json::Value>(line).ok())
        .filter(|value| value.get("type").and_then(serde_json::Value::as_str) == Some("metric"))
        .collect()
}

fn reading_names(report: &serde_json::Value) -> Vec<String> {
    report
        .get("readings")
        .and_then(serde_json::Value::as_array)
        .map(|readings| {
            readings
                .iter()
                .filter_map(|reading| reading.get("name").and_then(serde_json::Value::as_str))
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[test]
fn simulate_emits_metrics_and_reports_readings() -> Result<(), Box<dyn std::error::Error>> {
    let output = run_cli(
        &[
            "--output",
            "ndjson",
            "--no-progress",
            "simulate",
            "--workers",
            "4",
            "--calls",
            "5",
            "--rounds",
            "2",
            "--fail-every",
            "5",
            "--operation",
            "login",
            "--metrics",
            "stderr",
        ],
        &[],
    )?;
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(report.get("calls").and_then(serde_json::Value::as_u64), Some(40));
    assert_eq!(report.get("failed").and_then(serde_json::Value::as_u64), Some(8));

    let names = reading_names(&report);
    for expected in [
        "server/rpc/login",
        "server/rpc/_concurrency",
        "server/rpc/_total",
        "server/GET//login",
        "user:user0/server/rpc/login",
        "user:anonymous/server/GET//login",
        "server/rpc/login/_errors",
    ] {
        assert!(names.iter().any(|name| name == expected), "missing {expected}");
    }

    let lines = metric_lines(&output.stderr);
    assert!(!lines.is_empty());
    assert!(lines.iter().any(|line| {
        line.get("name").and_then(serde_json::Value::as_str) == Some("server/rpc/login")
            && line.get("kind").and_then(serde_json::Value::as_str) == Some("elapsedCpu")
    }));
    Ok(())
}

#[test]
fn configured_layout_flows_through_env() -> Result<(), Box<dyn std::error::Error>> {
    let output = run_cli(
        &[
            "--output",
            "json",
            "--no-progress",
            "simulate",
            "--workers",
            "1",
            "--calls",
            "2",
            "--rounds",
            "1",
            "--operation",
            "lookup",
        ],
        &[
            ("CALLMETER_DISPATCHER_COMPONENT_KEY", "gateway"),
            ("CALLMETER_DISPATCHER_USER_PREFIX", "u."),
        ],
    )?;
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    let names = reading_names(&report);
    assert!(names.iter().any(|name| name == "gateway/rpc/lookup"));
    assert!(names.iter().any(|name| name == "u.user0/gateway/rpc/lookup"));
    assert!(names.iter().all(|name| !name.starts_with("server/")));
    Ok(())
}

#[test]
fn history_keeps_one_snapshot_per_round() -> Result<(), Box<dyn std::error::Error>> {
    let output = run_cli(
        &[
            "--output",
            "json",
            "--no-progress",
            "simulate",
            "--workers",
            "2",
            "--calls",
            "1",
            "--rounds",
            "3",
            "--overrides-json",
            r#"{"caches":{"historySize":2}}"#,
        ],
        &[],
    )?;
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    let mut keys: Vec<String> = report
        .get("history")
        .and_then(serde_json::Value::as_array)
        .map(|rows| {
            rows.iter()
                .filter_map(|row| row.get("orderKey"))
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default();
    keys.dedup();
    assert_eq!(keys.len(), 2);
    Ok(())
}
