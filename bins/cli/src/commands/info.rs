//! Info command handler.

use crate::CliOutput;
use crate::error::{CliError, ExitCode};
use crate::format::{OutputMode, ndjson_line, pretty_json_line};
use callmeter_adapters::{ThreadCpuClock, adapters_crate_version};
use callmeter_engine::engine_crate_version;

struct BuildInfo {
    name: &'static str,
    version: &'static str,
    engine_version: &'static str,
    adapters_version: &'static str,
    thread_cpu_clock: bool,
}

const fn build_info() -> BuildInfo {
    BuildInfo {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        engine_version: engine_crate_version(),
        adapters_version: adapters_crate_version(),
        thread_cpu_clock: ThreadCpuClock::is_supported(),
    }
}

/// Run the info command.
pub fn run_info(mode: OutputMode) -> Result<CliOutput, CliError> {
    let build = build_info();

    let stdout = if mode.is_ndjson() {
        let mut payload = build_json(&build);
        if let Some(object) = payload.as_object_mut() {
            object.insert("type".to_string(), "summary".into());
            object.insert("kind".to_string(), "info".into());
        }
        ndjson_line(&payload)?
    } else if mode.is_json() {
        pretty_json_line(&build_json(&build))?
    } else {
        format_info_text(&build)
    };

    Ok(CliOutput {
        stdout,
        stderr: String::new(),
        exit_code: ExitCode::Ok,
    })
}

fn format_info_text(build: &BuildInfo) -> String {
    format!(
        "status: ok\nname: {}\nversion: {}\nengine: {}\nadapters: {}\nthreadCpuClock: {}\n",
        build.name,
        build.version,
        build.engine_version,
        build.adapters_version,
        if build.thread_cpu_clock {
            "supported"
        } else {
            "unsupported (cpu readings are 0)"
        },
    )
}

fn build_json(build: &BuildInfo) -> serde_json::Value {
    serde_json::json!({
        "status": "ok",
        "build": {
            "name": build.name,
            "version": build.version,
            "engineVersion": build.engine_version,
            "adaptersVersion": build.adapters_version,
            "threadCpuClock": build.thread_cpu_clock,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::OutputFormat;

    #[test]
    fn json_info_lists_build_fields() -> Result<(), Box<dyn std::error::Error>> {
        let mode = OutputMode {
            format: OutputFormat::Json,
            no_progress: true,
        };
        let output = run_info(mode)?;
        let value: serde_json::Value = serde_json::from_str(output.stdout.trim())?;
        let build = value.get("build").ok_or("missing build")?;
        for key in ["name", "version", "engineVersion", "adaptersVersion", "threadCpuClock"] {
            assert!(build.get(key).is_some(), "missing {key}");
        }
        Ok(())
    }
}
