//! CLI binary entrypoint.

mod commands;
mod error;
mod format;

use callmeter_config::{InstrumentationEnv, LoggingConfig};
use callmeter_shared::{ErrorEnvelope, is_secret_key};
use clap::{Parser, Subcommand};
use commands::config::ConfigSyntax;
use commands::simulate::MetricsTarget;
use commands::{
    SimulateInput, run_config_schema, run_config_show, run_config_validate, run_info,
    run_simulate,
};
use error::{CliError, ExitCode};
use format::{OutputArgs, OutputMode, ndjson_line, pretty_json_line};
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Prefix of environment variables read by the CLI.
const ENV_PREFIX: &str = "CALLMETER_";

#[derive(Debug, Parser)]
#[command(
    name = "callmeter",
    version,
    about = "Call instrumentation toolkit",
    long_about = None
)]
struct Cli {
    #[command(flatten)]
    output: OutputArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show build and version details.
    Info,
    /// Config-related commands.
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Run an instrumented workload and report the recorded metrics.
    Simulate {
        /// Optional config file path (JSON/TOML).
        #[arg(long)]
        config: Option<PathBuf>,
        /// Inline JSON overrides applied on top of the config file.
        #[arg(long)]
        overrides_json: Option<String>,
        /// Concurrent worker threads.
        #[arg(long, default_value_t = 4)]
        workers: usize,
        /// Calls per worker and round.
        #[arg(long, default_value_t = 25)]
        calls: usize,
        /// Rounds; each ends with a history snapshot.
        #[arg(long, default_value_t = 3)]
        rounds: usize,
        /// Fail every n-th call of each worker (0 disables failures).
        #[arg(long, default_value_t = 0)]
        fail_every: usize,
        /// Operation name to cycle through (repeatable).
        #[arg(long = "operation")]
        operations: Vec<String>,
        /// Where metric emissions are written.
        #[arg(long, value_enum, default_value_t = MetricsTarget::None)]
        metrics: MetricsTarget,
    },
}

#[derive(Debug, Subcommand)]
enum ConfigCommands {
    /// Print the effective config.
    Show {
        /// Optional config file path (JSON/TOML).
        #[arg(long)]
        path: Option<PathBuf>,
        /// Inline JSON overrides.
        #[arg(long)]
        overrides_json: Option<String>,
        /// Syntax of the rendered config in text mode.
        #[arg(long, value_enum, default_value_t = ConfigSyntax::Toml)]
        syntax: ConfigSyntax,
    },
    /// Validate the effective config.
    Validate {
        /// Optional config file path (JSON/TOML).
        #[arg(long)]
        path: Option<PathBuf>,
        /// Inline JSON overrides.
        #[arg(long)]
        overrides_json: Option<String>,
    },
    /// Print the JSON Schema of the config file.
    Schema,
}

/// Rendered command result.
#[derive(Debug)]
pub struct CliOutput {
    /// Command response.
    pub stdout: String,
    /// Progress lines.
    pub stderr: String,
    /// Process exit code.
    pub exit_code: ExitCode,
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    let mode = OutputMode::from_args(&cli.output);

    match run(&cli.command, mode) {
        Ok(output) => match write_output(&output) {
            Ok(()) => std::process::ExitCode::from(output.exit_code.as_u8()),
            Err(error) => exit_with_error(&error),
        },
        Err(error) => exit_with_error(&error),
    }
}

fn exit_with_error(error: &CliError) -> std::process::ExitCode {
    let _ = writeln!(io::stderr(), "error: {error}");
    std::process::ExitCode::from(error.exit_code().as_u8())
}

fn run(command: &Commands, mode: OutputMode) -> Result<CliOutput, CliError> {
    if matches!(command, Commands::Info) {
        return run_info(mode);
    }
    if matches!(
        command,
        Commands::Config {
            command: ConfigCommands::Schema
        }
    ) {
        return run_config_schema(mode);
    }

    let env = match InstrumentationEnv::from_map(&collect_scoped_env(ENV_PREFIX)) {
        Ok(env) => env,
        Err(error) => return Ok(format_error_output(mode, &ErrorEnvelope::from(error))),
    };
    run_with_env(command, mode, &env)
}

fn run_with_env(
    command: &Commands,
    mode: OutputMode,
    env: &InstrumentationEnv,
) -> Result<CliOutput, CliError> {
    match command {
        Commands::Info => run_info(mode),
        Commands::Config { command } => match command {
            ConfigCommands::Show {
                path,
                overrides_json,
                syntax,
            } => run_config_show(
                mode,
                env,
                path.as_deref(),
                overrides_json.as_deref(),
                *syntax,
            ),
            ConfigCommands::Validate {
                path,
                overrides_json,
            } => run_config_validate(mode, env, path.as_deref(), overrides_json.as_deref()),
            ConfigCommands::Schema => run_config_schema(mode),
        },
        Commands::Simulate {
            config,
            overrides_json,
            workers,
            calls,
            rounds,
            fail_every,
            operations,
            metrics,
        } => {
            let input = SimulateInput {
                config_path: config.clone(),
                overrides_json: overrides_json.clone(),
                workers: *workers,
                calls: *calls,
                rounds: *rounds,
                fail_every: *fail_every,
                operations: operations.clone(),
                metrics: *metrics,
            };
            run_simulate(mode, &input, env)
        },
    }
}

/// Install the global tracing subscriber on stderr.
///
/// `RUST_LOG` wins over the configured level. Later calls are no-ops.
pub fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(logging.level.as_str()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);
    // Fails only when a subscriber is already installed; keep that one.
    if logging.json {
        builder.json().try_init().ok();
    } else {
        builder.try_init().ok();
    }
}

/// Render `error` as a failed command result, redacting secret metadata.
pub fn format_error_output(mode: OutputMode, error: &ErrorEnvelope) -> CliOutput {
    let secret_keys: Vec<&str> = error
        .metadata
        .keys()
        .map(String::as_str)
        .filter(|key| is_secret_key(key))
        .collect();
    let error = error.clone().redact_metadata(&secret_keys);
    let exit_code = ExitCode::for_kind(error.kind);

    let payload = serde_json::json!({
        "status": "error",
        "error": {
            "code": error.code.to_string(),
            "kind": error.kind.to_string(),
            "message": error.message,
            "meta": error.metadata,
        },
    });
    let rendered = if mode.is_ndjson() {
        ndjson_line(&payload).ok()
    } else if mode.is_json() {
        pretty_json_line(&payload).ok()
    } else {
        Some(format_error_text(&error))
    };

    CliOutput {
        stdout: rendered.unwrap_or_else(|| format_error_text(&error)),
        stderr: String::new(),
        exit_code,
    }
}

fn format_error_text(error: &ErrorEnvelope) -> String {
    let mut out = String::new();
    out.push_str("status: error\n");
    out.push_str("code: ");
    out.push_str(&error.code.to_string());
    out.push('\n');
    out.push_str("message: ");
    out.push_str(&error.message);
    out.push('\n');
    out.push_str("kind: ");
    out.push_str(&error.kind.to_string());
    out.push('\n');

    if !error.metadata.is_empty() {
        out.push_str("meta:\n");
        for (key, value) in &error.metadata {
            out.push_str("  ");
            out.push_str(key);
            out.push_str(": ");
            out.push_str(value);
            out.push('\n');
        }
    }

    out
}

/// Append an `info:` progress line unless progress is suppressed.
pub fn log_info(stderr: &mut String, message: &str, no_progress: bool) {
    if no_progress {
        return;
    }
    stderr.push_str("info: ");
    stderr.push_str(message);
    stderr.push('\n');
}

fn write_output(output: &CliOutput) -> Result<(), CliError> {
    let mut stdout = io::stdout();
    stdout.write_all(output.stdout.as_bytes())?;

    if !output.stderr.is_empty() {
        let mut stderr = io::stderr();
        stderr.write_all(output.stderr.as_bytes())?;
        stderr.flush()?;
    }

    Ok(())
}

fn collect_scoped_env(prefix: &str) -> BTreeMap<String, String> {
    std::env::vars()
        .filter(|(key, _)| key.starts_with(prefix))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::OutputFormat;
    use callmeter_shared::ErrorCode;
    use clap::CommandFactory;

    #[test]
    fn version_flag_is_supported() {
        let result = Cli::command().try_get_matches_from(["callmeter", "--version"]);
        let is_version = matches!(
            result,
            Err(error) if error.kind() == clap::error::ErrorKind::DisplayVersion
        );

        assert!(is_version, "expected clap to render version");
    }

    #[test]
    fn simulate_flags_parse() -> Result<(), Box<dyn std::error::Error>> {
        let cli = Cli::try_parse_from([
            "callmeter",
            "--output",
            "json",
            "simulate",
            "--workers",
            "2",
            "--operation",
            "login",
            "--operation",
            "search",
            "--metrics",
            "stderr",
        ])?;
        let Commands::Simulate {
            workers,
            operations,
            metrics,
            ..
        } = cli.command
        else {
            return Err("expected simulate".into());
        };
        assert_eq!(workers, 2);
        assert_eq!(operations, vec!["login".to_string(), "search".to_string()]);
        assert_eq!(metrics, MetricsTarget::Stderr);
        assert!(OutputMode::from_args(&cli.output).is_json());
        Ok(())
    }

    #[test]
    fn error_output_redacts_secrets() -> Result<(), Box<dyn std::error::Error>> {
        let mode = OutputMode {
            format: OutputFormat::Json,
            no_progress: true,
        };
        let error = ErrorEnvelope::expected(ErrorCode::invalid_input(), "bad sink")
            .with_metadata("apiToken", "hunter2")
            .with_metadata("sink", "audit");
        let output = format_error_output(mode, &error);
        let value: serde_json::Value = serde_json::from_str(output.stdout.trim())?;

        assert_eq!(output.exit_code, ExitCode::InvalidInput);
        assert_eq!(
            value.pointer("/error/meta/apiToken").and_then(serde_json::Value::as_str),
            Some("<redacted>")
        );
        assert_eq!(
            value.pointer("/error/meta/sink").and_then(serde_json::Value::as_str),
            Some("audit")
        );
        Ok(())
    }

    #[test]
    fn exit_codes_for_errors() {
        let io_error = CliError::Io(io::Error::other("io"));
        let invariant = CliError::Envelope(ErrorEnvelope::invariant(
            ErrorCode::internal(),
            "broken",
        ));
        assert_eq!(io_error.exit_code(), ExitCode::Io);
        assert_eq!(invariant.exit_code(), ExitCode::Internal);
        assert_eq!(
            CliError::InvalidInput("x".to_string()).exit_code(),
            ExitCode::InvalidInput
        );
    }

    #[test]
    fn tracing_init_tolerates_repeated_calls() {
        let logging = LoggingConfig::default();
        init_tracing(&logging);
        init_tracing(&LoggingConfig {
            json: true,
            ..logging
        });
    }

    #[test]
    fn env_errors_are_reported() -> Result<(), Box<dyn std::error::Error>> {
        let mut vars = BTreeMap::new();
        vars.insert("CALLMETER_METRICS_WINDOW_MS".to_string(), "soon".to_string());
        let error = InstrumentationEnv::from_map(&vars)
            .err()
            .ok_or("expected env parse failure")?;
        let output = format_error_output(
            OutputMode {
                format: OutputFormat::Text,
                no_progress: true,
            },
            &ErrorEnvelope::from(error),
        );
        assert_eq!(output.exit_code, ExitCode::InvalidInput);
        assert!(output.stdout.starts_with("status: error\n"));
        Ok(())
    }
}
