//! Simulate command: drive an instrumented workload and report readings.

use crate::error::{CliError, ExitCode};
use crate::format::{OutputMode, ndjson_line, pretty_json_line};
use crate::{CliOutput, format_error_output, init_tracing, log_info};
use callmeter_adapters::{
    JsonLogger, JsonMetricSink, LogSink, MetricTags, NoopMetricSink, ScopedIdentity,
    StderrLogSink, StdoutLogSink, SystemClock, ThreadCpuClock, TracingLogger, ZeroCpuClock,
};
use callmeter_config::{InstrumentationEnv, LogLevelSetting, ValidatedConfig, load_config_from_path};
use callmeter_domain::{MetricReading, OperationName, UserId};
use callmeter_engine::{
    CacheStats, EngineDeps, HistoryBuffer, HistoryRow, InstrumentedDispatcher, RequestLine,
    TimerClientRegistry,
};
use callmeter_ports::{Clock, CpuClock, LogLevel, LoggerPort, MetricSinkPort};
use callmeter_shared::ErrorEnvelope;
use serde::Serialize;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Operations used when none are given.
pub const DEFAULT_OPERATIONS: [&str; 3] = ["login", "search", "checkout"];

/// Where metric emissions are written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum MetricsTarget {
    /// Discard emissions.
    #[default]
    None,
    /// JSON lines on stdout.
    Stdout,
    /// JSON lines on stderr.
    Stderr,
}

impl MetricsTarget {
    fn log_sink(self) -> Option<Arc<dyn LogSink>> {
        match self {
            Self::None => None,
            Self::Stdout => Some(Arc::new(StdoutLogSink)),
            Self::Stderr => Some(Arc::new(StderrLogSink)),
        }
    }
}

/// Inputs of the simulate command.
#[derive(Debug, Clone)]
pub struct SimulateInput {
    /// Optional config file.
    pub config_path: Option<PathBuf>,
    /// Inline JSON overrides.
    pub overrides_json: Option<String>,
    /// Concurrent worker threads.
    pub workers: usize,
    /// Calls per worker per round.
    pub calls: usize,
    /// Rounds; each round ends with a history snapshot.
    pub rounds: usize,
    /// Fail every n-th call of a worker; zero never fails.
    pub fail_every: usize,
    /// Operation names cycled by the workers.
    pub operations: Vec<String>,
    /// Metric destination.
    pub metrics: MetricsTarget,
}

impl Default for SimulateInput {
    fn default() -> Self {
        Self {
            config_path: None,
            overrides_json: None,
            workers: 4,
            calls: 25,
            rounds: 3,
            fail_every: 0,
            operations: DEFAULT_OPERATIONS.iter().map(ToString::to_string).collect(),
            metrics: MetricsTarget::None,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulationReport {
    status: &'static str,
    workers: usize,
    rounds: usize,
    calls: u64,
    succeeded: u64,
    failed: u64,
    key_cache: CacheStats,
    readings: Vec<MetricReading>,
    history: Vec<HistoryRow<MetricReading>>,
}

#[derive(Debug)]
struct SimulatedFailure;

#[derive(Default)]
struct Tally {
    succeeded: AtomicU64,
    failed: AtomicU64,
}

/// Run the simulate command, resolving the metric destination from `input`.
pub fn run_simulate(
    mode: OutputMode,
    input: &SimulateInput,
    env: &InstrumentationEnv,
) -> Result<CliOutput, CliError> {
    run_simulate_with_sink(mode, input, env, input.metrics.log_sink())
}

/// Run the simulate command writing metric lines to `metric_lines`, or
/// nowhere when `None`.
pub fn run_simulate_with_sink(
    mode: OutputMode,
    input: &SimulateInput,
    env: &InstrumentationEnv,
    metric_lines: Option<Arc<dyn LogSink>>,
) -> Result<CliOutput, CliError> {
    if input.workers == 0 || input.calls == 0 || input.rounds == 0 {
        return Err(CliError::InvalidInput(
            "workers, calls and rounds must be positive".to_string(),
        ));
    }

    let config = match load_config_from_path(
        input.config_path.as_deref(),
        input.overrides_json.as_deref(),
        env,
    ) {
        Ok(config) => config,
        Err(error) => return Ok(format_error_output(mode, &error)),
    };
    let operations = match parse_operations(&input.operations) {
        Ok(operations) => operations,
        Err(error) => return Ok(format_error_output(mode, &error)),
    };

    init_tracing(&config.logging);
    let deps = engine_deps(&config);
    let clients = TimerClientRegistry::from_config(&config, &deps, |name| {
        metric_sink(name, metric_lines.as_ref())
    });
    let dispatcher = InstrumentedDispatcher::from_config(
        &config,
        clients.default_client(),
        Arc::new(ScopedIdentity),
        &deps,
    );
    let capacity = usize::try_from(config.caches.history_size)
        .ok()
        .and_then(NonZeroUsize::new)
        .unwrap_or(NonZeroUsize::MIN);
    let history = HistoryBuffer::new(capacity, config.caches.history_key, Arc::clone(&deps.clock));

    let mut stderr = String::new();
    log_info(
        &mut stderr,
        &format!(
            "simulating {} workers x {} calls over {} rounds",
            input.workers, input.calls, input.rounds
        ),
        mode.no_progress,
    );

    let tally = Tally::default();
    for round in 0..input.rounds {
        run_round(&dispatcher, &operations, input, &tally);
        if let Err(error) = history.push(dispatcher.client().registry().readings()) {
            deps.logger.failure(
                LogLevel::Warn,
                "simulate.history_push_failed",
                &ErrorEnvelope::from(error).with_metadata("round", round.to_string()),
                None,
            );
        }
    }

    let report = SimulationReport {
        status: "ok",
        workers: input.workers,
        rounds: input.rounds,
        calls: tally.succeeded.load(Ordering::Relaxed) + tally.failed.load(Ordering::Relaxed),
        succeeded: tally.succeeded.load(Ordering::Relaxed),
        failed: tally.failed.load(Ordering::Relaxed),
        key_cache: dispatcher.key_cache().stats(),
        readings: dispatcher.client().registry().readings(),
        history: history.render(),
    };
    log_info(&mut stderr, "simulate completed", mode.no_progress);

    let stdout = if mode.is_ndjson() {
        ndjson_line(&serde_json::to_value(&report)?)?
    } else if mode.is_json() {
        pretty_json_line(&serde_json::to_value(&report)?)?
    } else {
        format_report_text(&report)
    };

    Ok(CliOutput {
        stdout,
        stderr,
        exit_code: ExitCode::Ok,
    })
}

fn parse_operations(names: &[String]) -> Result<Vec<OperationName>, ErrorEnvelope> {
    if names.is_empty() {
        return DEFAULT_OPERATIONS
            .iter()
            .map(|name| OperationName::parse(name).map_err(ErrorEnvelope::from))
            .collect();
    }
    names
        .iter()
        .map(|name| {
            OperationName::parse(name)
                .map_err(|error| ErrorEnvelope::from(error).with_metadata("operation", name.clone()))
        })
        .collect()
}

fn engine_deps(config: &ValidatedConfig) -> EngineDeps {
    let cpu_clock: Arc<dyn CpuClock> = if ThreadCpuClock::is_supported() {
        Arc::new(ThreadCpuClock)
    } else {
        Arc::new(ZeroCpuClock)
    };
    let logger: Arc<dyn LoggerPort> = if config.logging.json {
        Arc::new(
            JsonLogger::new(Arc::new(StderrLogSink)).with_min_level(log_level(config.logging.level)),
        )
    } else {
        Arc::new(TracingLogger::new())
    };
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    EngineDeps {
        clock,
        cpu_clock,
        logger,
    }
}

const fn log_level(setting: LogLevelSetting) -> LogLevel {
    match setting {
        LogLevelSetting::Debug => LogLevel::Debug,
        LogLevelSetting::Info => LogLevel::Info,
        LogLevelSetting::Warn => LogLevel::Warn,
        LogLevelSetting::Error => LogLevel::Error,
    }
}

fn metric_sink(client: &str, lines: Option<&Arc<dyn LogSink>>) -> Arc<dyn MetricSinkPort> {
    match lines {
        Some(lines) => {
            let mut tags = MetricTags::new();
            tags.insert("client".into(), client.into());
            Arc::new(JsonMetricSink::new(Arc::clone(lines)).with_tags(tags))
        },
        None => Arc::new(NoopMetricSink),
    }
}

fn run_round(
    dispatcher: &InstrumentedDispatcher,
    operations: &[OperationName],
    input: &SimulateInput,
    tally: &Tally,
) {
    std::thread::scope(|scope| {
        for worker in 0..input.workers {
            scope.spawn(move || run_worker(dispatcher, operations, input, tally, worker));
        }
    });
}

fn run_worker(
    dispatcher: &InstrumentedDispatcher,
    operations: &[OperationName],
    input: &SimulateInput,
    tally: &Tally,
    worker: usize,
) {
    // Every fourth worker stays unbound and is recorded as the anonymous user.
    let _user = if worker % 4 == 3 {
        None
    } else {
        UserId::parse(format!("user{worker}"))
            .ok()
            .map(ScopedIdentity::enter)
    };

    for call in 0..input.calls {
        let Some(operation) = operations.get((worker + call) % operations.len()) else {
            continue;
        };
        let fails = input.fail_every > 0 && (call + 1) % input.fail_every == 0;
        let work = || {
            busy_work(call);
            if fails { Err(SimulatedFailure) } else { Ok(()) }
        };

        let outcome = if worker % 2 == 1 {
            let path = format!("/{}", operation.as_str());
            let request = RequestLine {
                method: "get",
                path: &path,
            };
            dispatcher.instrument_http(&request, work)
        } else {
            dispatcher.instrument_rpc(operation, work)
        };

        let counter = if outcome.is_ok() {
            &tally.succeeded
        } else {
            &tally.failed
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

fn busy_work(call: usize) -> u64 {
    let rounds = (call % 7 + 1) * 2_000;
    let checksum = (0..rounds).fold(0_u64, |acc, n| {
        acc.rotate_left(5) ^ u64::try_from(n).unwrap_or_default()
    });
    std::hint::black_box(checksum)
}

fn format_report_text(report: &SimulationReport) -> String {
    let mut out = String::new();
    out.push_str("status: ok\n");
    out.push_str(&format!(
        "calls: {} (succeeded {}, failed {})\n",
        report.calls, report.succeeded, report.failed
    ));
    out.push_str(&format!(
        "keyCache: hits {} misses {} clears {}\n",
        report.key_cache.hits, report.key_cache.misses, report.key_cache.clears
    ));
    out.push_str("readings:\n");
    for reading in &report.readings {
        out.push_str(&format!(
            "  {} {} value={} low={} high={} count={}\n",
            reading.name,
            reading.family.as_str(),
            reading.value,
            reading.low,
            reading.high,
            reading.count
        ));
    }
    out.push_str(&format!("history: {} snapshots\n", history_snapshots(report)));
    out
}

fn history_snapshots(report: &SimulationReport) -> usize {
    let mut keys: Vec<_> = report.history.iter().map(|row| &row.order_key).collect();
    keys.dedup();
    keys.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::OutputFormat;
    use callmeter_adapters::WriterLogSink;

    const JSON: OutputMode = OutputMode {
        format: OutputFormat::Json,
        no_progress: true,
    };

    fn small_input() -> SimulateInput {
        SimulateInput {
            workers: 4,
            calls: 6,
            rounds: 2,
            fail_every: 3,
            operations: vec!["login".to_string(), "search".to_string()],
            ..SimulateInput::default()
        }
    }

    #[test]
    fn report_counts_every_call() -> Result<(), Box<dyn std::error::Error>> {
        let output = run_simulate(JSON, &small_input(), &InstrumentationEnv::default())?;
        let value: serde_json::Value = serde_json::from_str(output.stdout.trim())?;

        assert_eq!(value.get("calls").and_then(serde_json::Value::as_u64), Some(48));
        assert_eq!(value.get("failed").and_then(serde_json::Value::as_u64), Some(16));
        let names: Vec<&str> = value
            .get("readings")
            .and_then(serde_json::Value::as_array)
            .map(|readings| {
                readings
                    .iter()
                    .filter_map(|reading| reading.get("name").and_then(serde_json::Value::as_str))
                    .collect()
            })
            .unwrap_or_default();
        assert!(names.contains(&"server/rpc/login"));
        assert!(names.contains(&"server/GET//search"));
        assert!(names.contains(&"user:anonymous/server/GET//login"));
        assert!(names.contains(&"server/rpc/login/_errors"));
        Ok(())
    }

    #[test]
    fn metric_lines_are_tagged_by_client() -> Result<(), Box<dyn std::error::Error>> {
        let lines = Arc::new(WriterLogSink::new(Vec::new()));
        let input = SimulateInput {
            workers: 1,
            calls: 2,
            rounds: 1,
            ..small_input()
        };
        let metric_lines: Arc<dyn LogSink> = lines.clone();
        run_simulate_with_sink(
            JSON,
            &input,
            &InstrumentationEnv::default(),
            Some(metric_lines),
        )?;

        let snapshot = lines.snapshot();
        let first: serde_json::Value = snapshot
            .lines()
            .next()
            .map(serde_json::from_str)
            .transpose()?
            .ok_or("no metric lines")?;
        assert_eq!(
            first.pointer("/tags/client").and_then(serde_json::Value::as_str),
            Some("default")
        );
        Ok(())
    }

    #[test]
    fn zero_workers_is_rejected() {
        let input = SimulateInput {
            workers: 0,
            ..SimulateInput::default()
        };
        let result = run_simulate(JSON, &input, &InstrumentationEnv::default());
        assert!(matches!(result, Err(CliError::InvalidInput(_))));
    }

    #[test]
    fn invalid_operation_reports_an_error() -> Result<(), Box<dyn std::error::Error>> {
        let input = SimulateInput {
            operations: vec![String::new()],
            ..small_input()
        };
        let output = run_simulate(JSON, &input, &InstrumentationEnv::default())?;
        assert_eq!(output.exit_code, ExitCode::InvalidInput);
        Ok(())
    }
}
