//! rtbench entry point.
//!
//! Resolves a task preset, builds the measurement engine around the chosen
//! workload, prepares the measurement thread and writes one report
//! directory per run.

mod printer;

use anyhow::{Context, Result};
use bench_common::config::{CaseFile, ConfigError, RunConfig};
use bench_common::error::BenchError;
use bench_core::engine::MeasurementEngine;
use bench_core::realtime::prepare_measurement_thread;
use bench_core::report::ReportSink;
use bench_core::system_metrics::ProcessMetrics;
use bench_core::workload::{default_workload_name, workload_by_name, workload_names};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, SystemTime};
use tracing::{error, info, warn};

use crate::printer::ReportPrinter;

/// Environment variable naming a default run configuration file.
const CONFIG_ENV: &str = "RTBENCH_CONFIG";

/// rtbench command-line arguments.
#[derive(Parser, Debug)]
#[command(
    name = "rtbench",
    about = "Measure deadline, period and hiccup latency of a periodic task under doubling load",
    version,
    long_about = None
)]
struct Args {
    /// Task preset to run (see --list).
    #[arg(required_unless_present = "list")]
    task: Option<String>,

    /// Number of measured iterations; the load doubles each iteration.
    #[arg(long, short = 'i')]
    iterations: Option<u32>,

    /// Runtime of each iteration in seconds.
    #[arg(long = "time", short = 't', value_name = "SECONDS")]
    runtime: Option<u64>,

    /// Workload to drive.
    #[arg(long, short = 'w', default_value_t = default_workload_name().to_string())]
    workload: String,

    /// Case file with additional task presets (TOML).
    #[arg(long = "cases", short = 'f', value_name = "FILE")]
    cases: Option<PathBuf>,

    /// Run configuration file (TOML).
    #[arg(long, short = 'c', value_name = "FILE")]
    config: Option<PathBuf>,

    /// Prefix of the report directory.
    #[arg(long, short = 'o', default_value = "")]
    output: String,

    /// Runtime of each warmup pass in seconds.
    #[arg(long, value_name = "SECONDS")]
    warmup: Option<u64>,

    /// Hiccup sampler interval in microseconds.
    #[arg(long, value_name = "MICROS")]
    hiccup_interval_us: Option<u64>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, short = 'l', default_value = "info")]
    log_level: String,

    /// List task presets and workloads, then exit.
    #[arg(long)]
    list: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    init_logging(&args.log_level);

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::from(exit_code(&e))
        }
    }
}

/// Initialize logging with the specified log level.
fn init_logging(level: &str) {
    let filter = format!("rtbench={level},bench_core={level},bench_common={level}");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&filter)),
        )
        .with_target(true)
        .with_thread_ids(true)
        .init();
}

/// Map a failure to the process exit code.
///
/// - 2: a case or configuration file could not be read or parsed
/// - 3: the requested task is not defined
/// - 4: unsupported parameter values
/// - 1: anything else
fn exit_code(err: &anyhow::Error) -> u8 {
    for cause in err.chain() {
        if let Some(config) = cause.downcast_ref::<ConfigError>() {
            return match config {
                ConfigError::UnknownTask { .. } => 3,
                ConfigError::Io { .. } | ConfigError::Parse(_) | ConfigError::Serialize(_) => 2,
            };
        }
        if let Some(bench) = cause.downcast_ref::<BenchError>() {
            return if bench.is_configuration() { 4 } else { 1 };
        }
    }
    1
}

fn run(args: &Args) -> Result<()> {
    let cases = load_cases(args)?;

    if args.list {
        print_listing(&cases);
        return Ok(());
    }

    let task_name = args.task.as_deref().context("no task given")?;
    let task = cases.task(task_name)?;
    let config = load_run_config(args)?;
    let workload = workload_by_name(&args.workload)?;

    let mut engine = MeasurementEngine::new(task, workload, ProcessMetrics::new(), config)
        .with_context(|| format!("cannot benchmark task {task_name}"))?;

    let planned = engine.planned_duration();
    info!(
        name = task_name,
        %task,
        workload = %args.workload,
        iterations = engine.config().iterations,
        planned = %humantime::format_duration(planned),
        "Preparing benchmark"
    );
    let completion = SystemTime::now().checked_add(planned).map_or_else(
        || "unknown".to_string(),
        |at| humantime::format_rfc3339_seconds(at).to_string(),
    );
    info!("Expected time of completion: {completion}");

    // Nothing is written to disk until the measurement thread is ready
    let status = prepare_measurement_thread(&engine.config().realtime)?;
    if engine.config().realtime.enabled && status == Default::default() {
        warn!("Real-time preparation requested but nothing could be applied");
    }

    let mut printer = ReportPrinter::create(&args.output, &args.workload, task_name)?;
    printer.write_config(engine.config())?;
    printer.note(&format!(
        "Initializing benchmark: {task_name} {task} with {} workload, {} iterations",
        args.workload,
        engine.config().iterations
    ))?;
    printer.note(&format!("Expected time of completion: {completion}"))?;

    let summary = engine.run(&mut printer)?;

    info!(
        dir = %printer.dir().display(),
        iterations = summary.loads.len(),
        elapsed = %humantime::format_duration(Duration::from_secs(summary.elapsed.as_secs())),
        worst_deadline_ns = summary.worst_deadline_ns,
        worst_hiccup_ns = summary.worst_hiccup_ns,
        "Benchmark completed successfully"
    );
    Ok(())
}

/// Built-in presets, extended or overridden by `--cases`.
fn load_cases(args: &Args) -> Result<CaseFile> {
    let mut cases = CaseFile::builtin();
    if let Some(path) = &args.cases {
        info!(?path, "Loading case file");
        let extra = CaseFile::from_file(path)
            .with_context(|| format!("failed to load case file {}", path.display()))?;
        cases.tasks.extend(extra.tasks);
    }
    Ok(cases)
}

/// Load the run configuration, then apply command-line overrides.
///
/// Resolution priority (first match wins):
/// 1. Command-line `--config` argument
/// 2. `RTBENCH_CONFIG` environment variable
/// 3. Built-in defaults
fn load_run_config(args: &Args) -> Result<RunConfig> {
    let mut config = if let Some(path) = &args.config {
        info!(?path, "Loading run config from command-line argument");
        RunConfig::from_file(path)
            .with_context(|| format!("failed to load run config from {}", path.display()))?
    } else if let Ok(env_path) = std::env::var(CONFIG_ENV) {
        let path = PathBuf::from(&env_path);
        info!(?path, "Loading run config from {CONFIG_ENV}");
        RunConfig::from_file(&path)
            .with_context(|| format!("failed to load run config from {CONFIG_ENV}={env_path}"))?
    } else {
        RunConfig::default()
    };

    if let Some(iterations) = args.iterations {
        config.iterations = iterations;
    }
    if let Some(seconds) = args.runtime {
        config.iteration_runtime = Duration::from_secs(seconds);
    }
    if let Some(seconds) = args.warmup {
        config.warmup_runtime = Duration::from_secs(seconds);
    }
    if let Some(micros) = args.hiccup_interval_us {
        config.hiccup_interval = Duration::from_micros(micros);
    }

    config.validate()?;
    Ok(config)
}

fn print_listing(cases: &CaseFile) {
    println!("Tasks:");
    for (name, task) in &cases.tasks {
        println!("  {name:<12} {task}");
    }
    println!("Workloads:");
    for name in workload_names() {
        println!("  {name}");
    }
}
