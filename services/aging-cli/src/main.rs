use aging_client::{MemoryTarget, RestTarget};
use aging_core::{Credentials, LoggingConfig, SessionConnector, Settings, TargetKind};
use aging_runner::{parse_formats, AgingTestRunner, FileReportSink, ReportFormat, RunOutcome};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "aging-cli")]
#[command(about = "Long-duration aging (soak) load test runner", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to ./config/aging or $AGING_CONFIG)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Test duration in hours
    #[arg(long)]
    duration: Option<f64>,

    /// Concurrent workers in the warmup, steady and cooldown phases
    #[arg(long)]
    threads: Option<usize>,

    /// Pause between operations of one worker, in seconds
    #[arg(long)]
    interval: Option<f64>,

    /// Warmup length in minutes
    #[arg(long)]
    warmup: Option<f64>,

    /// Worker multiplier during the peak phase
    #[arg(long)]
    peak_multiplier: Option<f64>,

    /// Live-record ceiling, in units of 10,000 records
    #[arg(long)]
    data_count: Option<f64>,

    /// Minutes between status reports
    #[arg(long)]
    report_interval: Option<f64>,

    /// Target platform implementation
    #[arg(long, value_enum)]
    target: Option<TargetArg>,

    /// Base URL of a REST target
    #[arg(long)]
    base_url: Option<String>,

    /// Login user name
    #[arg(long)]
    username: Option<String>,

    /// Login password
    #[arg(long, env = "AGING_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Directory for report files
    #[arg(long)]
    report_dir: Option<PathBuf>,

    /// Comma-separated report formats (json, md)
    #[arg(long)]
    report_format: Option<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TargetArg {
    Memory,
    Rest,
}

impl From<TargetArg> for TargetKind {
    fn from(arg: TargetArg) -> Self {
        match arg {
            TargetArg::Memory => TargetKind::Memory,
            TargetArg::Rest => TargetKind::Rest,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Cli::parse();

    let mut settings = match &args.config {
        Some(path) => Settings::from_file(path)?,
        None => Settings::load()?,
    };
    apply_overrides(&mut settings, &args);
    settings.validate()?;

    init_logging(&settings.logging);

    let formats = match &args.report_format {
        Some(value) => parse_formats(value)?,
        None => configured_formats(&settings),
    };
    if formats.is_empty() {
        return Err("no report format enabled".into());
    }

    let connector: Arc<dyn SessionConnector> = match settings.target.kind {
        TargetKind::Memory => Arc::new(MemoryTarget::new()),
        TargetKind::Rest => Arc::new(RestTarget::new(
            settings.target.base_url.clone(),
            Duration::from_secs(settings.target.request_timeout_seconds),
        )?),
    };

    info!(
        target = ?settings.target.kind,
        duration_hours = settings.test.duration_hours,
        threads = settings.test.concurrent_threads,
        report_dir = %settings.report.output_dir.display(),
        "Starting aging test"
    );

    let sink = Arc::new(FileReportSink::new(
        settings.report.output_dir.clone(),
        formats,
    ));
    let runner = AgingTestRunner::new(
        settings.test.clone(),
        connector,
        Credentials::new(
            settings.target.username.clone(),
            settings.target.password.clone(),
        ),
        sink.clone(),
    )?;

    let stop = runner.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping workers");
            stop.stop();
        }
    });

    let outcome = runner.run().await;
    print_summary(&outcome, &sink.report_paths(&outcome.report));

    Ok(())
}

fn apply_overrides(settings: &mut Settings, args: &Cli) {
    let test = &mut settings.test;
    if let Some(hours) = args.duration {
        test.duration_hours = hours;
    }
    if let Some(threads) = args.threads {
        test.concurrent_threads = threads;
    }
    if let Some(interval) = args.interval {
        test.operation_interval_seconds = interval;
    }
    if let Some(warmup) = args.warmup {
        test.warmup_minutes = warmup;
    }
    if let Some(multiplier) = args.peak_multiplier {
        test.peak_multiplier = multiplier;
    }
    if let Some(count) = args.data_count {
        test.max_data_count_ten_thousands = count;
    }
    if let Some(minutes) = args.report_interval {
        test.report_interval_minutes = minutes;
    }

    let target = &mut settings.target;
    if let Some(kind) = args.target {
        target.kind = kind.into();
    }
    if let Some(url) = &args.base_url {
        target.base_url = url.clone();
    }
    if let Some(username) = &args.username {
        target.username = username.clone();
    }
    if let Some(password) = &args.password {
        target.password = password.clone();
    }

    if let Some(dir) = &args.report_dir {
        settings.report.output_dir = dir.clone();
    }
}

fn configured_formats(settings: &Settings) -> Vec<ReportFormat> {
    let mut formats = Vec::new();
    if settings.report.json {
        formats.push(ReportFormat::Json);
    }
    if settings.report.markdown {
        formats.push(ReportFormat::Markdown);
    }
    formats
}

fn init_logging(logging: &LoggingConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = fmt().with_env_filter(env_filter).with_target(false);

    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn print_summary(outcome: &RunOutcome, report_paths: &[PathBuf]) {
    let summary = &outcome.report.summary;
    let status = if summary.data_limit_exceeded || summary.performance_degradation_detected {
        "⚠️"
    } else {
        "✅"
    };

    println!();
    println!("{} Aging test finished: {}", status, outcome.stop_reason);
    println!(
        "   Duration: {:.1} minutes",
        outcome.report.test_info.duration_minutes
    );
    println!("   Total operations: {}", summary.total_operations);
    println!("   Successful: {}", summary.successful_operations);
    println!("   Failed: {}", summary.failed_operations);
    println!("   Success rate: {:.2}%", summary.success_rate);
    println!(
        "   Avg duration: {:.1}ms",
        summary.average_duration_seconds * 1000.0
    );
    println!("   Live entities: {}", summary.total_entities);
    for path in report_paths {
        println!("   Report: {}", path.display());
    }
    println!();
}
