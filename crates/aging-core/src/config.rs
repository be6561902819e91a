//! Configuration management for aging runs
//!
//! Settings are merged from several sources before a run starts and are
//! immutable afterwards:
//! - Hardcoded defaults (lowest priority)
//! - `./config/aging.{toml,yaml,json}`
//! - File named by the `AGING_CONFIG` env var
//! - Environment variables such as `AGING__TEST__CONCURRENT_THREADS=20`
//!
//! Command-line overrides are applied by the binary on the deserialized
//! value and followed by [`Settings::validate`].

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::catalog::OperationMix;

/// Longest accepted run, and cap on every time-valued setting (one year)
pub const MAX_DURATION_HOURS: f64 = 24.0 * 365.0;

/// Upper bound on workers in any phase, peak included
pub const MAX_WORKERS: usize = 10_000;

/// Upper bound on record counts, in units of 10,000 (10 billion records)
pub const MAX_DATA_COUNT_TEN_THOUSANDS: f64 = 1_000_000.0;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub test: AgingTestConfig,

    #[serde(default)]
    pub target: TargetConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub report: ReportConfig,
}

/// Load-shape parameters of a single aging run
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AgingTestConfig {
    /// Nominal run length in hours (default: 24)
    pub duration_hours: f64,

    /// Workers in the warmup, steady and cooldown phases (default: 10)
    pub concurrent_threads: usize,

    /// Pause between two operations of one worker (default: 1.0)
    pub operation_interval_seconds: f64,

    /// Warmup phase length (default: 30)
    pub warmup_minutes: f64,

    /// Peak phase length (default: 60)
    pub peak_minutes: f64,

    /// Cooldown phase length (default: 15)
    pub cooldown_minutes: f64,

    /// Worker multiplier applied during the peak phase (default: 2.0)
    pub peak_multiplier: f64,

    /// Records already present on the target, in units of 10,000 (default: 0)
    pub base_data_count_ten_thousands: f64,

    /// Live-record ceiling, in units of 10,000 (default: 100 = 1,000,000)
    pub max_data_count_ten_thousands: f64,

    /// Mean slowdown over baseline that stops the run (default: 50%)
    pub performance_degradation_threshold_percent: f64,

    /// Samples per worker performance window (default: 100)
    pub performance_window_size: usize,

    /// Interval of the background status sampler (default: 5)
    pub report_interval_minutes: f64,

    /// Page size of list operations (default: 20)
    pub list_page_size: usize,

    /// Pause after a failed operation (default: 1.0)
    pub failure_backoff_seconds: f64,

    /// Wait for workers to drain after a stop signal (default: 2.0)
    pub shutdown_grace_seconds: f64,

    /// Share of each operation kind
    pub operation_mix: OperationMix,
}

impl Default for AgingTestConfig {
    fn default() -> Self {
        Self {
            duration_hours: 24.0,
            concurrent_threads: 10,
            operation_interval_seconds: 1.0,
            warmup_minutes: 30.0,
            peak_minutes: 60.0,
            cooldown_minutes: 15.0,
            peak_multiplier: 2.0,
            base_data_count_ten_thousands: 0.0,
            max_data_count_ten_thousands: 100.0,
            performance_degradation_threshold_percent: 50.0,
            performance_window_size: crate::window::DEFAULT_WINDOW_SIZE,
            report_interval_minutes: 5.0,
            list_page_size: 20,
            failure_backoff_seconds: 1.0,
            shutdown_grace_seconds: 2.0,
            operation_mix: OperationMix::default(),
        }
    }
}

impl AgingTestConfig {
    /// Nominal run length in minutes
    pub fn duration_minutes(&self) -> f64 {
        self.duration_hours * 60.0
    }

    /// Live-record ceiling as an absolute count
    pub fn max_entities(&self) -> u64 {
        (self.max_data_count_ten_thousands * 10_000.0).round() as u64
    }

    /// Pre-existing records as an absolute count
    pub fn base_entities(&self) -> u64 {
        (self.base_data_count_ten_thousands * 10_000.0).round() as u64
    }

    pub fn operation_interval(&self) -> Duration {
        secs(self.operation_interval_seconds)
    }

    pub fn failure_backoff(&self) -> Duration {
        secs(self.failure_backoff_seconds)
    }

    pub fn shutdown_grace(&self) -> Duration {
        secs(self.shutdown_grace_seconds)
    }

    pub fn report_interval(&self) -> Duration {
        secs(self.report_interval_minutes * 60.0)
    }

    /// Validate load-shape values
    ///
    /// Every time-valued field must be finite and fit within
    /// [`MAX_DURATION_HOURS`] so that it converts to a [`Duration`] and can be
    /// added to an `Instant`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.duration_hours > 0.0 && self.duration_hours <= MAX_DURATION_HOURS) {
            return Err(invalid(format!(
                "test.duration_hours must be > 0 and <= {}",
                MAX_DURATION_HOURS
            )));
        }

        if self.concurrent_threads == 0 || self.concurrent_threads > MAX_WORKERS {
            return Err(invalid(format!(
                "test.concurrent_threads must be between 1 and {}",
                MAX_WORKERS
            )));
        }

        let max_minutes = MAX_DURATION_HOURS * 60.0;
        let max_seconds = max_minutes * 60.0;
        for (name, value, max) in [
            ("test.operation_interval_seconds", self.operation_interval_seconds, max_seconds),
            ("test.warmup_minutes", self.warmup_minutes, max_minutes),
            ("test.peak_minutes", self.peak_minutes, max_minutes),
            ("test.cooldown_minutes", self.cooldown_minutes, max_minutes),
            (
                "test.base_data_count_ten_thousands",
                self.base_data_count_ten_thousands,
                MAX_DATA_COUNT_TEN_THOUSANDS,
            ),
            ("test.failure_backoff_seconds", self.failure_backoff_seconds, max_seconds),
            ("test.shutdown_grace_seconds", self.shutdown_grace_seconds, max_seconds),
        ] {
            if !(value >= 0.0 && value <= max) {
                return Err(invalid(format!("{} must be between 0 and {}", name, max)));
            }
        }

        if !(self.peak_multiplier > 0.0
            && self.concurrent_threads as f64 * self.peak_multiplier <= MAX_WORKERS as f64)
        {
            return Err(invalid(format!(
                "test.peak_multiplier must be > 0 and keep peak workers <= {}",
                MAX_WORKERS
            )));
        }

        if !(self.max_data_count_ten_thousands > 0.0
            && self.max_data_count_ten_thousands <= MAX_DATA_COUNT_TEN_THOUSANDS)
        {
            return Err(invalid(format!(
                "test.max_data_count_ten_thousands must be > 0 and <= {}",
                MAX_DATA_COUNT_TEN_THOUSANDS
            )));
        }

        if !(self.performance_degradation_threshold_percent > 0.0
            && self.performance_degradation_threshold_percent.is_finite())
        {
            return Err(invalid(
                "test.performance_degradation_threshold_percent must be a finite value > 0",
            ));
        }

        if self.performance_window_size < crate::window::MIN_DEGRADATION_SAMPLES {
            return Err(invalid(format!(
                "test.performance_window_size must be >= {}",
                crate::window::MIN_DEGRADATION_SAMPLES
            )));
        }

        if !(self.report_interval_minutes > 0.0 && self.report_interval_minutes <= max_minutes) {
            return Err(invalid(format!(
                "test.report_interval_minutes must be > 0 and <= {}",
                max_minutes
            )));
        }

        if self.list_page_size == 0 {
            return Err(invalid("test.list_page_size must be > 0"));
        }

        self.operation_mix
            .validate()
            .map_err(|e| invalid(format!("test.operation_mix: {}", e)))?;

        Ok(())
    }
}

/// Which target implementation drives the workers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    /// In-process simulated platform
    #[default]
    Memory,
    /// HTTP/JSON platform
    Rest,
}

/// Target system connection settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TargetConfig {
    pub kind: TargetKind,

    /// Base URL of a REST target (default: "http://localhost:8080")
    pub base_url: String,

    pub username: String,

    pub password: String,

    /// Per-request timeout (default: 30)
    pub request_timeout_seconds: u64,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            kind: TargetKind::Memory,
            base_url: "http://localhost:8080".to_string(),
            username: "aging".to_string(),
            password: String::new(),
            request_timeout_seconds: 30,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error (default: "info")
    pub level: String,

    /// Log format: json or pretty (default: "pretty")
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// Report output settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Directory receiving report files (default: "./aging-reports")
    pub output_dir: PathBuf,

    /// Write a JSON report (default: true)
    pub json: bool,

    /// Write a Markdown report (default: true)
    pub markdown: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./aging-reports"),
            json: true,
            markdown: true,
        }
    }
}

impl Settings {
    /// Load configuration from defaults, config files and environment.
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .add_source(File::with_name("./config/aging").required(false));

        if let Ok(config_path) = std::env::var("AGING_CONFIG") {
            builder = builder.add_source(File::with_name(&config_path).required(false));
        }

        // Example: AGING__TEST__CONCURRENT_THREADS=20
        builder = builder.add_source(
            Environment::with_prefix("AGING")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        tracing::debug!(
            target_kind = ?settings.target.kind,
            duration_hours = settings.test.duration_hours,
            "Configuration loaded"
        );
        Ok(settings)
    }

    /// Load configuration from a specific file path
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let settings: Settings = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.test.validate()?;

        if self.target.kind == TargetKind::Rest && self.target.base_url.trim().is_empty() {
            return Err(invalid("target.base_url cannot be empty for a rest target"));
        }

        if self.target.request_timeout_seconds == 0 {
            return Err(invalid("target.request_timeout_seconds must be > 0"));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(invalid(format!(
                "logging.level must be one of: {}",
                valid_levels.join(", ")
            )));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(invalid(format!(
                "logging.format must be one of: {}",
                valid_formats.join(", ")
            )));
        }

        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Message(message.into())
}

fn secs(value: f64) -> Duration {
    Duration::from_secs_f64(value.max(0.0))
}
