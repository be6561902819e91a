//! Report sinks: where status snapshots and the final report go

use aging_core::{AgingError, AgingResult};
use parking_lot::Mutex;
use std::fmt::Write as _;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::metrics::AggregateMetrics;
use crate::report::{AgingReport, Trend, VolumeTrend};

/// Destination for periodic status and the final report
pub trait ReportSink: Send + Sync {
    /// Called from the reporting loop with each fresh snapshot
    fn write_status(&self, _metrics: &AggregateMetrics) -> AgingResult<()> {
        Ok(())
    }

    fn write_report(&self, report: &AgingReport) -> AgingResult<()>;
}

/// Report format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Json,
    Markdown,
}

impl ReportFormat {
    fn extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Markdown => "md",
        }
    }
}

/// Writes reports into a directory.
///
/// Status snapshots are appended to `status.jsonl`; the final report lands in
/// `aging_report_<start time>.<ext>` for every configured format.
pub struct FileReportSink {
    dir: PathBuf,
    formats: Vec<ReportFormat>,
}

impl FileReportSink {
    pub fn new(dir: impl Into<PathBuf>, formats: Vec<ReportFormat>) -> Self {
        Self {
            dir: dir.into(),
            formats,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn status_path(&self) -> PathBuf {
        self.dir.join("status.jsonl")
    }

    /// Files [`ReportSink::write_report`] produces for `report`
    pub fn report_paths(&self, report: &AgingReport) -> Vec<PathBuf> {
        let stem = format!(
            "aging_report_{}",
            report.test_info.start_time.format("%Y%m%d_%H%M%S")
        );
        self.formats
            .iter()
            .map(|format| self.dir.join(format!("{}.{}", stem, format.extension())))
            .collect()
    }
}

impl ReportSink for FileReportSink {
    fn write_status(&self, metrics: &AggregateMetrics) -> AgingResult<()> {
        fs::create_dir_all(&self.dir)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.status_path())?;
        let line = serde_json::to_string(metrics)?;
        writeln!(file, "{}", line)?;
        Ok(())
    }

    fn write_report(&self, report: &AgingReport) -> AgingResult<()> {
        fs::create_dir_all(&self.dir)?;

        for (format, path) in self.formats.iter().zip(self.report_paths(report)) {
            let content = match format {
                ReportFormat::Json => serde_json::to_string_pretty(report)?,
                ReportFormat::Markdown => render_markdown(report),
            };

            let mut file = File::create(&path)?;
            file.write_all(content.as_bytes())?;
            tracing::info!(path = %path.display(), "Report written");
        }
        Ok(())
    }
}

/// Keeps everything in memory; used by tests and embedding callers
#[derive(Default)]
pub struct MemoryReportSink {
    statuses: Mutex<Vec<AggregateMetrics>>,
    reports: Mutex<Vec<AgingReport>>,
}

impl MemoryReportSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn statuses(&self) -> Vec<AggregateMetrics> {
        self.statuses.lock().clone()
    }

    pub fn reports(&self) -> Vec<AgingReport> {
        self.reports.lock().clone()
    }

    pub fn last_report(&self) -> Option<AgingReport> {
        self.reports.lock().last().cloned()
    }
}

impl ReportSink for MemoryReportSink {
    fn write_status(&self, metrics: &AggregateMetrics) -> AgingResult<()> {
        self.statuses.lock().push(metrics.clone());
        Ok(())
    }

    fn write_report(&self, report: &AgingReport) -> AgingResult<()> {
        self.reports.lock().push(report.clone());
        Ok(())
    }
}

/// Render the Markdown version of a report
pub fn render_markdown(report: &AgingReport) -> String {
    let summary = &report.summary;
    let info = &report.test_info;
    let status = if summary.data_limit_exceeded || summary.performance_degradation_detected {
        "❌ Stopped by stop condition"
    } else {
        "✅ No stop condition triggered"
    };

    let mut out = String::new();
    let _ = write!(
        out,
        r#"# Aging Test Report

**Status**: {}
**Run**: {}

---

## Summary

- **Start**: {}
- **End**: {}
- **Duration**: {:.1} minutes (planned {:.1})
- **Ended**: {}
- **Stop Reason**: {}
- **Total Operations**: {}
- **Successful**: {}
- **Failed**: {}
- **Success Rate**: {:.2}%
- **Average Duration**: {:.3}s
- **Live Entities**: {}

---

## Phases

| Phase | Start (min) | Duration (min) | Workers | Samples | Success Rate | Avg Duration |
|-------|-------------|----------------|---------|---------|--------------|--------------|
"#,
        status,
        info.run_id,
        info.start_time.to_rfc3339(),
        info.end_time.to_rfc3339(),
        info.duration_minutes,
        info.planned_minutes,
        summary.termination,
        summary.stop_reason.as_deref().unwrap_or("-"),
        summary.total_operations,
        summary.successful_operations,
        summary.failed_operations,
        summary.success_rate,
        summary.average_duration_seconds,
        summary.total_entities,
    );

    for phase in &report.analysis.phase_breakdown {
        let _ = writeln!(
            out,
            "| {} | {:.1} | {:.1} | {} | {} | {} | {} |",
            phase.phase,
            phase.started_at_minute,
            phase.duration_minutes,
            phase.worker_count,
            phase.samples,
            phase
                .average_success_rate
                .map_or("-".to_string(), |r| format!("{:.2}%", r)),
            phase
                .average_duration_seconds
                .map_or("-".to_string(), |d| format!("{:.3}s", d)),
        );
    }

    let trends = &report.analysis.trend_analysis;
    let perf = &report.analysis.performance_analysis;
    let _ = write!(
        out,
        r#"
---

## Trends

- **Success Rate**: {}
- **Response Time**: {}
- **Entity Count**: {}

---

## Performance

- **First Avg Duration**: {}
- **Last Avg Duration**: {}
- **Peak Avg Duration**: {}
- **Final Degradation**: {}
- **Data Limit Usage**: {:.1}%
- **Estimated Total Records**: {}

---

## Entities

"#,
        trend_label(trends.success_rate),
        trend_label(trends.response_time),
        volume_label(trends.entity_count),
        seconds(perf.first_average_duration_seconds),
        seconds(perf.last_average_duration_seconds),
        seconds(perf.peak_average_duration_seconds),
        perf.final_degradation_percent
            .map_or("-".to_string(), |d| format!("{:.1}%", d)),
        perf.data_limit_usage_percent,
        perf.estimated_total_records,
    );

    if summary.entity_counts.is_empty() {
        out.push_str("No live entities\n");
    } else {
        for (kind, count) in &summary.entity_counts {
            let _ = writeln!(out, "- **{}**: {}", kind, count);
        }
    }

    out.push_str("\n---\n\n## Recommendations\n\n");
    for item in &report.analysis.recommendations {
        let _ = writeln!(out, "- {}", item);
    }

    out
}

fn trend_label(trend: Trend) -> &'static str {
    match trend {
        Trend::Improving => "📈 improving",
        Trend::Declining => "📉 declining",
        Trend::Stable => "➡️ stable",
    }
}

fn volume_label(trend: VolumeTrend) -> &'static str {
    match trend {
        VolumeTrend::Growing => "📈 growing",
        VolumeTrend::Shrinking => "📉 shrinking",
        VolumeTrend::Stable => "➡️ stable",
    }
}

fn seconds(value: Option<f64>) -> String {
    value.map_or("-".to_string(), |v| format!("{:.3}s", v))
}

/// Parse a comma separated format list such as `json,md`
pub fn parse_formats(value: &str) -> AgingResult<Vec<ReportFormat>> {
    let mut formats = Vec::new();
    for part in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let format = match part.to_ascii_lowercase().as_str() {
            "json" => ReportFormat::Json,
            "md" | "markdown" => ReportFormat::Markdown,
            other => {
                return Err(AgingError::Validation(format!(
                    "unknown report format `{}`",
                    other
                )))
            }
        };
        if !formats.contains(&format) {
            formats.push(format);
        }
    }

    if formats.is_empty() {
        return Err(AgingError::Validation(
            "at least one report format is required".to_string(),
        ));
    }
    Ok(formats)
}
