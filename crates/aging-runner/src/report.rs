//! Final aging report and its analysis

use aging_core::{AgingTestConfig, EntityKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::metrics::{AggregateMetrics, PhaseHistoryEntry, StopState};
use crate::phase::TestPhase;

/// Success-rate movement (percentage points) treated as noise
pub const SUCCESS_RATE_TOLERANCE: f64 = 1.0;

/// Relative response-time movement treated as noise
pub const DURATION_TOLERANCE: f64 = 0.05;

/// Data-limit usage (percent) that triggers a capacity recommendation
pub const DATA_LIMIT_WARNING_PERCENT: f64 = 80.0;

/// Success rate (percent) below which a run is considered unhealthy
pub const MIN_HEALTHY_SUCCESS_RATE: f64 = 95.0;

/// Average operation duration (seconds) considered slow
pub const SLOW_OPERATION_SECONDS: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgingReport {
    pub test_info: TestInfo,
    pub summary: Summary,
    pub metrics_history: Vec<AggregateMetrics>,
    pub analysis: Analysis,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestInfo {
    pub run_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_minutes: f64,
    pub planned_minutes: f64,
    pub config: AgingTestConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// Totals of the last snapshot (the pool active when it was taken)
    pub total_operations: u64,
    pub successful_operations: u64,
    pub failed_operations: u64,
    pub success_rate: f64,
    pub average_duration_seconds: f64,
    pub entity_counts: BTreeMap<EntityKind, usize>,
    pub total_entities: usize,
    pub data_limit_exceeded: bool,
    pub performance_degradation_detected: bool,
    pub stop_reason: Option<String>,
    /// How the run ended (completed, stop condition, operator, failure)
    pub termination: String,
    pub phase_history: Vec<PhaseHistoryEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub phase_breakdown: Vec<PhaseBreakdown>,
    pub trend_analysis: TrendAnalysis,
    pub performance_analysis: PerformanceAnalysis,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseBreakdown {
    pub phase: TestPhase,
    pub started_at_minute: f64,
    pub duration_minutes: f64,
    pub worker_count: usize,
    pub samples: usize,
    pub average_success_rate: Option<f64>,
    pub average_duration_seconds: Option<f64>,
    pub entities_at_end: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Improving,
    Declining,
    Stable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeTrend {
    Growing,
    Shrinking,
    Stable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendAnalysis {
    pub success_rate: Trend,
    pub response_time: Trend,
    pub entity_count: VolumeTrend,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceAnalysis {
    pub first_average_duration_seconds: Option<f64>,
    pub last_average_duration_seconds: Option<f64>,
    pub peak_average_duration_seconds: Option<f64>,
    pub duration_change_percent: Option<f64>,
    pub final_degradation_percent: Option<f64>,
    pub max_degradation_percent: Option<f64>,
    pub data_limit_usage_percent: f64,
    pub estimated_total_records: u64,
}

/// Inputs for [`build_report`], collected by the monitor
pub(crate) struct ReportInputs<'a> {
    pub run_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub elapsed_minutes: f64,
    pub planned_minutes: f64,
    pub config: &'a AgingTestConfig,
    pub stop: &'a StopState,
    pub termination: &'a str,
    pub phase_history: &'a [PhaseHistoryEntry],
    pub metrics_history: &'a [AggregateMetrics],
}

pub(crate) fn build_report(inputs: ReportInputs<'_>) -> AgingReport {
    let last = inputs.metrics_history.last();

    let summary = Summary {
        total_operations: last.map_or(0, |m| m.total_operations),
        successful_operations: last.map_or(0, |m| m.successful_operations),
        failed_operations: last.map_or(0, |m| m.failed_operations),
        success_rate: last.map_or(0.0, |m| m.success_rate),
        average_duration_seconds: last.map_or(0.0, |m| m.average_duration_seconds),
        entity_counts: last.map(|m| m.entity_counts.clone()).unwrap_or_default(),
        total_entities: last.map_or(0, |m| m.total_entities),
        data_limit_exceeded: inputs.stop.data_limit_exceeded,
        performance_degradation_detected: inputs.stop.performance_degradation_detected,
        stop_reason: inputs.stop.stop_reason.clone(),
        termination: inputs.termination.to_string(),
        phase_history: inputs.phase_history.to_vec(),
    };

    let performance_analysis = analyze_performance(inputs.metrics_history, inputs.config);
    let analysis = Analysis {
        phase_breakdown: phase_breakdown(
            inputs.phase_history,
            inputs.metrics_history,
            inputs.elapsed_minutes,
        ),
        trend_analysis: analyze_trends(inputs.metrics_history),
        recommendations: recommendations(&summary, &performance_analysis, inputs.config),
        performance_analysis,
    };

    AgingReport {
        test_info: TestInfo {
            run_id: inputs.run_id,
            start_time: inputs.start_time,
            end_time: inputs.end_time,
            duration_minutes: inputs.elapsed_minutes,
            planned_minutes: inputs.planned_minutes,
            config: inputs.config.clone(),
        },
        summary,
        metrics_history: inputs.metrics_history.to_vec(),
        analysis,
    }
}

pub fn phase_breakdown(
    phases: &[PhaseHistoryEntry],
    history: &[AggregateMetrics],
    elapsed_minutes: f64,
) -> Vec<PhaseBreakdown> {
    phases
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let ends_at = phases
                .get(i + 1)
                .map_or(elapsed_minutes, |next| next.elapsed_minutes);
            let samples: Vec<&AggregateMetrics> = history
                .iter()
                .filter(|m| m.phase == Some(entry.phase))
                .collect();
            let active: Vec<&AggregateMetrics> = samples
                .iter()
                .copied()
                .filter(|m| m.total_operations > 0)
                .collect();

            PhaseBreakdown {
                phase: entry.phase,
                started_at_minute: entry.elapsed_minutes,
                duration_minutes: (ends_at - entry.elapsed_minutes).max(0.0),
                worker_count: entry.worker_count,
                samples: samples.len(),
                average_success_rate: mean(active.iter().map(|m| m.success_rate)),
                average_duration_seconds: mean(active.iter().map(|m| m.average_duration_seconds)),
                entities_at_end: samples.last().map(|m| m.total_entities),
            }
        })
        .collect()
}

/// Compare the first and last snapshots that saw any operation.
///
/// Fewer than two such snapshots yields `Stable` everywhere.
pub fn analyze_trends(history: &[AggregateMetrics]) -> TrendAnalysis {
    let active: Vec<&AggregateMetrics> =
        history.iter().filter(|m| m.total_operations > 0).collect();

    let (success_rate, response_time) = match (active.first(), active.last()) {
        (Some(first), Some(last)) if active.len() >= 2 => {
            let rate_delta = last.success_rate - first.success_rate;
            let success_rate = if rate_delta > SUCCESS_RATE_TOLERANCE {
                Trend::Improving
            } else if rate_delta < -SUCCESS_RATE_TOLERANCE {
                Trend::Declining
            } else {
                Trend::Stable
            };

            let response_time = if first.average_duration_seconds > 0.0 {
                let change = (last.average_duration_seconds - first.average_duration_seconds)
                    / first.average_duration_seconds;
                if change > DURATION_TOLERANCE {
                    Trend::Declining
                } else if change < -DURATION_TOLERANCE {
                    Trend::Improving
                } else {
                    Trend::Stable
                }
            } else {
                Trend::Stable
            };

            (success_rate, response_time)
        }
        _ => (Trend::Stable, Trend::Stable),
    };

    let entity_count = match (history.first(), history.last()) {
        (Some(first), Some(last)) if history.len() >= 2 => {
            match last.total_entities.cmp(&first.total_entities) {
                std::cmp::Ordering::Greater => VolumeTrend::Growing,
                std::cmp::Ordering::Less => VolumeTrend::Shrinking,
                std::cmp::Ordering::Equal => VolumeTrend::Stable,
            }
        }
        _ => VolumeTrend::Stable,
    };

    TrendAnalysis {
        success_rate,
        response_time,
        entity_count,
    }
}

pub fn analyze_performance(
    history: &[AggregateMetrics],
    config: &AgingTestConfig,
) -> PerformanceAnalysis {
    let active: Vec<&AggregateMetrics> =
        history.iter().filter(|m| m.total_operations > 0).collect();

    let first = active.first().map(|m| m.average_duration_seconds);
    let last = active.last().map(|m| m.average_duration_seconds);
    let peak = active
        .iter()
        .map(|m| m.average_duration_seconds)
        .fold(None, |acc: Option<f64>, d| Some(acc.map_or(d, |a| a.max(d))));

    let duration_change_percent = match (first, last) {
        (Some(first), Some(last)) if first > 0.0 => Some((last - first) / first * 100.0),
        _ => None,
    };

    let max_degradation_percent = history
        .iter()
        .filter_map(|m| m.max_degradation_percent)
        .fold(None, |acc: Option<f64>, d| Some(acc.map_or(d, |a| a.max(d))));

    let live = history.last().map_or(0, |m| m.total_entities) as u64;
    let max_entities = config.max_entities();

    PerformanceAnalysis {
        first_average_duration_seconds: first,
        last_average_duration_seconds: last,
        peak_average_duration_seconds: peak,
        duration_change_percent,
        final_degradation_percent: history.last().and_then(|m| m.average_degradation_percent),
        max_degradation_percent,
        data_limit_usage_percent: if max_entities > 0 {
            live as f64 / max_entities as f64 * 100.0
        } else {
            0.0
        },
        estimated_total_records: config.base_entities() + live,
    }
}

pub fn recommendations(
    summary: &Summary,
    performance: &PerformanceAnalysis,
    config: &AgingTestConfig,
) -> Vec<String> {
    let mut items = Vec::new();

    if performance.data_limit_usage_percent >= DATA_LIMIT_WARNING_PERCENT {
        items.push(format!(
            "Live data reached {:.1}% of the {} record ceiling; plan archiving or extra capacity",
            performance.data_limit_usage_percent,
            config.max_entities()
        ));
    }

    if summary.performance_degradation_detected {
        items.push(format!(
            "Response times degraded beyond {:.0}% of baseline; profile slow queries and review indexes",
            config.performance_degradation_threshold_percent
        ));
    }

    if summary.total_operations > 0 && summary.success_rate < MIN_HEALTHY_SUCCESS_RATE {
        items.push(format!(
            "Success rate {:.2}% is below {:.0}%; inspect failing operations on the target",
            summary.success_rate, MIN_HEALTHY_SUCCESS_RATE
        ));
    }

    if summary.average_duration_seconds > SLOW_OPERATION_SECONDS {
        items.push(format!(
            "Average operation took {:.3}s (over {:.1}s); check target resource usage",
            summary.average_duration_seconds, SLOW_OPERATION_SECONDS
        ));
    }

    if summary.failed_operations > 0 {
        items.push(format!(
            "{} operations failed; review worker logs for error details",
            summary.failed_operations
        ));
    }

    if items.is_empty() {
        items.push("No issues detected; the system stayed healthy for the whole run".to_string());
    }

    items
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    (count > 0).then(|| sum / count as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(
        elapsed: f64,
        phase: TestPhase,
        ops: u64,
        success_rate: f64,
        avg: f64,
        entities: usize,
    ) -> AggregateMetrics {
        let successful = (ops as f64 * success_rate / 100.0).round() as u64;
        AggregateMetrics {
            timestamp: Utc::now(),
            elapsed_minutes: elapsed,
            phase: Some(phase),
            active_workers: 2,
            total_operations: ops,
            successful_operations: successful,
            failed_operations: ops - successful,
            success_rate,
            average_duration_seconds: avg,
            entity_counts: BTreeMap::new(),
            total_entities: entities,
            average_degradation_percent: None,
            max_degradation_percent: None,
            data_limit_exceeded: false,
            performance_degradation_detected: false,
        }
    }

    fn phase(phase: TestPhase, at: f64, workers: usize) -> PhaseHistoryEntry {
        PhaseHistoryEntry {
            phase,
            timestamp: Utc::now(),
            elapsed_minutes: at,
            worker_count: workers,
        }
    }

    #[test]
    fn test_trends_need_two_active_snapshots() {
        let history = vec![
            snapshot(0.0, TestPhase::Warmup, 0, 0.0, 0.0, 0),
            snapshot(5.0, TestPhase::Warmup, 10, 100.0, 0.2, 4),
        ];
        let trends = analyze_trends(&history);

        assert_eq!(trends.success_rate, Trend::Stable);
        assert_eq!(trends.response_time, Trend::Stable);
        assert_eq!(trends.entity_count, VolumeTrend::Growing);
    }

    #[test]
    fn test_trend_tolerances() {
        let history = vec![
            snapshot(5.0, TestPhase::Steady, 100, 99.0, 0.100, 10),
            snapshot(10.0, TestPhase::Steady, 200, 99.5, 0.104, 10),
        ];
        let trends = analyze_trends(&history);
        assert_eq!(trends.success_rate, Trend::Stable);
        assert_eq!(trends.response_time, Trend::Stable);
        assert_eq!(trends.entity_count, VolumeTrend::Stable);

        let history = vec![
            snapshot(5.0, TestPhase::Steady, 100, 99.0, 0.100, 10),
            snapshot(10.0, TestPhase::Steady, 200, 90.0, 0.200, 3),
        ];
        let trends = analyze_trends(&history);
        assert_eq!(trends.success_rate, Trend::Declining);
        assert_eq!(trends.response_time, Trend::Declining);
        assert_eq!(trends.entity_count, VolumeTrend::Shrinking);

        let history = vec![
            snapshot(5.0, TestPhase::Steady, 100, 80.0, 0.200, 3),
            snapshot(10.0, TestPhase::Steady, 200, 99.0, 0.100, 3),
        ];
        let trends = analyze_trends(&history);
        assert_eq!(trends.success_rate, Trend::Improving);
        assert_eq!(trends.response_time, Trend::Improving);
    }

    #[test]
    fn test_phase_breakdown() {
        let phases = vec![
            phase(TestPhase::Warmup, 0.0, 2),
            phase(TestPhase::Peak, 5.0, 4),
        ];
        let history = vec![
            snapshot(2.5, TestPhase::Warmup, 10, 100.0, 0.1, 3),
            snapshot(5.0, TestPhase::Warmup, 20, 90.0, 0.3, 6),
            snapshot(7.5, TestPhase::Peak, 40, 100.0, 0.2, 12),
        ];

        let breakdown = phase_breakdown(&phases, &history, 9.0);
        assert_eq!(breakdown.len(), 2);

        let warmup = &breakdown[0];
        assert_eq!(warmup.duration_minutes, 5.0);
        assert_eq!(warmup.samples, 2);
        assert_eq!(warmup.average_success_rate, Some(95.0));
        assert!((warmup.average_duration_seconds.unwrap() - 0.2).abs() < 1e-9);
        assert_eq!(warmup.entities_at_end, Some(6));

        let peak = &breakdown[1];
        assert_eq!(peak.worker_count, 4);
        assert_eq!(peak.duration_minutes, 4.0);
        assert_eq!(peak.samples, 1);
    }

    #[test]
    fn test_performance_analysis() {
        let config = AgingTestConfig {
            base_data_count_ten_thousands: 1.0,
            max_data_count_ten_thousands: 0.01,
            ..Default::default()
        };
        let mut history = vec![
            snapshot(1.0, TestPhase::Warmup, 10, 100.0, 0.1, 20),
            snapshot(2.0, TestPhase::Warmup, 20, 100.0, 0.4, 50),
            snapshot(3.0, TestPhase::Warmup, 30, 100.0, 0.2, 90),
        ];
        history[1].max_degradation_percent = Some(30.0);
        history[2].average_degradation_percent = Some(12.0);

        let perf = analyze_performance(&history, &config);
        assert_eq!(perf.first_average_duration_seconds, Some(0.1));
        assert_eq!(perf.last_average_duration_seconds, Some(0.2));
        assert_eq!(perf.peak_average_duration_seconds, Some(0.4));
        assert!((perf.duration_change_percent.unwrap() - 100.0).abs() < 1e-9);
        assert_eq!(perf.final_degradation_percent, Some(12.0));
        assert_eq!(perf.max_degradation_percent, Some(30.0));
        assert!((perf.data_limit_usage_percent - 90.0).abs() < 1e-9);
        assert_eq!(perf.estimated_total_records, 10_090);
    }

    #[test]
    fn test_empty_history() {
        let config = AgingTestConfig::default();
        let perf = analyze_performance(&[], &config);
        assert!(perf.first_average_duration_seconds.is_none());
        assert_eq!(perf.data_limit_usage_percent, 0.0);
        assert!(phase_breakdown(&[], &[], 0.0).is_empty());
    }

    #[test]
    fn test_recommendations() {
        let config = AgingTestConfig::default();
        let stop = StopState {
            performance_degradation_detected: true,
            ..Default::default()
        };
        let history = vec![snapshot(1.0, TestPhase::Peak, 100, 50.0, 2.0, 1)];
        let report = build_report(ReportInputs {
            run_id: Uuid::new_v4(),
            start_time: Utc::now(),
            end_time: Utc::now(),
            elapsed_minutes: 1.0,
            planned_minutes: 10.0,
            config: &config,
            stop: &stop,
            termination: "stop condition",
            phase_history: &[],
            metrics_history: &history,
        });

        let recs = &report.analysis.recommendations;
        assert_eq!(recs.len(), 4);
        assert!(recs[0].contains("degraded"));
        assert!(recs[1].contains("50.00%"));
        assert!(recs[2].contains("2.000s"));
        assert!(recs[3].starts_with("50 operations failed"));
    }

    #[test]
    fn test_healthy_run_recommendation() {
        let config = AgingTestConfig::default();
        let history = vec![snapshot(1.0, TestPhase::Steady, 100, 100.0, 0.05, 10)];
        let report = build_report(ReportInputs {
            run_id: Uuid::new_v4(),
            start_time: Utc::now(),
            end_time: Utc::now(),
            elapsed_minutes: 1.0,
            planned_minutes: 1.0,
            config: &config,
            stop: &StopState::default(),
            termination: "completed normally",
            phase_history: &[],
            metrics_history: &history,
        });

        assert_eq!(report.summary.total_operations, 100);
        assert_eq!(report.analysis.recommendations.len(), 1);
        assert!(report.analysis.recommendations[0].starts_with("No issues detected"));
    }
}
