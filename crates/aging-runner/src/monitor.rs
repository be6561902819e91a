//! Aggregates worker statistics, latches stop conditions and keeps history

use aging_core::{AgingError, AgingResult, AgingTestConfig};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::warn;
use uuid::Uuid;

use crate::metrics::{AggregateMetrics, PhaseHistoryEntry, StatisticsSource, StopState};
use crate::phase::{PhaseSchedule, TestPhase};
use crate::report::{build_report, AgingReport, ReportInputs};

struct Started {
    instant: Instant,
    at: DateTime<Utc>,
}

#[derive(Default)]
struct MonitorInner {
    started: Option<Started>,
    finished_at: Option<DateTime<Utc>>,
    current_phase: Option<TestPhase>,
    stop: StopState,
    termination: Option<String>,
    phase_history: Vec<PhaseHistoryEntry>,
    metrics_history: Vec<AggregateMetrics>,
}

/// Run-wide observer shared by the runner and its reporting loop
pub struct Monitor {
    run_id: Uuid,
    config: Arc<AgingTestConfig>,
    planned_minutes: f64,
    inner: Mutex<MonitorInner>,
}

impl Monitor {
    /// Monitor whose time budget is the full phase schedule of `config`
    pub fn new(config: Arc<AgingTestConfig>) -> Self {
        let planned_minutes = PhaseSchedule::for_config(&config).total_minutes();
        Self::with_planned_minutes(config, planned_minutes)
    }

    pub fn with_planned_minutes(config: Arc<AgingTestConfig>, planned_minutes: f64) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            config,
            planned_minutes,
            inner: Mutex::new(MonitorInner::default()),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn planned_minutes(&self) -> f64 {
        self.planned_minutes
    }

    /// Record the run start; later calls are ignored
    pub fn start(&self) {
        let mut inner = self.inner.lock();
        if inner.started.is_none() {
            inner.started = Some(Started {
                instant: Instant::now(),
                at: Utc::now(),
            });
        }
    }

    /// Record the run end and how it ended
    pub fn finish(&self, termination: impl Into<String>) {
        let mut inner = self.inner.lock();
        inner.finished_at = Some(Utc::now());
        inner.termination = Some(termination.into());
    }

    pub fn record_phase(&self, phase: TestPhase, worker_count: usize) {
        let mut inner = self.inner.lock();
        let elapsed_minutes = elapsed_minutes(&inner);
        inner.current_phase = Some(phase);
        inner.phase_history.push(PhaseHistoryEntry {
            phase,
            timestamp: Utc::now(),
            elapsed_minutes,
            worker_count,
        });
    }

    pub fn current_phase(&self) -> Option<TestPhase> {
        self.inner.lock().current_phase
    }

    /// Aggregate a snapshot over `workers`, check stop conditions and
    /// append the snapshot to the history.
    pub fn sample<W: StatisticsSource>(&self, workers: &[W]) -> AgingResult<AggregateMetrics> {
        // Worker locks are taken before ours, never while holding it
        let stats: Vec<_> = workers.iter().map(StatisticsSource::statistics).collect();

        let mut inner = self.inner.lock();
        if inner.started.is_none() {
            return Err(AgingError::invalid_state("monitor sampled before start"));
        }

        let total_operations: u64 = stats.iter().map(|s| s.total_operations).sum();
        let successful_operations: u64 = stats.iter().map(|s| s.successful_operations).sum();
        let failed_operations: u64 = stats.iter().map(|s| s.failed_operations).sum();

        let (success_rate, average_duration_seconds) = if total_operations > 0 {
            let weighted_duration: f64 = stats
                .iter()
                .map(|s| s.average_duration_seconds * s.total_operations as f64)
                .sum();
            (
                successful_operations as f64 / total_operations as f64 * 100.0,
                weighted_duration / total_operations as f64,
            )
        } else {
            (0.0, 0.0)
        };

        let mut entity_counts = BTreeMap::new();
        for s in &stats {
            for (kind, count) in &s.entity_counts {
                *entity_counts.entry(*kind).or_insert(0) += count;
            }
        }
        let total_entities: usize = stats.iter().map(|s| s.total_entities).sum();

        let readings: Vec<f64> = stats.iter().filter_map(|s| s.degradation_percent).collect();
        let average_degradation_percent = (!readings.is_empty())
            .then(|| readings.iter().sum::<f64>() / readings.len() as f64);
        let max_degradation_percent = readings.iter().copied().reduce(f64::max);

        self.check_stop_conditions(&mut inner.stop, total_entities, average_degradation_percent);

        let metrics = AggregateMetrics {
            timestamp: Utc::now(),
            elapsed_minutes: elapsed_minutes(&inner),
            phase: inner.current_phase,
            active_workers: stats.len(),
            total_operations,
            successful_operations,
            failed_operations,
            success_rate,
            average_duration_seconds,
            entity_counts,
            total_entities,
            average_degradation_percent,
            max_degradation_percent,
            data_limit_exceeded: inner.stop.data_limit_exceeded,
            performance_degradation_detected: inner.stop.performance_degradation_detected,
        };
        inner.metrics_history.push(metrics.clone());
        Ok(metrics)
    }

    fn check_stop_conditions(
        &self,
        stop: &mut StopState,
        total_entities: usize,
        average_degradation: Option<f64>,
    ) {
        let max_entities = self.config.max_entities();
        if total_entities as u64 > max_entities {
            let reason = format!(
                "data limit exceeded: {} live entities over the {} ceiling",
                total_entities, max_entities
            );
            if !stop.data_limit_exceeded {
                warn!(total_entities, max_entities, "Data limit exceeded");
            }
            stop.latch_data_limit(reason);
        }

        let threshold = self.config.performance_degradation_threshold_percent;
        if let Some(degradation) = average_degradation.filter(|d| *d > threshold) {
            let reason = format!(
                "performance degraded by {:.1}% (threshold {:.1}%)",
                degradation, threshold
            );
            if !stop.performance_degradation_detected {
                warn!(degradation, threshold, "Performance degradation detected");
            }
            stop.latch_degradation(reason);
        }
    }

    /// False once a stop condition latched or the planned time is used up
    pub fn should_continue(&self) -> bool {
        let inner = self.inner.lock();
        !inner.stop.is_triggered() && elapsed_minutes(&inner) < self.planned_minutes
    }

    pub fn stop_state(&self) -> StopState {
        self.inner.lock().stop.clone()
    }

    pub fn phase_history(&self) -> Vec<PhaseHistoryEntry> {
        self.inner.lock().phase_history.clone()
    }

    pub fn metrics_history(&self) -> Vec<AggregateMetrics> {
        self.inner.lock().metrics_history.clone()
    }

    /// Minutes since [`Monitor::start`]; 0 before it
    pub fn elapsed_minutes(&self) -> f64 {
        elapsed_minutes(&self.inner.lock())
    }

    pub fn generate_report(&self) -> AgingReport {
        let inner = self.inner.lock();
        let now = Utc::now();
        let start_time = inner.started.as_ref().map_or(now, |s| s.at);

        build_report(ReportInputs {
            run_id: self.run_id,
            start_time,
            end_time: inner.finished_at.unwrap_or(now),
            elapsed_minutes: elapsed_minutes(&inner),
            planned_minutes: self.planned_minutes,
            config: &self.config,
            stop: &inner.stop,
            termination: inner.termination.as_deref().unwrap_or("in progress"),
            phase_history: &inner.phase_history,
            metrics_history: &inner.metrics_history,
        })
    }
}

fn elapsed_minutes(inner: &MonitorInner) -> f64 {
    inner
        .started
        .as_ref()
        .map_or(0.0, |s| s.instant.elapsed().as_secs_f64() / 60.0)
}
