//! Metric records shared by workers, the monitor and reports

use aging_core::{EntityKind, OperationKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::phase::TestPhase;

/// Outcome of one operation executed by a worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationResult {
    /// Operation actually performed (a Read on an empty cache becomes a Create)
    pub operation: OperationKind,
    pub entity: EntityKind,
    pub success: bool,
    pub duration_seconds: f64,
    pub error_message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Consistent point-in-time statistics of one worker
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerStatistics {
    pub worker_id: usize,
    pub total_operations: u64,
    pub successful_operations: u64,
    pub failed_operations: u64,
    /// Percent (0-100); 0 when no operation ran
    pub success_rate: f64,
    pub average_duration_seconds: f64,
    pub min_duration_seconds: f64,
    pub max_duration_seconds: f64,
    pub entity_counts: BTreeMap<EntityKind, usize>,
    pub total_entities: usize,
    pub degradation_percent: Option<f64>,
    pub baseline_seconds: Option<f64>,
    pub current_mean_seconds: f64,
}

/// Anything the monitor can read worker statistics from
pub trait StatisticsSource {
    fn statistics(&self) -> WorkerStatistics;
}

impl StatisticsSource for WorkerStatistics {
    fn statistics(&self) -> WorkerStatistics {
        self.clone()
    }
}

impl<T: StatisticsSource + ?Sized> StatisticsSource for Arc<T> {
    fn statistics(&self) -> WorkerStatistics {
        (**self).statistics()
    }
}

/// Stop-condition latches; flags only ever go from false to true
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StopState {
    pub data_limit_exceeded: bool,
    pub performance_degradation_detected: bool,
    pub stop_reason: Option<String>,
}

impl StopState {
    pub fn is_triggered(&self) -> bool {
        self.data_limit_exceeded || self.performance_degradation_detected
    }

    pub(crate) fn latch_data_limit(&mut self, reason: String) {
        self.data_limit_exceeded = true;
        self.stop_reason = Some(reason);
    }

    pub(crate) fn latch_degradation(&mut self, reason: String) {
        self.performance_degradation_detected = true;
        self.stop_reason = Some(reason);
    }
}

/// One phase transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseHistoryEntry {
    pub phase: TestPhase,
    pub timestamp: DateTime<Utc>,
    pub elapsed_minutes: f64,
    pub worker_count: usize,
}

/// Aggregate snapshot taken by the monitor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateMetrics {
    pub timestamp: DateTime<Utc>,
    pub elapsed_minutes: f64,
    pub phase: Option<TestPhase>,
    pub active_workers: usize,
    pub total_operations: u64,
    pub successful_operations: u64,
    pub failed_operations: u64,
    /// Percent (0-100) over workers that ran at least one operation
    pub success_rate: f64,
    pub average_duration_seconds: f64,
    pub entity_counts: BTreeMap<EntityKind, usize>,
    pub total_entities: usize,
    pub average_degradation_percent: Option<f64>,
    pub max_degradation_percent: Option<f64>,
    pub data_limit_exceeded: bool,
    pub performance_degradation_detected: bool,
}
