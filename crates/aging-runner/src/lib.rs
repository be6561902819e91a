//! Aging (soak) test orchestration
//!
//! A run walks through warmup, steady, peak and cooldown phases. Each phase
//! gets a fresh pool of [`Worker`]s issuing random CRUD operations against a
//! target; a [`Monitor`] aggregates their statistics, latches stop
//! conditions (data ceiling, response-time degradation) and produces the
//! final [`AgingReport`].

pub mod metrics;
pub mod monitor;
pub mod phase;
pub mod report;
pub mod reporter;
pub mod runner;
pub mod worker;

pub use metrics::{
    AggregateMetrics, OperationResult, PhaseHistoryEntry, StatisticsSource, StopState,
    WorkerStatistics,
};
pub use monitor::Monitor;
pub use phase::{PhasePlan, PhaseSchedule, TestPhase};
pub use report::{AgingReport, Analysis, Summary, TestInfo, Trend, VolumeTrend};
pub use reporter::{parse_formats, FileReportSink, MemoryReportSink, ReportFormat, ReportSink};
pub use runner::{AgingTestRunner, RunOutcome, StopHandle, Termination};
pub use worker::{Worker, WorkerState};
