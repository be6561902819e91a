//! Aging test runner: phase loop, worker pools and the reporting loop

use aging_core::{
    AgingError, AgingResult, AgingTestConfig, Credentials, OperationCatalog, SessionConnector,
};
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::metrics::AggregateMetrics;
use crate::monitor::Monitor;
use crate::phase::{PhasePlan, PhaseSchedule};
use crate::report::AgingReport;
use crate::reporter::ReportSink;
use crate::worker::Worker;

/// Longest the phase loop sleeps between checks
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// Every scheduled phase ran to its end
    Completed,
    /// The planned time budget ran out
    TimeBudget,
    /// Data limit or degradation latch fired
    StopCondition,
    /// [`StopHandle::stop`] was called
    Operator,
    /// Phase execution panicked
    Failed(String),
}

impl Termination {
    pub fn describe(&self) -> String {
        match self {
            Self::Completed | Self::TimeBudget => "completed normally".to_string(),
            Self::StopCondition => "stop condition triggered".to_string(),
            Self::Operator => "stopped by operator".to_string(),
            Self::Failed(message) => format!("aborted: {}", message),
        }
    }
}

/// Result of [`AgingTestRunner::run`]
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Latched stop reason, or a description of how the run ended
    pub stop_reason: String,
    pub termination: Termination,
    pub report: AgingReport,
}

/// Requests a graceful stop of a running test from another task
#[derive(Clone)]
pub struct StopHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }
}

struct WorkerPool {
    stop_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

struct ReportingLoop {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Drives a full aging run against one target
pub struct AgingTestRunner {
    config: Arc<AgingTestConfig>,
    catalog: Arc<OperationCatalog>,
    connector: Arc<dyn SessionConnector>,
    credentials: Arc<Credentials>,
    sink: Arc<dyn ReportSink>,
    schedule: PhaseSchedule,
    monitor: Arc<Monitor>,
    active: Arc<RwLock<Vec<Arc<Worker>>>>,
    pool: Mutex<Option<WorkerPool>>,
    next_worker_id: AtomicUsize,
    stop_tx: Arc<watch::Sender<bool>>,
    poll_interval: Duration,
}

impl AgingTestRunner {
    /// Validate `config` and wire the runner; nothing starts until [`run`](Self::run)
    pub fn new(
        config: AgingTestConfig,
        connector: Arc<dyn SessionConnector>,
        credentials: Credentials,
        sink: Arc<dyn ReportSink>,
    ) -> AgingResult<Self> {
        config
            .validate()
            .map_err(|e| AgingError::Validation(e.to_string()))?;

        let config = Arc::new(config);
        let schedule = PhaseSchedule::for_config(&config);
        let monitor = Arc::new(Monitor::with_planned_minutes(
            Arc::clone(&config),
            schedule.total_minutes(),
        ));
        let (stop_tx, _) = watch::channel(false);

        Ok(Self {
            catalog: Arc::new(OperationCatalog::new(config.operation_mix.clone())),
            config,
            connector,
            credentials: Arc::new(credentials),
            sink,
            schedule,
            monitor,
            active: Arc::new(RwLock::new(Vec::new())),
            pool: Mutex::new(None),
            next_worker_id: AtomicUsize::new(0),
            stop_tx: Arc::new(stop_tx),
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval.max(Duration::from_millis(1));
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            tx: Arc::clone(&self.stop_tx),
        }
    }

    pub fn monitor(&self) -> &Arc<Monitor> {
        &self.monitor
    }

    pub fn schedule(&self) -> &PhaseSchedule {
        &self.schedule
    }

    /// Workers of the current phase
    pub fn active_workers(&self) -> Vec<Arc<Worker>> {
        self.active.read().clone()
    }

    /// Execute all phases, then always produce and write the final report
    pub async fn run(&self) -> RunOutcome {
        self.monitor.start();
        info!(
            run_id = %self.monitor.run_id(),
            planned_minutes = self.schedule.total_minutes(),
            threads = self.config.concurrent_threads,
            phases = ?self.schedule.phases(),
            "Starting aging test"
        );

        let reporting = self.spawn_reporting_loop();

        let termination = match AssertUnwindSafe(self.execute_phases()).catch_unwind().await {
            Ok(termination) => termination,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(error = %message, "Phase execution aborted");
                Termination::Failed(message)
            }
        };

        self.stop_workers().await;
        reporting.stop().await;

        self.monitor.finish(termination.describe());
        let report = self.monitor.generate_report();
        if let Err(e) = self.sink.write_report(&report) {
            error!(error = %e, "Failed to write aging report");
        }

        let stop_reason = report
            .summary
            .stop_reason
            .clone()
            .unwrap_or_else(|| termination.describe());

        info!(
            total_operations = report.summary.total_operations,
            success_rate = report.summary.success_rate,
            duration_minutes = report.test_info.duration_minutes,
            stop_reason = %stop_reason,
            "Aging test finished"
        );

        RunOutcome {
            stop_reason,
            termination,
            report,
        }
    }

    async fn execute_phases(&self) -> Termination {
        for plan in self.schedule.plans() {
            match self.execute_phase(plan).await {
                Termination::Completed => continue,
                other => return other,
            }
        }
        Termination::Completed
    }

    async fn execute_phase(&self, plan: &PhasePlan) -> Termination {
        let worker_count = plan.worker_count(self.config.concurrent_threads);
        info!(
            phase = %plan.phase,
            minutes = plan.minutes,
            workers = worker_count,
            "Entering phase"
        );

        self.monitor.record_phase(plan.phase, worker_count);
        self.stop_workers().await;
        self.start_workers(worker_count);

        let started = Instant::now();
        let length = plan.duration();
        let outcome = loop {
            if *self.stop_tx.borrow() {
                info!(phase = %plan.phase, "Stop requested by operator");
                break Termination::Operator;
            }
            if !self.monitor.should_continue() {
                break if self.monitor.stop_state().is_triggered() {
                    Termination::StopCondition
                } else {
                    Termination::TimeBudget
                };
            }

            let elapsed = started.elapsed();
            if elapsed >= length {
                break Termination::Completed;
            }
            tokio::time::sleep(self.poll_interval.min(length - elapsed)).await;
        };

        // Last look at this pool before it goes away
        if let Err(e) = self.monitor.sample(&self.active_workers()) {
            warn!(error = %e, "Final phase sample failed");
        }
        self.stop_workers().await;

        info!(phase = %plan.phase, outcome = ?outcome, "Phase finished");
        outcome
    }

    fn start_workers(&self, count: usize) {
        let (stop_tx, stop_rx) = watch::channel(false);
        let mut workers = Vec::with_capacity(count);
        let mut handles = Vec::with_capacity(count);

        for _ in 0..count {
            let id = self.next_worker_id.fetch_add(1, Ordering::Relaxed);
            let worker = Arc::new(Worker::new(
                id,
                Arc::clone(&self.config),
                Arc::clone(&self.catalog),
                Arc::clone(&self.connector),
                Arc::clone(&self.credentials),
            ));
            handles.push(tokio::spawn(Arc::clone(&worker).run(stop_rx.clone())));
            workers.push(worker);
        }

        *self.active.write() = workers;
        *self.pool.lock() = Some(WorkerPool { stop_tx, handles });
    }

    /// Signal the current pool and wait up to the grace period for it.
    ///
    /// Workers still running after the grace period are detached; their
    /// late results are never sampled.
    async fn stop_workers(&self) {
        let pool = self.pool.lock().take();
        let Some(pool) = pool else {
            return;
        };

        pool.stop_tx.send_replace(true);
        let count = pool.handles.len();
        let grace = self.config.shutdown_grace();

        match tokio::time::timeout(grace, futures::future::join_all(pool.handles)).await {
            Ok(results) => {
                for result in results {
                    if let Err(e) = result {
                        warn!(error = %e, "Worker task ended abnormally");
                    }
                }
            }
            Err(_) => warn!(
                workers = count,
                grace_ms = grace.as_millis() as u64,
                "Workers did not stop within grace period, detaching"
            ),
        }

        self.active.write().clear();
    }

    fn spawn_reporting_loop(&self) -> ReportingLoop {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let monitor = Arc::clone(&self.monitor);
        let active = Arc::clone(&self.active);
        let sink = Arc::clone(&self.sink);
        let period = self.config.report_interval();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let workers = active.read().clone();
                        report_status(&monitor, sink.as_ref(), &workers);
                    }
                    _ = stop_rx.changed() => break,
                }
            }
        });

        ReportingLoop { stop_tx, handle }
    }
}

impl ReportingLoop {
    async fn stop(self) {
        self.stop_tx.send_replace(true);
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Reporting loop ended abnormally");
        }
    }
}

/// Sample the current pool and forward the snapshot to the sink.
///
/// Ticks that land between two phases see an empty pool; those are skipped
/// so the history carries no zero-worker snapshots.
fn report_status(monitor: &Monitor, sink: &dyn ReportSink, workers: &[Arc<Worker>]) {
    if workers.is_empty() {
        debug!("No active workers, status sample skipped");
        return;
    }

    match monitor.sample(workers) {
        Ok(metrics) => {
            log_status(&metrics);
            if let Err(e) = sink.write_status(&metrics) {
                warn!(error = %e, "Failed to write status");
            }
        }
        Err(e) => warn!(error = %e, "Status sample skipped"),
    }
}

fn log_status(metrics: &AggregateMetrics) {
    info!(
        phase = ?metrics.phase,
        elapsed_minutes = metrics.elapsed_minutes,
        workers = metrics.active_workers,
        total_operations = metrics.total_operations,
        success_rate = metrics.success_rate,
        avg_duration_s = metrics.average_duration_seconds,
        total_entities = metrics.total_entities,
        degradation_percent = ?metrics.average_degradation_percent,
        "Aging test status"
    );
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
