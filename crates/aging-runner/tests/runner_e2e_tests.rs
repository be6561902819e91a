//! End-to-end aging runs against the in-memory target
//!
//! All tests run on a paused tokio clock, so hour-long schedules finish in
//! well under a second of wall time.

use aging_client::{MemoryTarget, MemoryTargetOptions};
use aging_core::{AgingTestConfig, Credentials, OperationKind, OperationMix};
use aging_runner::{
    AgingReport, AgingTestRunner, FileReportSink, MemoryReportSink, ReportFormat, ReportSink,
    TestPhase, Termination,
};
use std::sync::Arc;
use std::time::Duration;

fn create_only() -> OperationMix {
    OperationMix {
        create_pct: 1.0,
        read_pct: 0.0,
        update_pct: 0.0,
        delete_pct: 0.0,
        list_pct: 0.0,
    }
}

fn runner(
    config: AgingTestConfig,
    target: MemoryTarget,
    sink: Arc<dyn ReportSink>,
) -> AgingTestRunner {
    AgingTestRunner::new(
        config,
        Arc::new(target),
        Credentials::new("aging", "secret"),
        sink,
    )
    .expect("valid config")
}

fn assert_totals_match_last_snapshot(report: &AgingReport) {
    let last = report.metrics_history.last().expect("at least one snapshot");
    assert_eq!(report.summary.total_operations, last.total_operations);
    assert_eq!(report.summary.total_entities, last.total_entities);
}

#[tokio::test(start_paused = true)]
async fn test_short_run_skips_steady_phase() {
    let config = AgingTestConfig {
        duration_hours: 1.0,
        concurrent_threads: 2,
        operation_interval_seconds: 10.0,
        warmup_minutes: 5.0,
        peak_multiplier: 2.0,
        report_interval_minutes: 10.0,
        ..Default::default()
    };
    let sink = Arc::new(MemoryReportSink::new());
    let runner = runner(config, MemoryTarget::new(), sink.clone());

    assert_eq!(
        runner.schedule().phases(),
        vec![TestPhase::Warmup, TestPhase::Peak, TestPhase::Cooldown]
    );

    let outcome = runner.run().await;
    let report = &outcome.report;

    assert_eq!(outcome.stop_reason, "completed normally");
    assert!(matches!(
        outcome.termination,
        Termination::Completed | Termination::TimeBudget
    ));

    let phases: Vec<_> = report
        .summary
        .phase_history
        .iter()
        .map(|entry| (entry.phase, entry.worker_count))
        .collect();
    assert_eq!(
        phases,
        vec![
            (TestPhase::Warmup, 2),
            (TestPhase::Peak, 4),
            (TestPhase::Cooldown, 2)
        ]
    );

    // 5 + 60 + 15 minutes of simulated time
    assert!((report.test_info.duration_minutes - 80.0).abs() < 0.5);
    assert!(report.summary.total_operations > 0);
    assert_eq!(report.summary.success_rate, 100.0);
    assert!(!report.summary.data_limit_exceeded);
    assert!(!report.summary.performance_degradation_detected);
    assert!(report.summary.stop_reason.is_none());
    assert_totals_match_last_snapshot(report);

    // Periodic snapshots plus one at the end of each phase
    assert!(sink.statuses().len() >= 7);
    assert!(report.metrics_history.len() >= sink.statuses().len() + 3);
    assert_eq!(sink.reports().len(), 1);
    assert!(runner.active_workers().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_failing_creates_leave_no_entities() {
    let config = AgingTestConfig {
        duration_hours: 0.05,
        concurrent_threads: 2,
        warmup_minutes: 1.0,
        peak_minutes: 1.0,
        cooldown_minutes: 1.0,
        operation_mix: create_only(),
        ..Default::default()
    };
    let target = MemoryTarget::with_options(MemoryTargetOptions {
        failing_operations: [OperationKind::Create].into_iter().collect(),
        ..Default::default()
    });
    let sink = Arc::new(MemoryReportSink::new());
    let outcome = runner(config, target.clone(), sink).run().await;
    let summary = &outcome.report.summary;

    assert!(summary.total_operations > 0);
    assert_eq!(summary.successful_operations, 0);
    assert_eq!(summary.success_rate, 0.0);
    assert_eq!(summary.total_entities, 0);
    assert_eq!(target.total_records(), 0);

    let recommendations = &outcome.report.analysis.recommendations;
    assert!(recommendations.iter().any(|r| r.contains("Success rate")));
    assert!(recommendations.iter().any(|r| r.contains("operations failed")));
}

#[tokio::test(start_paused = true)]
async fn test_data_limit_stops_run_early() {
    let config = AgingTestConfig {
        duration_hours: 1.0,
        concurrent_threads: 2,
        max_data_count_ten_thousands: 0.001, // 10 live entities
        report_interval_minutes: 0.5,
        operation_mix: create_only(),
        ..Default::default()
    };
    let target = MemoryTarget::new();
    let sink = Arc::new(MemoryReportSink::new());
    let outcome = runner(config, target.clone(), sink.clone()).run().await;
    let report = &outcome.report;

    assert_eq!(outcome.termination, Termination::StopCondition);
    assert!(outcome.stop_reason.contains("data limit exceeded"));
    assert!(report.summary.data_limit_exceeded);
    assert!(!report.summary.performance_degradation_detected);

    // Stopped during warmup, long before the planned 75 minutes
    assert_eq!(report.summary.phase_history.len(), 1);
    assert_eq!(report.summary.phase_history[0].phase, TestPhase::Warmup);
    assert!(report.test_info.duration_minutes < 2.0);
    assert!(report.summary.total_entities > 10);
    assert!(target.total_records() > 10);
    assert!(sink.statuses().iter().any(|m| m.data_limit_exceeded));
    assert_totals_match_last_snapshot(report);
}

#[tokio::test(start_paused = true)]
async fn test_growing_latency_triggers_degradation() {
    let config = AgingTestConfig {
        duration_hours: 1.0,
        concurrent_threads: 1,
        performance_window_size: 10,
        performance_degradation_threshold_percent: 50.0,
        report_interval_minutes: 0.5,
        operation_mix: create_only(),
        ..Default::default()
    };
    // 10ms base plus 1ms per stored record
    let target = MemoryTarget::with_options(MemoryTargetOptions {
        latency: Duration::from_millis(10),
        latency_per_thousand_records: Duration::from_secs(1),
        ..Default::default()
    });
    let sink = Arc::new(MemoryReportSink::new());
    let outcome = runner(config, target, sink).run().await;
    let report = &outcome.report;

    assert_eq!(outcome.termination, Termination::StopCondition);
    assert!(outcome.stop_reason.starts_with("performance degraded"));
    assert!(report.summary.performance_degradation_detected);
    assert!(!report.summary.data_limit_exceeded);
    assert!(report.test_info.duration_minutes < 2.0);

    let degradation = report
        .analysis
        .performance_analysis
        .max_degradation_percent
        .expect("degradation reading");
    assert!(degradation > 50.0);
    assert!(report
        .analysis
        .recommendations
        .iter()
        .any(|r| r.contains("degraded")));
}

#[tokio::test(start_paused = true)]
async fn test_rejected_logins_produce_empty_report() {
    let config = AgingTestConfig {
        duration_hours: 0.05,
        concurrent_threads: 3,
        warmup_minutes: 1.0,
        peak_minutes: 1.0,
        cooldown_minutes: 1.0,
        ..Default::default()
    };
    let target = MemoryTarget::with_options(MemoryTargetOptions {
        reject_logins: true,
        ..Default::default()
    });
    let sink = Arc::new(MemoryReportSink::new());
    let outcome = runner(config, target, sink.clone()).run().await;

    assert_eq!(outcome.stop_reason, "completed normally");
    assert_eq!(outcome.report.summary.total_operations, 0);
    assert_eq!(outcome.report.summary.phase_history.len(), 4);
    assert_eq!(sink.reports().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_file_sink_receives_status_and_report() {
    let dir = tempfile::tempdir().unwrap();
    let config = AgingTestConfig {
        duration_hours: 0.1,
        concurrent_threads: 1,
        warmup_minutes: 1.0,
        peak_minutes: 1.0,
        cooldown_minutes: 1.0,
        report_interval_minutes: 1.0,
        ..Default::default()
    };
    let sink = Arc::new(FileReportSink::new(
        dir.path(),
        vec![ReportFormat::Json, ReportFormat::Markdown],
    ));
    let outcome = runner(config, MemoryTarget::new(), sink.clone()).run().await;

    let status = std::fs::read_to_string(sink.status_path()).unwrap();
    assert!(status.lines().count() >= 5);

    let paths = sink.report_paths(&outcome.report);
    let json = std::fs::read_to_string(&paths[0]).unwrap();
    let parsed: AgingReport = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.test_info.run_id, outcome.report.test_info.run_id);
    assert_eq!(
        parsed.summary.total_operations,
        outcome.report.summary.total_operations
    );
    assert_eq!(parsed.metrics_history.len(), outcome.report.metrics_history.len());

    let markdown = std::fs::read_to_string(&paths[1]).unwrap();
    assert!(markdown.contains("## Recommendations"));
}
