//! Load phases and the phase schedule of a run

use aging_core::AgingTestConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Load phases, executed in declaration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestPhase {
    Warmup,
    Steady,
    Peak,
    Cooldown,
}

impl TestPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Warmup => "warmup",
            Self::Steady => "steady",
            Self::Peak => "peak",
            Self::Cooldown => "cooldown",
        }
    }
}

impl fmt::Display for TestPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Length and concurrency of one phase
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhasePlan {
    pub phase: TestPhase,
    pub minutes: f64,
    pub multiplier: f64,
}

impl PhasePlan {
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.minutes.max(0.0) * 60.0)
    }

    /// Workers for this phase: `round(threads * multiplier)`, at least one
    pub fn worker_count(&self, concurrent_threads: usize) -> usize {
        ((concurrent_threads as f64 * self.multiplier).round() as usize).max(1)
    }
}

/// Ordered phases of a run; phases with no time left are dropped
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseSchedule {
    plans: Vec<PhasePlan>,
}

impl PhaseSchedule {
    /// Warmup → Steady → Peak → Cooldown.
    ///
    /// Steady gets whatever remains of `duration_hours` after warmup and the
    /// peak allotment; with nothing remaining it is skipped entirely.
    pub fn for_config(config: &AgingTestConfig) -> Self {
        let steady_minutes =
            config.duration_minutes() - config.warmup_minutes - config.peak_minutes;

        let plans = [
            PhasePlan {
                phase: TestPhase::Warmup,
                minutes: config.warmup_minutes,
                multiplier: 1.0,
            },
            PhasePlan {
                phase: TestPhase::Steady,
                minutes: steady_minutes,
                multiplier: 1.0,
            },
            PhasePlan {
                phase: TestPhase::Peak,
                minutes: config.peak_minutes,
                multiplier: config.peak_multiplier,
            },
            PhasePlan {
                phase: TestPhase::Cooldown,
                minutes: config.cooldown_minutes,
                multiplier: 1.0,
            },
        ]
        .into_iter()
        .filter(|plan| plan.minutes > 0.0)
        .collect();

        Self { plans }
    }

    pub fn plans(&self) -> &[PhasePlan] {
        &self.plans
    }

    pub fn phases(&self) -> Vec<TestPhase> {
        self.plans.iter().map(|p| p.phase).collect()
    }

    /// Sum of all scheduled phase lengths
    pub fn total_minutes(&self) -> f64 {
        self.plans.iter().map(|p| p.minutes).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schedule() {
        let schedule = PhaseSchedule::for_config(&AgingTestConfig::default());

        assert_eq!(
            schedule.phases(),
            vec![
                TestPhase::Warmup,
                TestPhase::Steady,
                TestPhase::Peak,
                TestPhase::Cooldown
            ]
        );
        // 24h - 30min warmup - 60min peak
        assert_eq!(schedule.plans()[1].minutes, 1350.0);
        assert_eq!(schedule.total_minutes(), 1440.0 + 15.0);
    }

    #[test]
    fn test_steady_skipped_for_short_runs() {
        let config = AgingTestConfig {
            duration_hours: 1.0,
            warmup_minutes: 5.0,
            ..Default::default()
        };
        let schedule = PhaseSchedule::for_config(&config);

        assert_eq!(
            schedule.phases(),
            vec![TestPhase::Warmup, TestPhase::Peak, TestPhase::Cooldown]
        );
        assert_eq!(schedule.plans()[0].minutes, 5.0);
        assert_eq!(schedule.plans()[1].minutes, 60.0);
        assert_eq!(schedule.plans()[2].minutes, 15.0);
        assert_eq!(schedule.total_minutes(), 80.0);
    }

    #[test]
    fn test_worker_counts() {
        let config = AgingTestConfig {
            concurrent_threads: 2,
            peak_multiplier: 2.0,
            ..Default::default()
        };
        let schedule = PhaseSchedule::for_config(&config);
        let peak = schedule
            .plans()
            .iter()
            .find(|p| p.phase == TestPhase::Peak)
            .unwrap();

        assert_eq!(peak.worker_count(config.concurrent_threads), 4);
        assert_eq!(schedule.plans()[0].worker_count(2), 2);

        let tiny = PhasePlan {
            phase: TestPhase::Peak,
            minutes: 1.0,
            multiplier: 0.1,
        };
        assert_eq!(tiny.worker_count(2), 1);

        let fractional = PhasePlan {
            phase: TestPhase::Peak,
            minutes: 1.0,
            multiplier: 1.5,
        };
        assert_eq!(fractional.worker_count(3), 5); // round(4.5)
    }

    #[test]
    fn test_plan_duration() {
        let plan = PhasePlan {
            phase: TestPhase::Warmup,
            minutes: 1.5,
            multiplier: 1.0,
        };
        assert_eq!(plan.duration(), Duration::from_secs(90));
    }
}
