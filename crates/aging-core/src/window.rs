//! Sliding performance window with a one-shot baseline

use std::collections::VecDeque;

/// Default number of samples kept per window.
pub const DEFAULT_WINDOW_SIZE: usize = 100;

/// Minimum samples before a degradation reading is reported.
pub const MIN_DEGRADATION_SAMPLES: usize = 10;

/// Fixed-capacity FIFO of operation durations (seconds).
///
/// The baseline is the mean of the first `capacity` samples ever recorded.
/// It is captured the moment the window first fills and never recomputed,
/// so later readings compare live performance against cold-start behavior.
#[derive(Debug, Clone)]
pub struct PerformanceWindow {
    samples: VecDeque<f64>,
    capacity: usize,
    sum: f64,
    baseline: Option<f64>,
}

impl PerformanceWindow {
    /// Create an empty window; a zero capacity is clamped to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            sum: 0.0,
            baseline: None,
        }
    }

    /// Record a duration, evicting the oldest sample when full.
    pub fn record(&mut self, duration_seconds: f64) {
        self.samples.push_back(duration_seconds);
        self.sum += duration_seconds;

        if self.samples.len() > self.capacity {
            if let Some(evicted) = self.samples.pop_front() {
                self.sum -= evicted;
            }
        }

        if self.baseline.is_none() && self.samples.len() == self.capacity {
            self.baseline = Some(self.exact_mean());
        }
    }

    pub fn baseline(&self) -> Option<f64> {
        self.baseline
    }

    /// Mean of the current contents; 0.0 when empty.
    pub fn current_mean(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.sum / self.samples.len() as f64
    }

    /// Percent change of the current mean over the baseline.
    ///
    /// `None` until the baseline exists and at least
    /// [`MIN_DEGRADATION_SAMPLES`] samples are present.
    pub fn degradation_percent(&self) -> Option<f64> {
        let baseline = self.baseline?;
        if self.samples.len() < MIN_DEGRADATION_SAMPLES || baseline <= 0.0 {
            return None;
        }
        Some((self.current_mean() - baseline) / baseline * 100.0)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    // Running sums drift over long runs; the baseline is taken from the samples.
    fn exact_mean(&self) -> f64 {
        self.samples.iter().sum::<f64>() / self.samples.len() as f64
    }
}

impl Default for PerformanceWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SIZE)
    }
}
