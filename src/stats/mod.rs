//! Rolling history and statistics over recent samples.
//!
//! Maintains fixed-capacity FIFO windows of recent values and derives live
//! statistics (mean, variance, histogram) from them without going back to
//! the server.

mod history;

pub use history::RollingHistory;

use std::collections::VecDeque;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

/// One bucket of an equal-width histogram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramBucket {
    /// Human-readable bucket range, e.g. "8.2-10.4"
    pub label: String,
    /// Number of samples falling into this bucket
    pub count: u64,
    /// Representative value for the bucket (midpoint)
    pub value: f64,
}

/// Fixed-capacity window of numeric samples with derived statistics.
///
/// `variance` uses the population formula (divide by N). The window is a
/// live stability readout, not a sample estimator, and downstream display
/// code depends on the ÷N behavior.
pub struct RollingStatistics {
    samples: RwLock<VecDeque<f64>>,
    capacity: usize,
}

impl RollingStatistics {
    /// Create a window holding at most `capacity` samples.
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest once the window is full.
    pub fn push(&self, value: f64) {
        let mut samples = self.samples.write().unwrap();
        if samples.len() >= self.capacity {
            samples.pop_front();
        }
        samples.push_back(value);
    }

    /// Number of samples currently in the window.
    pub fn len(&self) -> usize {
        self.samples.read().unwrap().len()
    }

    /// True when no samples have been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.samples.read().unwrap().is_empty()
    }

    /// Maximum number of samples retained.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Samples in insertion order (oldest first).
    pub fn values(&self) -> Vec<f64> {
        self.samples.read().unwrap().iter().copied().collect()
    }

    /// Mean over the current window. Empty window yields 0, not NaN.
    pub fn mean(&self) -> f64 {
        let samples = self.samples.read().unwrap();
        if samples.is_empty() {
            return 0.0;
        }
        samples.iter().sum::<f64>() / samples.len() as f64
    }

    /// Population variance (÷N) over the current window.
    ///
    /// Empty window yields 0; a single sample yields 0.
    pub fn variance(&self) -> f64 {
        let samples = self.samples.read().unwrap();
        if samples.is_empty() {
            return 0.0;
        }
        let mean = samples.iter().sum::<f64>() / samples.len() as f64;
        samples.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / samples.len() as f64
    }

    /// Population standard deviation over the current window.
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Bucket the current samples into `bins` equal-width buckets spanning
    /// `[min, max]`. Samples outside the range are clamped into the first
    /// or last bucket. A degenerate range (min >= max) collapses into a
    /// single bucket holding everything.
    pub fn histogram(&self, bins: usize, min: f64, max: f64) -> Vec<HistogramBucket> {
        let samples = self.samples.read().unwrap();
        if samples.is_empty() || bins == 0 {
            return Vec::new();
        }

        if min >= max {
            return vec![HistogramBucket {
                label: format!("{:.1}-{:.1}", min, max),
                count: samples.len() as u64,
                value: min,
            }];
        }

        let width = (max - min) / bins as f64;
        let mut counts = vec![0u64; bins];
        for &v in samples.iter() {
            let idx = (((v - min) / width) as isize).clamp(0, bins as isize - 1) as usize;
            counts[idx] += 1;
        }

        counts
            .into_iter()
            .enumerate()
            .map(|(i, count)| {
                let lo = min + width * i as f64;
                let hi = lo + width;
                HistogramBucket {
                    label: format!("{:.1}-{:.1}", lo, hi),
                    count,
                    value: (lo + hi) / 2.0,
                }
            })
            .collect()
    }

    /// Histogram over the observed sample range.
    pub fn auto_histogram(&self, bins: usize) -> Vec<HistogramBucket> {
        let (min, max) = {
            let samples = self.samples.read().unwrap();
            if samples.is_empty() {
                return Vec::new();
            }
            let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
            let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            (min, max)
        };
        self.histogram(bins, min, max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_empty_window_mean_variance_zero() {
        let stats = RollingStatistics::new(10);
        assert_eq!(stats.mean(), 0.0);
        assert_eq!(stats.variance(), 0.0);
        assert_eq!(stats.std_dev(), 0.0);
        assert!(stats.is_empty());
    }

    #[test]
    fn test_single_sample_variance_zero() {
        let stats = RollingStatistics::new(10);
        stats.push(42.0);
        assert_eq!(stats.mean(), 42.0);
        assert_eq!(stats.variance(), 0.0);
    }

    #[test]
    fn test_identical_samples_variance_zero() {
        let stats = RollingStatistics::new(10);
        for _ in 0..4 {
            stats.push(5.0);
        }
        assert_eq!(stats.mean(), 5.0);
        assert_eq!(stats.variance(), 0.0);
    }

    #[test]
    fn test_population_variance_divides_by_n() {
        let stats = RollingStatistics::new(10);
        stats.push(2.0);
        stats.push(4.0);
        // Population variance of [2, 4]: ((−1)² + 1²) / 2 = 1.
        // The sample estimator (÷ N−1) would give 2.
        assert!((stats.variance() - 1.0).abs() < f64::EPSILON);
        assert!((stats.std_dev() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_eviction_keeps_most_recent() {
        let stats = RollingStatistics::new(3);
        for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
            stats.push(v);
        }
        assert_eq!(stats.len(), 3);
        assert_eq!(stats.values(), vec![3.0, 4.0, 5.0]);
        assert_eq!(stats.mean(), 4.0);
    }

    #[test]
    fn test_histogram_buckets_and_labels() {
        let stats = RollingStatistics::new(10);
        for v in [0.0, 1.0, 5.0, 9.0, 10.0] {
            stats.push(v);
        }
        let buckets = stats.histogram(2, 0.0, 10.0);
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].label, "0.0-5.0");
        assert_eq!(buckets[1].label, "5.0-10.0");
        // 0.0 and 1.0 fall in the first bucket; 5.0, 9.0 and the clamped
        // max sample land in the second.
        assert_eq!(buckets[0].count, 2);
        assert_eq!(buckets[1].count, 3);
        assert!((buckets[0].value - 2.5).abs() < f64::EPSILON);
        assert!((buckets[1].value - 7.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_histogram_degenerate_range_single_bucket() {
        let stats = RollingStatistics::new(10);
        stats.push(3.0);
        stats.push(3.0);
        let buckets = stats.auto_histogram(10);
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].count, 2);
    }

    #[test]
    fn test_histogram_empty_window() {
        let stats = RollingStatistics::new(10);
        assert!(stats.histogram(10, 0.0, 1.0).is_empty());
        assert!(stats.auto_histogram(10).is_empty());
    }

    #[test]
    fn test_histogram_counts_cover_all_samples() {
        let stats = RollingStatistics::new(100);
        for i in 0..50 {
            stats.push(i as f64);
        }
        let buckets = stats.auto_histogram(7);
        let total: u64 = buckets.iter().map(|b| b.count).sum();
        assert_eq!(total, 50);
    }

    proptest! {
        #[test]
        fn prop_window_holds_most_recent_capacity_values(
            values in proptest::collection::vec(-1e6f64..1e6, 0..400),
            capacity in 1usize..64,
        ) {
            let stats = RollingStatistics::new(capacity);
            for &v in &values {
                stats.push(v);
            }
            let window = stats.values();
            let expected: Vec<f64> = values
                .iter()
                .copied()
                .skip(values.len().saturating_sub(capacity))
                .collect();
            prop_assert_eq!(window.len(), values.len().min(capacity));
            prop_assert_eq!(window, expected);
        }

        #[test]
        fn prop_variance_never_nan(
            values in proptest::collection::vec(-1e6f64..1e6, 0..100),
        ) {
            let stats = RollingStatistics::new(50);
            for &v in &values {
                stats.push(v);
            }
            prop_assert!(!stats.mean().is_nan());
            prop_assert!(!stats.variance().is_nan());
            prop_assert!(stats.variance() >= 0.0);
        }
    }
}
