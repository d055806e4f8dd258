//! Small numeric helpers shared by the experiments.
//!
//! Every function is total: empty inputs and zero denominators yield `0.0`.

use serde::Serialize;

/// Arithmetic mean.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() { 0.0 } else { values.iter().sum::<f64>() / values.len() as f64 }
}

/// Population standard deviation.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = mean(values);
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Median, averaging the two middle values for even lengths.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 { (sorted[mid - 1] + sorted[mid]) / 2.0 } else { sorted[mid] }
}

/// Relative improvement of `candidate` over `baseline` for lower-is-better metrics,
/// in percent: `(baseline - candidate) / baseline * 100`.
pub fn percent_improvement(baseline: f64, candidate: f64) -> f64 {
    if baseline == 0.0 { 0.0 } else { (baseline - candidate) / baseline * 100.0 }
}

/// Relative gain of `candidate` over `baseline` for higher-is-better metrics, in percent.
pub fn percent_gain(baseline: f64, candidate: f64) -> f64 {
    if baseline == 0.0 { 0.0 } else { (candidate - baseline) / baseline * 100.0 }
}

/// Sequential throughput implied by a per-transaction latency.
pub fn tps_from_latency_ms(latency_ms: f64) -> f64 {
    if latency_ms > 0.0 { 1_000.0 / latency_ms } else { 0.0 }
}

/// Throughput of `count` operations completed in `elapsed_ms`.
pub fn throughput(count: usize, elapsed_ms: f64) -> f64 {
    if elapsed_ms > 0.0 { count as f64 / elapsed_ms * 1_000.0 } else { 0.0 }
}

/// Rounds to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Summary of a [`LatencySeries`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LatencySummary {
    /// Number of samples.
    pub count: usize,
    /// Mean in milliseconds.
    pub mean_ms: f64,
    /// Median in milliseconds.
    pub median_ms: f64,
    /// Population standard deviation in milliseconds.
    pub std_dev_ms: f64,
    /// Smallest sample.
    pub min_ms: f64,
    /// Largest sample.
    pub max_ms: f64,
}

/// An append-only collection of latency samples in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LatencySeries {
    samples: Vec<f64>,
}

impl LatencySeries {
    /// Creates an empty series.
    pub const fn new() -> Self {
        Self { samples: Vec::new() }
    }

    /// Adds one sample.
    pub fn push(&mut self, latency_ms: f64) {
        self.samples.push(latency_ms);
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether no samples were recorded.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Raw samples in insertion order.
    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    /// Mean of the samples.
    pub fn mean(&self) -> f64 {
        mean(&self.samples)
    }

    /// Descriptive statistics of the samples.
    pub fn summary(&self) -> LatencySummary {
        if self.samples.is_empty() {
            return LatencySummary::default();
        }
        LatencySummary {
            count: self.samples.len(),
            mean_ms: mean(&self.samples),
            median_ms: median(&self.samples),
            std_dev_ms: std_dev(&self.samples),
            min_ms: self.samples.iter().copied().fold(f64::INFINITY, f64::min),
            max_ms: self.samples.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }
}

impl Extend<f64> for LatencySeries {
    fn extend<I: IntoIterator<Item = f64>>(&mut self, iter: I) {
        self.samples.extend(iter);
    }
}

/// Incrementally updated mean that keeps no samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RunningMean {
    count: u64,
    mean: f64,
}

impl RunningMean {
    /// Creates an empty mean.
    pub const fn new() -> Self {
        Self { count: 0, mean: 0.0 }
    }

    /// Folds `value` into the mean.
    pub fn push(&mut self, value: f64) {
        self.count += 1;
        self.mean += (value - self.mean) / self.count as f64;
    }

    /// Current mean, `0.0` before any value.
    pub const fn mean(&self) -> f64 {
        self.mean
    }

    /// Number of values folded in.
    pub const fn count(&self) -> u64 {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn empty_inputs_are_zero() {
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(std_dev(&[]), 0.0);
        assert_eq!(median(&[]), 0.0);
        assert_eq!(LatencySeries::new().summary(), LatencySummary::default());
        assert_eq!(RunningMean::new().mean(), 0.0);
    }

    #[test]
    fn population_std_dev() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_eq!(mean(&values), 5.0);
        assert_eq!(std_dev(&values), 2.0);
    }

    #[rstest]
    #[case::odd(&[3.0, 1.0, 2.0], 2.0)]
    #[case::even(&[4.0, 1.0, 3.0, 2.0], 2.5)]
    #[case::single(&[7.0], 7.0)]
    fn median_cases(#[case] values: &[f64], #[case] expected: f64) {
        assert_eq!(median(values), expected);
    }

    #[rstest]
    #[case::faster(250.0, 100.0, 60.0)]
    #[case::slower(100.0, 150.0, -50.0)]
    #[case::equal(80.0, 80.0, 0.0)]
    #[case::zero_baseline(0.0, 10.0, 0.0)]
    fn improvement_formula(#[case] baseline: f64, #[case] candidate: f64, #[case] expected: f64) {
        assert!((percent_improvement(baseline, candidate) - expected).abs() < 1e-9);
    }

    #[rstest]
    #[case::double(7.0, 14.0, 100.0)]
    #[case::zero_baseline(0.0, 14.0, 0.0)]
    fn gain_formula(#[case] baseline: f64, #[case] candidate: f64, #[case] expected: f64) {
        assert!((percent_gain(baseline, candidate) - expected).abs() < 1e-9);
    }

    #[test]
    fn throughput_helpers() {
        assert_eq!(tps_from_latency_ms(250.0), 4.0);
        assert_eq!(tps_from_latency_ms(0.0), 0.0);
        assert_eq!(throughput(500, 2_000.0), 250.0);
        assert_eq!(throughput(500, 0.0), 0.0);
        assert_eq!(round2(1.23456), 1.23);
    }

    #[test]
    fn running_mean_matches_batch_mean() {
        let values = [12.0, 7.5, 30.0, 1.0];
        let mut running = RunningMean::new();
        for v in values {
            running.push(v);
        }
        assert_eq!(running.count(), 4);
        assert!((running.mean() - mean(&values)).abs() < 1e-9);
    }

    #[test]
    fn series_summary() {
        let mut series = LatencySeries::new();
        series.extend([100.0, 300.0, 200.0]);
        let summary = series.summary();
        assert_eq!(summary.count, 3);
        assert_eq!(summary.mean_ms, 200.0);
        assert_eq!(summary.median_ms, 200.0);
        assert_eq!(summary.min_ms, 100.0);
        assert_eq!(summary.max_ms, 300.0);
    }
}
