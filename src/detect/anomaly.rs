use crate::detect::Severity;
use crate::telemetry::{Axis, Sample};
use chrono::{DateTime, Utc};
use serde::Serialize;

pub const DEFAULT_MULTIPLIER: f64 = 2.5;

/// Values above `HIGH_FACTOR * threshold` are rated high severity.
const HIGH_FACTOR: f64 = 1.5;

/// A simple time series for statistical analysis.
pub struct TimeSeries {
    values: Vec<f64>,
}

impl TimeSeries {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }

    pub fn from_axis(samples: &[Sample], axis: Axis) -> Self {
        Self::new(samples.iter().map(|s| axis.value(s)).collect())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().sum::<f64>() / self.values.len() as f64
    }

    /// Sample variance (n - 1 denominator). Zero below two values.
    pub fn variance(&self) -> f64 {
        if self.values.len() < 2 {
            return 0.0;
        }
        let mean = self.mean();
        let sum_sq_diff: f64 = self.values.iter().map(|&x| (x - mean).powi(2)).sum();
        sum_sq_diff / (self.values.len() - 1) as f64
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> Option<f64> {
        self.values.iter().copied().reduce(f64::min)
    }

    pub fn max(&self) -> Option<f64> {
        self.values.iter().copied().reduce(f64::max)
    }

    pub fn last(&self) -> Option<f64> {
        self.values.last().copied()
    }
}

/// One reading flagged as unusually high on one axis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Anomaly {
    pub timestamp: DateTime<Utc>,
    pub axis: Axis,
    pub value: f64,
    pub threshold: f64,
    pub severity: Severity,
}

/// `mean + multiplier * std_dev` for one axis, or `None` when the axis has
/// no spread to measure against.
pub fn axis_threshold(samples: &[Sample], axis: Axis, multiplier: f64) -> Option<f64> {
    let ts = TimeSeries::from_axis(samples, axis);
    if ts.len() < 2 {
        return None;
    }
    let std = ts.std_dev();
    if std == 0.0 || !std.is_finite() {
        return None;
    }
    Some(ts.mean() + multiplier * std)
}

fn scan_axis(samples: &[Sample], axis: Axis, multiplier: f64) -> Vec<Anomaly> {
    let Some(threshold) = axis_threshold(samples, axis, multiplier) else {
        return Vec::new();
    };

    samples
        .iter()
        .filter(|s| axis.value(s) > threshold)
        .map(|s| {
            let value = axis.value(s);
            Anomaly {
                timestamp: s.timestamp,
                axis,
                value,
                threshold,
                severity: if value > threshold * HIGH_FACTOR {
                    Severity::High
                } else {
                    Severity::Medium
                },
            }
        })
        .collect()
}

/// Flag readings above `mean + multiplier * std_dev`, computed per axis over
/// the whole input. Newest first.
pub fn scan_anomalies(samples: &[Sample], multiplier: f64) -> Vec<Anomaly> {
    let mut anomalies: Vec<Anomaly> = Axis::ALL
        .iter()
        .flat_map(|axis| scan_axis(samples, *axis, multiplier))
        .collect();
    anomalies.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    anomalies
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::MachineState;
    use chrono::{Duration, TimeZone};

    fn at(min: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 3, 12, 0, 0).unwrap() + Duration::minutes(min)
    }

    fn trace(xs: &[f64]) -> Vec<Sample> {
        xs.iter()
            .enumerate()
            .map(|(i, x)| Sample::new(at(i as i64), MachineState::Running, *x, 1.0, 1.0))
            .collect()
    }

    #[test]
    fn test_stats() {
        let ts = TimeSeries::new(vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(ts.mean(), 3.0);
        // Sample variance of 1..5 is 2.5
        assert!((ts.variance() - 2.5).abs() < 1e-12);
        assert_eq!(ts.min(), Some(1.0));
        assert_eq!(ts.max(), Some(5.0));
        assert_eq!(TimeSeries::new(vec![4.0]).std_dev(), 0.0);
    }

    #[test]
    fn test_empty_input() {
        assert!(scan_anomalies(&[], DEFAULT_MULTIPLIER).is_empty());
    }

    #[test]
    fn test_constant_axes_are_skipped() {
        // y and z are constant; only x can produce anomalies.
        let mut xs = vec![1.0; 20];
        xs[7] = 6.0;
        let found = scan_anomalies(&trace(&xs), DEFAULT_MULTIPLIER);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].axis, Axis::X);
        assert_eq!(found[0].timestamp, at(7));
        assert_eq!(found[0].value, 6.0);
    }

    #[test]
    fn test_severity_split() {
        // mean and sd are dominated by the bulk; the spike blows past 1.5x.
        let mut xs = vec![1.0, 1.1, 0.9, 1.0, 1.05, 0.95, 1.0, 1.0, 1.1, 0.9];
        xs.extend_from_slice(&[1.0; 10]);
        xs.push(10.0);
        let found = scan_anomalies(&trace(&xs), DEFAULT_MULTIPLIER);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].severity, Severity::High);

        let threshold = axis_threshold(&trace(&xs), Axis::X, DEFAULT_MULTIPLIER).unwrap();
        assert!(found[0].value > threshold * 1.5);
    }

    #[test]
    fn test_medium_severity() {
        let xs = vec![0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0];
        // mean 0.2, sd ~0.4216: threshold ~0.8325, high above ~1.2487
        let found = scan_anomalies(&trace(&xs), 1.5);
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|a| a.severity == Severity::Medium));
    }

    #[test]
    fn test_sorted_newest_first_across_axes() {
        let mut samples: Vec<Sample> = (0..30)
            .map(|i| {
                let wobble = if i % 2 == 0 { 0.9 } else { 1.1 };
                Sample::new(at(i), MachineState::Running, wobble, wobble, wobble)
            })
            .collect();
        samples[5].vibration_y = 8.0;
        samples[20].vibration_x = 8.0;
        samples[12].vibration_z = 8.0;

        let found = scan_anomalies(&samples, DEFAULT_MULTIPLIER);
        let times: Vec<_> = found.iter().map(|a| a.timestamp).collect();
        assert_eq!(times, vec![at(20), at(12), at(5)]);
        assert_eq!(found[0].axis, Axis::X);
        assert_eq!(found[1].axis, Axis::Z);
        assert_eq!(found[2].axis, Axis::Y);
    }

    #[test]
    fn test_higher_multiplier_never_finds_more() {
        let xs: Vec<f64> = (0..60).map(|i| ((i * 37) % 11) as f64 * 0.3).collect();
        let samples = trace(&xs);
        let mut last = usize::MAX;
        for k in [0.0, 0.5, 1.0, 1.5, 2.0, 2.5, 3.0, 4.0] {
            let n = scan_anomalies(&samples, k).len();
            assert!(n <= last);
            last = n;
        }
    }
}
