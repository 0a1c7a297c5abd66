use crate::detect::anomaly::TimeSeries;
use crate::telemetry::{Axis, MachineState, Sample};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AxisStats {
    pub axis: Axis,
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    /// Value of the most recent sample.
    pub current: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VibrationStats {
    pub samples: usize,
    pub axes: Vec<AxisStats>,
}

impl VibrationStats {
    pub fn axis(&self, axis: Axis) -> Option<&AxisStats> {
        self.axes.iter().find(|a| a.axis == axis)
    }
}

/// Per-axis descriptive statistics. `None` for an empty series.
pub fn vibration_stats(samples: &[Sample]) -> Option<VibrationStats> {
    let axes = Axis::ALL
        .iter()
        .map(|&axis| {
            let ts = TimeSeries::from_axis(samples, axis);
            Some(AxisStats {
                axis,
                mean: ts.mean(),
                std_dev: ts.std_dev(),
                min: ts.min()?,
                max: ts.max()?,
                current: ts.last()?,
            })
        })
        .collect::<Option<Vec<_>>>()?;

    Some(VibrationStats {
        samples: samples.len(),
        axes,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateShare {
    pub state: MachineState,
    pub count: usize,
    pub percentage: f64,
    /// Assumes one sample per minute.
    pub duration_hours: f64,
}

/// Hours of history behind the status state summary.
pub const SUMMARY_WINDOW_HOURS: i64 = 24;

/// Share of each state present in `samples`, in declaration order.
pub fn state_summary(samples: &[Sample]) -> Vec<StateShare> {
    if samples.is_empty() {
        return Vec::new();
    }
    let total = samples.len() as f64;
    MachineState::ALL
        .into_iter()
        .filter_map(|state| {
            let count = samples.iter().filter(|s| s.state == state).count();
            (count > 0).then(|| StateShare {
                state,
                count,
                percentage: count as f64 / total * 100.0,
                duration_hours: count as f64 / 60.0,
            })
        })
        .collect()
}
