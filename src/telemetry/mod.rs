//! Vibration telemetry: samples, machine states and axes.

pub mod generator;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Operating state recorded alongside each vibration sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MachineState {
    Running,
    Breakdown,
    ProductionStop,
    QualityIssue,
}

impl MachineState {
    pub const ALL: [MachineState; 4] = [
        MachineState::Running,
        MachineState::Breakdown,
        MachineState::ProductionStop,
        MachineState::QualityIssue,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MachineState::Running => "running",
            MachineState::Breakdown => "breakdown",
            MachineState::ProductionStop => "production_stop",
            MachineState::QualityIssue => "quality_issue",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MachineState::Running => "Running",
            MachineState::Breakdown => "Breakdown",
            MachineState::ProductionStop => "Production stop",
            MachineState::QualityIssue => "Quality issue",
        }
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MachineState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(MachineState::Running),
            "breakdown" => Ok(MachineState::Breakdown),
            "production_stop" => Ok(MachineState::ProductionStop),
            "quality_issue" => Ok(MachineState::QualityIssue),
            other => anyhow::bail!("unknown machine state '{}'", other),
        }
    }
}

/// Vibration measurement axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    #[serde(rename = "vibration_x")]
    X,
    #[serde(rename = "vibration_y")]
    Y,
    #[serde(rename = "vibration_z")]
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    pub fn as_str(&self) -> &'static str {
        match self {
            Axis::X => "vibration_x",
            Axis::Y => "vibration_y",
            Axis::Z => "vibration_z",
        }
    }

    /// Read this axis component from a sample.
    pub fn value(&self, sample: &Sample) -> f64 {
        match self {
            Axis::X => sample.vibration_x,
            Axis::Y => sample.vibration_y,
            Axis::Z => sample.vibration_z,
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One point of the machine time series. Vibration is in mm/s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub state: MachineState,
    pub vibration_x: f64,
    pub vibration_y: f64,
    pub vibration_z: f64,
}

impl Sample {
    pub fn new(timestamp: DateTime<Utc>, state: MachineState, x: f64, y: f64, z: f64) -> Self {
        Self {
            timestamp,
            state,
            vibration_x: x,
            vibration_y: y,
            vibration_z: z,
        }
    }

    /// Euclidean norm of the three axes.
    pub fn magnitude(&self) -> f64 {
        (self.vibration_x.powi(2) + self.vibration_y.powi(2) + self.vibration_z.powi(2)).sqrt()
    }

    /// Largest single-axis reading.
    pub fn peak_axis(&self) -> f64 {
        self.vibration_x.max(self.vibration_y).max(self.vibration_z)
    }
}

/// Keep samples whose timestamp falls within `[start, end]`; either bound may be open.
pub fn filter_window(
    samples: &[Sample],
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> Vec<Sample> {
    samples
        .iter()
        .filter(|s| start.map_or(true, |b| s.timestamp >= b))
        .filter(|s| end.map_or(true, |b| s.timestamp <= b))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_magnitude() {
        let ts = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();
        let s = Sample::new(ts, MachineState::Running, 3.0, 4.0, 0.0);
        assert_eq!(s.magnitude(), 5.0);
        assert_eq!(s.peak_axis(), 4.0);
    }

    #[test]
    fn test_state_round_trips_through_str() {
        for state in MachineState::ALL {
            assert_eq!(state.as_str().parse::<MachineState>().unwrap(), state);
        }
        assert!("stalled".parse::<MachineState>().is_err());
    }

    #[test]
    fn test_filter_window_is_inclusive() {
        let base = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();
        let samples: Vec<Sample> = (0..5)
            .map(|i| {
                Sample::new(
                    base + chrono::Duration::minutes(i),
                    MachineState::Running,
                    0.5,
                    0.5,
                    0.5,
                )
            })
            .collect();

        let window = filter_window(
            &samples,
            Some(base + chrono::Duration::minutes(1)),
            Some(base + chrono::Duration::minutes(3)),
        );
        assert_eq!(window.len(), 3);
        assert_eq!(filter_window(&samples, None, None).len(), 5);
    }
}
