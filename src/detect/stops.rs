//! Stop detection over the vibration magnitude.
//!
//! A sample is "stopped" when its magnitude is at or below
//! `stop_vibration_threshold`. [`StopTracker`] walks the series as a
//! two-state machine and reports an interval only when a stop is both
//! opened and closed by a later running sample. A stop that is still open
//! when the data ends is never reported.

use crate::config::MonitorConfig;
use crate::detect::AutoStop;
use crate::telemetry::Sample;
use chrono::{DateTime, Utc};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Stopped { since: DateTime<Utc> },
}

/// A stop interval bounded by its first stopped sample and the first running
/// sample after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClosedStop {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Inclusive threshold test.
pub fn is_stopped(sample: &Sample, threshold: f64) -> bool {
    sample.magnitude() <= threshold
}

pub struct StopTracker {
    threshold: f64,
    state: RunState,
}

impl StopTracker {
    /// The tracker starts in `Running`, so a series that opens stopped
    /// starts an interval at its first sample.
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            state: RunState::Running,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Advance by one sample. Returns the interval closed by this sample, if any.
    pub fn observe(&mut self, sample: &Sample) -> Option<ClosedStop> {
        let stopped = is_stopped(sample, self.threshold);
        match (self.state, stopped) {
            (RunState::Running, true) => {
                self.state = RunState::Stopped {
                    since: sample.timestamp,
                };
                None
            }
            (RunState::Stopped { since }, false) => {
                self.state = RunState::Running;
                Some(ClosedStop {
                    start: since,
                    end: sample.timestamp,
                })
            }
            _ => None,
        }
    }
}

/// Scan `samples` and return every closed stop lasting at least
/// `min_stop_duration` minutes, stamped with `now` as detection time.
pub fn detect_stops(samples: &[Sample], config: &MonitorConfig, now: DateTime<Utc>) -> Vec<AutoStop> {
    let mut tracker = StopTracker::new(config.stop_vibration_threshold);

    let events: Vec<AutoStop> = samples
        .iter()
        .filter_map(|s| tracker.observe(s))
        .filter(|stop| stop.end > stop.start)
        .map(|stop| AutoStop::new(stop.start, stop.end, now))
        .filter(|event| event.duration_minutes >= config.min_stop_duration)
        .collect();

    if let RunState::Stopped { since } = tracker.state() {
        debug!(%since, "machine still stopped at end of data, stop left open");
    }
    events
}
