//! Synthetic vibration traces for demos and tests.
//!
//! One sample per minute. The machine dwells in a state for a random number
//! of minutes, then moves along a fixed transition table. Each axis is drawn
//! from a clipped normal distribution that depends on the state.

use crate::telemetry::{MachineState, Sample};
use chrono::{DateTime, Duration, Utc};
use rand::distributions::WeightedIndex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use std::ops::Range;

struct VibrationProfile {
    mean: f64,
    std_dev: f64,
    min: f64,
    max: f64,
}

fn profile(state: MachineState) -> VibrationProfile {
    match state {
        MachineState::Running => VibrationProfile { mean: 0.8, std_dev: 0.3, min: 0.2, max: 1.5 },
        MachineState::Breakdown => VibrationProfile { mean: 3.0, std_dev: 1.0, min: 2.0, max: 5.0 },
        MachineState::ProductionStop => VibrationProfile { mean: 0.1, std_dev: 0.05, min: 0.0, max: 0.3 },
        MachineState::QualityIssue => VibrationProfile { mean: 1.2, std_dev: 0.4, min: 0.8, max: 2.0 },
    }
}

/// Dwell time range in minutes.
fn dwell_minutes(state: MachineState) -> std::ops::RangeInclusive<usize> {
    match state {
        MachineState::Running => 30..=180,
        MachineState::Breakdown => 15..=60,
        MachineState::ProductionStop => 10..=45,
        MachineState::QualityIssue => 5..=30,
    }
}

fn transitions(state: MachineState) -> &'static [(MachineState, f64)] {
    use MachineState::*;
    match state {
        Running => &[(Running, 0.85), (Breakdown, 0.05), (ProductionStop, 0.08), (QualityIssue, 0.02)],
        Breakdown => &[(Running, 0.7), (ProductionStop, 0.3)],
        ProductionStop => &[(Running, 0.9), (Breakdown, 0.1)],
        QualityIssue => &[(Running, 0.8), (ProductionStop, 0.2)],
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

pub struct DemoGenerator {
    rng: StdRng,
}

impl DemoGenerator {
    /// A fixed seed gives a reproducible trace.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng }
    }

    pub fn state_sequence(&mut self, minutes: usize) -> Vec<MachineState> {
        let mut states = Vec::with_capacity(minutes);
        let mut current = MachineState::Running;

        while states.len() < minutes {
            let dwell = self.rng.gen_range(dwell_minutes(current));
            let remaining = minutes - states.len();
            states.extend(std::iter::repeat(current).take(dwell.min(remaining)));
            current = self.next_state(current);
        }

        states
    }

    fn next_state(&mut self, current: MachineState) -> MachineState {
        let table = transitions(current);
        match WeightedIndex::new(table.iter().map(|(_, w)| *w)) {
            Ok(dist) => table[dist.sample(&mut self.rng)].0,
            Err(_) => MachineState::Running,
        }
    }

    fn vibration(&mut self, state: MachineState) -> f64 {
        let p = profile(state);
        let raw = Normal::new(p.mean, p.std_dev)
            .map(|n| n.sample(&mut self.rng))
            .unwrap_or(p.mean);
        round2(raw.clamp(p.min, p.max))
    }

    /// Generate `hours` of one-minute samples starting at `start`.
    pub fn generate(&mut self, start: DateTime<Utc>, hours: u32) -> Vec<Sample> {
        let minutes = hours as usize * 60;
        let states = self.state_sequence(minutes);

        states
            .into_iter()
            .enumerate()
            .map(|(i, state)| {
                let mut x = self.vibration(state);
                let mut y = self.vibration(state);
                let mut z = self.vibration(state);

                // Axes move together when something is broken.
                if state == MachineState::Breakdown {
                    let factor = self.rng.gen_range(0.7..0.9);
                    y = x * factor + self.rng.gen_range(-0.2..0.2);
                    z = x * factor + self.rng.gen_range(-0.2..0.2);
                }

                x += self.rng.gen_range(-0.05..0.05);
                y += self.rng.gen_range(-0.05..0.05);
                z += self.rng.gen_range(-0.05..0.05);

                Sample::new(
                    start + Duration::minutes(i as i64),
                    state,
                    round2(x.max(0.0)),
                    round2(y.max(0.0)),
                    round2(z.max(0.0)),
                )
            })
            .collect()
    }

    /// Overwrite a short run near the end of the trace with a breakdown-level
    /// vibration spike. Returns the affected index range.
    pub fn inject_spike(&mut self, samples: &mut [Sample]) -> Option<Range<usize>> {
        if samples.len() < 50 {
            return None;
        }
        let back = self.rng.gen_range(50..=samples.len().min(200));
        let start = samples.len() - back;
        let len = self.rng.gen_range(5..=15);
        let end = (start + len).min(samples.len());

        for sample in &mut samples[start..end] {
            sample.vibration_x = round2(self.rng.gen_range(3.0..5.0));
            sample.vibration_y = round2(self.rng.gen_range(3.0..5.0));
            sample.vibration_z = round2(self.rng.gen_range(3.0..5.0));
            sample.state = MachineState::Breakdown;
        }

        Some(start..end)
    }
}
