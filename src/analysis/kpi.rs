//! Reliability KPIs derived from the state label of each sample.

use crate::telemetry::{filter_window, MachineState, Sample};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Key of a reported KPI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Kpi {
    #[serde(rename = "TBF")]
    Tbf,
    #[serde(rename = "TFN")]
    Tfn,
    Availability,
    BreakdownRate,
    QualityIssueRate,
    ProductionStopRate,
    #[serde(rename = "MTBF")]
    Mtbf,
    #[serde(rename = "MTTR")]
    Mttr,
    #[serde(rename = "OEE")]
    Oee,
}

impl Kpi {
    pub const ALL: [Kpi; 9] = [
        Kpi::Tbf,
        Kpi::Tfn,
        Kpi::Availability,
        Kpi::BreakdownRate,
        Kpi::QualityIssueRate,
        Kpi::ProductionStopRate,
        Kpi::Mtbf,
        Kpi::Mttr,
        Kpi::Oee,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Kpi::Tbf => "TBF",
            Kpi::Tfn => "TFN",
            Kpi::Availability => "Availability",
            Kpi::BreakdownRate => "BreakdownRate",
            Kpi::QualityIssueRate => "QualityIssueRate",
            Kpi::ProductionStopRate => "ProductionStopRate",
            Kpi::Mtbf => "MTBF",
            Kpi::Mttr => "MTTR",
            Kpi::Oee => "OEE",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            Kpi::Mtbf | Kpi::Mttr => "h",
            _ => "%",
        }
    }
}

impl fmt::Display for Kpi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// KPI values rounded to one decimal, keyed by name.
pub type KpiMap = BTreeMap<Kpi, f64>;

/// Full-precision KPI values for one window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Kpis {
    pub samples: usize,
    pub tbf: f64,
    pub tfn: f64,
    pub availability: f64,
    pub breakdown_rate: f64,
    pub quality_issue_rate: f64,
    pub production_stop_rate: f64,
    pub mtbf_hours: f64,
    pub mttr_hours: f64,
    pub oee: f64,
}

impl Kpis {
    /// `None` for an empty window.
    pub fn from_samples(samples: &[Sample]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let n = samples.len() as f64;
        let count = |state: MachineState| samples.iter().filter(|s| s.state == state).count() as f64;

        let running = count(MachineState::Running);
        let breakdown = count(MachineState::Breakdown);
        let production_stop = count(MachineState::ProductionStop);
        let quality = count(MachineState::QualityIssue);

        let tbf = running / n * 100.0;
        let availability = (n - breakdown) / n * 100.0;
        let quality_issue_rate = quality / n * 100.0;

        Some(Self {
            samples: samples.len(),
            tbf,
            tfn: (running + production_stop) / n * 100.0,
            availability,
            breakdown_rate: breakdown / n * 100.0,
            quality_issue_rate,
            production_stop_rate: production_stop / n * 100.0,
            mtbf_hours: mtbf_hours(samples),
            mttr_hours: mttr_hours(samples),
            oee: tbf * availability * (100.0 - quality_issue_rate) / 10_000.0,
        })
    }

    pub fn get(&self, kpi: Kpi) -> f64 {
        match kpi {
            Kpi::Tbf => self.tbf,
            Kpi::Tfn => self.tfn,
            Kpi::Availability => self.availability,
            Kpi::BreakdownRate => self.breakdown_rate,
            Kpi::QualityIssueRate => self.quality_issue_rate,
            Kpi::ProductionStopRate => self.production_stop_rate,
            Kpi::Mtbf => self.mtbf_hours,
            Kpi::Mttr => self.mttr_hours,
            Kpi::Oee => self.oee,
        }
    }

    pub fn to_map(&self) -> KpiMap {
        Kpi::ALL.into_iter().map(|k| (k, round1(self.get(k)))).collect()
    }
}

/// KPIs over the samples within `[start, end]`. Empty window, empty map.
pub fn compute_kpis(
    samples: &[Sample],
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> KpiMap {
    let window = filter_window(samples, start, end);
    Kpis::from_samples(&window)
        .map(|k| k.to_map())
        .unwrap_or_default()
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

struct BreakdownRun {
    onset: DateTime<Utc>,
    /// First sample after the run, `None` while the run is still open.
    cleared: Option<DateTime<Utc>>,
}

fn breakdown_runs(samples: &[Sample]) -> Vec<BreakdownRun> {
    let mut runs: Vec<BreakdownRun> = Vec::new();
    let mut open = false;
    for s in samples {
        let broken = s.state == MachineState::Breakdown;
        if broken && !open {
            runs.push(BreakdownRun {
                onset: s.timestamp,
                cleared: None,
            });
            open = true;
        } else if !broken && open {
            if let Some(run) = runs.last_mut() {
                run.cleared = Some(s.timestamp);
            }
            open = false;
        }
    }
    runs
}

fn hours(d: chrono::Duration) -> f64 {
    d.num_milliseconds() as f64 / 3_600_000.0
}

/// Mean gap in hours between successive breakdown onsets; 0 below two onsets.
fn mtbf_hours(samples: &[Sample]) -> f64 {
    let onsets: Vec<DateTime<Utc>> = breakdown_runs(samples).iter().map(|r| r.onset).collect();
    if onsets.len() < 2 {
        return 0.0;
    }
    let gaps: Vec<f64> = onsets.windows(2).map(|w| hours(w[1] - w[0])).collect();
    gaps.iter().sum::<f64>() / gaps.len() as f64
}

/// Mean repair time in hours over breakdown runs that ended inside the window.
fn mttr_hours(samples: &[Sample]) -> f64 {
    let repairs: Vec<f64> = breakdown_runs(samples)
        .iter()
        .filter_map(|r| r.cleared.map(|end| hours(end - r.onset)))
        .collect();
    if repairs.is_empty() {
        return 0.0;
    }
    repairs.iter().sum::<f64>() / repairs.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(min: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 2, 0, 0, 0).unwrap() + Duration::minutes(min)
    }

    /// One sample per minute with the given states.
    fn labelled(states: &[MachineState]) -> Vec<Sample> {
        states
            .iter()
            .enumerate()
            .map(|(i, s)| Sample::new(at(i as i64), *s, 1.0, 1.0, 1.0))
            .collect()
    }

    use MachineState::{Breakdown as B, ProductionStop as P, QualityIssue as Q, Running as R};

    #[test]
    fn test_empty_window_gives_empty_map() {
        assert!(compute_kpis(&[], None, None).is_empty());
        let samples = labelled(&[R, R, R]);
        assert!(compute_kpis(&samples, Some(at(10)), None).is_empty());
    }

    #[test]
    fn test_state_shares_sum_to_hundred() {
        let states = [R, R, B, P, Q, R, P, R, B, Q, R];
        let k = Kpis::from_samples(&labelled(&states)).unwrap();
        let total = k.tbf + k.breakdown_rate + k.quality_issue_rate + k.production_stop_rate;
        assert!((total - 100.0).abs() < 1e-9);
        assert!((k.availability + k.breakdown_rate - 100.0).abs() < 1e-9);

        let map = compute_kpis(&labelled(&states), None, None);
        let rounded = map[&Kpi::Tbf]
            + map[&Kpi::BreakdownRate]
            + map[&Kpi::QualityIssueRate]
            + map[&Kpi::ProductionStopRate];
        assert!((rounded - 100.0).abs() <= 0.2);
    }

    #[test]
    fn test_ratios() {
        // 6 running, 2 breakdown, 1 production stop, 1 quality issue
        let states = [R, R, R, B, B, R, P, R, Q, R];
        let map = compute_kpis(&labelled(&states), None, None);
        assert_eq!(map[&Kpi::Tbf], 60.0);
        assert_eq!(map[&Kpi::Tfn], 70.0);
        assert_eq!(map[&Kpi::Availability], 80.0);
        assert_eq!(map[&Kpi::BreakdownRate], 20.0);
        assert_eq!(map[&Kpi::QualityIssueRate], 10.0);
        // 60 * 80 * 90 / 10000
        assert_eq!(map[&Kpi::Oee], 43.2);
    }

    #[test]
    fn test_mtbf_needs_two_onsets() {
        let k = Kpis::from_samples(&labelled(&[R, R, R])).unwrap();
        assert_eq!(k.mtbf_hours, 0.0);

        // A single run, however long, has nothing to measure between.
        let k = Kpis::from_samples(&labelled(&[R, B, B, B, R])).unwrap();
        assert_eq!(k.mtbf_hours, 0.0);
        assert!((k.mttr_hours - 3.0 / 60.0).abs() < 1e-12);
    }

    #[test]
    fn test_mtbf_and_mttr() {
        let mut samples = Vec::new();
        // Breakdowns start at t=0h, 2h and 5h; each lasts 30 minutes.
        for onset_h in [0, 2, 5] {
            let onset = at(onset_h * 60);
            samples.push(Sample::new(onset, B, 3.0, 3.0, 3.0));
            samples.push(Sample::new(onset + Duration::minutes(30), R, 1.0, 1.0, 1.0));
        }
        let k = Kpis::from_samples(&samples).unwrap();
        assert!((k.mtbf_hours - 2.5).abs() < 1e-12);
        assert!((k.mttr_hours - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_open_breakdown_excluded_from_mttr() {
        let states = [R, B, B, R, R, R, B, B, B];
        let k = Kpis::from_samples(&labelled(&states)).unwrap();
        // The closed run lasted 2 minutes; the trailing run is still open.
        assert!((k.mttr_hours - 2.0 / 60.0).abs() < 1e-12);
        // Both onsets still count towards MTBF: 5 minutes apart.
        assert!((k.mtbf_hours - 5.0 / 60.0).abs() < 1e-12);

        let only_open = Kpis::from_samples(&labelled(&[R, R, B, B])).unwrap();
        assert_eq!(only_open.mttr_hours, 0.0);
    }

    #[test]
    fn test_map_is_rounded() {
        let states = [R, R, B];
        let k = Kpis::from_samples(&labelled(&states)).unwrap();
        assert!((k.tbf - 200.0 / 3.0).abs() < 1e-12);
        let map = k.to_map();
        assert_eq!(map[&Kpi::Tbf], 66.7);
        assert_eq!(map[&Kpi::BreakdownRate], 33.3);
        assert_eq!(map.len(), Kpi::ALL.len());
    }

    #[test]
    fn test_map_serializes_with_kpi_names() {
        let map = compute_kpis(&labelled(&[R, B]), None, None);
        let json = serde_json::to_value(&map).unwrap();
        assert_eq!(json["TBF"], 50.0);
        assert!(json["MTBF"].is_number());
    }
}
