//! Plain-text maintenance report.

use crate::analysis::kpi::{compute_kpis, Kpi, KpiMap};
use crate::analysis::stats::vibration_stats;
use crate::detect::anomaly::{scan_anomalies, Anomaly};
use crate::telemetry::{filter_window, Axis, Sample};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write;

/// Number of anomalies listed individually in the report.
const LISTED_ANOMALIES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Advice {
    Critical,
    Warning,
    Info,
    Excellent,
}

impl Advice {
    pub fn message(&self) -> &'static str {
        match self {
            Advice::Critical => "High breakdown rate, immediate inspection recommended",
            Advice::Warning => "Low availability, review the preventive maintenance plan",
            Advice::Info => "Many anomalies detected, reinforce monitoring",
            Advice::Excellent => "Optimal performance, keep the current maintenance programme",
        }
    }

    fn tag(&self) -> &'static str {
        match self {
            Advice::Critical => "CRITICAL",
            Advice::Warning => "WARNING",
            Advice::Info => "INFO",
            Advice::Excellent => "EXCELLENT",
        }
    }
}

/// Advice derived from rounded KPIs and the anomaly count.
pub fn recommendations(kpis: &KpiMap, anomaly_count: usize) -> Vec<Advice> {
    let get = |k: Kpi| kpis.get(&k).copied();
    let mut advice = Vec::new();

    if get(Kpi::BreakdownRate).unwrap_or(0.0) > 10.0 {
        advice.push(Advice::Critical);
    }
    if get(Kpi::Availability).unwrap_or(100.0) < 85.0 {
        advice.push(Advice::Warning);
    }
    if anomaly_count > 10 {
        advice.push(Advice::Info);
    }
    if get(Kpi::Tbf).unwrap_or(0.0) > 90.0 && get(Kpi::Availability).unwrap_or(0.0) > 90.0 {
        advice.push(Advice::Excellent);
    }
    advice
}

/// Render the report for samples within `[start, end]`.
pub fn render_report(
    samples: &[Sample],
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    multiplier: f64,
    generated_at: DateTime<Utc>,
) -> String {
    let window = filter_window(samples, start, end);
    let kpis = compute_kpis(&window, None, None);
    let anomalies = scan_anomalies(&window, multiplier);
    let stats = vibration_stats(&window);

    let bound = |t: Option<DateTime<Utc>>| match t {
        Some(t) => t.format("%Y-%m-%d %H:%M").to_string(),
        None => "-".to_string(),
    };

    let mut out = String::new();
    let _ = writeln!(out, "PREDICTIVE MAINTENANCE REPORT");
    let _ = writeln!(out, "=============================");
    let _ = writeln!(out);
    let _ = writeln!(out, "Period:    {} to {}", bound(start), bound(end));
    let _ = writeln!(out, "Generated: {}", generated_at.format("%Y-%m-%d %H:%M:%S UTC"));
    let _ = writeln!(out, "Samples:   {}", window.len());

    let _ = writeln!(out);
    let _ = writeln!(out, "KEY PERFORMANCE INDICATORS");
    let _ = writeln!(out, "--------------------------");
    if kpis.is_empty() {
        let _ = writeln!(out, "No data in the selected period.");
    }
    for (kpi, value) in &kpis {
        let _ = writeln!(out, "  {:<20} {:>7.1} {}", kpi.as_str(), value, kpi.unit());
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "VIBRATION");
    let _ = writeln!(out, "---------");
    for axis in Axis::ALL {
        let mean = stats
            .as_ref()
            .and_then(|s| s.axis(axis))
            .map(|a| a.mean)
            .unwrap_or(0.0);
        let _ = writeln!(out, "  {:<20} mean {:.2} mm/s", axis.as_str(), mean);
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "ANOMALIES");
    let _ = writeln!(out, "---------");
    let _ = writeln!(out, "  Detected: {}", anomalies.len());
    for a in anomalies.iter().take(LISTED_ANOMALIES) {
        let _ = writeln!(out, "  {}", format_anomaly(a));
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "RECOMMENDATIONS");
    let _ = writeln!(out, "---------------");
    for advice in recommendations(&kpis, anomalies.len()) {
        let _ = writeln!(out, "  {}: {}", advice.tag(), advice.message());
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "{}", "=".repeat(50));
    out
}

fn format_anomaly(a: &Anomaly) -> String {
    format!(
        "{} {}: {:.2} mm/s (threshold {:.2}, {:?})",
        a.timestamp.format("%Y-%m-%d %H:%M"),
        a.axis.as_str(),
        a.value,
        a.threshold,
        a.severity
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::MachineState;
    use chrono::{Duration, TimeZone};

    fn kpis(pairs: &[(Kpi, f64)]) -> KpiMap {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_recommendations() {
        let healthy = kpis(&[(Kpi::Tbf, 95.0), (Kpi::Availability, 98.0), (Kpi::BreakdownRate, 2.0)]);
        assert_eq!(recommendations(&healthy, 0), vec![Advice::Excellent]);

        let failing = kpis(&[(Kpi::Tbf, 60.0), (Kpi::Availability, 80.0), (Kpi::BreakdownRate, 20.0)]);
        assert_eq!(
            recommendations(&failing, 11),
            vec![Advice::Critical, Advice::Warning, Advice::Info]
        );

        // An empty window gives no advice at all.
        assert!(recommendations(&KpiMap::new(), 0).is_empty());
    }

    #[test]
    fn test_render_report_sections() {
        let t0 = Utc.with_ymd_and_hms(2026, 5, 1, 8, 0, 0).unwrap();
        let samples: Vec<Sample> = (0..120)
            .map(|i| {
                let state = if (40..50).contains(&i) {
                    MachineState::Breakdown
                } else {
                    MachineState::Running
                };
                let v = if i % 2 == 0 { 0.9 } else { 1.1 };
                Sample::new(t0 + Duration::minutes(i), state, v, v, v)
            })
            .collect();

        let text = render_report(&samples, Some(t0), None, 2.5, t0 + Duration::hours(3));
        assert!(text.contains("PREDICTIVE MAINTENANCE REPORT"));
        assert!(text.contains("Samples:   120"));
        assert!(text.contains("Availability"));
        assert!(text.contains("vibration_x"));
        assert!(text.contains("Detected: 0"));
        // 110 / 120 running, 91.7% TBF and availability
        assert!(text.contains("EXCELLENT"));
    }

    #[test]
    fn test_render_empty_report() {
        let now = Utc.with_ymd_and_hms(2026, 5, 1, 8, 0, 0).unwrap();
        let text = render_report(&[], None, None, 2.5, now);
        assert!(text.contains("No data in the selected period."));
        assert!(!text.contains("EXCELLENT"));
    }
}
