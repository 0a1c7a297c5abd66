//! Reliability KPIs, descriptive statistics and the maintenance report.

pub mod kpi;
pub mod report;
pub mod stats;

pub use self::kpi::{compute_kpis, Kpi, KpiMap, Kpis};
