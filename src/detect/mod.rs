//! Downtime detection, anomaly scanning and the downtime event log.

pub mod anomaly;
pub mod dedup;
pub mod engine;
pub mod events;
pub mod stops;

use crate::config::MonitorConfig;
use crate::telemetry::Sample;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("no automatic stop with id {0}")]
    NotFound(Uuid),
    #[error("automatic stop {0} is already classified")]
    AlreadyClassified(Uuid),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Severity of a vibration anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Medium,
    High,
}

/// Display alert level for the latest reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Normal,
    Alert,
    Critical,
}

/// Compare the strongest axis of `sample` against the alert thresholds.
pub fn alert_level(sample: &Sample, config: &MonitorConfig) -> AlertLevel {
    let peak = sample.peak_axis();
    if peak > config.critical_vibration_threshold {
        AlertLevel::Critical
    } else if peak > config.alert_vibration_threshold {
        AlertLevel::Alert
    } else {
        AlertLevel::Normal
    }
}

/// Downtime cause category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopType {
    Maintenance,
    Planned,
    Unplanned,
    Operator,
    Quality,
}

impl StopType {
    pub const ALL: [StopType; 5] = [
        StopType::Maintenance,
        StopType::Planned,
        StopType::Unplanned,
        StopType::Operator,
        StopType::Quality,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StopType::Maintenance => "maintenance",
            StopType::Planned => "planned",
            StopType::Unplanned => "unplanned",
            StopType::Operator => "operator",
            StopType::Quality => "quality",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StopType::Maintenance => "Maintenance",
            StopType::Planned => "Planned stop",
            StopType::Unplanned => "Unplanned stop",
            StopType::Operator => "Operator-related",
            StopType::Quality => "Quality defect",
        }
    }

    /// Suggested subcategories for operator forms. Not enforced.
    pub fn subcategories(&self) -> &'static [&'static str] {
        match self {
            StopType::Maintenance => &["Preventive", "Corrective", "Inspection", "Lubrication"],
            StopType::Planned => &["Product change", "Format change", "Machine setup", "Break"],
            StopType::Unplanned => &["Mechanical", "Electrical", "Hydraulic", "Pneumatic", "Other"],
            StopType::Operator => &["Absence", "Micro-stop", "Adjustment", "Training"],
            StopType::Quality => &["Cut precision", "Material defect", "Calibration"],
        }
    }
}

impl fmt::Display for StopType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StopType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StopType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("unknown stop type '{}'", s))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::Low => "low",
            Urgency::Medium => "medium",
            Urgency::High => "high",
            Urgency::Critical => "critical",
        }
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Urgency {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Urgency::Low),
            "medium" => Ok(Urgency::Medium),
            "high" => Ok(Urgency::High),
            "critical" => Ok(Urgency::Critical),
            other => anyhow::bail!("unknown urgency '{}'", other),
        }
    }
}

/// Operator input for classifying an automatic stop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationRequest {
    pub stop_type: StopType,
    pub subcategory: String,
    #[serde(default)]
    pub comment: String,
    pub operator: String,
    #[serde(default)]
    pub urgency: Urgency,
}

/// Cause assigned to an automatic stop by an operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub stop_type: StopType,
    pub subcategory: String,
    pub comment: String,
    pub operator: String,
    pub urgency: Urgency,
    pub classified_at: DateTime<Utc>,
}

impl Classification {
    pub fn from_request(req: ClassificationRequest, at: DateTime<Utc>) -> Self {
        Self {
            stop_type: req.stop_type,
            subcategory: req.subcategory,
            comment: req.comment,
            operator: req.operator,
            urgency: req.urgency,
            classified_at: at,
        }
    }
}

/// A stop interval found in the vibration trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoStop {
    pub id: Uuid,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_minutes: f64,
    pub detected_at: DateTime<Utc>,
    /// `None` until an operator assigns a cause.
    pub classification: Option<Classification>,
}

impl AutoStop {
    /// A fresh, unclassified event. Caller guarantees `end > start`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>, detected_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            start,
            end,
            duration_minutes: minutes_between(start, end),
            detected_at,
            classification: None,
        }
    }

    pub fn is_classified(&self) -> bool {
        self.classification.is_some()
    }

    /// Consume the event and return it with a cause attached.
    pub fn classify(self, classification: Classification) -> Result<Self, ClassifyError> {
        if self.is_classified() {
            return Err(ClassifyError::AlreadyClassified(self.id));
        }
        Ok(Self {
            classification: Some(classification),
            ..self
        })
    }
}

/// A downtime entry typed in by an operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualStop {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub stop_type: StopType,
    pub subcategory: String,
    /// Component concerned, if any.
    pub part: Option<String>,
    pub duration_minutes: u32,
    pub comment: String,
    pub operator: String,
    pub urgency: Urgency,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DowntimeEvent {
    Automatic(AutoStop),
    Manual(ManualStop),
}

impl DowntimeEvent {
    /// Instant used to order the timeline.
    pub fn at(&self) -> DateTime<Utc> {
        match self {
            DowntimeEvent::Automatic(e) => e.start,
            DowntimeEvent::Manual(e) => e.timestamp,
        }
    }

    pub fn is_classified(&self) -> bool {
        match self {
            DowntimeEvent::Automatic(e) => e.is_classified(),
            DowntimeEvent::Manual(_) => true,
        }
    }
}

pub(crate) fn minutes_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start).num_milliseconds() as f64 / 60_000.0
}
