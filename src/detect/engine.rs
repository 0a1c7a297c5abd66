use crate::config::{ConfigStore, MonitorConfig};
use crate::detect::dedup::filter_new;
use crate::detect::events::{insert_auto_stop, load_auto_stops};
use crate::detect::stops::detect_stops;
use crate::storage::samples::load_samples;
use crate::storage::Pool;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::TransactionBehavior;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// Outcome of one detection pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DetectionRun {
    pub scanned: usize,
    pub candidates: usize,
    pub accepted: usize,
}

#[derive(Clone)]
pub struct DetectionEngine {
    pool: Pool,
}

impl DetectionEngine {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Scan every stored sample for stops and append the ones not already
    /// logged. The read, dedup and append share one immediate transaction so
    /// concurrent runs cannot log the same stop twice.
    pub fn run_once(&self, config: &MonitorConfig, now: DateTime<Utc>) -> Result<DetectionRun> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let samples = load_samples(&tx, None, None)?;
        let existing = load_auto_stops(&tx)?;
        let candidates = detect_stops(&samples, config, now);
        let found = candidates.len();
        let accepted = filter_new(candidates, &existing);

        for event in &accepted {
            insert_auto_stop(&tx, event)?;
        }
        tx.commit().context("failed to commit detection run")?;

        let run = DetectionRun {
            scanned: samples.len(),
            candidates: found,
            accepted: accepted.len(),
        };
        info!(
            scanned = run.scanned,
            candidates = run.candidates,
            accepted = run.accepted,
            "detection run finished"
        );
        Ok(run)
    }
}

/// Sleep between background passes.
fn pass_interval(config: &MonitorConfig) -> Duration {
    Duration::from_secs(config.detection_interval_minutes.saturating_mul(60))
}

/// Background detection loop.
/// Re-reads the configuration before each pass, so interval changes and the
/// `auto_detection_enabled` switch apply without a restart. With
/// `notifications_enabled`, newly logged stops raise a warning.
pub async fn run_detection_loop(engine: DetectionEngine, config: Arc<Mutex<ConfigStore>>) {
    info!("Detection loop started");

    loop {
        let snapshot = config.lock().await.config().clone();
        tokio::time::sleep(pass_interval(&snapshot)).await;

        let snapshot = config.lock().await.config().clone();
        if !snapshot.auto_detection_enabled {
            continue;
        }

        let notify = snapshot.notifications_enabled;
        let engine = engine.clone();
        let result = tokio::task::spawn_blocking(move || engine.run_once(&snapshot, Utc::now())).await;
        match result {
            Ok(Ok(run)) if notify && run.accepted > 0 => {
                warn!(new_stops = run.accepted, "New automatic stops awaiting classification");
            }
            Ok(Ok(_)) => {}
            Ok(Err(e)) => error!("Detection run failed: {:#}", e),
            Err(e) => error!("Detection task panicked: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::events::EventLog;
    use crate::storage::{test_pool, SampleStore};
    use crate::telemetry::{MachineState, Sample};
    use chrono::{Duration as ChronoDuration, TimeZone};

    fn at(min: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 6, 14, 0, 0).unwrap() + ChronoDuration::minutes(min)
    }

    fn trace() -> Vec<Sample> {
        let mut samples = Vec::new();
        for i in 0..40 {
            let (state, v) = match i {
                10..=13 | 25..=29 => (MachineState::ProductionStop, 0.03),
                _ => (MachineState::Running, 0.8),
            };
            samples.push(Sample::new(at(i), state, v, v, v));
        }
        samples
    }

    #[test]
    fn test_run_is_idempotent() {
        let (_dir, pool) = test_pool();
        SampleStore::new(pool.clone()).insert(&trace()).unwrap();
        let engine = DetectionEngine::new(pool.clone());
        let cfg = MonitorConfig::default();

        let first = engine.run_once(&cfg, at(60)).unwrap();
        assert_eq!(first.scanned, 40);
        assert_eq!(first.candidates, 2);
        assert_eq!(first.accepted, 2);

        let second = engine.run_once(&cfg, at(75)).unwrap();
        assert_eq!(second.candidates, 2);
        assert_eq!(second.accepted, 0);

        let log = EventLog::new(pool);
        let stops = log.automatic_stops().unwrap();
        assert_eq!(stops.len(), 2);
        assert_eq!(stops[0].start, at(10));
        assert_eq!(stops[0].duration_minutes, 4.0);
        assert_eq!(stops[1].duration_minutes, 5.0);
        assert!(stops.iter().all(|s| s.detected_at == at(60)));
    }

    #[test]
    fn test_pass_interval_saturates() {
        let cfg = MonitorConfig::default();
        assert_eq!(pass_interval(&cfg), Duration::from_secs(15 * 60));

        let huge = MonitorConfig {
            detection_interval_minutes: u64::MAX,
            ..MonitorConfig::default()
        };
        assert_eq!(pass_interval(&huge), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn test_empty_store() {
        let (_dir, pool) = test_pool();
        let run = DetectionEngine::new(pool)
            .run_once(&MonitorConfig::default(), at(0))
            .unwrap();
        assert_eq!(run, DetectionRun::default());
    }
}
