//! Time-series store for vibration samples.

use crate::storage::{format_ts, parse_ts, Pool};
use crate::telemetry::{MachineState, Sample};
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InsertReport {
    pub inserted: usize,
    /// Samples whose timestamp was already stored.
    pub skipped: usize,
}

#[derive(Clone)]
pub struct SampleStore {
    pool: Pool,
}

impl SampleStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Insert samples in one transaction. Existing timestamps are left alone.
    pub fn insert(&self, samples: &[Sample]) -> Result<InsertReport> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        let mut report = InsertReport::default();
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO samples (timestamp, state, vibration_x, vibration_y, vibration_z)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for s in samples {
                let changed = stmt.execute(params![
                    format_ts(s.timestamp),
                    s.state.as_str(),
                    s.vibration_x,
                    s.vibration_y,
                    s.vibration_z
                ])?;
                if changed == 0 {
                    report.skipped += 1;
                } else {
                    report.inserted += 1;
                }
            }
        }
        tx.commit().context("failed to commit sample batch")?;

        info!(inserted = report.inserted, skipped = report.skipped, "stored samples");
        Ok(report)
    }

    /// Samples within `[start, end]`, oldest first.
    pub fn load(&self, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Result<Vec<Sample>> {
        let conn = self.pool.get()?;
        load_samples(&conn, start, end)
    }

    pub fn latest(&self) -> Result<Option<Sample>> {
        let conn = self.pool.get()?;
        let row = conn
            .query_row(
                "SELECT timestamp, state, vibration_x, vibration_y, vibration_z
                 FROM samples ORDER BY timestamp DESC LIMIT 1",
                [],
                raw_row,
            )
            .optional()?;
        Ok(row.and_then(decode))
    }

    pub fn count(&self) -> Result<u64> {
        let conn = self.pool.get()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM samples", [], |row| row.get(0))?;
        Ok(n as u64)
    }

    /// Samples within `hours` of the newest stored sample, oldest first.
    pub fn recent(&self, hours: i64) -> Result<Vec<Sample>> {
        match self.latest()? {
            Some(newest) => self.load(Some(newest.timestamp - Duration::hours(hours)), None),
            None => Ok(Vec::new()),
        }
    }

    /// First and last stored timestamps.
    pub fn span(&self) -> Result<Option<(DateTime<Utc>, DateTime<Utc>)>> {
        let conn = self.pool.get()?;
        let (first, last): (Option<String>, Option<String>) = conn.query_row(
            "SELECT MIN(timestamp), MAX(timestamp) FROM samples",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        match (first, last) {
            (Some(first), Some(last)) => Ok(Some((parse_ts(&first)?, parse_ts(&last)?))),
            _ => Ok(None),
        }
    }
}

type RawRow = (String, String, f64, f64, f64);

fn raw_row(row: &Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

/// Corrupt rows are logged and dropped so one bad record does not hide the
/// rest of the series.
fn decode((ts, state, x, y, z): RawRow) -> Option<Sample> {
    let timestamp = match parse_ts(&ts) {
        Ok(t) => t,
        Err(e) => {
            warn!(timestamp = %ts, error = %e, "skipping sample with unreadable timestamp");
            return None;
        }
    };
    let state = match state.parse::<MachineState>() {
        Ok(s) => s,
        Err(e) => {
            warn!(timestamp = %ts, error = %e, "skipping sample with unknown state");
            return None;
        }
    };
    Some(Sample::new(timestamp, state, x, y, z))
}

pub(crate) fn load_samples(
    conn: &Connection,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> Result<Vec<Sample>> {
    let mut stmt = conn.prepare(
        "SELECT timestamp, state, vibration_x, vibration_y, vibration_z FROM samples
         WHERE (?1 IS NULL OR timestamp >= ?1)
         AND (?2 IS NULL OR timestamp <= ?2)
         ORDER BY timestamp ASC",
    )?;

    let rows = stmt.query_map(params![start.map(format_ts), end.map(format_ts)], raw_row)?;

    let mut samples = Vec::new();
    for r in rows {
        if let Some(sample) = decode(r?) {
            samples.push(sample);
        }
    }
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_pool;
    use chrono::{Duration, TimeZone};

    fn at(min: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 4, 7, 0, 0).unwrap() + Duration::minutes(min)
    }

    fn samples(n: i64) -> Vec<Sample> {
        (0..n)
            .map(|i| Sample::new(at(i), MachineState::Running, 0.8, 0.7, 0.9))
            .collect()
    }

    #[test]
    fn test_insert_and_load_in_order() {
        let (_dir, pool) = test_pool();
        let store = SampleStore::new(pool);

        let mut batch = samples(5);
        batch.reverse();
        let report = store.insert(&batch).unwrap();
        assert_eq!(report.inserted, 5);

        let loaded = store.load(None, None).unwrap();
        assert_eq!(loaded.len(), 5);
        assert_eq!(loaded[0].timestamp, at(0));
        assert_eq!(loaded[4].timestamp, at(4));
        assert_eq!(store.count().unwrap(), 5);
    }

    #[test]
    fn test_duplicate_timestamps_are_skipped() {
        let (_dir, pool) = test_pool();
        let store = SampleStore::new(pool);

        store.insert(&samples(3)).unwrap();
        let report = store.insert(&samples(4)).unwrap();
        assert_eq!(report, InsertReport { inserted: 1, skipped: 3 });
    }

    #[test]
    fn test_window_and_span() {
        let (_dir, pool) = test_pool();
        let store = SampleStore::new(pool);
        assert!(store.span().unwrap().is_none());
        assert!(store.latest().unwrap().is_none());

        store.insert(&samples(10)).unwrap();
        let window = store.load(Some(at(2)), Some(at(5))).unwrap();
        assert_eq!(window.len(), 4);
        assert_eq!(store.span().unwrap(), Some((at(0), at(9))));
        assert_eq!(store.latest().unwrap().unwrap().timestamp, at(9));
    }

    #[test]
    fn test_sub_millisecond_samples_are_kept() {
        let (_dir, pool) = test_pool();
        let store = SampleStore::new(pool);
        let t = at(0);
        let report = store
            .insert(&[
                Sample::new(t, MachineState::Running, 0.8, 0.7, 0.9),
                Sample::new(t + Duration::microseconds(400), MachineState::Running, 0.8, 0.7, 0.9),
            ])
            .unwrap();
        assert_eq!(report, InsertReport { inserted: 2, skipped: 0 });
        assert_eq!(store.load(Some(t), Some(t)).unwrap().len(), 1);
    }

    #[test]
    fn test_recent_is_anchored_on_newest_sample() {
        let (_dir, pool) = test_pool();
        let store = SampleStore::new(pool);
        assert!(store.recent(24).unwrap().is_empty());

        // 26 hours of per-minute samples
        store.insert(&samples(26 * 60)).unwrap();
        let recent = store.recent(24).unwrap();
        assert_eq!(recent.len(), 24 * 60 + 1);
        assert_eq!(recent[0].timestamp, at(2 * 60 - 1));
        assert_eq!(recent.last().unwrap().timestamp, at(26 * 60 - 1));
    }

    #[test]
    fn test_corrupt_rows_are_skipped() {
        let (_dir, pool) = test_pool();
        let store = SampleStore::new(pool.clone());
        store.insert(&samples(2)).unwrap();

        pool.get()
            .unwrap()
            .execute(
                "INSERT INTO samples VALUES ('2026-03-04T07:05:00.000000000Z', 'exploded', 1, 1, 1)",
                [],
            )
            .unwrap();

        assert_eq!(store.load(None, None).unwrap().len(), 2);
    }
}
