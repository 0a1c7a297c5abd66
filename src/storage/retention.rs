//! Bulk retention cleanup.

use crate::storage::{format_ts, Pool};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, TransactionBehavior};
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    pub samples: usize,
    pub manual_stops: usize,
    pub auto_stops: usize,
}

/// Delete samples and downtime events older than `days` before `now`.
///
/// Runs as one immediate transaction, so no detection run can interleave.
pub fn purge_older_than(pool: &Pool, days: u32, now: DateTime<Utc>) -> Result<PurgeReport> {
    let cutoff = now
        .checked_sub_signed(Duration::days(i64::from(days)))
        .map(format_ts)
        .ok_or_else(|| anyhow!("retention of {} days reaches past the supported date range", days))?;
    let mut conn = pool.get()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let report = PurgeReport {
        samples: tx.execute("DELETE FROM samples WHERE timestamp < ?1", params![cutoff])?,
        manual_stops: tx.execute("DELETE FROM manual_stops WHERE timestamp < ?1", params![cutoff])?,
        auto_stops: tx.execute("DELETE FROM auto_stops WHERE start_at < ?1", params![cutoff])?,
    };

    tx.commit().context("failed to commit retention cleanup")?;
    info!(
        %cutoff,
        samples = report.samples,
        manual_stops = report.manual_stops,
        auto_stops = report.auto_stops,
        "retention cleanup finished"
    );
    Ok(report)
}
