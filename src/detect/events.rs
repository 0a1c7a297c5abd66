//! Persistent downtime event log: automatic stops awaiting classification and
//! operator-entered manual stops.

use crate::detect::{
    AutoStop, Classification, ClassificationRequest, ClassifyError, DowntimeEvent, ManualStop,
    StopType, Urgency,
};
use crate::storage::{format_ts, parse_ts, Pool};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

/// Operator input for a manual downtime entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewManualStop {
    pub timestamp: DateTime<Utc>,
    pub stop_type: StopType,
    pub subcategory: String,
    #[serde(default)]
    pub part: Option<String>,
    pub duration_minutes: u32,
    #[serde(default)]
    pub comment: String,
    pub operator: String,
    #[serde(default)]
    pub urgency: Urgency,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionStats {
    pub total: usize,
    pub classified: usize,
    /// Percentage of automatic stops that carry a cause.
    pub classification_rate: f64,
    pub total_minutes: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManualSummary {
    pub stop_type: StopType,
    pub count: usize,
    pub mean_duration_minutes: f64,
}

#[derive(Clone)]
pub struct EventLog {
    pool: Pool,
}

impl EventLog {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn append_automatic_event(&self, event: &AutoStop) -> Result<()> {
        let conn = self.pool.get()?;
        insert_auto_stop(&conn, event)
    }

    /// All automatic stops, oldest first.
    pub fn automatic_stops(&self) -> Result<Vec<AutoStop>> {
        let conn = self.pool.get()?;
        load_auto_stops(&conn)
    }

    /// Automatic stops still waiting for a cause, newest first.
    pub fn unclassified_events(&self) -> Result<Vec<AutoStop>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE classified = 0 ORDER BY start_at DESC",
            SELECT_AUTO
        ))?;
        let rows = stmt.query_map([], raw_auto)?;
        let events = rows.map(|r| decode_auto(r?)).collect();
        events
    }

    pub fn get_automatic(&self, id: Uuid) -> Result<Option<AutoStop>> {
        let conn = self.pool.get()?;
        get_auto_stop(&conn, id)
    }

    /// Attach a cause to an automatic stop. A stop can be classified once;
    /// when two operators race, the second sees `AlreadyClassified`.
    pub fn classify_event(
        &self,
        id: Uuid,
        request: ClassificationRequest,
        now: DateTime<Utc>,
    ) -> Result<AutoStop, ClassifyError> {
        let mut conn = self.pool.get().map_err(anyhow::Error::from)?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(anyhow::Error::from)?;

        let event = get_auto_stop(&tx, id)?
            .ok_or(ClassifyError::NotFound(id))?
            .classify(Classification::from_request(request, now))?;
        let classification = event
            .classification
            .as_ref()
            .ok_or(ClassifyError::NotFound(id))?;
        let json = serde_json::to_string(classification).map_err(anyhow::Error::from)?;

        let changed = tx
            .execute(
                "UPDATE auto_stops SET classified = 1, classification_json = ?2
                 WHERE id = ?1 AND classified = 0",
                params![id.to_string(), json],
            )
            .map_err(anyhow::Error::from)?;
        if changed == 0 {
            return Err(ClassifyError::AlreadyClassified(id));
        }
        tx.commit().context("failed to commit classification")?;

        info!(
            %id,
            stop_type = %classification.stop_type,
            operator = %classification.operator,
            "automatic stop classified"
        );
        Ok(event)
    }

    pub fn add_manual_stop(&self, stop: NewManualStop) -> Result<ManualStop> {
        if stop.duration_minutes < 1 {
            anyhow::bail!("manual stop duration must be at least one minute");
        }

        let record = ManualStop {
            id: Uuid::new_v4(),
            timestamp: stop.timestamp,
            stop_type: stop.stop_type,
            subcategory: stop.subcategory,
            part: stop.part,
            duration_minutes: stop.duration_minutes,
            comment: stop.comment,
            operator: stop.operator,
            urgency: stop.urgency,
        };

        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO manual_stops
             (id, timestamp, stop_type, subcategory, part, duration_minutes, comment, operator, urgency)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                record.id.to_string(),
                format_ts(record.timestamp),
                record.stop_type.as_str(),
                record.subcategory,
                record.part,
                record.duration_minutes,
                record.comment,
                record.operator,
                record.urgency.as_str(),
            ],
        )
        .context("failed to store manual stop")?;

        info!(id = %record.id, stop_type = %record.stop_type, minutes = record.duration_minutes, "manual stop logged");
        Ok(record)
    }

    /// Manual stops, newest first. `None` returns all of them.
    pub fn manual_stops(&self, limit: Option<usize>) -> Result<Vec<ManualStop>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, timestamp, stop_type, subcategory, part, duration_minutes, comment, operator, urgency
             FROM manual_stops ORDER BY timestamp DESC LIMIT ?1",
        )?;
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let rows = stmt.query_map([limit], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, u32>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, String>(7)?,
                row.get::<_, String>(8)?,
            ))
        })?;

        let mut stops = Vec::new();
        for r in rows {
            let (id, ts, stop_type, subcategory, part, duration_minutes, comment, operator, urgency) = r?;
            stops.push(ManualStop {
                id: Uuid::parse_str(&id).with_context(|| format!("bad manual stop id '{}'", id))?,
                timestamp: parse_ts(&ts)?,
                stop_type: stop_type.parse()?,
                subcategory,
                part,
                duration_minutes,
                comment,
                operator,
                urgency: urgency.parse()?,
            });
        }
        Ok(stops)
    }

    /// Automatic and manual stops merged, newest first.
    pub fn timeline(&self, limit: Option<usize>) -> Result<Vec<DowntimeEvent>> {
        let mut events: Vec<DowntimeEvent> = self
            .automatic_stops()?
            .into_iter()
            .map(DowntimeEvent::Automatic)
            .chain(self.manual_stops(None)?.into_iter().map(DowntimeEvent::Manual))
            .collect();
        events.sort_by(|a, b| b.at().cmp(&a.at()));
        if let Some(limit) = limit {
            events.truncate(limit);
        }
        Ok(events)
    }

    pub fn detection_stats(&self) -> Result<DetectionStats> {
        let stops = self.automatic_stops()?;
        let total = stops.len();
        let classified = stops.iter().filter(|s| s.is_classified()).count();
        let classification_rate = if total == 0 {
            0.0
        } else {
            classified as f64 / total as f64 * 100.0
        };
        Ok(DetectionStats {
            total,
            classified,
            classification_rate,
            total_minutes: stops.iter().map(|s| s.duration_minutes).sum(),
        })
    }

    /// Count and mean duration per stop type, for types that occur.
    pub fn manual_summary(&self) -> Result<Vec<ManualSummary>> {
        let stops = self.manual_stops(None)?;
        Ok(StopType::ALL
            .into_iter()
            .filter_map(|t| {
                let minutes: Vec<u32> = stops
                    .iter()
                    .filter(|s| s.stop_type == t)
                    .map(|s| s.duration_minutes)
                    .collect();
                if minutes.is_empty() {
                    return None;
                }
                let total: u64 = minutes.iter().map(|&m| u64::from(m)).sum();
                Some(ManualSummary {
                    stop_type: t,
                    count: minutes.len(),
                    mean_duration_minutes: total as f64 / minutes.len() as f64,
                })
            })
            .collect())
    }
}

const SELECT_AUTO: &str =
    "SELECT id, start_at, end_at, duration_minutes, detected_at, classification_json FROM auto_stops";

type RawAuto = (String, String, String, f64, String, Option<String>);

fn raw_auto(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawAuto> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn decode_auto((id, start, end, duration_minutes, detected_at, json): RawAuto) -> Result<AutoStop> {
    let classification = match json {
        Some(raw) => Some(
            serde_json::from_str::<Classification>(&raw)
                .with_context(|| format!("bad classification on stop {}", id))?,
        ),
        None => None,
    };
    Ok(AutoStop {
        id: Uuid::parse_str(&id).with_context(|| format!("bad automatic stop id '{}'", id))?,
        start: parse_ts(&start)?,
        end: parse_ts(&end)?,
        duration_minutes,
        detected_at: parse_ts(&detected_at)?,
        classification,
    })
}

fn get_auto_stop(conn: &Connection, id: Uuid) -> Result<Option<AutoStop>> {
    let raw = conn
        .query_row(
            &format!("{} WHERE id = ?1", SELECT_AUTO),
            [id.to_string()],
            raw_auto,
        )
        .optional()?;
    raw.map(decode_auto).transpose()
}

pub(crate) fn insert_auto_stop(conn: &Connection, event: &AutoStop) -> Result<()> {
    let json = event
        .classification
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    conn.execute(
        "INSERT INTO auto_stops
         (id, start_at, end_at, duration_minutes, detected_at, classified, classification_json)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.id.to_string(),
            format_ts(event.start),
            format_ts(event.end),
            event.duration_minutes,
            format_ts(event.detected_at),
            event.is_classified(),
            json,
        ],
    )
    .with_context(|| format!("failed to store automatic stop {}", event.id))?;
    Ok(())
}

pub(crate) fn load_auto_stops(conn: &Connection) -> Result<Vec<AutoStop>> {
    let mut stmt = conn.prepare(&format!("{} ORDER BY start_at ASC", SELECT_AUTO))?;
    let rows = stmt.query_map([], raw_auto)?;
    let events = rows.map(|r| decode_auto(r?)).collect();
    events
}
