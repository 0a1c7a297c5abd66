//! Database schema and migrations.

use anyhow::Result;
use rusqlite::Connection;

pub const SCHEMA_VERSION: i64 = 3;

/// Run all pending migrations.
pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS samples (
            timestamp TEXT PRIMARY KEY,
            state TEXT NOT NULL,
            vibration_x REAL NOT NULL,
            vibration_y REAL NOT NULL,
            vibration_z REAL NOT NULL
        );

        CREATE TABLE IF NOT EXISTS manual_stops (
            id TEXT PRIMARY KEY,
            timestamp TEXT NOT NULL,
            stop_type TEXT NOT NULL,
            subcategory TEXT NOT NULL,
            part TEXT,
            duration_minutes INTEGER NOT NULL,
            comment TEXT NOT NULL DEFAULT '',
            operator TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS auto_stops (
            id TEXT PRIMARY KEY,
            start_at TEXT NOT NULL,
            end_at TEXT NOT NULL,
            duration_minutes REAL NOT NULL,
            detected_at TEXT NOT NULL,
            classified INTEGER NOT NULL DEFAULT 0,
            classification_json TEXT,
            CHECK (end_at > start_at)
        );

        CREATE INDEX IF NOT EXISTS idx_manual_stops_timestamp ON manual_stops(timestamp);
        CREATE INDEX IF NOT EXISTS idx_auto_stops_start ON auto_stops(start_at);
        CREATE INDEX IF NOT EXISTS idx_auto_stops_classified ON auto_stops(classified);",
    )?;

    // Migration: manual stops gained an urgency level in v2
    let has_urgency: i32 = conn
        .query_row(
            "SELECT count(*) FROM pragma_table_info('manual_stops') WHERE name='urgency'",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if has_urgency == 0 {
        conn.execute(
            "ALTER TABLE manual_stops ADD COLUMN urgency TEXT NOT NULL DEFAULT 'medium'",
            [],
        )?;
    }

    // Migration: v3 stores nanosecond timestamps; widen millisecond text
    // (`...SS.mmmZ`, 24 chars) so string order still matches time order.
    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;
    if version < 3 {
        conn.execute_batch(
            "UPDATE samples SET timestamp = substr(timestamp, 1, 23) || '000000Z'
                 WHERE length(timestamp) = 24;
             UPDATE manual_stops SET timestamp = substr(timestamp, 1, 23) || '000000Z'
                 WHERE length(timestamp) = 24;
             UPDATE auto_stops SET start_at = substr(start_at, 1, 23) || '000000Z'
                 WHERE length(start_at) = 24;
             UPDATE auto_stops SET end_at = substr(end_at, 1, 23) || '000000Z'
                 WHERE length(end_at) = 24;
             UPDATE auto_stops SET detected_at = substr(detected_at, 1, 23) || '000000Z'
                 WHERE length(detected_at) = 24;",
        )?;
    }

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [SCHEMA_VERSION],
    )?;

    Ok(())
}
