//! Durable sample store backed by SQLite.
//!
//! One row per limiter run in the `time_slice` table:
//! `(timestamp INTEGER UNIQUE, data_usage INTEGER)`. Timestamps are stored
//! as microseconds since the Unix epoch (UTC), so integer ordering is
//! chronological and two runs 15 minutes apart can never collide — a
//! duplicate key means overlapping invocations and is surfaced as
//! [`LimiterError::DuplicateTimestamp`].
//!
//! Rows are append-only: one insert per run, never updated, deleted only by
//! the retention pruner via [`SampleStore::delete_before`].

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{LimiterError, Result};

/// One point-in-time observation of Transmission's cumulative counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    /// Instant the sample was taken. Unique across all rows.
    pub timestamp: DateTime<Utc>,
    /// Lifetime downloaded + uploaded bytes at that instant.
    pub data_usage: i64,
}

/// Handle to the `time_slice` table. One store (one SQLite connection) per
/// run: opened before any query, dropped at process exit.
pub struct SampleStore {
    conn: Connection,
}

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS time_slice (
    timestamp  INTEGER NOT NULL UNIQUE,
    data_usage INTEGER NOT NULL
)";

impl SampleStore {
    /// Open (creating if necessary) the store at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).map_err(|e| {
            LimiterError::Store(format!("cannot open {}: {e}", path.as_ref().display()))
        })?;
        Self::with_connection(conn)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute(SCHEMA, [])?;
        Ok(Self { conn })
    }

    /// Insert one sample. Fails with [`LimiterError::DuplicateTimestamp`] if
    /// a row with this exact timestamp already exists.
    pub fn insert(&self, sample: &Sample) -> Result<()> {
        let result = self.conn.execute(
            "INSERT INTO time_slice (timestamp, data_usage) VALUES (?1, ?2)",
            params![micros(sample.timestamp), sample.data_usage],
        );
        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(LimiterError::DuplicateTimestamp(
                    sample.timestamp.to_rfc3339(),
                ))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// The sample with the greatest timestamp strictly before `t`, if any.
    pub fn find_latest_before(&self, t: DateTime<Utc>) -> Result<Option<Sample>> {
        let row = self
            .conn
            .query_row(
                "SELECT timestamp, data_usage FROM time_slice
                 WHERE timestamp < ?1 ORDER BY timestamp DESC LIMIT 1",
                params![micros(t)],
                decode_row,
            )
            .optional()?;
        Ok(row)
    }

    /// The oldest sample in the store, if any.
    pub fn find_earliest(&self) -> Result<Option<Sample>> {
        let row = self
            .conn
            .query_row(
                "SELECT timestamp, data_usage FROM time_slice
                 ORDER BY timestamp ASC LIMIT 1",
                [],
                decode_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Delete every sample strictly older than `t`; returns the count removed.
    pub fn delete_before(&self, t: DateTime<Utc>) -> Result<usize> {
        let removed = self.conn.execute(
            "DELETE FROM time_slice WHERE timestamp < ?1",
            params![micros(t)],
        )?;
        Ok(removed)
    }
}

fn micros(t: DateTime<Utc>) -> i64 {
    t.timestamp_micros()
}

fn decode_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Sample> {
    let us: i64 = row.get(0)?;
    Ok(Sample {
        timestamp: DateTime::from_timestamp_micros(us).unwrap_or_default(),
        data_usage: row.get(1)?,
    })
}
