//! # SQLite Record Store
//!
//! Durable record storage with one row per target distance, keyed by the
//! stable distance key.
//!
//! The write path is a single conditional upsert: the `ON CONFLICT` update
//! only fires when the incoming time is strictly faster than the stored
//! one. The read-compare-write race of naive record updates is closed
//! inside the database, so concurrent callers can never regress a record.

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{RecordError, Result};
use crate::store::RecordStore;
use crate::{Record, TargetDistance};

/// SQLite-backed implementation of [`RecordStore`].
pub struct SqliteRecordStore {
    db: Connection,
}

impl SqliteRecordStore {
    /// Open (or create) a record store at the given database path.
    pub fn new(db_path: &str) -> Result<Self> {
        let db = Connection::open(db_path)?;
        Self::init_schema(&db)?;
        Ok(Self { db })
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> Result<Self> {
        Self::new(":memory:")
    }

    /// Initialize the database schema.
    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                distance_key TEXT PRIMARY KEY,
                distance_km REAL NOT NULL,
                time_seconds INTEGER NOT NULL,
                pace_seconds_per_km REAL NOT NULL,
                activity_id TEXT NOT NULL,
                activity_name TEXT NOT NULL,
                activity_date INTEGER NOT NULL,
                start_km REAL NOT NULL,
                end_km REAL NOT NULL,
                updated_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
            );
        "#,
        )?;
        Ok(())
    }
}

impl RecordStore for SqliteRecordStore {
    fn get(&self, distance_key: &str) -> Result<Option<Record>> {
        let mut stmt = self.db.prepare(
            "SELECT distance_key, distance_km, time_seconds, pace_seconds_per_km,
                    activity_id, activity_name, activity_date, start_km, end_km, updated_at
             FROM records WHERE distance_key = ?1",
        )?;

        let row = stmt
            .query_row(params![distance_key], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, f64>(1)?,
                    row.get::<_, u32>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, i64>(6)?,
                    row.get::<_, f64>(7)?,
                    row.get::<_, f64>(8)?,
                    row.get::<_, i64>(9)?,
                ))
            })
            .optional()?;

        let (key, distance_km, time_seconds, pace, activity_id, activity_name, activity_date, start_km, end_km, updated_at) =
            match row {
                Some(row) => row,
                None => return Ok(None),
            };

        let target = TargetDistance::from_key(&key).ok_or_else(|| RecordError::Store {
            message: format!("unknown distance key '{}' in records table", key),
        })?;

        Ok(Some(Record {
            target,
            distance_km,
            time_seconds,
            pace_seconds_per_km: pace,
            activity_id,
            activity_name,
            activity_date,
            start_km,
            end_km,
            updated_at,
        }))
    }

    fn upsert_if_faster(&mut self, record: &Record) -> Result<bool> {
        let changed = self.db.execute(
            r#"
            INSERT INTO records
                (distance_key, distance_km, time_seconds, pace_seconds_per_km,
                 activity_id, activity_name, activity_date, start_km, end_km, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, strftime('%s', 'now'))
            ON CONFLICT (distance_key) DO UPDATE SET
                distance_km = excluded.distance_km,
                time_seconds = excluded.time_seconds,
                pace_seconds_per_km = excluded.pace_seconds_per_km,
                activity_id = excluded.activity_id,
                activity_name = excluded.activity_name,
                activity_date = excluded.activity_date,
                start_km = excluded.start_km,
                end_km = excluded.end_km,
                updated_at = excluded.updated_at
            WHERE excluded.time_seconds < records.time_seconds
        "#,
            params![
                record.target.key(),
                record.distance_km,
                record.time_seconds,
                record.pace_seconds_per_km,
                record.activity_id,
                record.activity_name,
                record.activity_date,
                record.start_km,
                record.end_km,
            ],
        )?;

        Ok(changed > 0)
    }

    fn count(&self) -> Result<u64> {
        let count: i64 = self
            .db
            .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}
