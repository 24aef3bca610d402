//! SQLite database store implementation.

use chrono::{DateTime, NaiveDateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, types::Type, Connection, OptionalExtension, Result as SqlResult, Row};
use std::path::Path;
use std::sync::Arc;

use super::models::*;
use super::{AlertStore, DbError, ResultStore, TargetStore};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.9f";

/// Thread-safe SQLite store keeping the full check history.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and apply migrations.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init()?;
        Ok(store)
    }

    fn init(&self) -> Result<(), DbError> {
        let conn = self.conn.lock();
        conn.execute_batch(include_str!("../../migrations/000001_init.up.sql"))
            .map_err(|e| DbError::Migration(format!("Migration 1 failed: {}", e)))?;
        Ok(())
    }

    fn target_by_url(conn: &Connection, url: &str) -> SqlResult<Option<Target>> {
        conn.query_row(
            "SELECT id, url, created_at FROM targets WHERE url = ?1",
            params![url],
            target_from_row,
        )
        .optional()
    }
}

impl TargetStore for SqliteStore {
    fn add(&self, target: &mut Target) -> Result<(), DbError> {
        let conn = self.conn.lock();

        if let Some(existing) = Self::target_by_url(&conn, &target.url)? {
            *target = existing;
            return Ok(());
        }

        target.ensure_id();
        conn.execute(
            "INSERT INTO targets (id, url, created_at) VALUES (?1, ?2, ?3)",
            params![target.id, target.url, format_db_time(&target.created_at)],
        )?;
        Ok(())
    }

    fn list(&self) -> Result<Vec<Target>, DbError> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT id, url, created_at FROM targets ORDER BY created_at ASC")?;

        let targets = stmt
            .query_map([], target_from_row)?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(targets)
    }
}

impl ResultStore for SqliteStore {
    fn append(&self, result: &CheckResult) -> Result<(), DbError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO results (target_id, up, http_status, latency_ms, reason, checked_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                result.target_id,
                result.up,
                result.http_status,
                result.latency_ms,
                result.reason,
                format_db_time(&result.checked_at),
            ],
        )?;
        Ok(())
    }

    fn latest(&self) -> Result<Vec<LatestRow>, DbError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT r.target_id, t.url, r.up, r.http_status, r.latency_ms, r.reason, r.checked_at
             FROM results r
             JOIN targets t ON t.id = r.target_id
             WHERE r.id = (
                 SELECT r2.id FROM results r2
                 WHERE r2.target_id = r.target_id
                 ORDER BY r2.checked_at DESC, r2.id DESC
                 LIMIT 1
             )
             ORDER BY r.target_id ASC",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok(LatestRow {
                    target_id: row.get(0)?,
                    url: row.get(1)?,
                    up: row.get(2)?,
                    http_status: row.get(3)?,
                    latency_ms: row.get(4)?,
                    reason: row.get(5)?,
                    checked_at: time_column(row, 6)?,
                })
            })?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(rows)
    }
}

impl AlertStore for SqliteStore {
    fn get(&self, target_id: &str) -> Result<Option<AlertRecord>, DbError> {
        let conn = self.conn.lock();
        let record = conn
            .query_row(
                "SELECT last_state, last_sent_at FROM alerts WHERE target_id = ?1",
                params![target_id],
                |row| {
                    let sent: Option<String> = row.get(1)?;
                    Ok(AlertRecord {
                        target_id: target_id.to_string(),
                        last_state: row.get(0)?,
                        last_sent_at: match sent {
                            Some(_) => Some(time_column(row, 1)?),
                            None => None,
                        },
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    fn set(
        &self,
        target_id: &str,
        last_state: bool,
        sent_at: Option<DateTime<Utc>>,
    ) -> Result<(), DbError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO alerts (target_id, last_state, last_sent_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(target_id) DO UPDATE SET
             last_state=excluded.last_state, last_sent_at=excluded.last_sent_at",
            params![target_id, last_state, sent_at.as_ref().map(format_db_time)],
        )?;
        Ok(())
    }
}

fn target_from_row(row: &Row<'_>) -> SqlResult<Target> {
    Ok(Target {
        id: row.get(0)?,
        url: row.get(1)?,
        created_at: time_column(row, 2)?,
    })
}

/// Read a timestamp column, failing the row when the text does not parse.
fn time_column(row: &Row<'_>, idx: usize) -> SqlResult<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_db_time(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("invalid timestamp {:?}", raw).into(),
        )
    })
}

fn format_db_time(t: &DateTime<Utc>) -> String {
    t.format(TIME_FORMAT).to_string()
}

/// Parse a datetime string from the database.
fn parse_db_time(s: &str) -> Option<DateTime<Utc>> {
    let formats = [
        "%Y-%m-%d %H:%M:%S%.9f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
    ];

    for fmt in &formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(DateTime::from_naive_utc_and_offset(dt, Utc));
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    None
}
