//! Storage contracts and backends.
//!
//! The scheduler and alerter only see the [`TargetStore`], [`ResultStore`]
//! and [`AlertStore`] traits. Two backends implement all three: an in-memory
//! store and a SQLite store with an embedded migration.

mod memory;
mod models;
mod store;

pub use memory::*;
pub use models::*;
pub use store::*;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Database error types.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Migration error: {0}")]
    Migration(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Registry of monitored targets.
pub trait TargetStore: Send + Sync {
    /// Add a target, assigning its ID and creation time when unset.
    ///
    /// Adding a URL that is already known leaves the store unchanged and
    /// rewrites `target` to the existing entry.
    fn add(&self, target: &mut Target) -> Result<(), DbError>;

    fn list(&self) -> Result<Vec<Target>, DbError>;
}

/// Append-only check history with a latest-per-target projection.
pub trait ResultStore: Send + Sync {
    fn append(&self, result: &CheckResult) -> Result<(), DbError>;

    /// One row per target: its most recent result by `checked_at`.
    fn latest(&self) -> Result<Vec<LatestRow>, DbError>;
}

/// Per-target alert state.
pub trait AlertStore: Send + Sync {
    /// `Ok(None)` when no record exists yet.
    fn get(&self, target_id: &str) -> Result<Option<AlertRecord>, DbError>;

    /// Upsert the record. `sent_at: None` clears the last send time.
    fn set(
        &self,
        target_id: &str,
        last_state: bool,
        sent_at: Option<DateTime<Utc>>,
    ) -> Result<(), DbError>;
}
