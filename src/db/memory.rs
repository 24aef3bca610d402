//! In-memory store, used when no database path is configured.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::models::*;
use super::{AlertStore, DbError, ResultStore, TargetStore};

#[derive(Default)]
struct Inner {
    targets: HashMap<String, Target>,
    by_url: HashMap<String, String>,
    latest: HashMap<String, CheckResult>,
    alerts: HashMap<String, AlertRecord>,
}

/// Thread-safe store keeping targets, the latest result per target and alert
/// records. Result history is not retained.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TargetStore for MemoryStore {
    fn add(&self, target: &mut Target) -> Result<(), DbError> {
        let mut inner = self.inner.write();

        if let Some(existing) = inner
            .by_url
            .get(&target.url)
            .and_then(|id| inner.targets.get(id))
        {
            *target = existing.clone();
            return Ok(());
        }

        target.ensure_id();
        inner.by_url.insert(target.url.clone(), target.id.clone());
        inner.targets.insert(target.id.clone(), target.clone());
        Ok(())
    }

    fn list(&self) -> Result<Vec<Target>, DbError> {
        let inner = self.inner.read();
        let mut targets: Vec<Target> = inner.targets.values().cloned().collect();
        targets.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(targets)
    }
}

impl ResultStore for MemoryStore {
    fn append(&self, result: &CheckResult) -> Result<(), DbError> {
        let mut inner = self.inner.write();
        // Concurrent workers may land out of order; keep the newest.
        let newer = inner
            .latest
            .get(&result.target_id)
            .map_or(true, |current| result.checked_at >= current.checked_at);
        if newer {
            inner.latest.insert(result.target_id.clone(), result.clone());
        }
        Ok(())
    }

    fn latest(&self) -> Result<Vec<LatestRow>, DbError> {
        let inner = self.inner.read();
        let mut rows: Vec<LatestRow> = inner
            .latest
            .values()
            .filter_map(|r| {
                let target = inner.targets.get(&r.target_id)?;
                Some(LatestRow {
                    target_id: r.target_id.clone(),
                    url: target.url.clone(),
                    up: r.up,
                    http_status: r.http_status,
                    latency_ms: Some(r.latency_ms),
                    reason: r.reason.clone(),
                    checked_at: r.checked_at,
                })
            })
            .collect();
        rows.sort_by(|a, b| a.target_id.cmp(&b.target_id));
        Ok(rows)
    }
}

impl AlertStore for MemoryStore {
    fn get(&self, target_id: &str) -> Result<Option<AlertRecord>, DbError> {
        Ok(self.inner.read().alerts.get(target_id).cloned())
    }

    fn set(
        &self,
        target_id: &str,
        last_state: bool,
        sent_at: Option<DateTime<Utc>>,
    ) -> Result<(), DbError> {
        self.inner.write().alerts.insert(
            target_id.to_string(),
            AlertRecord {
                target_id: target_id.to_string(),
                last_state,
                last_sent_at: sent_at,
            },
        );
        Ok(())
    }
}
