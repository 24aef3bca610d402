//! Database model types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Format used for time-derived target IDs.
const TARGET_ID_FORMAT: &str = "%Y%m%dT%H%M%S%.9f";

/// A monitored endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub id: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

impl Target {
    /// A target for `url` with no ID yet; the store assigns one on add.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            url: url.into(),
            created_at: Utc::now(),
        }
    }

    /// Fill in the ID from the current time if it is unset.
    pub fn ensure_id(&mut self) {
        if self.id.is_empty() {
            self.id = Utc::now().format(TARGET_ID_FORMAT).to_string();
        }
    }
}

/// One persisted check against one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub target_id: String,
    pub up: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    pub latency_ms: f64,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub reason: String,
    pub checked_at: DateTime<Utc>,
}

/// Most recent result for a target, joined with the target URL.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatestRow {
    pub target_id: String,
    pub url: String,
    pub up: bool,
    pub http_status: Option<u16>,
    pub latency_ms: Option<f64>,
    pub reason: String,
    pub checked_at: DateTime<Utc>,
}

/// Last observed state for a target and when we last notified about it.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertRecord {
    pub target_id: String,
    pub last_state: bool,
    /// Set only when a notification was actually dispatched.
    pub last_sent_at: Option<DateTime<Utc>>,
}
