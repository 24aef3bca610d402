//! Debounced up/down alerting over the latest check per target.

use chrono::{DateTime, SecondsFormat, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::context::wait_for_shutdown;
use crate::db::{AlertRecord, AlertStore, DbError, LatestRow, ResultStore};
use crate::notify::Notifier;

const TITLE_DOWN: &str = "🔴 Target DOWN";
const TITLE_RECOVERED: &str = "🟢 Target RECOVERED";

/// Alerter settings.
#[derive(Debug, Clone)]
pub struct AlerterConfig {
    /// Also notify when a target comes back up.
    pub alert_on_recovery: bool,
    /// Minimum time between DOWN notifications for one target.
    pub cooldown: Duration,
    pub poll_interval: Duration,
}

impl Default for AlerterConfig {
    fn default() -> Self {
        Self {
            alert_on_recovery: true,
            cooldown: Duration::from_secs(600),
            poll_interval: Duration::from_secs(30),
        }
    }
}

/// What a pass decided for one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decision {
    Notify,
    /// State changed but the alert was suppressed.
    Record,
    Unchanged,
}

/// Scans the latest results and notifies on state transitions.
pub struct Alerter {
    results: Arc<dyn ResultStore>,
    alerts: Arc<dyn AlertStore>,
    notifier: Arc<dyn Notifier>,
    config: AlerterConfig,
}

impl Alerter {
    pub fn new(
        results: Arc<dyn ResultStore>,
        alerts: Arc<dyn AlertStore>,
        notifier: Arc<dyn Notifier>,
        config: AlerterConfig,
    ) -> Self {
        Self {
            results,
            alerts,
            notifier,
            config,
        }
    }

    /// Scan immediately, then once per poll interval, until shutdown.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        if self.config.poll_interval.is_zero() {
            tracing::warn!("alerter poll interval is zero, alerter disabled");
            return;
        }

        tracing::info!(
            poll_secs = self.config.poll_interval.as_secs_f64(),
            cooldown_secs = self.config.cooldown.as_secs(),
            alert_on_recovery = self.config.alert_on_recovery,
            "alerter started"
        );

        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut shutdown) => {
                    tracing::info!("alerter stopped");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.scan_once().await {
                        tracing::warn!(error = %e, "alerter: failed to read latest results");
                    }
                }
            }
        }
    }

    /// One scan over all targets. Returns the number of notifications sent.
    pub async fn scan_once(&self) -> Result<usize, DbError> {
        self.scan_at(Utc::now()).await
    }

    async fn scan_at(&self, now: DateTime<Utc>) -> Result<usize, DbError> {
        let rows = self.results.latest()?;
        let mut sent = 0;

        for row in rows {
            let record = match self.alerts.get(&row.target_id) {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(
                        target_id = %row.target_id,
                        error = %e,
                        "alerter: failed to load alert state"
                    );
                    continue;
                }
            };

            match self.decide(record.as_ref(), &row, now) {
                Decision::Notify => {
                    let (title, text) = format_alert(&row);
                    if let Err(e) = self.notifier.send(title, &text).await {
                        tracing::warn!(
                            target_id = %row.target_id,
                            error = %e,
                            "alerter: notification failed"
                        );
                    }
                    sent += 1;
                    self.persist(&row, Some(now));
                }
                Decision::Record => self.persist(&row, None),
                Decision::Unchanged => {}
            }
        }

        Ok(sent)
    }

    fn decide(&self, record: Option<&AlertRecord>, row: &LatestRow, now: DateTime<Utc>) -> Decision {
        let state_changed = record.map_or(true, |r| r.last_state != row.up);
        if !state_changed {
            return Decision::Unchanged;
        }

        let cooled = match record.and_then(|r| r.last_sent_at) {
            None => true,
            // A send time in the future means clock skew; stay quiet.
            Some(sent) => (now - sent)
                .to_std()
                .map_or(false, |elapsed| elapsed >= self.config.cooldown),
        };

        let notify = if row.up {
            // Recoveries bypass the cooldown.
            self.config.alert_on_recovery
        } else {
            cooled
        };

        if notify {
            Decision::Notify
        } else {
            Decision::Record
        }
    }

    fn persist(&self, row: &LatestRow, sent_at: Option<DateTime<Utc>>) {
        if let Err(e) = self.alerts.set(&row.target_id, row.up, sent_at) {
            tracing::warn!(
                target_id = %row.target_id,
                error = %e,
                "alerter: failed to save alert state"
            );
        }
    }
}

/// Title and body for a transition notification.
fn format_alert(row: &LatestRow) -> (&'static str, String) {
    let title = if row.up { TITLE_RECOVERED } else { TITLE_DOWN };

    let http = row
        .http_status
        .map(|s| s.to_string())
        .unwrap_or_else(|| "n/a".to_string());
    let latency = row
        .latency_ms
        .map(|l| format!("{:.0} ms", l))
        .unwrap_or_else(|| "n/a".to_string());

    let text = format!(
        "URL: {}\nHTTP: {}\nLatency: {}\nReason: {}\nChecked: {}",
        row.url,
        http,
        latency,
        row.reason,
        row.checked_at.to_rfc3339_opts(SecondsFormat::Secs, true),
    );

    (title, text)
}
