//! Notification transports for alerts.

mod slack;

pub use slack::*;

use async_trait::async_trait;
use std::sync::Arc;

/// Best-effort delivery of a titled message.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, title: &str, text: &str) -> Result<(), NotifyError>;
}

/// Notifier errors
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("notification endpoint returned status {0}")]
    Status(u16),
}

/// Writes alerts to the log. Used when no webhook is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, title: &str, text: &str) -> Result<(), NotifyError> {
        tracing::warn!(title = %title, "Alert triggered: {}", text.replace('\n', " | "));
        Ok(())
    }
}

/// Fans a message out to several notifiers, reporting the first failure.
#[derive(Default, Clone)]
pub struct MultiNotifier {
    notifiers: Vec<Arc<dyn Notifier>>,
}

impl MultiNotifier {
    pub fn new(notifiers: Vec<Arc<dyn Notifier>>) -> Self {
        Self { notifiers }
    }
}

#[async_trait]
impl Notifier for MultiNotifier {
    async fn send(&self, title: &str, text: &str) -> Result<(), NotifyError> {
        let mut first_err = None;
        for notifier in &self.notifiers {
            if let Err(e) = notifier.send(title, text).await {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
