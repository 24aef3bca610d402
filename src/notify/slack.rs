//! Slack incoming-webhook notifier.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

use super::{Notifier, NotifyError};

#[derive(Serialize)]
struct SlackPayload {
    text: String,
}

/// Posts alerts to a Slack incoming webhook.
pub struct SlackNotifier {
    webhook: String,
    client: reqwest::Client,
}

impl SlackNotifier {
    /// Returns `None` when the webhook URL is empty.
    pub fn new(webhook: &str) -> Option<Self> {
        let webhook = webhook.trim();
        if webhook.is_empty() {
            return None;
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .ok()?;
        Some(Self {
            webhook: webhook.to_string(),
            client,
        })
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn send(&self, title: &str, text: &str) -> Result<(), NotifyError> {
        let payload = SlackPayload {
            text: format!("*{}*\n{}", title, text),
        };

        let response = self.client.post(&self.webhook).json(&payload).send().await?;

        if !response.status().is_success() {
            return Err(NotifyError::Status(response.status().as_u16()));
        }

        tracing::debug!(title = %title, "Slack notification sent");
        Ok(())
    }
}
