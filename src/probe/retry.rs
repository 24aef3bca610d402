//! Retrying probe decorator.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::{CheckOutcome, Probe};
use crate::context::CheckContext;

const EXHAUSTED_SUFFIX: &str = " (after retries)";

/// Wraps a probe with bounded retries and a fixed backoff between attempts.
pub struct RetryProbe {
    inner: Arc<dyn Probe>,
    attempts: u32,
    backoff: Duration,
}

impl RetryProbe {
    /// `attempts` below 1 is treated as 1.
    pub fn new(inner: Arc<dyn Probe>, attempts: u32, backoff: Duration) -> Self {
        Self {
            inner,
            attempts: attempts.max(1),
            backoff,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

#[async_trait]
impl Probe for RetryProbe {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn check(&self, ctx: &CheckContext, target: &str) -> CheckOutcome {
        let mut last = CheckOutcome::default();

        for attempt in 1..=self.attempts {
            last = self.inner.check(ctx, target).await;
            if last.success {
                return last;
            }

            if attempt < self.attempts {
                if let Err(e) = ctx.guard(tokio::time::sleep(self.backoff)).await {
                    tracing::debug!(
                        url = %target,
                        attempt,
                        reason = %e,
                        "retry backoff interrupted"
                    );
                    return last;
                }
            }
        }

        last.message.push_str(EXHAUSTED_SUFFIX);
        last
    }
}
