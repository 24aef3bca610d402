//! HTTP reachability probe.

use async_trait::async_trait;
use std::time::{Duration, Instant};

use super::{elapsed_ms, CheckOutcome, Probe, ProbeError};
use crate::context::CheckContext;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
const USER_AGENT: &str = "uptimechecker/1.0";

/// Issues a GET and treats any 2xx or 3xx response as up.
pub struct HttpProbe {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpProbe {
    /// Build a probe whose requests give up after `timeout` (5s if zero).
    pub fn new(timeout: Duration) -> Result<Self, ProbeError> {
        let timeout = if timeout.is_zero() {
            DEFAULT_TIMEOUT
        } else {
            timeout
        };

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .pool_max_idle_per_host(16)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| ProbeError::Config(e.to_string()))?;

        Ok(Self { client, timeout })
    }

    async fn fetch(&self, ctx: &CheckContext, url: &str) -> Result<reqwest::StatusCode, ProbeError> {
        let send = self.client.get(url).send();
        let response = ctx.guard(send).await?.map_err(|e| {
            if e.is_timeout() {
                ProbeError::Timeout(self.timeout)
            } else {
                ProbeError::Network(error_chain(&e))
            }
        })?;
        Ok(response.status())
    }
}

#[async_trait]
impl Probe for HttpProbe {
    fn name(&self) -> &str {
        "HTTP"
    }

    async fn check(&self, ctx: &CheckContext, target: &str) -> CheckOutcome {
        let url = normalize_url(target);
        let start = Instant::now();

        match self.fetch(ctx, &url).await {
            Ok(status) => CheckOutcome {
                success: status.is_success() || status.is_redirection(),
                status_code: status.as_u16(),
                latency_ms: elapsed_ms(start),
                message: status.to_string(),
            },
            Err(e) => CheckOutcome::failed(elapsed_ms(start), e),
        }
    }
}

/// Prefix bare addresses with `http://`.
fn normalize_url(address: &str) -> String {
    if address.starts_with("http://") || address.starts_with("https://") {
        address.to_string()
    } else {
        format!("http://{}", address)
    }
}

/// reqwest's top-level message hides the cause; append the source chain.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut msg = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        msg.push_str(": ");
        msg.push_str(&cause.to_string());
        source = cause.source();
    }
    msg
}
