//! Name-resolution probe using the system resolver.

use async_trait::async_trait;
use std::fmt;
use std::time::{Duration, Instant};

use super::{elapsed_ms, CheckOutcome, Probe};
use crate::context::CheckContext;

const RESOLVE_TIMEOUT: Duration = Duration::from_secs(3);

/// Classification of a resolution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveClass {
    Resolves,
    NoAddress,
    ResolveFailed,
    InvalidName,
}

impl fmt::Display for ResolveClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResolveClass::Resolves => "RESOLVES",
            ResolveClass::NoAddress => "NO_ADDRESS",
            ResolveClass::ResolveFailed => "RESOLVE_FAILED",
            ResolveClass::InvalidName => "INVALID_NAME",
        };
        f.write_str(s)
    }
}

/// Checks that the target's host name resolves to at least one address.
#[derive(Debug, Clone)]
pub struct DnsProbe {
    timeout: Duration,
}

impl DnsProbe {
    pub fn new() -> Self {
        Self {
            timeout: RESOLVE_TIMEOUT,
        }
    }

    async fn resolve(&self, ctx: &CheckContext, host: &str) -> (ResolveClass, String) {
        let ctx = ctx.with_timeout(self.timeout);
        match ctx.guard(tokio::net::lookup_host((host, 0))).await {
            Ok(Ok(mut addrs)) => {
                if addrs.next().is_some() {
                    (ResolveClass::Resolves, String::new())
                } else {
                    (ResolveClass::NoAddress, String::new())
                }
            }
            Ok(Err(e)) => (ResolveClass::ResolveFailed, e.to_string()),
            Err(e) => (ResolveClass::ResolveFailed, e.to_string()),
        }
    }
}

impl Default for DnsProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Probe for DnsProbe {
    fn name(&self) -> &str {
        "DNS"
    }

    async fn check(&self, ctx: &CheckContext, target: &str) -> CheckOutcome {
        let start = Instant::now();

        let class = match extract_host(target) {
            Some(host) => {
                let (class, detail) = self.resolve(ctx, &host).await;
                if !detail.is_empty() {
                    tracing::debug!(host = %host, error = %detail, "resolution failed");
                }
                class
            }
            None => ResolveClass::InvalidName,
        };

        CheckOutcome {
            success: class == ResolveClass::Resolves,
            status_code: 0,
            latency_ms: elapsed_ms(start),
            message: class.to_string(),
        }
    }
}

/// Host part of a URL, or the trimmed input when it is already a bare name.
fn extract_host(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    match reqwest::Url::parse(raw) {
        Ok(url) => url
            .host_str()
            .filter(|h| !h.is_empty())
            .map(|h| h.trim_matches(|c| c == '[' || c == ']').to_string()),
        Err(_) if raw.contains("://") || raw.contains('/') => None,
        Err(_) => Some(raw.to_string()),
    }
}
