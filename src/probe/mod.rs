//! Probe module for endpoint checks.
//!
//! Supports HTTP reachability and DNS resolution probes, a retrying wrapper
//! and a composite runner.

mod composite;
mod dns;
mod http;
mod retry;

pub use composite::*;
pub use dns::*;
pub use http::*;
pub use retry::*;

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

use crate::context::{CheckContext, ContextError};

/// Probe error types.
///
/// Probes never return these to callers; they are folded into a failed
/// [`CheckOutcome`] with the error text as its message.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("check {0}")]
    Interrupted(#[from] ContextError),
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Result of a single probe invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CheckOutcome {
    pub success: bool,
    /// HTTP status, 0 when no response was received.
    pub status_code: u16,
    pub latency_ms: f64,
    pub message: String,
}

impl CheckOutcome {
    /// Transport-level failure: no response, status code 0.
    pub fn failed(latency_ms: f64, err: impl ToString) -> Self {
        Self {
            success: false,
            status_code: 0,
            latency_ms,
            message: err.to_string(),
        }
    }
}

/// Outcome of one probe inside a composite run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeReport {
    pub probe: String,
    #[serde(flatten)]
    pub outcome: CheckOutcome,
}

/// A single check mechanism.
///
/// Implementations must return by the context's deadline and must not touch
/// shared state beyond outbound network calls.
#[async_trait]
pub trait Probe: Send + Sync {
    fn name(&self) -> &str;

    async fn check(&self, ctx: &CheckContext, target: &str) -> CheckOutcome;
}

fn elapsed_ms(start: std::time::Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}
