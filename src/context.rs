//! Deadlines and shutdown propagation for checks and background loops.
//!
//! Shutdown is a `watch::Receiver<bool>`: flipping it to `true` (or dropping
//! the sender) tells every loop and in-flight check to wind down.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;

/// Why a guarded future did not complete.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextError {
    #[error("deadline exceeded")]
    DeadlineExceeded,
    #[error("cancelled")]
    Cancelled,
}

/// A cancellable deadline handed to every probe invocation.
#[derive(Debug, Clone, Default)]
pub struct CheckContext {
    deadline: Option<Instant>,
    shutdown: Option<watch::Receiver<bool>>,
}

impl CheckContext {
    /// A context that never expires and is never cancelled.
    pub fn background() -> Self {
        Self::default()
    }

    /// A context cancelled by the given shutdown signal.
    pub fn with_shutdown(shutdown: watch::Receiver<bool>) -> Self {
        Self {
            deadline: None,
            shutdown: Some(shutdown),
        }
    }

    /// Derive a child context that expires after `timeout`, or earlier if the
    /// parent's deadline comes first.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(existing) if existing < candidate => existing,
            _ => candidate,
        };
        Self {
            deadline: Some(deadline),
            shutdown: self.shutdown.clone(),
        }
    }

    /// Non-blocking check of both the deadline and the shutdown signal.
    pub fn err(&self) -> Option<ContextError> {
        if let Some(rx) = &self.shutdown {
            if *rx.borrow() || rx.has_changed().is_err() {
                return Some(ContextError::Cancelled);
            }
        }
        match self.deadline {
            Some(d) if Instant::now() >= d => Some(ContextError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolves once the deadline passes or shutdown is signalled.
    pub async fn done(&self) -> ContextError {
        let shutdown = self.shutdown.clone();
        let deadline = self.deadline;

        tokio::select! {
            _ = async move {
                match shutdown {
                    Some(mut rx) => wait_for_shutdown(&mut rx).await,
                    None => std::future::pending::<()>().await,
                }
            } => ContextError::Cancelled,
            _ = async move {
                match deadline {
                    Some(d) => tokio::time::sleep_until(d).await,
                    None => std::future::pending::<()>().await,
                }
            } => ContextError::DeadlineExceeded,
        }
    }

    /// Run `fut` to completion unless the context finishes first.
    pub async fn guard<F: Future>(&self, fut: F) -> Result<F::Output, ContextError> {
        if let Some(e) = self.err() {
            return Err(e);
        }
        tokio::select! {
            out = fut => Ok(out),
            e = self.done() => Err(e),
        }
    }
}

/// Wait until the shutdown flag is raised or its sender goes away.
pub async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}
