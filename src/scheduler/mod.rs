//! Background loops: periodic rechecks and transition alerts.
//!
//! Both loops run one pass immediately, then one per tick, and stop when the
//! shared shutdown signal is raised.

mod alerter;
mod rechecker;

pub use alerter::*;
pub use rechecker::*;
