//! uptimechecker: periodic uptime monitoring for HTTP targets.
//!
//! Targets are re-probed on a fixed interval with bounded concurrency. Every
//! check is appended to the result store, and state transitions (up to down,
//! down to up) produce notifications subject to a cooldown.

pub mod config;
pub mod context;
pub mod db;
pub mod notify;
pub mod probe;
pub mod ratelimit;
pub mod scheduler;
pub mod web;
