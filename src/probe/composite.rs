//! Runs several probes against one target.

use std::sync::Arc;

use super::{Probe, ProbeReport};
use crate::context::CheckContext;

/// Ordered set of probes run sequentially against the same target.
///
/// It reports every outcome and leaves the up/down verdict to the caller.
#[derive(Clone, Default)]
pub struct CompositeProbe {
    probes: Vec<Arc<dyn Probe>>,
}

impl CompositeProbe {
    pub fn new(probes: Vec<Arc<dyn Probe>>) -> Self {
        Self { probes }
    }

    pub async fn run(&self, ctx: &CheckContext, target: &str) -> Vec<ProbeReport> {
        let mut reports = Vec::with_capacity(self.probes.len());
        for probe in &self.probes {
            let outcome = probe.check(ctx, target).await;
            reports.push(ProbeReport {
                probe: probe.name().to_string(),
                outcome,
            });
        }
        reports
    }
}
