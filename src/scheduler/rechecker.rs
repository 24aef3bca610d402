//! Periodic rechecking of every known target.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;

use crate::context::{wait_for_shutdown, CheckContext, ContextError};
use crate::db::{CheckResult, ResultStore, Target, TargetStore};
use crate::probe::Probe;

const DEFAULT_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// Rechecker settings. Out-of-range values are coerced by [`Rechecker::new`].
#[derive(Debug, Clone)]
pub struct RecheckerConfig {
    /// Time between passes; zero disables the loop.
    pub interval: Duration,
    /// Budget for a single check.
    pub timeout: Duration,
    /// Maximum checks in flight at once.
    pub concurrency: usize,
}

impl Default for RecheckerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            timeout: DEFAULT_CHECK_TIMEOUT,
            concurrency: 8,
        }
    }
}

/// Checks all targets each tick with bounded parallelism and stores outcomes.
pub struct Rechecker {
    targets: Arc<dyn TargetStore>,
    results: Arc<dyn ResultStore>,
    probe: Arc<dyn Probe>,
    config: RecheckerConfig,
}

impl Rechecker {
    pub fn new(
        targets: Arc<dyn TargetStore>,
        results: Arc<dyn ResultStore>,
        probe: Arc<dyn Probe>,
        mut config: RecheckerConfig,
    ) -> Self {
        if config.timeout.is_zero() {
            config.timeout = DEFAULT_CHECK_TIMEOUT;
        }
        config.concurrency = config.concurrency.max(1);

        Self {
            targets,
            results,
            probe,
            config,
        }
    }

    pub fn config(&self) -> &RecheckerConfig {
        &self.config
    }

    /// Run one pass immediately, then one per interval, until shutdown.
    ///
    /// Returns at once when the interval is zero. A pass that is running when
    /// shutdown arrives is allowed to finish; no further pass is started.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        if self.config.interval.is_zero() {
            tracing::info!("rechecker disabled");
            return;
        }

        tracing::info!(
            interval_secs = self.config.interval.as_secs_f64(),
            concurrency = self.config.concurrency,
            "rechecker started"
        );

        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut shutdown) => {
                    tracing::info!("rechecker stopped");
                    break;
                }
                _ = ticker.tick() => {
                    self.run_pass(&shutdown).await;
                }
            }
        }
    }

    /// Check every target once. Returns after all checks have finished.
    async fn run_pass(&self, shutdown: &watch::Receiver<bool>) -> usize {
        let targets = match self.targets.list() {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(error = %e, "rechecker: failed to list targets");
                return 0;
            }
        };

        if targets.is_empty() {
            return 0;
        }

        let pass_ctx = CheckContext::with_shutdown(shutdown.clone());
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let mut workers = JoinSet::new();

        for target in targets {
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(p) => p,
                Err(_) => break,
            };

            let ctx = pass_ctx.with_timeout(self.config.timeout);
            let probe = self.probe.clone();
            let results = self.results.clone();

            workers.spawn(async move {
                let _permit = permit;
                check_target(&ctx, probe.as_ref(), results.as_ref(), target).await
            });
        }

        let mut stored = 0;
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(true) => stored += 1,
                Ok(false) => {}
                Err(e) => tracing::error!(error = %e, "rechecker: check task failed"),
            }
        }

        tracing::debug!(stored, "rechecker pass complete");
        stored
    }
}

/// Probe one target and append the result. Returns whether a result was stored.
async fn check_target(
    ctx: &CheckContext,
    probe: &dyn Probe,
    results: &dyn ResultStore,
    target: Target,
) -> bool {
    if ctx.err().is_some() {
        tracing::debug!(target_id = %target.id, "rechecker: skipping check after shutdown");
        return false;
    }

    let outcome = probe.check(ctx, &target.url).await;

    // An interrupted check says nothing about the target.
    if ctx.err() == Some(ContextError::Cancelled) {
        tracing::debug!(target_id = %target.id, "rechecker: check interrupted by shutdown, not stored");
        return false;
    }

    let result = CheckResult {
        target_id: target.id.clone(),
        up: outcome.success,
        http_status: (outcome.status_code != 0).then_some(outcome.status_code),
        latency_ms: outcome.latency_ms,
        reason: outcome.message,
        checked_at: Utc::now(),
    };

    if let Err(e) = results.append(&result) {
        tracing::warn!(
            target_id = %target.id,
            url = %target.url,
            error = %e,
            "rechecker: failed to append result"
        );
        return false;
    }

    tracing::debug!(
        target_id = %target.id,
        url = %target.url,
        status = outcome.status_code,
        up = result.up,
        latency_ms = result.latency_ms,
        reason = %result.reason,
        "rechecker: checked"
    );
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{DbError, LatestRow, MemoryStore};
    use crate::probe::testing::ok;
    use crate::probe::CheckOutcome;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    /// Always succeeds after a short delay, tracking peak concurrency.
    #[derive(Default)]
    struct SlowProbe {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Probe for SlowProbe {
        fn name(&self) -> &str {
            "slow"
        }

        async fn check(&self, _ctx: &CheckContext, _target: &str) -> CheckOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            ok("200 OK")
        }
    }

    /// Waits on the context for up to two seconds before answering.
    struct HangingProbe;

    #[async_trait]
    impl Probe for HangingProbe {
        fn name(&self) -> &str {
            "hanging"
        }

        async fn check(&self, ctx: &CheckContext, _target: &str) -> CheckOutcome {
            match ctx.guard(tokio::time::sleep(Duration::from_secs(2))).await {
                Ok(()) => ok("200 OK"),
                Err(e) => CheckOutcome::failed(1.0, format!("check {}", e)),
            }
        }
    }

    /// Fails to return a response.
    struct DownProbe;

    #[async_trait]
    impl Probe for DownProbe {
        fn name(&self) -> &str {
            "down"
        }

        async fn check(&self, _ctx: &CheckContext, _target: &str) -> CheckOutcome {
            CheckOutcome::failed(3.0, "connection refused")
        }
    }

    /// Records appends, optionally rejecting one target.
    #[derive(Default)]
    struct RecordingResults {
        appended: Mutex<Vec<CheckResult>>,
        reject: Option<String>,
    }

    impl ResultStore for RecordingResults {
        fn append(&self, result: &CheckResult) -> Result<(), DbError> {
            if self.reject.as_deref() == Some(result.target_id.as_str()) {
                return Err(DbError::Unavailable("disk full".into()));
            }
            self.appended.lock().push(result.clone());
            Ok(())
        }

        fn latest(&self) -> Result<Vec<LatestRow>, DbError> {
            Ok(Vec::new())
        }
    }

    struct BrokenTargets;

    impl TargetStore for BrokenTargets {
        fn add(&self, _target: &mut Target) -> Result<(), DbError> {
            Err(DbError::Unavailable("down".into()))
        }

        fn list(&self) -> Result<Vec<Target>, DbError> {
            Err(DbError::Unavailable("down".into()))
        }
    }

    fn targets(n: usize) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        for i in 0..n {
            let mut t = Target::new(format!("https://site-{}.example", i));
            t.id = format!("T{}", i);
            store.add(&mut t).unwrap();
        }
        store
    }

    fn config(concurrency: usize) -> RecheckerConfig {
        RecheckerConfig {
            interval: Duration::from_millis(50),
            timeout: Duration::from_secs(1),
            concurrency,
        }
    }

    #[tokio::test]
    async fn test_pass_appends_every_target_within_concurrency() {
        let probe = Arc::new(SlowProbe::default());
        let results = Arc::new(RecordingResults::default());
        let rechecker = Rechecker::new(targets(10), results.clone(), probe.clone(), config(3));

        let (_tx, rx) = watch::channel(false);
        let stored = rechecker.run_pass(&rx).await;

        assert_eq!(stored, 10);
        assert_eq!(results.appended.lock().len(), 10);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 10);
        let peak = probe.peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak in-flight {} exceeded limit", peak);
        assert!(peak >= 2, "checks should overlap, peak {}", peak);
        // Barrier: nothing left running once the pass returns.
        assert_eq!(probe.in_flight.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_probe_still_recorded_as_down() {
        let results = Arc::new(RecordingResults::default());
        let rechecker = Rechecker::new(targets(2), results.clone(), Arc::new(DownProbe), config(2));

        let (_tx, rx) = watch::channel(false);
        rechecker.run_pass(&rx).await;

        let appended = results.appended.lock();
        assert_eq!(appended.len(), 2);
        for r in appended.iter() {
            assert!(!r.up);
            assert_eq!(r.http_status, None);
            assert_eq!(r.reason, "connection refused");
        }
    }

    #[tokio::test]
    async fn test_append_failure_is_isolated() {
        let results = Arc::new(RecordingResults {
            appended: Mutex::new(Vec::new()),
            reject: Some("T1".to_string()),
        });
        let rechecker = Rechecker::new(
            targets(3),
            results.clone(),
            Arc::new(SlowProbe::default()),
            config(3),
        );

        let (_tx, rx) = watch::channel(false);
        let stored = rechecker.run_pass(&rx).await;

        assert_eq!(stored, 2);
        let ids: Vec<String> = results
            .appended
            .lock()
            .iter()
            .map(|r| r.target_id.clone())
            .collect();
        assert!(ids.contains(&"T0".to_string()));
        assert!(ids.contains(&"T2".to_string()));
    }

    #[tokio::test]
    async fn test_list_failure_skips_pass() {
        let results = Arc::new(RecordingResults::default());
        let rechecker = Rechecker::new(
            Arc::new(BrokenTargets),
            results.clone(),
            Arc::new(SlowProbe::default()),
            config(1),
        );

        let (_tx, rx) = watch::channel(false);
        assert_eq!(rechecker.run_pass(&rx).await, 0);
        assert!(results.appended.lock().is_empty());
    }

    #[tokio::test]
    async fn test_results_visible_through_latest() {
        let store = targets(2);
        let rechecker = Rechecker::new(
            store.clone(),
            store.clone(),
            Arc::new(SlowProbe::default()),
            config(2),
        );

        let (_tx, rx) = watch::channel(false);
        rechecker.run_pass(&rx).await;

        let rows = store.latest().unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.up && r.http_status == Some(200)));
    }

    #[test]
    fn test_config_coercion() {
        let rechecker = Rechecker::new(
            targets(0),
            Arc::new(RecordingResults::default()),
            Arc::new(DownProbe),
            RecheckerConfig {
                interval: Duration::from_secs(1),
                timeout: Duration::ZERO,
                concurrency: 0,
            },
        );
        assert_eq!(rechecker.config().timeout, Duration::from_secs(10));
        assert_eq!(rechecker.config().concurrency, 1);
    }

    #[tokio::test]
    async fn test_zero_interval_disables_loop() {
        let probe = Arc::new(SlowProbe::default());
        let mut cfg = config(1);
        cfg.interval = Duration::ZERO;
        let rechecker = Rechecker::new(
            targets(1),
            Arc::new(RecordingResults::default()),
            probe.clone(),
            cfg,
        );

        let (_tx, rx) = watch::channel(false);
        tokio::time::timeout(Duration::from_secs(1), rechecker.run(rx))
            .await
            .expect("disabled rechecker should return immediately");
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_run_passes_until_shutdown() {
        let probe = Arc::new(SlowProbe::default());
        let results = Arc::new(RecordingResults::default());
        let rechecker = Arc::new(Rechecker::new(
            targets(1),
            results.clone(),
            probe.clone(),
            config(1),
        ));

        let (tx, rx) = watch::channel(false);
        let handle = {
            let rechecker = rechecker.clone();
            tokio::spawn(async move { rechecker.run(rx).await })
        };

        tokio::time::sleep(Duration::from_millis(180)).await;
        tx.send(true).unwrap();

        let start = Instant::now();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("rechecker should stop promptly")
            .unwrap();
        assert!(start.elapsed() < Duration::from_millis(500));

        // Immediate pass plus at least one tick.
        let passes = results.appended.lock().len();
        assert!(passes >= 2, "expected several passes, got {}", passes);

        // No further passes after shutdown.
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(results.appended.lock().len(), passes);
    }

    #[tokio::test]
    async fn test_check_interrupted_by_shutdown_is_not_stored() {
        let store = targets(1);
        let rechecker = Arc::new(Rechecker::new(
            store.clone(),
            store.clone(),
            Arc::new(HangingProbe),
            RecheckerConfig {
                interval: Duration::from_secs(60),
                timeout: Duration::from_secs(10),
                concurrency: 1,
            },
        ));

        let (tx, rx) = watch::channel(false);
        let handle = {
            let rechecker = rechecker.clone();
            tokio::spawn(async move { rechecker.run(rx).await })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("in-flight check should end on shutdown")
            .unwrap();

        assert!(store.latest().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pass_after_shutdown_skips_checks() {
        let probe = Arc::new(SlowProbe::default());
        let rechecker = Rechecker::new(
            targets(3),
            Arc::new(RecordingResults::default()),
            probe.clone(),
            config(3),
        );

        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();
        assert_eq!(rechecker.run_pass(&rx).await, 0);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
    }
}
