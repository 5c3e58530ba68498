use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use crate::check::Decision;

/// Admin state for health/stats endpoints
#[derive(Debug)]
pub struct AdminState {
    start_time: Instant,
    healthy: AtomicBool,
    ready: AtomicBool,
    active_checks: AtomicU64,
    checks_total: AtomicU64,
    checks_allowed: AtomicU64,
    checks_invalid: AtomicU64,
    checks_internal: AtomicU64,
    cleanup_runs: AtomicU64,
}

impl AdminState {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            healthy: AtomicBool::new(true),
            ready: AtomicBool::new(false),
            active_checks: AtomicU64::new(0),
            checks_total: AtomicU64::new(0),
            checks_allowed: AtomicU64::new(0),
            checks_invalid: AtomicU64::new(0),
            checks_internal: AtomicU64::new(0),
            cleanup_runs: AtomicU64::new(0),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::Relaxed);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Relaxed);
    }

    pub fn check_started(&self) {
        self.active_checks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn check_ended(&self) {
        self.active_checks.fetch_sub(1, Ordering::Relaxed);
    }

    /// Count a check decision.
    pub fn record_decision(&self, decision: Decision) {
        self.checks_total.fetch_add(1, Ordering::Relaxed);
        let counter = match decision {
            Decision::Allow => &self.checks_allowed,
            Decision::InvalidArgument => &self.checks_invalid,
            Decision::Internal => &self.checks_internal,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_cleanup_runs(&self) {
        self.cleanup_runs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn active_checks(&self) -> u64 {
        self.active_checks.load(Ordering::Relaxed)
    }

    /// Snapshot of the check counters.
    pub fn check_stats(&self) -> CheckStats {
        CheckStats {
            active: self.active_checks(),
            total: self.checks_total.load(Ordering::Relaxed),
            allowed: self.checks_allowed.load(Ordering::Relaxed),
            invalid_argument: self.checks_invalid.load(Ordering::Relaxed),
            internal: self.checks_internal.load(Ordering::Relaxed),
            cleanup_runs: self.cleanup_runs.load(Ordering::Relaxed),
        }
    }
}

impl Default for AdminState {
    fn default() -> Self {
        Self::new()
    }
}

/// Check counters reported by the stats endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CheckStats {
    pub active: u64,
    pub total: u64,
    pub allowed: u64,
    pub invalid_argument: u64,
    pub internal: u64,
    pub cleanup_runs: u64,
}

/// Render the default registry in Prometheus text format.
pub fn render() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;

    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

/// Dispatcher metrics with authservice_* prefix
pub mod counters {
    use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};
    use std::sync::{Mutex, OnceLock};

    static INIT_LOCK: Mutex<()> = Mutex::new(());

    static CHECKS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
    static TRIGGER_RULE_BYPASS_TOTAL: OnceLock<IntCounter> = OnceLock::new();
    static NO_CHAIN_MATCH_TOTAL: OnceLock<IntCounter> = OnceLock::new();
    static PIPELINE_PANICS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
    static CHECK_DURATION: OnceLock<HistogramVec> = OnceLock::new();
    static CLEANUP_RUNS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

    /// Create and register all metrics with the default registry.
    ///
    /// Recording functions are no-ops until this has run. Calling it more
    /// than once is harmless.
    pub fn init() -> Result<(), prometheus::Error> {
        let _guard = INIT_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        if CHECKS_TOTAL.get().is_some() {
            return Ok(());
        }

        let checks = IntCounterVec::new(
            Opts::new("authservice_checks_total", "Checks by chain and decision"),
            &["chain", "decision"],
        )?;
        let bypass = IntCounter::new(
            "authservice_trigger_rule_bypass_total",
            "Checks allowed because no trigger rule matched the path",
        )?;
        let no_match = IntCounter::new(
            "authservice_no_chain_match_total",
            "Checks allowed because no chain matched",
        )?;
        let panics = IntCounterVec::new(
            Opts::new("authservice_pipeline_panics_total", "Pipelines that panicked"),
            &["chain"],
        )?;
        let duration = HistogramVec::new(
            HistogramOpts::new("authservice_check_duration_seconds", "Pipeline duration"),
            &["chain"],
        )?;
        let cleanup = IntCounterVec::new(
            Opts::new("authservice_cleanup_runs_total", "Chain cleanup runs by result"),
            &["chain", "result"],
        )?;

        let registry = prometheus::default_registry();
        registry.register(Box::new(checks.clone()))?;
        registry.register(Box::new(bypass.clone()))?;
        registry.register(Box::new(no_match.clone()))?;
        registry.register(Box::new(panics.clone()))?;
        registry.register(Box::new(duration.clone()))?;
        registry.register(Box::new(cleanup.clone()))?;

        let _ = CHECKS_TOTAL.set(checks);
        let _ = TRIGGER_RULE_BYPASS_TOTAL.set(bypass);
        let _ = NO_CHAIN_MATCH_TOTAL.set(no_match);
        let _ = PIPELINE_PANICS_TOTAL.set(panics);
        let _ = CHECK_DURATION.set(duration);
        let _ = CLEANUP_RUNS_TOTAL.set(cleanup);

        Ok(())
    }

    pub fn check_decided(chain: &str, decision: &str) {
        if let Some(c) = CHECKS_TOTAL.get() {
            c.with_label_values(&[chain, decision]).inc();
        }
    }

    pub fn trigger_rule_bypass() {
        if let Some(c) = TRIGGER_RULE_BYPASS_TOTAL.get() {
            c.inc();
        }
    }

    pub fn no_chain_match() {
        if let Some(c) = NO_CHAIN_MATCH_TOTAL.get() {
            c.inc();
        }
    }

    pub fn pipeline_panic(chain: &str) {
        if let Some(c) = PIPELINE_PANICS_TOTAL.get() {
            c.with_label_values(&[chain]).inc();
        }
    }

    pub fn check_duration(chain: &str, duration_secs: f64) {
        if let Some(h) = CHECK_DURATION.get() {
            h.with_label_values(&[chain]).observe(duration_secs);
        }
    }

    pub fn cleanup_run(chain: &str, result: &str) {
        if let Some(c) = CLEANUP_RUNS_TOTAL.get() {
            c.with_label_values(&[chain, result]).inc();
        }
    }
}
