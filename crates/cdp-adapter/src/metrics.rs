use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use lazy_static::lazy_static;
use prometheus::{
    core::Collector, histogram_opts, HistogramVec, IntCounter, IntCounterVec, Registry,
};
use tracing::error;

/// Process-wide counters, readable without a prometheus registry.
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
pub struct AdapterMetricsSnapshot {
    pub calls: u64,
    pub call_failures: u64,
    pub call_latency_total_us: u64,
    pub discarded_events: u64,
    pub eval_retries: u64,
}

static CALLS: AtomicU64 = AtomicU64::new(0);
static CALL_FAILURES: AtomicU64 = AtomicU64::new(0);
static CALL_LATENCY_TOTAL_US: AtomicU64 = AtomicU64::new(0);
static DISCARDED_EVENTS: AtomicU64 = AtomicU64::new(0);
static EVAL_RETRIES: AtomicU64 = AtomicU64::new(0);

lazy_static! {
    static ref CDP_CALLS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("chatturn_cdp_calls_total", "DevTools calls issued"),
        &["method"]
    )
    .unwrap();
    static ref CDP_CALL_FAILURES_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("chatturn_cdp_call_failures_total", "DevTools calls that failed"),
        &["method", "kind"]
    )
    .unwrap();
    static ref CDP_CALL_DURATION: HistogramVec = HistogramVec::new(
        histogram_opts!(
            "chatturn_cdp_call_duration_seconds",
            "DevTools call latency",
            vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0]
        ),
        &["method"]
    )
    .unwrap();
    static ref CDP_DISCARDED_EVENTS_TOTAL: IntCounter = IntCounter::new(
        "chatturn_cdp_discarded_events_total",
        "Unsolicited protocol events dropped by the transport"
    )
    .unwrap();
    static ref CDP_EVAL_RETRIES_TOTAL: IntCounter = IntCounter::new(
        "chatturn_cdp_eval_retries_total",
        "Evaluations retried after execution-context loss"
    )
    .unwrap();
}

fn register<C>(registry: &Registry, collector: C)
where
    C: Collector + Clone + Send + Sync + 'static,
{
    if let Err(err) = registry.register(Box::new(collector.clone())) {
        if !matches!(err, prometheus::Error::AlreadyReg) {
            error!(target: "cdp-transport", ?err, "failed to register cdp metric");
        }
    }
}

pub fn register_metrics(registry: &Registry) {
    register(registry, CDP_CALLS_TOTAL.clone());
    register(registry, CDP_CALL_FAILURES_TOTAL.clone());
    register(registry, CDP_CALL_DURATION.clone());
    register(registry, CDP_DISCARDED_EVENTS_TOTAL.clone());
    register(registry, CDP_EVAL_RETRIES_TOTAL.clone());
}

pub fn record_call(method: &str) {
    CALLS.fetch_add(1, Ordering::Relaxed);
    CDP_CALLS_TOTAL.with_label_values(&[method]).inc();
}

pub fn record_call_success(method: &str, duration: Duration) {
    let micros = duration.as_micros().min(u64::MAX as u128) as u64;
    CALL_LATENCY_TOTAL_US.fetch_add(micros, Ordering::Relaxed);
    CDP_CALL_DURATION
        .with_label_values(&[method])
        .observe(duration.as_secs_f64());
}

pub fn record_call_failure(method: &str, kind: &str) {
    CALL_FAILURES.fetch_add(1, Ordering::Relaxed);
    CDP_CALL_FAILURES_TOTAL
        .with_label_values(&[method, kind])
        .inc();
}

pub fn record_discarded_event() {
    DISCARDED_EVENTS.fetch_add(1, Ordering::Relaxed);
    CDP_DISCARDED_EVENTS_TOTAL.inc();
}

pub fn record_eval_retry() {
    EVAL_RETRIES.fetch_add(1, Ordering::Relaxed);
    CDP_EVAL_RETRIES_TOTAL.inc();
}

pub fn snapshot() -> AdapterMetricsSnapshot {
    AdapterMetricsSnapshot {
        calls: CALLS.load(Ordering::Relaxed),
        call_failures: CALL_FAILURES.load(Ordering::Relaxed),
        call_latency_total_us: CALL_LATENCY_TOTAL_US.load(Ordering::Relaxed),
        discarded_events: DISCARDED_EVENTS.load(Ordering::Relaxed),
        eval_retries: EVAL_RETRIES.load(Ordering::Relaxed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Counters are process-global, so assert on deltas.
    #[test]
    fn records_call_outcomes() {
        let before = snapshot();
        record_call("Runtime.evaluate");
        record_call_success("Runtime.evaluate", Duration::from_micros(150));
        record_call("Page.reload");
        record_call_failure("Page.reload", "timeout");
        let after = snapshot();
        assert!(after.calls >= before.calls + 2);
        assert!(after.call_failures >= before.call_failures + 1);
        assert!(after.call_latency_total_us >= before.call_latency_total_us + 150);
    }

    #[test]
    fn registers_into_custom_registry_once() {
        let registry = Registry::new();
        register_metrics(&registry);
        register_metrics(&registry);
        record_eval_retry();
        let families = registry.gather();
        assert!(families
            .iter()
            .any(|family| family.get_name() == "chatturn_cdp_eval_retries_total"));
    }
}
