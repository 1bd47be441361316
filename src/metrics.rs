//! Prometheus metrics for the access-control core.
//!
//! - `authz_decisions_total{outcome}` - policy checks by outcome
//! - `authz_check_duration_seconds` - time spent building and evaluating abilities
//! - `catalog_permissions` - permissions currently held by the catalog
//! - `catalog_write_failures_total` - snapshot writes that failed
//!
//! Recording is a no-op until [`init`] has run; the host decides whether
//! metrics are collected and serves [`gather_metrics`] itself.

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::OnceLock;

/// Prometheus registry for all access-control metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

/// Policy checks by outcome (allow, forbidden, unauthenticated, ...).
pub static AUTHZ_DECISIONS: OnceLock<IntCounterVec> = OnceLock::new();

/// Latency of one policy check including the role lookup.
pub static AUTHZ_LATENCY: OnceLock<Histogram> = OnceLock::new();

/// Distinct permissions in the catalog.
pub static CATALOG_PERMISSIONS: OnceLock<IntGauge> = OnceLock::new();

/// Failed catalog snapshot writes.
pub static CATALOG_WRITE_FAILURES: OnceLock<IntCounter> = OnceLock::new();

/// Initialize the Prometheus metrics registry.
///
/// Safe to call more than once; later calls keep the first set of metrics.
pub fn init() {
    let r = registry();

    macro_rules! register {
        ($metric:ident, $init:expr) => {
            match $init {
                Ok(m) => {
                    if let Err(e) = r.register(Box::new(m.clone())) {
                        tracing::warn!(metric = stringify!($metric), error = %e, "Failed to register metric");
                    }
                    let _ = $metric.set(m);
                }
                Err(e) => {
                    tracing::warn!(metric = stringify!($metric), error = %e, "Failed to create metric");
                }
            }
        };
    }

    if AUTHZ_DECISIONS.get().is_some() {
        return;
    }

    register!(AUTHZ_DECISIONS, IntCounterVec::new(Opts::new("authz_decisions_total", "Policy checks by outcome"), &["outcome"]));
    register!(AUTHZ_LATENCY, Histogram::with_opts(
        HistogramOpts::new("authz_check_duration_seconds", "Policy check latency including role lookup")
            .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5])));
    register!(CATALOG_PERMISSIONS, IntGauge::new("catalog_permissions", "Distinct permissions in the catalog"));
    register!(CATALOG_WRITE_FAILURES, IntCounter::new("catalog_write_failures_total", "Failed catalog snapshot writes"));
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode Prometheus metrics");
        return String::new();
    }

    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
            String::new()
        }
    }
}

/// Record one policy decision.
#[inline]
pub fn record_decision(outcome: &str, duration_secs: f64) {
    if let Some(c) = AUTHZ_DECISIONS.get() {
        c.with_label_values(&[outcome]).inc();
    }
    if let Some(h) = AUTHZ_LATENCY.get() {
        h.observe(duration_secs);
    }
}

#[inline]
pub fn set_catalog_size(count: usize) {
    if let Some(g) = CATALOG_PERMISSIONS.get() {
        g.set(count as i64);
    }
}

#[inline]
pub fn record_catalog_write_failure() {
    if let Some(c) = CATALOG_WRITE_FAILURES.get() {
        c.inc();
    }
}
