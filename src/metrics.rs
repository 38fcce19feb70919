// Prometheus metrics definitions for the bracket engine.

use std::sync::Once;

use lazy_static::lazy_static;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ── Counters ─────────────────────────────────────────────────────

    /// Brackets built, by format.
    pub static ref BRACKETS_BUILT_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("brackets_built_total", "Brackets built"),
        &["format"],
    )
    .unwrap();

    /// Votes counted.
    pub static ref VOTES_ACCEPTED_TOTAL: IntCounter = IntCounter::new(
        "brackets_votes_accepted_total",
        "Votes counted",
    )
    .unwrap();

    /// Votes rejected because the voter already voted on the match.
    pub static ref DUPLICATE_VOTES_TOTAL: IntCounter = IntCounter::new(
        "brackets_duplicate_votes_total",
        "Duplicate votes rejected",
    )
    .unwrap();

    /// Matches resolved, by how (votes, explicit, bye).
    pub static ref MATCHES_RESOLVED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("brackets_matches_resolved_total", "Matches resolved"),
        &["resolution"],
    )
    .unwrap();

    /// Competitions that declared a winner, by format.
    pub static ref COMPETITIONS_COMPLETED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("brackets_competitions_completed_total", "Competitions completed"),
        &["format"],
    )
    .unwrap();

    /// Deadline sweeps run.
    pub static ref SWEEPER_RUNS_TOTAL: IntCounter = IntCounter::new(
        "brackets_sweeper_runs_total",
        "Deadline sweeps run",
    )
    .unwrap();

    /// Matches closed by the deadline sweeper.
    pub static ref SWEEPER_MATCHES_CLOSED_TOTAL: IntCounter = IntCounter::new(
        "brackets_sweeper_matches_closed_total",
        "Matches closed by the deadline sweeper",
    )
    .unwrap();

    // ── Histograms ───────────────────────────────────────────────────

    /// Time spent in one deadline sweep, in seconds.
    pub static ref SWEEP_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new("brackets_sweep_duration_seconds", "Deadline sweep duration in seconds")
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
    )
    .unwrap();
}

static REGISTER: Once = Once::new();

/// Register all metrics with the custom registry. Safe to call more than once.
pub fn register_metrics() {
    REGISTER.call_once(|| {
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(BRACKETS_BUILT_TOTAL.clone()),
            Box::new(VOTES_ACCEPTED_TOTAL.clone()),
            Box::new(DUPLICATE_VOTES_TOTAL.clone()),
            Box::new(MATCHES_RESOLVED_TOTAL.clone()),
            Box::new(COMPETITIONS_COMPLETED_TOTAL.clone()),
            Box::new(SWEEPER_RUNS_TOTAL.clone()),
            Box::new(SWEEPER_MATCHES_CLOSED_TOTAL.clone()),
            Box::new(SWEEP_DURATION_SECONDS.clone()),
        ];

        for c in collectors {
            if let Err(e) = REGISTRY.register(c) {
                tracing::warn!("failed to register metric: {e}");
            }
        }
    });
}

/// Serialize all registered metrics to the Prometheus text exposition format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!("failed to encode metrics: {e}");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
