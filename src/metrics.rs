// Prometheus metrics definitions for the collector.

use lazy_static::lazy_static;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ── Gauges ───────────────────────────────────────────────────────

    /// Beacon connections currently being handled.
    pub static ref ACTIVE_CONNECTIONS: IntGauge =
        IntGauge::new("pwnts_active_connections", "Beacon connections currently open").unwrap();

    // ── Counters ─────────────────────────────────────────────────────

    /// Beacons that reached the pipeline, by outcome (selftest, persisted, or a drop reason).
    pub static ref BEACONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("pwnts_beacons_total", "Beacons processed, by outcome"),
        &["outcome"],
    )
    .unwrap();

    /// Rows appended to the checkin log.
    pub static ref CHECKINS_PERSISTED_TOTAL: IntCounter = IntCounter::new(
        "pwnts_checkins_persisted_total",
        "Checkins appended to the log",
    )
    .unwrap();

    /// Connections abandoned before a payload was read, by stage (accept, handshake, read, timeout).
    pub static ref TRANSPORT_ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("pwnts_transport_errors_total", "Transport failures, by stage"),
        &["stage"],
    )
    .unwrap();

    // ── Histograms ───────────────────────────────────────────────────

    /// Time from payload read to pipeline outcome.
    pub static ref INTAKE_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new("pwnts_intake_duration_seconds", "Beacon pipeline duration in seconds")
            .buckets(vec![0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.5, 1.0]),
    )
    .unwrap();

    /// Time to rebuild the scoreboard from the checkin log.
    pub static ref SCOREBOARD_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "pwnts_scoreboard_duration_seconds",
            "Scoreboard reconstruction duration in seconds",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0]),
    )
    .unwrap();
}

/// Register all metrics with the custom registry. Safe to call more than once.
pub fn register_metrics() {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(ACTIVE_CONNECTIONS.clone()),
        Box::new(BEACONS_TOTAL.clone()),
        Box::new(CHECKINS_PERSISTED_TOTAL.clone()),
        Box::new(TRANSPORT_ERRORS_TOTAL.clone()),
        Box::new(INTAKE_DURATION_SECONDS.clone()),
        Box::new(SCOREBOARD_DURATION_SECONDS.clone()),
    ];

    for c in collectors {
        match REGISTRY.register(c) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => tracing::error!("Failed to register metric: {e}"),
        }
    }
}

/// Serialize all registered metrics to the Prometheus text exposition format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {e}");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Count a connection that failed before the pipeline ran.
pub fn record_transport_error(stage: &str) {
    TRANSPORT_ERRORS_TOTAL.with_label_values(&[stage]).inc();
}

/// Open-connection gauge guard: increments on creation, decrements on drop.
pub struct ConnectionGuard;

impl ConnectionGuard {
    pub fn open() -> Self {
        ACTIVE_CONNECTIONS.inc();
        ConnectionGuard
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        ACTIVE_CONNECTIONS.dec();
    }
}
