use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: bookings accepted.
pub const BOOKINGS_TOTAL: &str = "bayline_bookings_total";

/// Counter: booking/reschedule attempts rejected by the validator.
pub const CONFLICTS_TOTAL: &str = "bayline_conflicts_total";

/// Counter: committed state transitions.
pub const TRANSITIONS_TOTAL: &str = "bayline_transitions_total";

/// Counter: overdue bookings auto-cancelled by the sweep.
pub const SWEEP_CANCELLED_TOTAL: &str = "bayline_sweep_cancelled_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: business days currently loaded in memory.
pub const DAYS_LOADED: &str = "bayline_days_loaded";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "bayline_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "bayline_wal_flush_batch_size";

/// Install the Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}
