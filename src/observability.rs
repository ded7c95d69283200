use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: booking lifecycle operations. Labels: op, status.
pub const BOOKING_OPS_TOTAL: &str = "circulate_booking_ops_total";

// ── Sweep metrics ───────────────────────────────────────────────

/// Counter: promotion attempts. Labels: outcome.
pub const PROMOTIONS_TOTAL: &str = "circulate_promotions_total";

/// Counter: completed sweep runs.
pub const SWEEP_RUNS_TOTAL: &str = "circulate_sweep_runs_total";

/// Histogram: sweep run duration in seconds.
pub const SWEEP_DURATION_SECONDS: &str = "circulate_sweep_duration_seconds";

// ── Journal metrics ─────────────────────────────────────────────

/// Histogram: journal group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "circulate_wal_flush_duration_seconds";

/// Histogram: journal group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "circulate_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}
