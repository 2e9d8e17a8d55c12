use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total requests handled. Labels: operation, status.
pub const REQUESTS_TOTAL: &str = "rangebook_requests_total";

/// Histogram: request latency in seconds. Labels: operation.
pub const REQUEST_DURATION_SECONDS: &str = "rangebook_request_duration_seconds";

// ── Domain metrics ──────────────────────────────────────────────

/// Counter: bookings admitted. Labels: range.
pub const BOOKINGS_CREATED_TOTAL: &str = "rangebook_bookings_created_total";

/// Counter: creates refused because the slot was full. Labels: range.
pub const CAPACITY_REJECTIONS_TOTAL: &str = "rangebook_capacity_rejections_total";

/// Counter: failed password checks. Labels: operation.
pub const AUTH_FAILURES_TOTAL: &str = "rangebook_auth_failures_total";

/// Counter: plaintext credentials rehashed at startup.
pub const CREDENTIALS_MIGRATED_TOTAL: &str = "rangebook_credentials_migrated_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "rangebook_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "rangebook_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    match metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
    {
        Ok(()) => tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics"),
        Err(e) => tracing::error!("failed to install Prometheus metrics exporter: {e}"),
    }
}
