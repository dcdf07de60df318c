use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total requests handled. Labels: op, status.
pub const REQUESTS_TOTAL: &str = "roomsched_requests_total";

/// Histogram: request latency in seconds. Labels: op.
pub const REQUEST_DURATION_SECONDS: &str = "roomsched_request_duration_seconds";

// ── Domain metrics ──────────────────────────────────────────────

/// Counter: reservations created.
pub const RESERVATIONS_CREATED_TOTAL: &str = "roomsched_reservations_created_total";

/// Counter: booking or move attempts refused. Labels: reason.
pub const BOOKING_CONFLICTS_TOTAL: &str = "roomsched_booking_conflicts_total";

/// Counter: lifecycle transitions applied. Labels: action.
pub const TRANSITIONS_TOTAL: &str = "roomsched_transitions_total";

/// Counter: confirmed moves.
pub const MOVES_APPLIED_TOTAL: &str = "roomsched_moves_applied_total";

/// Counter: events made durable. Labels: event.
pub const EVENTS_COMMITTED_TOTAL: &str = "roomsched_events_committed_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "roomsched_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "roomsched_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "roomsched_connections_rejected_total";

/// Gauge: open `watch` subscriptions.
pub const WATCHERS_ACTIVE: &str = "roomsched_watchers_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "roomsched_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "roomsched_wal_flush_batch_size";

/// Counter: WAL compactions performed.
pub const WAL_COMPACTIONS_TOTAL: &str = "roomsched_wal_compactions_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), String> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("failed to install Prometheus metrics exporter: {e}"))?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}
