use std::net::SocketAddr;

use crate::engine::ErrorKind;

// ── Booking flow ────────────────────────────────────────────────

/// Counter: reservations committed.
pub const BOOKINGS_RESERVED_TOTAL: &str = "courtbook_bookings_reserved_total";

/// Counter: reservations rejected. Labels: reason.
pub const BOOKINGS_REJECTED_TOTAL: &str = "courtbook_bookings_rejected_total";

/// Counter: bookings withdrawn by their owner.
pub const BOOKINGS_CANCELLED_TOTAL: &str = "courtbook_bookings_cancelled_total";

/// Counter: manager verifications. Labels: status.
pub const BOOKINGS_VERIFIED_TOTAL: &str = "courtbook_bookings_verified_total";

/// Counter: bookings moved to COMPLETED/CANCELLED by the status job. Labels: status.
pub const BOOKINGS_ADVANCED_TOTAL: &str = "courtbook_bookings_advanced_total";

/// Histogram: reserve latency in seconds.
pub const RESERVE_DURATION_SECONDS: &str = "courtbook_reserve_duration_seconds";

// ── Availability maintenance ────────────────────────────────────

/// Counter: slots created by generation, rolling and reconciliation.
pub const SLOTS_GENERATED_TOTAL: &str = "courtbook_slots_generated_total";

/// Counter: window roll runs.
pub const WINDOW_ROLLS_TOTAL: &str = "courtbook_window_rolls_total";

/// Counter: courts that failed during a window roll or reconcile.
pub const COURT_JOB_FAILURES_TOTAL: &str = "courtbook_court_job_failures_total";

/// Counter: weekdays found changed by schedule reconciliation.
pub const RECONCILE_DAYS_CHANGED_TOTAL: &str = "courtbook_reconcile_days_changed_total";

/// Gauge: courts currently loaded.
pub const COURTS_ACTIVE: &str = "courtbook_courts_active";

// ── Storage ─────────────────────────────────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "courtbook_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "courtbook_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), String> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("failed to install Prometheus exporter: {e}"))?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Short label for a rejection reason.
pub fn rejection_label(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Validation => "validation",
        ErrorKind::NotFound => "not_found",
        ErrorKind::Conflict => "conflict",
        ErrorKind::Unauthorized => "unauthorized",
        ErrorKind::Storage => "storage",
    }
}
