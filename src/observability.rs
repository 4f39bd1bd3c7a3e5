use std::net::SocketAddr;

use crate::error::ScheduleError;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: booking attempts. Labels: outcome.
pub const BOOKINGS_TOTAL: &str = "weekend_slots_bookings_total";

/// Histogram: end-to-end booking latency in seconds.
pub const BOOKING_DURATION_SECONDS: &str = "weekend_slots_booking_duration_seconds";

/// Counter: bookings rolled back after the request update failed.
pub const BOOKINGS_REVERTED_TOTAL: &str = "weekend_slots_bookings_reverted_total";

/// Counter: schedule views assembled. Labels: partial ("true" when a request lookup was skipped).
pub const VIEWS_TOTAL: &str = "weekend_slots_views_total";

/// Counter: store calls that hit their deadline. Labels: op.
pub const STORE_TIMEOUTS_TOTAL: &str = "weekend_slots_store_timeouts_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Counter: slots created by the generator.
pub const SLOTS_CREATED_TOTAL: &str = "weekend_slots_slots_created_total";

/// Gauge: slots held by the ledger.
pub const SLOTS_ACTIVE: &str = "weekend_slots_slots_active";

/// Histogram: journal group-commit flush duration in seconds.
pub const JOURNAL_FLUSH_DURATION_SECONDS: &str = "weekend_slots_journal_flush_duration_seconds";

/// Histogram: journal group-commit batch size (records per flush).
pub const JOURNAL_FLUSH_BATCH_SIZE: &str = "weekend_slots_journal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Short label for a booking outcome.
pub fn outcome_label(result: &Result<(), &ScheduleError>) -> &'static str {
    match result {
        Ok(()) => "scheduled",
        Err(ScheduleError::SlotNotFound(_)) => "slot_not_found",
        Err(ScheduleError::RequestNotFound(_)) => "request_not_found",
        Err(ScheduleError::SlotFull(_)) => "slot_full",
        Err(ScheduleError::InsufficientCapacity { .. }) => "insufficient_capacity",
        Err(ScheduleError::CapacityExceeded { .. }) => "capacity_exceeded",
        Err(ScheduleError::RequestAlreadyScheduled(_)) => "already_scheduled",
        Err(ScheduleError::InvalidHours(_)) => "invalid_hours",
        Err(ScheduleError::ConcurrencyConflict(_) | ScheduleError::RequestBusy(_)) => "conflict",
        Err(ScheduleError::StoreTimeout(_)) => "timeout",
        Err(_) => "error",
    }
}
