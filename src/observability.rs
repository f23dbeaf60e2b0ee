use std::net::SocketAddr;

use crate::sql::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total queries executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "inncontrol_queries_total";

/// Histogram: query latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "inncontrol_query_duration_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "inncontrol_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "inncontrol_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "inncontrol_connections_rejected_total";

/// Counter: startup/auth failures.
pub const AUTH_FAILURES_TOTAL: &str = "inncontrol_auth_failures_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "inncontrol_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "inncontrol_wal_flush_batch_size";

/// Counter: WAL compactions completed.
pub const WAL_COMPACTIONS_TOTAL: &str = "inncontrol_wal_compactions_total";

// ── Domain ──────────────────────────────────────────────────────

/// Counter: booking requests declined because the room was taken.
pub const BOOKING_CONFLICTS_TOTAL: &str = "inncontrol_booking_conflicts_total";

/// Counter: room lock waits that gave up.
pub const LOCK_TIMEOUTS_TOTAL: &str = "inncontrol_lock_timeouts_total";

/// Counter: room status changes written by reconciliation or staff.
pub const ROOM_STATUS_UPDATES_TOTAL: &str = "inncontrol_room_status_updates_total";

/// Counter: full reconciliation sweeps run by the rollover task.
pub const RECONCILE_SWEEPS_TOTAL: &str = "inncontrol_reconcile_sweeps_total";

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

/// Map a Command variant to a short label for metrics.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::InsertHotel(_) => "insert_hotel",
        Command::InsertRoomType(_) => "insert_room_type",
        Command::InsertRoom(_) => "insert_room",
        Command::InsertClient(_) => "insert_client",
        Command::InsertBooking(_) => "insert_booking",
        Command::InsertEmployee(_) => "insert_employee",
        Command::InsertCleaningSchedule(_) => "insert_cleaning_schedule",
        Command::InsertCleaningLog(_) => "insert_cleaning_log",
        Command::UpdateRoomStatus { .. } => "update_room_status",
        Command::UpdateBooking { .. } => "update_booking",
        Command::UpdateEmployeeStatus { .. } => "update_employee_status",
        Command::UpdateCleaningLogStatus { .. } => "update_cleaning_log_status",
        Command::DeleteBooking { .. } => "delete_booking",
        Command::SelectHotels { .. } => "select_hotels",
        Command::SelectRoomTypes { .. } => "select_room_types",
        Command::SelectRooms { .. } => "select_rooms",
        Command::SelectClients { .. } => "select_clients",
        Command::SelectBookings { .. } => "select_bookings",
        Command::SelectEmployees { .. } => "select_employees",
        Command::SelectCleaningSchedules { .. } => "select_cleaning_schedules",
        Command::SelectCleaningLogs { .. } => "select_cleaning_logs",
        Command::SelectAvailableRooms { .. } => "select_available_rooms",
        Command::SelectRoomAvailability { .. } => "select_room_availability",
        Command::Reconcile { .. } => "reconcile",
        Command::SelectOccupancy { .. } => "select_occupancy",
    }
}
