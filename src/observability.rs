use std::net::SocketAddr;

// ── State document ──────────────────────────────────────────────

/// Counter: state document loads.
pub const STATE_LOADS_TOTAL: &str = "huddle_state_loads_total";

/// Counter: conditional state saves. Labels: outcome (ok, conflict, error).
pub const STATE_SAVES_TOTAL: &str = "huddle_state_saves_total";

// ── Executor ────────────────────────────────────────────────────

/// Counter: actions executed. Labels: action, outcome (ok, rejected).
pub const ACTIONS_TOTAL: &str = "huddle_actions_total";

/// Histogram: batch execution time in seconds.
pub const EXECUTE_DURATION_SECONDS: &str = "huddle_execute_duration_seconds";

// ── Event log ───────────────────────────────────────────────────

/// Counter: event appends. Labels: outcome (appended, duplicate, exhausted, error).
pub const EVENT_APPENDS_TOTAL: &str = "huddle_event_appends_total";

/// Counter: append attempts lost to a concurrent writer.
pub const EVENT_APPEND_RETRIES_TOTAL: &str = "huddle_event_append_retries_total";

/// Counter: new chunks created because the latest one was full.
pub const EVENT_CHUNK_ROLLOVERS_TOTAL: &str = "huddle_event_chunk_rollovers_total";

/// Counter: reminders delivered by the poller.
pub const REMINDERS_SENT_TOTAL: &str = "huddle_reminders_sent_total";

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
