//! Metrics for observability.
//!
//! Emits Prometheus-style metrics through the `metrics` facade for:
//! - Upstream connection attempts
//! - Tail sessions and tailer state
//! - Records delivered and stream loop latency
//! - Last delivered log position
//!
//! Installing a recorder/exporter is the host process's concern; without one
//! these calls are no-ops.
//!
//! # Metric Naming Convention
//!
//! All metrics are prefixed with `oplog_tailer_`:
//! - Counters end in `_total`
//! - Gauges represent current state
//! - Histograms track distributions (duration, size)

use crate::tailer::TailerState;
use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Record an upstream connection attempt.
pub fn record_upstream_connect(mode: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!("oplog_tailer_upstream_connects_total", "mode" => mode.to_string(), "status" => status).increment(1);
}

/// Record a tail session being opened.
pub fn record_tail_started(oplog: &str, resumed: bool) {
    let start = if resumed { "position" } else { "beginning" };
    counter!("oplog_tailer_tail_sessions_total", "oplog" => oplog.to_string(), "start" => start).increment(1);
}

/// Gauge for tailer state (0=idle, 1=tailing, 2=streaming).
pub fn set_tailer_state(oplog: &str, state: TailerState) {
    gauge!("oplog_tailer_state", "oplog" => oplog.to_string()).set(state_value(state));
}

fn state_value(state: TailerState) -> f64 {
    match state {
        TailerState::Idle => 0.0,
        TailerState::Tailing => 1.0,
        TailerState::Streaming => 2.0,
    }
}

/// Record one `stream()` call: records delivered and time spent.
pub fn record_stream_call(oplog: &str, delivered: usize, duration: Duration) {
    counter!("oplog_tailer_records_delivered_total", "oplog" => oplog.to_string()).increment(delivered as u64);
    histogram!("oplog_tailer_stream_duration_seconds", "oplog" => oplog.to_string())
        .record(duration.as_secs_f64());
}

/// Record the seconds component of the last delivered position.
pub fn set_last_position(oplog: &str, seconds: u32) {
    gauge!("oplog_tailer_last_position_seconds", "oplog" => oplog.to_string()).set(f64::from(seconds));
}

/// Record a stop request.
pub fn record_stop_requested() {
    counter!("oplog_tailer_stop_requests_total").increment(1);
}

/// Record an error by operation and type.
pub fn record_error(operation: &str, error_type: &str) {
    counter!(
        "oplog_tailer_errors_total",
        "operation" => operation.to_string(),
        "error_type" => error_type.to_string()
    )
    .increment(1);
}
