//! Metrics collection using metrics-rs.

use metrics::{Unit, counter, gauge, histogram};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Whether metrics have been initialized.
static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

// Metric names as constants for consistency
const PACKETS_SENT: &str = "pidflow_packets_sent_total";
const PACKETS_DROPPED: &str = "pidflow_packets_dropped_total";
const BYTES_SENT: &str = "pidflow_bytes_sent_total";
const BACKPRESSURE_STALLS: &str = "pidflow_backpressure_stalls_total";
const PROCESS_CALLS: &str = "pidflow_process_calls_total";
const PROCESS_TIME_NS: &str = "pidflow_process_time_ns";
const SERVICE_ERRORS: &str = "pidflow_service_errors_total";
const SETUP_FAILURES: &str = "pidflow_setup_failures_total";
const QUEUE_DEPTH: &str = "pidflow_pid_queue_depth";

/// Initialize metrics descriptions.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init_metrics() {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    metrics::describe_counter!(PACKETS_SENT, Unit::Count, "Packets queued on pids");
    metrics::describe_counter!(
        PACKETS_DROPPED,
        Unit::Count,
        "Packets released by consumers"
    );
    metrics::describe_counter!(BYTES_SENT, Unit::Bytes, "Payload bytes queued on pids");
    metrics::describe_counter!(
        BACKPRESSURE_STALLS,
        Unit::Count,
        "would_block checks that told a producer to hold off"
    );
    metrics::describe_counter!(PROCESS_CALLS, Unit::Count, "Filter process invocations");
    metrics::describe_histogram!(
        PROCESS_TIME_NS,
        Unit::Nanoseconds,
        "Time spent in one process invocation"
    );
    metrics::describe_counter!(
        SERVICE_ERRORS,
        Unit::Count,
        "Transient codec or parser errors"
    );
    metrics::describe_counter!(SETUP_FAILURES, Unit::Count, "Fatal filter setup failures");
    metrics::describe_gauge!(QUEUE_DEPTH, Unit::Count, "Packets queued on a pid");
}

/// Record a packet queued on a pid of `filter`.
#[inline]
pub fn record_packet_sent(filter: &str, pid: &str, bytes: usize) {
    counter!(PACKETS_SENT, "filter" => filter.to_string(), "pid" => pid.to_string()).increment(1);
    counter!(BYTES_SENT, "filter" => filter.to_string(), "pid" => pid.to_string())
        .increment(bytes as u64);
}

/// Record a packet released by a consumer.
#[inline]
pub fn record_packet_dropped(filter: &str, pid: &str) {
    counter!(PACKETS_DROPPED, "filter" => filter.to_string(), "pid" => pid.to_string())
        .increment(1);
}

/// Record a producer told to hold off.
#[inline]
pub fn record_backpressure_stall(filter: &str, pid: &str) {
    counter!(BACKPRESSURE_STALLS, "filter" => filter.to_string(), "pid" => pid.to_string())
        .increment(1);
}

/// Record the queue depth of a pid.
#[inline]
pub fn record_queue_depth(filter: &str, pid: &str, depth: usize) {
    gauge!(QUEUE_DEPTH, "filter" => filter.to_string(), "pid" => pid.to_string())
        .set(depth as f64);
}

/// Record one process invocation and its duration.
#[inline]
pub fn record_process_call(session: &str, filter: &str, duration: Duration) {
    counter!(PROCESS_CALLS, "session" => session.to_string(), "filter" => filter.to_string())
        .increment(1);
    histogram!(PROCESS_TIME_NS, "session" => session.to_string(), "filter" => filter.to_string())
        .record(duration.as_nanos() as f64);
}

/// Record a transient error.
#[inline]
pub fn record_service_error(session: &str, filter: &str) {
    counter!(SERVICE_ERRORS, "session" => session.to_string(), "filter" => filter.to_string())
        .increment(1);
}

/// Record a setup failure.
#[inline]
pub fn record_setup_failure(session: &str, filter: &str) {
    counter!(SETUP_FAILURES, "session" => session.to_string(), "filter" => filter.to_string())
        .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_metrics_idempotent() {
        init_metrics();
        init_metrics();
        assert!(METRICS_INITIALIZED.load(Ordering::SeqCst));
    }

    #[test]
    fn test_record_without_recorder() {
        // No recorder installed: calls are no-ops.
        record_packet_sent("m2psdmx", "PID1", 188);
        record_packet_dropped("m2psdmx", "PID1");
        record_backpressure_stall("m2psdmx", "PID1");
        record_queue_depth("m2psdmx", "PID1", 3);
        record_process_call("session", "m2psdmx", Duration::from_micros(5));
        record_service_error("session", "ffenc");
        record_setup_failure("session", "m2psdmx");
    }
}
