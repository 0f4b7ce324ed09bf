//! Observability: metrics and tracing.
//!
//! | Metric | Type | Description |
//! |--------|------|-------------|
//! | `pidflow_packets_sent_total` | Counter | Packets queued on pids |
//! | `pidflow_packets_dropped_total` | Counter | Packets released by consumers |
//! | `pidflow_bytes_sent_total` | Counter | Payload bytes queued |
//! | `pidflow_backpressure_stalls_total` | Counter | Producers told to hold off |
//! | `pidflow_process_calls_total` | Counter | Filter process invocations |
//! | `pidflow_process_time_ns` | Histogram | Time per process invocation |
//! | `pidflow_service_errors_total` | Counter | Transient codec errors |
//! | `pidflow_setup_failures_total` | Counter | Fatal setup failures |
//! | `pidflow_pid_queue_depth` | Gauge | Packets queued on a pid |
//!
//! The library never installs a recorder or subscriber; the application
//! picks its exporter.

mod metrics;
mod tracing_support;

pub use self::metrics::{
    init_metrics, record_backpressure_stall, record_packet_dropped, record_packet_sent,
    record_process_call, record_queue_depth, record_service_error, record_setup_failure,
};
pub use tracing_support::{TracingConfig, span_filter, span_session, trace_eos, trace_error};
