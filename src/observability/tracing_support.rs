//! Tracing integration for structured logging and spans.

use tracing::{Level, Span, span};

/// Configuration for tracing behavior.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Whether to create a span around session runs.
    pub session_spans: bool,
    /// Whether to create a span around each filter callback.
    pub filter_spans: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            session_spans: true,
            filter_spans: false, // One span per callback adds up
        }
    }
}

impl TracingConfig {
    /// Enable all spans.
    pub fn all() -> Self {
        Self {
            session_spans: true,
            filter_spans: true,
        }
    }

    /// Disable all spans.
    pub fn none() -> Self {
        Self {
            session_spans: false,
            filter_spans: false,
        }
    }
}

/// Create a span for a session run.
///
/// # Example
///
/// ```rust,ignore
/// let _guard = span_session("transcode").entered();
/// ```
#[inline]
pub fn span_session(name: &str) -> Span {
    span!(Level::INFO, "session", name = %name)
}

/// Create a span for one filter callback.
#[inline]
pub fn span_filter(session: &str, filter: &str) -> Span {
    span!(
        Level::DEBUG,
        "filter",
        session = %session,
        filter = %filter
    )
}

/// Log a filter reaching end of stream.
#[inline]
pub fn trace_eos(session: &str, filter: &str) {
    tracing::info!(
        session = %session,
        filter = %filter,
        "end of stream"
    );
}

/// Log a filter error.
#[inline]
pub fn trace_error(session: &str, filter: &str, error: &dyn std::error::Error) {
    tracing::error!(
        session = %session,
        filter = %filter,
        error = %error,
        "filter error"
    );
}
