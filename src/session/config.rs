//! Session configuration.

use crate::channel::WaterMarks;
use crate::observability::TracingConfig;

/// Configuration for a [`Session`](super::Session).
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Session name, used in logs and metric labels.
    pub name: String,

    /// Water marks of every pid created in the session.
    pub pid_buffer: WaterMarks,

    /// Consecutive ticks without progress after which `run` returns.
    pub idle_tick_limit: u32,

    /// Hard cap on the number of ticks `run` performs.
    pub max_ticks: Option<u64>,

    /// Maximum link/configure rounds after one callback before the graph
    /// is considered unsettled.
    pub max_configure_rounds: u32,

    /// Span configuration.
    pub tracing: TracingConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            name: "session".to_string(),
            pid_buffer: WaterMarks::default(), // 8 / 2
            idle_tick_limit: 4,
            max_ticks: None,
            max_configure_rounds: 16,
            tracing: TracingConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Shallow queues: a producer is held off after two packets.
    pub fn low_latency() -> Self {
        Self {
            pid_buffer: WaterMarks::new(2, 1),
            ..Self::default()
        }
    }

    /// Deep queues for batch transcoding.
    pub fn high_throughput() -> Self {
        Self {
            pid_buffer: WaterMarks::from_capacity(64),
            idle_tick_limit: 8,
            ..Self::default()
        }
    }

    /// Set the session name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the pid water marks.
    pub fn with_pid_buffer(mut self, marks: WaterMarks) -> Self {
        self.pid_buffer = marks;
        self
    }

    /// Set the idle tick limit (at least 1).
    pub fn with_idle_tick_limit(mut self, ticks: u32) -> Self {
        self.idle_tick_limit = ticks.max(1);
        self
    }

    /// Cap the number of ticks of `run`.
    pub fn with_max_ticks(mut self, ticks: u64) -> Self {
        self.max_ticks = Some(ticks);
        self
    }

    /// Set the span configuration.
    pub fn with_tracing(mut self, tracing: TracingConfig) -> Self {
        self.tracing = tracing;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SessionConfig::default();
        assert_eq!(config.pid_buffer, WaterMarks::new(8, 2));
        assert_eq!(config.idle_tick_limit, 4);
        assert!(config.max_ticks.is_none());
    }

    #[test]
    fn test_presets() {
        assert_eq!(SessionConfig::low_latency().pid_buffer.high, 2);
        let batch = SessionConfig::high_throughput();
        assert_eq!(batch.pid_buffer, WaterMarks::new(51, 12));
    }

    #[test]
    fn test_builders() {
        let config = SessionConfig::default()
            .with_name("transcode")
            .with_idle_tick_limit(0)
            .with_max_ticks(100)
            .with_tracing(TracingConfig::none());
        assert_eq!(config.name, "transcode");
        assert_eq!(config.idle_tick_limit, 1);
        assert_eq!(config.max_ticks, Some(100));
        assert!(!config.tracing.session_spans);
    }
}
