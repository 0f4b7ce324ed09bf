//! Lifecycle notices published by the session.

use std::fmt;

use crate::pid::PidId;

/// Notice sent over [`Session::notices`](super::Session::notices).
///
/// Each notice is sent once per occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionNotice {
    /// A filter reported a fatal setup error.
    SetupFailure {
        /// Filter name.
        filter: String,
        /// Error message.
        error: String,
    },
    /// A filter failed while processing.
    FilterFailed {
        /// Filter name.
        filter: String,
        /// Error message.
        error: String,
    },
    /// A filter finished.
    FilterEos {
        /// Filter name.
        filter: String,
    },
    /// A producer refused the proposals of its consumer.
    NegotiationFailed {
        /// Pid whose link was torn down.
        pid: PidId,
        /// Consumer name.
        consumer: String,
    },
    /// No filter accepted a pid; its packets are discarded.
    PidUnlinked {
        /// The pid.
        pid: PidId,
        /// Producer name.
        producer: String,
    },
}

impl SessionNotice {
    /// Whether the notice reports an error.
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            SessionNotice::SetupFailure { .. } | SessionNotice::FilterFailed { .. }
        )
    }
}

impl fmt::Display for SessionNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionNotice::SetupFailure { filter, error } => {
                write!(f, "{filter}: setup failure: {error}")
            }
            SessionNotice::FilterFailed { filter, error } => write!(f, "{filter}: failed: {error}"),
            SessionNotice::FilterEos { filter } => write!(f, "{filter}: end of stream"),
            SessionNotice::NegotiationFailed { pid, consumer } => {
                write!(f, "{consumer}: negotiation failed on {pid}")
            }
            SessionNotice::PidUnlinked { pid, producer } => {
                write!(f, "{producer}: no consumer for {pid}")
            }
        }
    }
}

/// Summary of a [`Session::run`](super::Session::run).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionReport {
    /// Ticks performed by this run.
    pub ticks: u64,
    /// Names of filters still active when the run returned.
    pub active: Vec<String>,
    /// Names of finished filters.
    pub finished: Vec<String>,
    /// Names of failed filters.
    pub failed: Vec<String>,
    /// Transient errors since the session started.
    pub service_errors: u64,
    /// Whether the run stopped because nothing progressed.
    pub stalled: bool,
}

impl SessionReport {
    /// Whether every filter finished and none failed.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.active.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notice_display() {
        let notice = SessionNotice::SetupFailure {
            filter: "m2psdmx".into(),
            error: "URL error: /nope.mpg".into(),
        };
        assert!(notice.is_error());
        assert_eq!(notice.to_string(), "m2psdmx: setup failure: URL error: /nope.mpg");

        let notice = SessionNotice::PidUnlinked {
            pid: PidId(4),
            producer: "m2psdmx".into(),
        };
        assert!(!notice.is_error());
        assert_eq!(notice.to_string(), "m2psdmx: no consumer for PID4");
    }
}
