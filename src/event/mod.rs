//! Control events exchanged between filters.
//!
//! Events travel along pid links, either against the data flow
//! (upstream, toward sources: play, stop, seek) or with it (downstream).
//! Each filter on the path sees the event in `process_event` and decides
//! whether it stops there ([`EventResult::Cancel`]) or continues
//! ([`EventResult::Propagate`]).

use std::fmt;

/// Direction an event travels in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventDirection {
    /// Against the data flow, toward sources.
    Upstream,
    /// With the data flow, toward sinks.
    Downstream,
}

/// Payload of a play request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayEvent {
    /// Start offset in seconds.
    pub start_range: f64,
    /// Playback speed, 1.0 for normal.
    pub speed: f64,
}

impl PlayEvent {
    /// Play from `start_range` at normal speed.
    pub fn from_start(start_range: f64) -> Self {
        Self {
            start_range,
            speed: 1.0,
        }
    }
}

impl Default for PlayEvent {
    fn default() -> Self {
        Self::from_start(0.0)
    }
}

/// Application defined event.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomEvent {
    /// Event name.
    pub name: String,
    /// Travel direction.
    pub direction: EventDirection,
}

/// Control event.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterEvent {
    /// Start or restart playback.
    Play(PlayEvent),
    /// Stop producing. Queued packets are not flushed.
    Stop,
    /// Change playback speed.
    SetSpeed {
        /// New speed.
        speed: f64,
    },
    /// Reposition the source without restarting playback.
    SourceSeek {
        /// Target position in seconds.
        start_range: f64,
    },
    /// Application defined event.
    Custom(CustomEvent),
}

impl FilterEvent {
    /// Play from `start_range` seconds at normal speed.
    pub fn play(start_range: f64) -> Self {
        FilterEvent::Play(PlayEvent::from_start(start_range))
    }

    /// Direction this event travels in.
    pub fn direction(&self) -> EventDirection {
        match self {
            FilterEvent::Play(_)
            | FilterEvent::Stop
            | FilterEvent::SetSpeed { .. }
            | FilterEvent::SourceSeek { .. } => EventDirection::Upstream,
            FilterEvent::Custom(custom) => custom.direction,
        }
    }

    /// Check if this is an upstream event (flows against data).
    pub fn is_upstream(&self) -> bool {
        self.direction() == EventDirection::Upstream
    }

    /// Event name for logging.
    pub fn name(&self) -> &str {
        match self {
            FilterEvent::Play(_) => "PLAY",
            FilterEvent::Stop => "STOP",
            FilterEvent::SetSpeed { .. } => "SET_SPEED",
            FilterEvent::SourceSeek { .. } => "SOURCE_SEEK",
            FilterEvent::Custom(custom) => &custom.name,
        }
    }
}

impl fmt::Display for FilterEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterEvent::Play(play) => {
                write!(f, "PLAY(start={}, speed={})", play.start_range, play.speed)
            }
            FilterEvent::SetSpeed { speed } => write!(f, "SET_SPEED({speed})"),
            FilterEvent::SourceSeek { start_range } => write!(f, "SOURCE_SEEK({start_range})"),
            other => f.write_str(other.name()),
        }
    }
}

// ============================================================================
// Event Result
// ============================================================================

/// Result of handling an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventResult {
    /// Event was consumed, don't propagate.
    Cancel,
    /// Event continues to the next filter.
    #[default]
    Propagate,
}

impl EventResult {
    /// Check if propagation stops here.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, EventResult::Cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_direction() {
        assert!(FilterEvent::play(0.0).is_upstream());
        assert!(FilterEvent::Stop.is_upstream());
        assert!(FilterEvent::SetSpeed { speed: 2.0 }.is_upstream());

        let custom = FilterEvent::Custom(CustomEvent {
            name: "marker".into(),
            direction: EventDirection::Downstream,
        });
        assert!(!custom.is_upstream());
        assert_eq!(custom.name(), "marker");
    }

    #[test]
    fn test_event_display() {
        assert_eq!(FilterEvent::play(1.5).to_string(), "PLAY(start=1.5, speed=1)");
        assert_eq!(FilterEvent::Stop.to_string(), "STOP");
    }

    #[test]
    fn test_event_result() {
        assert!(EventResult::Cancel.is_cancelled());
        assert!(!EventResult::default().is_cancelled());
    }
}
