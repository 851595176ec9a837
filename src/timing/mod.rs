//! Session timing
//!
//! Monotonic clock started when a viewer session starts, plus the connection
//! timing surfaced once the first remote stream arrives.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// Monotonic session clock
///
/// Elapsed times derive from a single start instant; the wall-clock start is
/// kept alongside for reporting.
#[derive(Debug, Clone)]
pub struct SessionClock {
    start: Arc<Instant>,
    started_at: DateTime<Utc>,
}

impl SessionClock {
    pub fn new() -> Self {
        Self {
            start: Arc::new(Instant::now()),
            started_at: Utc::now(),
        }
    }

    /// Seconds elapsed since the session started
    #[inline]
    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    /// Seconds between the session start and `instant`
    ///
    /// Instants before the start clamp to zero.
    #[inline]
    pub fn secs_at(&self, instant: Instant) -> f64 {
        instant.saturating_duration_since(*self.start).as_secs_f64()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Timing for a remote stream that surfaced at `instant`
    pub fn connection_timing(&self, instant: Instant) -> ConnectionTiming {
        ConnectionTiming {
            started_at: self.started_at,
            first_remote_track_at: Utc::now(),
            connection_secs: round_centis(self.secs_at(instant)),
        }
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new()
    }
}

/// How long it took from `start()` to the first remote stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionTiming {
    pub started_at: DateTime<Utc>,
    pub first_remote_track_at: DateTime<Utc>,
    /// Seconds, rounded to two decimals
    pub connection_secs: f64,
}

pub(crate) fn round_centis(secs: f64) -> f64 {
    (secs * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_secs_at_clamps_before_start() {
        let before = Instant::now();
        let clock = SessionClock::new();
        assert_eq!(clock.secs_at(before), 0.0);
    }

    #[test]
    fn test_connection_timing_rounds() {
        let clock = SessionClock::new();
        let later = clock.start.as_ref().to_owned() + Duration::from_millis(1234);
        let timing = clock.connection_timing(later);
        assert_eq!(timing.connection_secs, 1.23);
        assert_eq!(timing.started_at, clock.started_at());
    }

    #[test]
    fn test_round_centis() {
        assert_eq!(round_centis(2.005_1), 2.01);
        assert_eq!(round_centis(0.0), 0.0);
    }
}
