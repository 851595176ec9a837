//! Playback frame-rate meter
//!
//! Fed with the cumulative decoded/dropped frame counters of the remote
//! view, typically once a second, and turns them into per-interval and
//! running frame rates.

use crate::types::StatsReport;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

/// Seconds of playback after which the two-minute average is captured
pub const TWO_MINUTES_SECS: u64 = 120;

/// Cumulative frame counters as reported by the renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FrameCounters {
    pub decoded: u64,
    pub dropped: u64,
}

impl FrameCounters {
    /// Sum the frame counters of every inbound video entry in a stats report.
    ///
    /// Returns `None` when no entry reports decoded frames.
    pub fn from_report(report: &StatsReport) -> Option<Self> {
        let mut found = false;
        let mut counters = FrameCounters::default();
        for entry in report.entries.values() {
            if entry.get("type").and_then(|t| t.as_str()) != Some("inbound-rtp") {
                continue;
            }
            if let Some(kind) = entry.get("kind").and_then(|k| k.as_str()) {
                if kind != "video" {
                    continue;
                }
            }
            let Some(decoded) = entry.get("framesDecoded").and_then(|v| v.as_u64()) else {
                continue;
            };
            found = true;
            counters.decoded += decoded;
            counters.dropped += entry.get("framesDropped").and_then(|v| v.as_u64()).unwrap_or(0);
        }
        found.then_some(counters)
    }
}

/// One meter reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackSample {
    pub totals: FrameCounters,
    /// Frame rates over the interval since the previous sample
    pub current_decoded_fps: f64,
    pub current_dropped_fps: f64,
    /// Frame rates since the meter started
    pub avg_decoded_fps: f64,
    pub avg_dropped_fps: f64,
    /// Whole seconds since the meter started
    pub communication_secs: u64,
    /// Average decoded rate at the two-minute mark, once reached
    pub two_minute_avg_fps: Option<f64>,
}

impl PlaybackSample {
    pub fn current_total_fps(&self) -> f64 {
        self.current_decoded_fps + self.current_dropped_fps
    }

    pub fn avg_total_fps(&self) -> f64 {
        self.avg_decoded_fps + self.avg_dropped_fps
    }
}

#[derive(Debug, Clone)]
pub struct PlaybackMeter {
    initial: Instant,
    previous: Instant,
    last: FrameCounters,
    two_minute_avg: Option<f64>,
}

impl PlaybackMeter {
    /// Start metering at `started`, normally when the first remote track arrives
    pub fn new(started: Instant) -> Self {
        Self {
            initial: started,
            previous: started,
            last: FrameCounters::default(),
            two_minute_avg: None,
        }
    }

    pub fn sample(&mut self, counters: FrameCounters, now: Instant) -> PlaybackSample {
        let delta = now.saturating_duration_since(self.previous).as_secs_f64();
        let total = now.saturating_duration_since(self.initial);
        let total_secs = total.as_secs_f64();

        // counters can restart when the renderer is swapped
        let decoded_delta = counters.decoded.saturating_sub(self.last.decoded);
        let dropped_delta = counters.dropped.saturating_sub(self.last.dropped);

        let avg_decoded_fps = rate(counters.decoded, total_secs);
        let communication_secs = total.as_secs();
        if self.two_minute_avg.is_none() && communication_secs >= TWO_MINUTES_SECS {
            self.two_minute_avg = Some(avg_decoded_fps);
            log::info!("Two minute average FPS: {:.2}", avg_decoded_fps);
        }

        let sample = PlaybackSample {
            totals: counters,
            current_decoded_fps: rate(decoded_delta, delta),
            current_dropped_fps: rate(dropped_delta, delta),
            avg_decoded_fps,
            avg_dropped_fps: rate(counters.dropped, total_secs),
            communication_secs,
            two_minute_avg_fps: self.two_minute_avg,
        };

        self.previous = now;
        self.last = counters;
        sample
    }

    pub fn two_minute_avg_fps(&self) -> Option<f64> {
        self.two_minute_avg
    }
}

/// Meter slot shared by the session, which starts it on the first remote
/// stream, and the stats poller, which feeds it.
#[derive(Debug, Clone, Default)]
pub struct SharedMeter {
    inner: Arc<Mutex<Option<PlaybackMeter>>>,
}

impl SharedMeter {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<PlaybackMeter>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start metering at `started`. Returns false if already running.
    pub fn start(&self, started: Instant) -> bool {
        let mut meter = self.lock();
        if meter.is_some() {
            return false;
        }
        *meter = Some(PlaybackMeter::new(started));
        true
    }

    pub fn is_running(&self) -> bool {
        self.lock().is_some()
    }

    /// Feed a stats report; `None` until started or when the report has no
    /// frame counters.
    pub fn record(&self, report: &StatsReport, now: Instant) -> Option<PlaybackSample> {
        let counters = FrameCounters::from_report(report)?;
        self.lock().as_mut().map(|meter| meter.sample(counters, now))
    }

    pub fn stop(&self) {
        self.lock().take();
    }
}

fn rate(frames: u64, secs: f64) -> f64 {
    if secs <= 0.0 {
        0.0
    } else {
        frames as f64 / secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn counters(decoded: u64, dropped: u64) -> FrameCounters {
        FrameCounters { decoded, dropped }
    }

    #[test]
    fn test_current_and_average_rates() {
        let start = Instant::now();
        let mut meter = PlaybackMeter::new(start);

        let first = meter.sample(counters(30, 2), start + Duration::from_secs(1));
        assert_eq!(first.current_decoded_fps, 30.0);
        assert_eq!(first.current_dropped_fps, 2.0);
        assert_eq!(first.avg_decoded_fps, 30.0);

        let second = meter.sample(counters(50, 2), start + Duration::from_secs(2));
        assert_eq!(second.current_decoded_fps, 20.0);
        assert_eq!(second.current_dropped_fps, 0.0);
        assert_eq!(second.avg_decoded_fps, 25.0);
        assert_eq!(second.avg_dropped_fps, 1.0);
        assert_eq!(second.current_total_fps(), 20.0);
        assert_eq!(second.avg_total_fps(), 26.0);
        assert_eq!(second.communication_secs, 2);
    }

    #[test]
    fn test_zero_interval_reports_zero() {
        let start = Instant::now();
        let mut meter = PlaybackMeter::new(start);
        let sample = meter.sample(counters(10, 0), start);
        assert_eq!(sample.current_decoded_fps, 0.0);
        assert_eq!(sample.avg_decoded_fps, 0.0);
    }

    #[test]
    fn test_counter_reset_does_not_underflow() {
        let start = Instant::now();
        let mut meter = PlaybackMeter::new(start);
        meter.sample(counters(100, 10), start + Duration::from_secs(1));
        let sample = meter.sample(counters(5, 0), start + Duration::from_secs(2));
        assert_eq!(sample.current_decoded_fps, 0.0);
        assert_eq!(sample.current_dropped_fps, 0.0);
    }

    fn report(entries: Vec<(&str, serde_json::Value)>) -> StatsReport {
        StatsReport::new(entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }

    #[test]
    fn test_counters_from_inbound_video_only() {
        let stats = report(vec![
            (
                "in-video",
                serde_json::json!({ "type": "inbound-rtp", "kind": "video", "framesDecoded": 90, "framesDropped": 3 }),
            ),
            ("in-audio", serde_json::json!({ "type": "inbound-rtp", "kind": "audio", "framesDecoded": 500 })),
            ("out-video", serde_json::json!({ "type": "outbound-rtp", "framesEncoded": 90 })),
        ]);
        assert_eq!(FrameCounters::from_report(&stats), Some(counters(90, 3)));

        let audio_only = report(vec![("in-audio", serde_json::json!({ "type": "inbound-rtp", "kind": "audio" }))]);
        assert_eq!(FrameCounters::from_report(&audio_only), None);
    }

    #[test]
    fn test_shared_meter_samples_only_once_started() {
        let start = Instant::now();
        let meter = SharedMeter::new();
        let stats = report(vec![(
            "in-video",
            serde_json::json!({ "type": "inbound-rtp", "framesDecoded": 30 }),
        )]);

        assert!(meter.record(&stats, start).is_none());
        assert!(meter.start(start));
        assert!(!meter.start(start + Duration::from_secs(5)));

        let sample = meter.record(&stats, start + Duration::from_secs(1)).unwrap();
        assert_eq!(sample.current_decoded_fps, 30.0);

        meter.stop();
        assert!(!meter.is_running());
        assert!(meter.record(&stats, start + Duration::from_secs(2)).is_none());
    }

    #[test]
    fn test_two_minute_average_captured_once() {
        let start = Instant::now();
        let mut meter = PlaybackMeter::new(start);

        let early = meter.sample(counters(3570, 0), start + Duration::from_secs(119));
        assert_eq!(early.two_minute_avg_fps, None);

        let mark = meter.sample(counters(3600, 0), start + Duration::from_secs(120));
        assert_eq!(mark.two_minute_avg_fps, Some(30.0));

        let later = meter.sample(counters(7200, 0), start + Duration::from_secs(180));
        assert_eq!(later.two_minute_avg_fps, Some(30.0));
        assert_eq!(meter.two_minute_avg_fps(), Some(30.0));
    }
}
