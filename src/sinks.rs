//! Outward-facing sinks a session reports into.

use crate::errors::SessionError;
use crate::media::{DetachedView, MediaView};
use crate::playback::PlaybackSample;
use crate::signaling::NegotiationState;
use crate::timing::ConnectionTiming;
use crate::types::StatsReport;
use std::sync::Arc;

/// Receives everything a session surfaces besides media.
///
/// All methods default to no-ops so sinks only implement what they display.
pub trait SessionObserver: Send + Sync {
    /// Called once per poll interval with the raw report
    fn on_stats(&self, _report: StatsReport) {}

    /// Called once per inbound side-channel message
    fn on_remote_message(&self, _message: String) {}

    fn on_error(&self, _error: &SessionError) {}

    /// Called when the first remote stream is attached
    fn on_remote_stream(&self, _timing: &ConnectionTiming) {}

    fn on_state_change(&self, _state: NegotiationState) {}

    /// Called after each stats poll once the remote stream is playing
    fn on_playback(&self, _sample: &PlaybackSample) {}
}

/// Observer that only logs
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingObserver;

impl SessionObserver for LoggingObserver {
    fn on_stats(&self, report: StatsReport) {
        log::trace!("Stats report with {} entries", report.entries.len());
    }

    fn on_remote_message(&self, message: String) {
        log::info!("Remote message: {}", message);
    }

    fn on_error(&self, error: &SessionError) {
        log::warn!("Session error: {}", error);
    }

    fn on_remote_stream(&self, timing: &ConnectionTiming) {
        log::info!("Remote stream after {:.2}s", timing.connection_secs);
    }

    fn on_playback(&self, sample: &PlaybackSample) {
        log::debug!(
            "Playback {:.1} fps ({:.1} dropped) after {}s",
            sample.current_decoded_fps,
            sample.current_dropped_fps,
            sample.communication_secs
        );
    }
}

/// The sinks a session is started with
#[derive(Clone)]
pub struct ViewerSinks {
    pub local_view: Arc<dyn MediaView>,
    pub remote_view: Arc<dyn MediaView>,
    pub observer: Arc<dyn SessionObserver>,
}

impl Default for ViewerSinks {
    fn default() -> Self {
        Self {
            local_view: Arc::new(DetachedView),
            remote_view: Arc::new(DetachedView),
            observer: Arc::new(LoggingObserver),
        }
    }
}
