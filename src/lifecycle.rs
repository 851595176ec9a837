//! Ownership of everything a viewer session acquires.
//!
//! Every resource is held in an `Option` and released behind a presence check,
//! so [`ConnectionLifecycle::release`] can run any number of times and on a
//! session that never got past setup.

use crate::config::MediaConstraints;
use crate::errors::SessionError;
use crate::media::MediaCapture;
use crate::peer::{PeerTransport, SideChannel};
use crate::playback::SharedMeter;
use crate::signaling::SignalingLink;
use crate::sinks::{SessionObserver, ViewerSinks};
use crate::types::MediaStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Cancellable periodic statistics fetch
pub struct StatsPoller {
    handle: JoinHandle<()>,
}

impl StatsPoller {
    /// Fetch stats every `interval` and forward each report to `observer`.
    ///
    /// The first fetch happens one interval after start. A slow fetch pushes
    /// the next one back instead of bunching them up. Once `playback` is
    /// started each report also yields a playback sample. The task exits on
    /// its own once `active` goes false.
    pub fn start(
        peer: Arc<dyn PeerTransport>,
        interval: Duration,
        observer: Arc<dyn SessionObserver>,
        playback: SharedMeter,
        active: Arc<AtomicBool>,
    ) -> Self {
        let handle = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if !active.load(Ordering::SeqCst) {
                    break;
                }
                match peer.get_stats().await {
                    Ok(report) => {
                        if !active.load(Ordering::SeqCst) {
                            break;
                        }
                        let sample = playback.record(&report, tokio::time::Instant::now().into_std());
                        observer.on_stats(report);
                        if let Some(sample) = sample {
                            observer.on_playback(&sample);
                        }
                    }
                    Err(e) => log::debug!("Stats poll failed: {}", e),
                }
            }
        });
        Self { handle }
    }

    pub fn cancel(self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for StatsPoller {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Snapshot of which resources a session currently holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResourceSnapshot {
    pub active: bool,
    pub link: bool,
    pub link_open: bool,
    pub peer: bool,
    pub local_stream: bool,
    pub remote_stream: bool,
    pub side_channel: bool,
    pub stats_poller: bool,
    pub local_view_attached: bool,
    pub remote_view_attached: bool,
}

impl ResourceSnapshot {
    /// True once nothing is held any more
    pub fn is_released(&self) -> bool {
        *self == ResourceSnapshot::default()
    }
}

/// Connection lifecycle manager
pub struct ConnectionLifecycle {
    active: Arc<AtomicBool>,
    capture: Arc<dyn MediaCapture>,
    sinks: ViewerSinks,
    link: Option<Arc<dyn SignalingLink>>,
    link_open: bool,
    peer: Option<Arc<dyn PeerTransport>>,
    // captured but not yet fully added to the connection
    pending_local: Option<MediaStream>,
    local_stream: Option<MediaStream>,
    remote_stream: Option<MediaStream>,
    side_channel: Option<Arc<dyn SideChannel>>,
    stats_poller: Option<StatsPoller>,
    playback: SharedMeter,
    local_view_attached: bool,
    remote_view_attached: bool,
}

impl ConnectionLifecycle {
    pub fn new(
        peer: Arc<dyn PeerTransport>,
        link: Arc<dyn SignalingLink>,
        capture: Arc<dyn MediaCapture>,
        sinks: ViewerSinks,
    ) -> Self {
        Self {
            active: Arc::new(AtomicBool::new(true)),
            capture,
            sinks,
            link: Some(link),
            link_open: false,
            peer: Some(peer),
            pending_local: None,
            local_stream: None,
            remote_stream: None,
            side_channel: None,
            stats_poller: None,
            playback: SharedMeter::new(),
            local_view_attached: false,
            remote_view_attached: false,
        }
    }

    pub fn active_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.active)
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn observer(&self) -> &Arc<dyn SessionObserver> {
        &self.sinks.observer
    }

    pub fn peer(&self) -> Result<&Arc<dyn PeerTransport>, SessionError> {
        self.peer.as_ref().ok_or(SessionError::SessionClosed)
    }

    pub fn link(&self) -> Result<&Arc<dyn SignalingLink>, SessionError> {
        self.link.as_ref().ok_or(SessionError::SessionClosed)
    }

    pub fn side_channel(&self) -> Option<&Arc<dyn SideChannel>> {
        self.side_channel.as_ref()
    }

    pub fn local_stream(&self) -> Option<&MediaStream> {
        self.local_stream.as_ref()
    }

    pub fn remote_stream(&self) -> Option<&MediaStream> {
        self.remote_stream.as_ref()
    }

    pub fn has_remote_stream(&self) -> bool {
        self.remote_stream.is_some()
    }

    pub fn playback(&self) -> &SharedMeter {
        &self.playback
    }

    /// Open the signaling link; events flow into the session inbox from here on
    pub async fn open_link(&mut self, events: crate::peer::EventSender) -> Result<(), SessionError> {
        let link = Arc::clone(self.link()?);
        link.open(events).await?;
        self.link_open = true;
        Ok(())
    }

    /// Ask the capture capability for local media.
    ///
    /// Constraints asking for nothing skip capture and yield an empty stream.
    pub async fn acquire_local_media(
        &self,
        constraints: &MediaConstraints,
    ) -> Result<MediaStream, SessionError> {
        if constraints.requests_nothing() {
            log::info!("No local media requested, continuing receive-only");
            return Ok(MediaStream::new("receive-only", Vec::new()));
        }
        let capture = Arc::clone(&self.capture);
        let stream = capture.get_user_media(constraints).await?;
        if !self.is_active() {
            // stopped while the device was opening
            stream.stop_all();
            return Err(SessionError::SessionClosed);
        }
        log::info!("Acquired local media with {} track(s)", stream.tracks.len());
        Ok(stream)
    }

    /// Add every track to the connection, then record the stream and attach the
    /// local view together.
    ///
    /// The stream is held as pending while tracks are added, so a release that
    /// abandons this call part way still stops it.
    pub async fn attach_tracks(&mut self, stream: MediaStream) -> Result<(), SessionError> {
        let peer = match self.peer() {
            Ok(peer) => Arc::clone(peer),
            Err(e) => {
                stream.stop_all();
                return Err(e);
            }
        };
        self.pending_local = Some(stream.clone());
        for (index, track) in stream.tracks.iter().enumerate() {
            if let Err(e) = peer.add_track(track, &stream.id).await {
                self.pending_local = None;
                stream.stop_all();
                return Err(e);
            }
            log::debug!("Added local {:?} track {} ({})", track.kind, index, track.id);
        }
        self.pending_local = None;
        if !self.is_active() {
            stream.stop_all();
            return Err(SessionError::SessionClosed);
        }
        if stream.tracks.is_empty() {
            return Ok(());
        }
        self.sinks.local_view.attach(&stream);
        self.local_view_attached = true;
        self.local_stream = Some(stream);
        Ok(())
    }

    /// Create the side channel. Must run before the offer is created or the
    /// channel is missing from the negotiated description.
    pub async fn open_side_channel(&mut self, label: &str) -> Result<(), SessionError> {
        if self.side_channel.is_some() {
            return Ok(());
        }
        let peer = Arc::clone(self.peer()?);
        let channel = peer.create_data_channel(label).await?;
        if !self.is_active() {
            return Err(SessionError::SessionClosed);
        }
        log::info!("Opened side channel '{}'", channel.label());
        self.side_channel = Some(channel);
        Ok(())
    }

    pub fn start_stats_polling(&mut self, interval: Duration) -> Result<(), SessionError> {
        if self.stats_poller.is_some() {
            return Ok(());
        }
        let peer = Arc::clone(self.peer()?);
        self.stats_poller = Some(StatsPoller::start(
            peer,
            interval,
            Arc::clone(&self.sinks.observer),
            self.playback.clone(),
            self.active_flag(),
        ));
        Ok(())
    }

    /// Attach the first remote stream and start playback metering. Returns
    /// false when one is already attached.
    pub fn attach_remote_stream(&mut self, stream: MediaStream) -> bool {
        if self.remote_stream.is_some() || !self.is_active() {
            return false;
        }
        self.sinks.remote_view.attach(&stream);
        self.remote_view_attached = true;
        self.remote_stream = Some(stream);
        self.playback.start(tokio::time::Instant::now().into_std());
        true
    }

    pub fn snapshot(&self) -> ResourceSnapshot {
        ResourceSnapshot {
            active: self.is_active(),
            link: self.link.is_some(),
            link_open: self.link_open,
            peer: self.peer.is_some(),
            local_stream: self.local_stream.is_some() || self.pending_local.is_some(),
            remote_stream: self.remote_stream.is_some(),
            side_channel: self.side_channel.is_some(),
            stats_poller: self.stats_poller.is_some(),
            local_view_attached: self.local_view_attached,
            remote_view_attached: self.remote_view_attached,
        }
    }

    /// Scoped teardown of every held resource
    pub async fn release(&mut self) {
        let was_active = self.active.swap(false, Ordering::SeqCst);
        if was_active {
            log::info!("Releasing viewer session resources");
        }

        if let Some(link) = self.link.take() {
            if self.link_open {
                link.close().await;
            }
            self.link_open = false;
        }

        if let Some(peer) = self.peer.take() {
            if let Err(e) = peer.close().await {
                log::debug!("Peer connection close reported: {}", e);
            }
        }

        if let Some(stream) = self.pending_local.take() {
            stream.stop_all();
        }

        if let Some(stream) = self.local_stream.take() {
            stream.stop_all();
        }

        if let Some(stream) = self.remote_stream.take() {
            stream.stop_all();
        }

        if let Some(poller) = self.stats_poller.take() {
            poller.cancel();
        }
        self.playback.stop();

        if self.local_view_attached {
            self.sinks.local_view.clear();
            self.local_view_attached = false;
        }

        if self.remote_view_attached {
            self.sinks.remote_view.clear();
            self.remote_view_attached = false;
        }

        self.side_channel = None;
    }
}
