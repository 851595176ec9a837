//! Testing utilities for rtc-viewer
//!
//! Scripted collaborators that stand in for the signaling service, the
//! browser-grade peer connection and the camera, enabling offline testing of
//! the negotiation flow.

pub mod fakes;

pub use fakes::{
    synthetic_stream, GatedCall, PeerCall, PeerFailures, PeerGate, RecordingObserver, RecordingSignalingLink,
    RecordingSinks, RecordingView, ScriptedPeer, ScriptedPeerFactory, ScriptedSideChannel, StaticCapture,
    Transmission,
};

use crate::config::ViewerConfig;
use crate::errors::SessionError;
use crate::ice::{build_rtc_configuration, RTCConfiguration};
use crate::lifecycle::ConnectionLifecycle;
use crate::peer::{EventSender, SessionEvent};
use crate::session::Session;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver};

/// A session wired to scripted collaborators, driven by hand.
///
/// Nothing runs in the background: events pile up in `inbox` until
/// [`SessionRig::pump`] feeds them to the session.
pub struct SessionRig {
    pub session: Session,
    pub inbox: UnboundedReceiver<SessionEvent>,
    pub events: EventSender,
    pub link: Arc<RecordingSignalingLink>,
    pub peer: Arc<ScriptedPeer>,
    pub capture: Arc<StaticCapture>,
    pub sinks: RecordingSinks,
}

impl SessionRig {
    pub fn new(config: ViewerConfig) -> Self {
        Self::with(config, StaticCapture::new(), PeerFailures::default())
    }

    pub fn with(config: ViewerConfig, capture: StaticCapture, failures: PeerFailures) -> Self {
        let (tx, inbox) = mpsc::unbounded_channel();
        let events = EventSender::new(tx);
        let rtc_config = build_rtc_configuration(&config, &[]);
        let peer = Arc::new(ScriptedPeer::new(rtc_config, events.clone(), failures));
        let link = Arc::new(RecordingSignalingLink::new());
        let capture = Arc::new(capture);
        let sinks = RecordingSinks::new();
        let session = Session::new(
            &config,
            peer.clone(),
            link.clone(),
            capture.clone(),
            sinks.sinks(),
        );
        Self {
            session,
            inbox,
            events,
            link,
            peer,
            capture,
            sinks,
        }
    }

    /// Open the link without reporting it open yet
    pub async fn open(&mut self) -> Result<(), SessionError> {
        self.session.open_link(self.events.clone()).await
    }

    /// Hand every queued event to the session, in order. Returns how many ran.
    pub async fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.inbox.try_recv() {
            self.session.handle_event(event).await;
            handled += 1;
        }
        handled
    }
}

/// Lifecycle manager over scripted collaborators, for calling handlers directly.
///
/// Events the scripted peer emits go nowhere.
pub fn scripted_lifecycle(
    capture: StaticCapture,
    failures: PeerFailures,
) -> (ConnectionLifecycle, Arc<RecordingSignalingLink>, Arc<ScriptedPeer>, RecordingSinks) {
    let (tx, _inbox) = mpsc::unbounded_channel();
    let peer = Arc::new(ScriptedPeer::new(
        RTCConfiguration::default(),
        EventSender::new(tx),
        failures,
    ));
    let link = Arc::new(RecordingSignalingLink::new());
    let sinks = RecordingSinks::new();
    let lifecycle = ConnectionLifecycle::new(peer.clone(), link.clone(), Arc::new(capture), sinks.sinks());
    (lifecycle, link, peer, sinks)
}
