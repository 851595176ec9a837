//! Scripted in-memory collaborators
//!
//! Each fake records what the session asked of it and lets a test push the
//! events a real link or transport would produce.

use crate::config::MediaConstraints;
use crate::errors::SessionError;
use crate::ice::RTCConfiguration;
use crate::media::{MediaCapture, MediaView};
use crate::peer::{EventSender, OfferOptions, PeerEvent, PeerFactory, PeerTransport, SideChannel, SignalingEvent};
use crate::playback::PlaybackSample;
use crate::signaling::{NegotiationState, SignalingLink};
use crate::sinks::{SessionObserver, ViewerSinks};
use crate::timing::ConnectionTiming;
use crate::types::{
    ConnectionState, IceCandidate, MediaStream, MediaTrack, SessionDescription, StatsReport, TrackKind,
};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Build a stream with one track per kind
pub fn synthetic_stream(id: &str, kinds: &[TrackKind]) -> MediaStream {
    let tracks = kinds
        .iter()
        .enumerate()
        .map(|(index, kind)| {
            let label = match kind {
                TrackKind::Audio => "synthetic microphone",
                TrackKind::Video => "synthetic camera",
            };
            MediaTrack::new(format!("{}-track-{}", id, index), *kind, label)
        })
        .collect();
    MediaStream::new(id, tracks)
}

/// Something the session sent over the signaling link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transmission {
    Offer(SessionDescription),
    Candidate(IceCandidate),
}

/// Signaling link that records every transmission
#[derive(Default)]
pub struct RecordingSignalingLink {
    events: Mutex<Option<EventSender>>,
    transmissions: Mutex<Vec<Transmission>>,
    opened: AtomicUsize,
    closed: AtomicUsize,
    send_attempts: AtomicUsize,
    failing_sends: Mutex<Vec<usize>>,
    auto_open: bool,
    fail_open: bool,
}

impl RecordingSignalingLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A link that reports `Open` as soon as it is opened
    pub fn auto_open() -> Self {
        Self {
            auto_open: true,
            ..Self::default()
        }
    }

    /// A link whose `open` fails
    pub fn failing_open() -> Self {
        Self {
            fail_open: true,
            ..Self::default()
        }
    }

    /// Deliver an event as if it came from the signaling service.
    ///
    /// Returns false when the link was never opened.
    pub fn emit(&self, event: SignalingEvent) -> bool {
        match lock(&self.events).as_ref() {
            Some(events) => {
                events.signaling(event);
                true
            }
            None => false,
        }
    }

    pub fn transmissions(&self) -> Vec<Transmission> {
        lock(&self.transmissions).clone()
    }

    pub fn offers(&self) -> Vec<SessionDescription> {
        lock(&self.transmissions)
            .iter()
            .filter_map(|t| match t {
                Transmission::Offer(offer) => Some(offer.clone()),
                Transmission::Candidate(_) => None,
            })
            .collect()
    }

    pub fn candidates(&self) -> Vec<IceCandidate> {
        lock(&self.transmissions)
            .iter()
            .filter_map(|t| match t {
                Transmission::Candidate(candidate) => Some(candidate.clone()),
                Transmission::Offer(_) => None,
            })
            .collect()
    }

    pub fn open_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Fail the offer or candidate sends at the given zero-based attempt
    /// numbers. Failed sends are not recorded.
    pub fn fail_sends(&self, attempts: &[usize]) {
        *lock(&self.failing_sends) = attempts.to_vec();
    }

    fn send_fails(&self) -> bool {
        let attempt = self.send_attempts.fetch_add(1, Ordering::SeqCst);
        lock(&self.failing_sends).contains(&attempt)
    }
}

#[async_trait]
impl SignalingLink for RecordingSignalingLink {
    async fn open(&self, events: EventSender) -> Result<(), SessionError> {
        if self.fail_open {
            return Err(SessionError::SignalingLink("connection refused".to_string()));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        if self.auto_open {
            events.signaling(SignalingEvent::Open);
        }
        *lock(&self.events) = Some(events);
        Ok(())
    }

    async fn close(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
        lock(&self.events).take();
    }

    async fn send_sdp_offer(&self, offer: &SessionDescription) -> Result<(), SessionError> {
        if self.send_fails() {
            return Err(SessionError::SignalingLink("socket not writable".to_string()));
        }
        lock(&self.transmissions).push(Transmission::Offer(offer.clone()));
        Ok(())
    }

    async fn send_ice_candidate(&self, candidate: &IceCandidate) -> Result<(), SessionError> {
        if self.send_fails() {
            return Err(SessionError::SignalingLink("socket not writable".to_string()));
        }
        lock(&self.transmissions).push(Transmission::Candidate(candidate.clone()));
        Ok(())
    }
}

/// Capability calls made on a [`ScriptedPeer`], in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerCall {
    AddTrack(TrackKind),
    CreateDataChannel(String),
    CreateOffer(OfferOptions),
    SetLocalDescription,
    SetRemoteDescription,
    AddIceCandidate,
    GetStats,
    Close,
}

/// Which capability calls a [`ScriptedPeer`] should fail
#[derive(Debug, Clone, Copy, Default)]
pub struct PeerFailures {
    pub create_offer: bool,
    pub set_remote_description: bool,
    pub add_ice_candidate: bool,
    pub add_track: bool,
    pub create_data_channel: bool,
    pub get_stats: bool,
}

/// Capability call a [`ScriptedPeer`] can be held at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatedCall {
    AddTrack,
    CreateOffer,
    SetRemoteDescription,
}

/// Holds one kind of capability call until released
#[derive(Clone)]
pub struct PeerGate {
    call: GatedCall,
    started: Arc<Notify>,
    release: Arc<Notify>,
}

impl PeerGate {
    /// Returns the gate plus a notify fired when the call starts and one to
    /// release it.
    pub fn new(call: GatedCall) -> (Self, Arc<Notify>, Arc<Notify>) {
        let started = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let gate = Self {
            call,
            started: Arc::clone(&started),
            release: Arc::clone(&release),
        };
        (gate, started, release)
    }
}

/// Side channel that records sent messages
pub struct ScriptedSideChannel {
    label: String,
    sent: Mutex<Vec<String>>,
    fail_send: bool,
}

impl ScriptedSideChannel {
    pub fn sent(&self) -> Vec<String> {
        lock(&self.sent).clone()
    }
}

#[async_trait]
impl SideChannel for ScriptedSideChannel {
    fn label(&self) -> &str {
        &self.label
    }

    async fn send_text(&self, message: &str) -> Result<(), SessionError> {
        if self.fail_send {
            return Err(SessionError::SideChannelSend("channel not open".to_string()));
        }
        lock(&self.sent).push(message.to_string());
        Ok(())
    }
}

const BASE_SDP: &str = "v=0\r\no=- 0 0 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n";

/// Peer connection driven by the test.
///
/// Candidate generation and remote media are pushed explicitly; once gathering
/// completes the local description embeds every gathered candidate.
pub struct ScriptedPeer {
    config: RTCConfiguration,
    events: EventSender,
    failures: PeerFailures,
    calls: Mutex<Vec<PeerCall>>,
    local: Mutex<Option<SessionDescription>>,
    remote: Mutex<Option<SessionDescription>>,
    gathered: Mutex<Vec<IceCandidate>>,
    gathering_complete: Mutex<bool>,
    channels: Mutex<Vec<Arc<ScriptedSideChannel>>>,
    gate: Option<PeerGate>,
    stats_stall: Option<Duration>,
}

impl ScriptedPeer {
    pub fn new(config: RTCConfiguration, events: EventSender, failures: PeerFailures) -> Self {
        Self {
            config,
            events,
            failures,
            calls: Mutex::new(Vec::new()),
            local: Mutex::new(None),
            remote: Mutex::new(None),
            gathered: Mutex::new(Vec::new()),
            gathering_complete: Mutex::new(false),
            channels: Mutex::new(Vec::new()),
            gate: None,
            stats_stall: None,
        }
    }

    /// Hold the gated call until the gate is released
    pub fn with_gate(mut self, gate: PeerGate) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Make the first stats fetch take `stall`
    pub fn with_stats_stall(mut self, stall: Duration) -> Self {
        self.stats_stall = Some(stall);
        self
    }

    pub fn config(&self) -> &RTCConfiguration {
        &self.config
    }

    pub fn calls(&self) -> Vec<PeerCall> {
        lock(&self.calls).clone()
    }

    pub fn count(&self, call: &PeerCall) -> usize {
        lock(&self.calls).iter().filter(|c| *c == call).count()
    }

    pub fn remote_description(&self) -> Option<SessionDescription> {
        lock(&self.remote).clone()
    }

    pub fn side_channel(&self) -> Option<Arc<ScriptedSideChannel>> {
        lock(&self.channels).first().cloned()
    }

    pub fn is_closed(&self) -> bool {
        self.count(&PeerCall::Close) > 0
    }

    /// Generate a local candidate
    pub fn gather(&self, candidate: &str) -> IceCandidate {
        let candidate = IceCandidate::new(candidate);
        lock(&self.gathered).push(candidate.clone());
        self.events.peer(PeerEvent::IceCandidate(Some(candidate.clone())));
        candidate
    }

    /// Signal the end of candidate gathering
    pub fn complete_gathering(&self) {
        *lock(&self.gathering_complete) = true;
        self.events.peer(PeerEvent::IceCandidate(None));
    }

    pub fn emit_track(&self, stream: MediaStream) {
        self.events.peer(PeerEvent::Track(vec![stream]));
    }

    pub fn emit_state(&self, state: ConnectionState) {
        self.events.peer(PeerEvent::ConnectionStateChanged(state));
    }

    pub fn emit_message(&self, message: &str) {
        self.events.peer(PeerEvent::DataChannelMessage(message.to_string()));
    }

    fn record(&self, call: PeerCall) {
        lock(&self.calls).push(call);
    }

    async fn hold(&self, call: GatedCall) {
        if let Some(gate) = &self.gate {
            if gate.call == call {
                gate.started.notify_one();
                gate.release.notified().await;
            }
        }
    }
}

#[async_trait]
impl PeerTransport for ScriptedPeer {
    async fn create_offer(&self, options: OfferOptions) -> Result<SessionDescription, SessionError> {
        self.record(PeerCall::CreateOffer(options));
        self.hold(GatedCall::CreateOffer).await;
        if self.failures.create_offer {
            return Err(SessionError::transport("create offer", "scripted failure"));
        }
        let mut sdp = BASE_SDP.to_string();
        if options.receive_audio {
            sdp.push_str("m=audio 9 UDP/TLS/RTP/SAVPF 111\r\n");
        }
        if options.receive_video {
            sdp.push_str("m=video 9 UDP/TLS/RTP/SAVPF 96\r\n");
        }
        if !lock(&self.channels).is_empty() {
            sdp.push_str("m=application 9 UDP/DTLS/SCTP webrtc-datachannel\r\n");
        }
        Ok(SessionDescription::offer(sdp))
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<(), SessionError> {
        self.record(PeerCall::SetLocalDescription);
        *lock(&self.local) = Some(description);
        Ok(())
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        let mut description = lock(&self.local).clone()?;
        if *lock(&self.gathering_complete) {
            for candidate in lock(&self.gathered).iter() {
                description.sdp.push_str(&format!("a={}\r\n", candidate.candidate));
            }
        }
        Some(description)
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<(), SessionError> {
        self.record(PeerCall::SetRemoteDescription);
        self.hold(GatedCall::SetRemoteDescription).await;
        if self.failures.set_remote_description {
            return Err(SessionError::transport("set remote description", "scripted failure"));
        }
        *lock(&self.remote) = Some(description);
        Ok(())
    }

    async fn add_ice_candidate(&self, _candidate: IceCandidate) -> Result<(), SessionError> {
        self.record(PeerCall::AddIceCandidate);
        if self.failures.add_ice_candidate {
            return Err(SessionError::transport("add ice candidate", "scripted failure"));
        }
        Ok(())
    }

    async fn add_track(&self, track: &MediaTrack, _stream_id: &str) -> Result<(), SessionError> {
        self.record(PeerCall::AddTrack(track.kind));
        self.hold(GatedCall::AddTrack).await;
        if self.failures.add_track {
            return Err(SessionError::transport("add track", "scripted failure"));
        }
        Ok(())
    }

    async fn create_data_channel(&self, label: &str) -> Result<Arc<dyn SideChannel>, SessionError> {
        self.record(PeerCall::CreateDataChannel(label.to_string()));
        if self.failures.create_data_channel {
            return Err(SessionError::transport("create data channel", "scripted failure"));
        }
        let channel = Arc::new(ScriptedSideChannel {
            label: label.to_string(),
            sent: Mutex::new(Vec::new()),
            fail_send: false,
        });
        lock(&self.channels).push(Arc::clone(&channel));
        Ok(channel)
    }

    async fn get_stats(&self) -> Result<StatsReport, SessionError> {
        self.record(PeerCall::GetStats);
        let polled = self.count(&PeerCall::GetStats) as u64;
        if let (1, Some(stall)) = (polled, self.stats_stall) {
            tokio::time::sleep(stall).await;
        }
        if self.failures.get_stats {
            return Err(SessionError::transport("get stats", "scripted failure"));
        }
        // a steady 30 fps renderer
        let mut entries = BTreeMap::new();
        entries.insert(
            "inbound-rtp-video".to_string(),
            serde_json::json!({
                "type": "inbound-rtp",
                "kind": "video",
                "framesDecoded": 30 * polled,
                "framesDropped": 0,
            }),
        );
        Ok(StatsReport::new(entries))
    }

    async fn close(&self) -> Result<(), SessionError> {
        self.record(PeerCall::Close);
        Ok(())
    }
}

/// Factory handing out [`ScriptedPeer`]s and keeping hold of them for inspection
#[derive(Default)]
pub struct ScriptedPeerFactory {
    failures: PeerFailures,
    gate: Option<PeerGate>,
    fail_create: bool,
    peers: Mutex<Vec<Arc<ScriptedPeer>>>,
}

impl ScriptedPeerFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failures(failures: PeerFailures) -> Self {
        Self {
            failures,
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_create: true,
            ..Self::default()
        }
    }

    /// Peers hold `call` until released; see [`PeerGate::new`]
    pub fn gated(call: GatedCall) -> (Self, Arc<Notify>, Arc<Notify>) {
        let (gate, started, release) = PeerGate::new(call);
        let factory = Self {
            gate: Some(gate),
            ..Self::default()
        };
        (factory, started, release)
    }

    pub fn last_peer(&self) -> Option<Arc<ScriptedPeer>> {
        lock(&self.peers).last().cloned()
    }

    pub fn created(&self) -> usize {
        lock(&self.peers).len()
    }
}

#[async_trait]
impl PeerFactory for ScriptedPeerFactory {
    async fn create(
        &self,
        config: &RTCConfiguration,
        events: EventSender,
    ) -> Result<Arc<dyn PeerTransport>, SessionError> {
        if self.fail_create {
            return Err(SessionError::transport("create peer connection", "scripted failure"));
        }
        let mut peer = ScriptedPeer::new(config.clone(), events, self.failures);
        if let Some(gate) = &self.gate {
            peer = peer.with_gate(gate.clone());
        }
        let peer = Arc::new(peer);
        lock(&self.peers).push(Arc::clone(&peer));
        Ok(peer)
    }
}

enum CaptureBehavior {
    Succeed,
    Fail(String),
    Gated { started: Arc<Notify>, release: Arc<Notify> },
}

/// Capture capability returning synthetic streams
pub struct StaticCapture {
    behavior: CaptureBehavior,
    calls: AtomicUsize,
    streams: Mutex<Vec<MediaStream>>,
}

impl StaticCapture {
    pub fn new() -> Self {
        Self::with_behavior(CaptureBehavior::Succeed)
    }

    /// Every request fails with `DeviceUnavailable`
    pub fn failing(reason: &str) -> Self {
        Self::with_behavior(CaptureBehavior::Fail(reason.to_string()))
    }

    /// Capture blocks until released.
    ///
    /// Returns the capture plus a notify fired when capture starts and one to
    /// release it.
    pub fn gated() -> (Self, Arc<Notify>, Arc<Notify>) {
        let started = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let capture = Self::with_behavior(CaptureBehavior::Gated {
            started: Arc::clone(&started),
            release: Arc::clone(&release),
        });
        (capture, started, release)
    }

    fn with_behavior(behavior: CaptureBehavior) -> Self {
        Self {
            behavior,
            calls: AtomicUsize::new(0),
            streams: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every stream handed out; clones share track state with the session's copy
    pub fn streams(&self) -> Vec<MediaStream> {
        lock(&self.streams).clone()
    }
}

impl Default for StaticCapture {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaCapture for StaticCapture {
    async fn get_user_media(&self, constraints: &MediaConstraints) -> Result<MediaStream, SessionError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            CaptureBehavior::Succeed => {}
            CaptureBehavior::Fail(reason) => return Err(SessionError::DeviceUnavailable(reason.clone())),
            CaptureBehavior::Gated { started, release } => {
                started.notify_one();
                release.notified().await;
            }
        }
        let kinds: Vec<TrackKind> = [TrackKind::Audio, TrackKind::Video]
            .into_iter()
            .filter(|kind| constraints.requests(*kind))
            .collect();
        let stream = synthetic_stream(&format!("local-{}", call), &kinds);
        lock(&self.streams).push(stream.clone());
        Ok(stream)
    }
}

/// View sink recording attach and clear calls
#[derive(Default)]
pub struct RecordingView {
    current: Mutex<Option<String>>,
    attached: AtomicUsize,
    cleared: AtomicUsize,
}

impl RecordingView {
    /// Id of the stream currently shown
    pub fn current(&self) -> Option<String> {
        lock(&self.current).clone()
    }

    pub fn attach_count(&self) -> usize {
        self.attached.load(Ordering::SeqCst)
    }

    pub fn clear_count(&self) -> usize {
        self.cleared.load(Ordering::SeqCst)
    }
}

impl MediaView for RecordingView {
    fn attach(&self, stream: &MediaStream) {
        self.attached.fetch_add(1, Ordering::SeqCst);
        *lock(&self.current) = Some(stream.id.clone());
    }

    fn clear(&self) {
        self.cleared.fetch_add(1, Ordering::SeqCst);
        lock(&self.current).take();
    }
}

/// Observer recording everything a session reports
#[derive(Default)]
pub struct RecordingObserver {
    stats: Mutex<Vec<StatsReport>>,
    messages: Mutex<Vec<String>>,
    errors: Mutex<Vec<SessionError>>,
    timings: Mutex<Vec<ConnectionTiming>>,
    states: Mutex<Vec<NegotiationState>>,
    playback: Mutex<Vec<PlaybackSample>>,
}

impl RecordingObserver {
    pub fn stats_count(&self) -> usize {
        lock(&self.stats).len()
    }

    pub fn messages(&self) -> Vec<String> {
        lock(&self.messages).clone()
    }

    pub fn errors(&self) -> Vec<SessionError> {
        lock(&self.errors).clone()
    }

    pub fn timings(&self) -> Vec<ConnectionTiming> {
        lock(&self.timings).clone()
    }

    pub fn states(&self) -> Vec<NegotiationState> {
        lock(&self.states).clone()
    }

    pub fn playback_samples(&self) -> Vec<PlaybackSample> {
        lock(&self.playback).clone()
    }
}

impl SessionObserver for RecordingObserver {
    fn on_stats(&self, report: StatsReport) {
        lock(&self.stats).push(report);
    }

    fn on_remote_message(&self, message: String) {
        lock(&self.messages).push(message);
    }

    fn on_error(&self, error: &SessionError) {
        lock(&self.errors).push(error.clone());
    }

    fn on_remote_stream(&self, timing: &ConnectionTiming) {
        lock(&self.timings).push(timing.clone());
    }

    fn on_state_change(&self, state: NegotiationState) {
        lock(&self.states).push(state);
    }

    fn on_playback(&self, sample: &PlaybackSample) {
        lock(&self.playback).push(sample.clone());
    }
}

/// Recording sinks, kept alongside the [`ViewerSinks`] built from them
#[derive(Clone, Default)]
pub struct RecordingSinks {
    pub local_view: Arc<RecordingView>,
    pub remote_view: Arc<RecordingView>,
    pub observer: Arc<RecordingObserver>,
}

impl RecordingSinks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sinks(&self) -> ViewerSinks {
        ViewerSinks {
            local_view: self.local_view.clone(),
            remote_view: self.remote_view.clone(),
            observer: self.observer.clone(),
        }
    }
}
