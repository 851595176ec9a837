use crate::errors::SessionError;
use crate::ice::{BundlePolicy, IceServer, IceTransportPolicy, RTCConfiguration};
use crate::peer::{EventSender, OfferOptions, PeerEvent, PeerFactory, PeerTransport, SideChannel};
use crate::types::{
    ConnectionState, IceCandidate, MediaStream, MediaTrack, SdpType, SessionDescription, StatsReport, TrackKind,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::api::APIBuilder;
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::data_channel_state::RTCDataChannelState;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use webrtc::peer_connection::policy::ice_transport_policy::RTCIceTransportPolicy;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::{RTCRtpTransceiver, RTCRtpTransceiverInit};
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

impl From<&IceServer> for RTCIceServer {
    fn from(server: &IceServer) -> Self {
        RTCIceServer {
            urls: server.urls.clone(),
            username: server.username.clone().unwrap_or_default(),
            credential: server.credential.clone().unwrap_or_default(),
            ..Default::default()
        }
    }
}

fn to_rtc_configuration(config: &RTCConfiguration) -> webrtc::peer_connection::configuration::RTCConfiguration {
    webrtc::peer_connection::configuration::RTCConfiguration {
        ice_servers: config.ice_servers.iter().map(RTCIceServer::from).collect(),
        ice_transport_policy: match config.ice_transport_policy {
            IceTransportPolicy::All => RTCIceTransportPolicy::All,
            IceTransportPolicy::Relay => RTCIceTransportPolicy::Relay,
        },
        bundle_policy: match config.bundle_policy {
            BundlePolicy::Balanced => RTCBundlePolicy::Balanced,
            BundlePolicy::MaxCompat => RTCBundlePolicy::MaxCompat,
            BundlePolicy::MaxBundle => RTCBundlePolicy::MaxBundle,
        },
        ..Default::default()
    }
}

impl From<RTCPeerConnectionState> for ConnectionState {
    fn from(state: RTCPeerConnectionState) -> Self {
        match state {
            RTCPeerConnectionState::New | RTCPeerConnectionState::Unspecified => ConnectionState::New,
            RTCPeerConnectionState::Connecting => ConnectionState::Connecting,
            RTCPeerConnectionState::Connected => ConnectionState::Connected,
            RTCPeerConnectionState::Disconnected => ConnectionState::Disconnected,
            RTCPeerConnectionState::Failed => ConnectionState::Failed,
            RTCPeerConnectionState::Closed => ConnectionState::Closed,
        }
    }
}

impl From<RTCSdpType> for SdpType {
    fn from(sdp_type: RTCSdpType) -> Self {
        match sdp_type {
            RTCSdpType::Offer | RTCSdpType::Unspecified => SdpType::Offer,
            RTCSdpType::Answer => SdpType::Answer,
            RTCSdpType::Pranswer => SdpType::Pranswer,
            RTCSdpType::Rollback => SdpType::Rollback,
        }
    }
}

impl TryFrom<SessionDescription> for RTCSessionDescription {
    type Error = SessionError;

    fn try_from(desc: SessionDescription) -> Result<Self, Self::Error> {
        match desc.sdp_type {
            SdpType::Offer => RTCSessionDescription::offer(desc.sdp)
                .map_err(|e| SessionError::transport("Invalid SDP offer", e)),
            SdpType::Answer => RTCSessionDescription::answer(desc.sdp)
                .map_err(|e| SessionError::transport("Invalid SDP answer", e)),
            SdpType::Pranswer => RTCSessionDescription::pranswer(desc.sdp)
                .map_err(|e| SessionError::transport("Invalid SDP pranswer", e)),
            SdpType::Rollback => Err(SessionError::Transport(
                "Rollback SDP type not supported".to_string(),
            )),
        }
    }
}

impl From<RTCSessionDescription> for SessionDescription {
    fn from(desc: RTCSessionDescription) -> Self {
        SessionDescription {
            sdp_type: desc.sdp_type.into(),
            sdp: desc.sdp,
        }
    }
}

impl From<RTCIceCandidateInit> for IceCandidate {
    fn from(init: RTCIceCandidateInit) -> Self {
        IceCandidate {
            candidate: init.candidate,
            sdp_mid: init.sdp_mid,
            sdp_m_line_index: init.sdp_mline_index,
            username_fragment: init.username_fragment,
        }
    }
}

impl From<IceCandidate> for RTCIceCandidateInit {
    fn from(candidate: IceCandidate) -> Self {
        RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_m_line_index,
            username_fragment: candidate.username_fragment,
        }
    }
}

fn track_kind(codec: RTPCodecType) -> Option<TrackKind> {
    match codec {
        RTPCodecType::Audio => Some(TrackKind::Audio),
        RTPCodecType::Video => Some(TrackKind::Video),
        RTPCodecType::Unspecified => None,
    }
}

fn codec_type(kind: TrackKind) -> RTPCodecType {
    match kind {
        TrackKind::Audio => RTPCodecType::Audio,
        TrackKind::Video => RTPCodecType::Video,
    }
}

fn codec_capability(kind: TrackKind) -> RTCRtpCodecCapability {
    match kind {
        TrackKind::Audio => RTCRtpCodecCapability {
            mime_type: MIME_TYPE_OPUS.to_owned(),
            clock_rate: 48000,
            channels: 2,
            ..Default::default()
        },
        TrackKind::Video => RTCRtpCodecCapability {
            mime_type: MIME_TYPE_VP8.to_owned(),
            clock_rate: 90000,
            ..Default::default()
        },
    }
}

/// Route inbound side-channel text into the session inbox
fn forward_messages(channel: &Arc<RTCDataChannel>, events: EventSender) {
    let label = channel.label().to_string();
    channel.on_message(Box::new(move |msg: DataChannelMessage| {
        let text = String::from_utf8_lossy(&msg.data).into_owned();
        log::debug!("Message on data channel '{}' ({} bytes)", label, msg.data.len());
        events.peer(PeerEvent::DataChannelMessage(text));
        Box::pin(async {})
    }));
}

/// Creates webrtc-rs peer connections with the default codecs and interceptors
#[derive(Debug, Default, Clone, Copy)]
pub struct WebRtcPeerFactory;

impl WebRtcPeerFactory {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PeerFactory for WebRtcPeerFactory {
    async fn create(
        &self,
        config: &RTCConfiguration,
        events: EventSender,
    ) -> Result<Arc<dyn PeerTransport>, SessionError> {
        let peer = WebRtcPeer::new(config, events).await?;
        Ok(Arc::new(peer))
    }
}

/// Peer connection backed by webrtc-rs
pub struct WebRtcPeer {
    id: String,
    peer_connection: Arc<RTCPeerConnection>,
    events: EventSender,
    local_tracks: RwLock<HashMap<String, Arc<TrackLocalStaticSample>>>,
    local_kinds: RwLock<Vec<TrackKind>>,
    receivers_added: AtomicBool,
}

impl WebRtcPeer {
    pub async fn new(config: &RTCConfiguration, events: EventSender) -> Result<Self, SessionError> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| SessionError::transport("Failed to register codecs", e))?;
        let registry = register_default_interceptors(Registry::new(), &mut media_engine)
            .map_err(|e| SessionError::transport("Failed to register interceptors", e))?;
        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let peer_connection = Arc::new(
            api.new_peer_connection(to_rtc_configuration(config))
                .await
                .map_err(|e| SessionError::transport("Failed to create peer connection", e))?,
        );
        let id = uuid::Uuid::new_v4().to_string();

        let candidate_events = events.clone();
        let peer_id = id.clone();
        peer_connection.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            match candidate {
                Some(candidate) => match candidate.to_json() {
                    Ok(init) => {
                        log::debug!("ICE candidate gathered for peer {}: {}", peer_id, init.candidate);
                        candidate_events.peer(PeerEvent::IceCandidate(Some(init.into())));
                    }
                    Err(e) => log::warn!("Unserializable ICE candidate for peer {}: {}", peer_id, e),
                },
                None => candidate_events.peer(PeerEvent::IceCandidate(None)),
            }
            Box::pin(async {})
        }));

        let state_events = events.clone();
        peer_connection.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            state_events.peer(PeerEvent::ConnectionStateChanged(state.into()));
            Box::pin(async {})
        }));

        let track_events = events.clone();
        peer_connection.on_track(Box::new(
            move |track: Arc<TrackRemote>, _receiver: Arc<RTCRtpReceiver>, _transceiver: Arc<RTCRtpTransceiver>| {
                match track_kind(track.kind()) {
                    Some(kind) => {
                        let remote = MediaTrack::new(track.id(), kind, format!("remote {:?}", kind));
                        let stream = MediaStream::new(track.stream_id(), vec![remote]);
                        track_events.peer(PeerEvent::Track(vec![stream]));
                    }
                    None => log::debug!("Ignoring remote track of unspecified kind"),
                }
                Box::pin(async {})
            },
        ));

        // channels the master opens towards us
        let channel_events = events.clone();
        peer_connection.on_data_channel(Box::new(move |channel: Arc<RTCDataChannel>| {
            log::info!("Remote opened data channel '{}'", channel.label());
            forward_messages(&channel, channel_events.clone());
            Box::pin(async {})
        }));

        Ok(Self {
            id,
            peer_connection,
            events,
            local_tracks: RwLock::new(HashMap::new()),
            local_kinds: RwLock::new(Vec::new()),
            receivers_added: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.peer_connection.connection_state().into()
    }

    /// Local track to write captured samples into
    pub async fn local_track(&self, track_id: &str) -> Option<Arc<TrackLocalStaticSample>> {
        self.local_tracks.read().await.get(track_id).cloned()
    }

    /// Receive-only transceivers for requested kinds we send nothing of
    async fn add_receivers(&self, options: OfferOptions) -> Result<(), SessionError> {
        if self.receivers_added.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let sending = self.local_kinds.read().await.clone();
        let wanted = [
            (TrackKind::Audio, options.receive_audio),
            (TrackKind::Video, options.receive_video),
        ];
        for (kind, requested) in wanted {
            if !requested || sending.contains(&kind) {
                continue;
            }
            self.peer_connection
                .add_transceiver_from_kind(
                    codec_type(kind),
                    Some(RTCRtpTransceiverInit {
                        direction: RTCRtpTransceiverDirection::Recvonly,
                        send_encodings: vec![],
                    }),
                )
                .await
                .map_err(|e| SessionError::transport("Failed to add transceiver", e))?;
            log::debug!("Added receive-only {:?} transceiver for peer {}", kind, self.id);
        }
        Ok(())
    }
}

#[async_trait]
impl PeerTransport for WebRtcPeer {
    async fn create_offer(&self, options: OfferOptions) -> Result<SessionDescription, SessionError> {
        log::info!("Creating SDP offer for peer {}", self.id);
        self.add_receivers(options).await?;
        let offer = self
            .peer_connection
            .create_offer(None)
            .await
            .map_err(|e| SessionError::transport("Failed to create offer", e))?;
        Ok(offer.into())
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<(), SessionError> {
        let rtc_desc = RTCSessionDescription::try_from(description)?;
        self.peer_connection
            .set_local_description(rtc_desc)
            .await
            .map_err(|e| SessionError::transport("Failed to set local description", e))
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        self.peer_connection.local_description().await.map(Into::into)
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<(), SessionError> {
        log::info!("Setting remote description for peer {}", self.id);
        let rtc_desc = RTCSessionDescription::try_from(description)?;
        self.peer_connection
            .set_remote_description(rtc_desc)
            .await
            .map_err(|e| SessionError::transport("Failed to set remote description", e))
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), SessionError> {
        log::debug!("Adding ICE candidate for peer {}: {}", self.id, candidate.candidate);
        self.peer_connection
            .add_ice_candidate(candidate.into())
            .await
            .map_err(|e| SessionError::transport("Failed to add ICE candidate", e))
    }

    async fn add_track(&self, track: &MediaTrack, stream_id: &str) -> Result<(), SessionError> {
        let local = Arc::new(TrackLocalStaticSample::new(
            codec_capability(track.kind),
            track.id.clone(),
            stream_id.to_string(),
        ));
        self.peer_connection
            .add_track(Arc::clone(&local) as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(|e| SessionError::transport("Failed to add track", e))?;
        self.local_tracks.write().await.insert(track.id.clone(), local);
        self.local_kinds.write().await.push(track.kind);
        Ok(())
    }

    async fn create_data_channel(&self, label: &str) -> Result<Arc<dyn SideChannel>, SessionError> {
        log::info!("Creating data channel '{}' for peer {}", label, self.id);
        let config = RTCDataChannelInit {
            ordered: Some(true),
            ..Default::default()
        };
        let channel = self
            .peer_connection
            .create_data_channel(label, Some(config))
            .await
            .map_err(|e| SessionError::transport("Failed to create data channel", e))?;
        forward_messages(&channel, self.events.clone());
        Ok(Arc::new(WebRtcSideChannel {
            label: label.to_string(),
            channel,
        }))
    }

    async fn get_stats(&self) -> Result<StatsReport, SessionError> {
        let report = self.peer_connection.get_stats().await;
        let mut entries = BTreeMap::new();
        for (id, entry) in report.reports {
            let value = serde_json::to_value(&entry)
                .map_err(|e| SessionError::transport("Failed to encode stats", e))?;
            entries.insert(id, value);
        }
        Ok(StatsReport::new(entries))
    }

    async fn close(&self) -> Result<(), SessionError> {
        log::info!("Closing peer connection {}", self.id);
        self.peer_connection
            .close()
            .await
            .map_err(|e| SessionError::transport("Failed to close peer connection", e))
    }
}

/// Data channel used as the session's side channel
pub struct WebRtcSideChannel {
    label: String,
    channel: Arc<RTCDataChannel>,
}

#[async_trait]
impl SideChannel for WebRtcSideChannel {
    fn label(&self) -> &str {
        &self.label
    }

    async fn send_text(&self, message: &str) -> Result<(), SessionError> {
        if self.channel.ready_state() != RTCDataChannelState::Open {
            return Err(SessionError::SideChannelSend(format!(
                "Data channel '{}' is not open",
                self.label
            )));
        }
        log::debug!("Sending {} bytes through channel '{}'", message.len(), self.label);
        self.channel
            .send_text(message.to_string())
            .await
            .map(|_| ())
            .map_err(|e| SessionError::SideChannelSend(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ice_server_conversion() {
        let server = IceServer::turn(vec!["turn:relay.example.com:443".to_string()], "user", "secret");
        let rtc: RTCIceServer = (&server).into();
        assert_eq!(rtc.urls, server.urls);
        assert_eq!(rtc.username, "user");
        assert_eq!(rtc.credential, "secret");

        let stun: RTCIceServer = (&IceServer::stun("stun:stun.example.com:3478")).into();
        assert!(stun.username.is_empty());
    }

    #[test]
    fn test_relay_policy_conversion() {
        let config = RTCConfiguration {
            ice_transport_policy: IceTransportPolicy::Relay,
            ..RTCConfiguration::default()
        };
        let rtc = to_rtc_configuration(&config);
        assert_eq!(rtc.ice_transport_policy, RTCIceTransportPolicy::Relay);
        assert_eq!(rtc.bundle_policy, RTCBundlePolicy::MaxBundle);
    }

    #[test]
    fn test_candidate_conversion_keeps_fields() {
        let mut candidate = IceCandidate::new("candidate:1 1 UDP 2122260223 192.168.1.1 5000 typ host");
        candidate.username_fragment = Some("abcd".to_string());
        let init: RTCIceCandidateInit = candidate.clone().into();
        assert_eq!(init.sdp_mline_index, Some(0));
        assert_eq!(IceCandidate::from(init), candidate);
    }

    #[test]
    fn test_rollback_is_rejected() {
        let desc = SessionDescription {
            sdp_type: SdpType::Rollback,
            sdp: String::new(),
        };
        assert!(RTCSessionDescription::try_from(desc).is_err());
    }
}
