//! Peer connection contracts
//!
//! The negotiation core drives the media transport only through
//! [`PeerTransport`]; codecs, encryption and NAT traversal stay behind it.

use crate::errors::SessionError;
use crate::ice::RTCConfiguration;
use crate::types::{ConnectionState, IceCandidate, MediaStream, MediaTrack, SessionDescription, StatsReport};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

/// Label of the side channel a viewer opens when configured to
pub const SIDE_CHANNEL_LABEL: &str = "kvsDataChannel";

/// What the offer asks the remote side to send back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OfferOptions {
    pub receive_audio: bool,
    pub receive_video: bool,
}

impl Default for OfferOptions {
    fn default() -> Self {
        Self {
            receive_audio: true,
            receive_video: true,
        }
    }
}

/// Local connection events consumed by the outbound negotiation driver
#[derive(Debug, Clone)]
pub enum PeerEvent {
    /// The offer was created and applied as the local description
    LocalDescriptionReady(SessionDescription),
    /// A local candidate; `None` means gathering has completed
    IceCandidate(Option<IceCandidate>),
    /// Remote media arrived
    Track(Vec<MediaStream>),
    ConnectionStateChanged(ConnectionState),
    /// Inbound side-channel message
    DataChannelMessage(String),
}

/// Inbound signaling events consumed by the signaling router
#[derive(Debug, Clone)]
pub enum SignalingEvent {
    Open,
    SdpAnswer(SessionDescription),
    IceCandidate(IceCandidate),
    Close,
    Error(String),
}

/// Everything a session's event loop consumes
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Signaling(SignalingEvent),
    Peer(PeerEvent),
}

/// Sending half of a session inbox, handed to the link and the peer factory.
///
/// Sends after the session has shut down are dropped silently.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: UnboundedSender<SessionEvent>,
}

impl EventSender {
    pub fn new(tx: UnboundedSender<SessionEvent>) -> Self {
        Self { tx }
    }

    pub fn signaling(&self, event: SignalingEvent) {
        if self.tx.send(SessionEvent::Signaling(event)).is_err() {
            log::debug!("Session inbox closed, dropping signaling event");
        }
    }

    pub fn peer(&self, event: PeerEvent) {
        if self.tx.send(SessionEvent::Peer(event)).is_err() {
            log::debug!("Session inbox closed, dropping peer event");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// The external media-transport capability
#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn create_offer(&self, options: OfferOptions) -> Result<SessionDescription, SessionError>;

    async fn set_local_description(&self, description: SessionDescription) -> Result<(), SessionError>;

    /// Current local description; once gathering completes it embeds every candidate
    async fn local_description(&self) -> Option<SessionDescription>;

    async fn set_remote_description(&self, description: SessionDescription) -> Result<(), SessionError>;

    /// Remote candidates may arrive before the answer; the transport buffers them
    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), SessionError>;

    async fn add_track(&self, track: &MediaTrack, stream_id: &str) -> Result<(), SessionError>;

    async fn create_data_channel(&self, label: &str) -> Result<Arc<dyn SideChannel>, SessionError>;

    async fn get_stats(&self) -> Result<StatsReport, SessionError>;

    async fn close(&self) -> Result<(), SessionError>;
}

/// Creates peer connections wired to a session inbox
#[async_trait]
pub trait PeerFactory: Send + Sync {
    async fn create(
        &self,
        config: &RTCConfiguration,
        events: EventSender,
    ) -> Result<Arc<dyn PeerTransport>, SessionError>;
}

/// Ordered, reliable message stream multiplexed over the peer connection
#[async_trait]
pub trait SideChannel: Send + Sync {
    fn label(&self) -> &str;

    async fn send_text(&self, message: &str) -> Result<(), SessionError>;
}
