//! Signaling channel contract and the router that consumes its events.

pub mod router;

pub use router::SignalingRouter;

use crate::errors::SessionError;
use crate::peer::EventSender;
use crate::types::{IceCandidate, SessionDescription};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The external bidirectional message channel to the master.
///
/// The link is injected, not owned: its transport lifecycle belongs to the
/// caller. A session only opens, closes and sends through it.
#[async_trait]
pub trait SignalingLink: Send + Sync {
    /// Start connecting; progress arrives as [`crate::peer::SignalingEvent`]s on `events`
    async fn open(&self, events: EventSender) -> Result<(), SessionError>;

    async fn close(&self);

    async fn send_sdp_offer(&self, offer: &SessionDescription) -> Result<(), SessionError>;

    async fn send_ice_candidate(&self, candidate: &IceCandidate) -> Result<(), SessionError>;
}

/// Negotiation progress of a viewer session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NegotiationState {
    Idle,
    LinkOpening,
    MediaAcquiring,
    OfferCreated,
    OfferSent,
    AnswerReceived,
    Connected,
    Closed,
}

impl NegotiationState {
    /// Whether a local offer has been applied
    pub fn has_local_offer(self) -> bool {
        matches!(
            self,
            NegotiationState::OfferCreated
                | NegotiationState::OfferSent
                | NegotiationState::AnswerReceived
                | NegotiationState::Connected
        )
    }

    pub fn is_closed(self) -> bool {
        self == NegotiationState::Closed
    }
}

impl std::fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            NegotiationState::Idle => "IDLE",
            NegotiationState::LinkOpening => "LINK_OPENING",
            NegotiationState::MediaAcquiring => "MEDIA_ACQUIRING",
            NegotiationState::OfferCreated => "OFFER_CREATED",
            NegotiationState::OfferSent => "OFFER_SENT",
            NegotiationState::AnswerReceived => "ANSWER_RECEIVED",
            NegotiationState::Connected => "CONNECTED",
            NegotiationState::Closed => "CLOSED",
        };
        f.write_str(name)
    }
}
