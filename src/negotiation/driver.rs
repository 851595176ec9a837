use super::{CandidateBuffer, NegotiationMode};
use crate::errors::SessionError;
use crate::lifecycle::ConnectionLifecycle;
use crate::peer::PeerEvent;
use crate::types::{ConnectionState, IceCandidate, MediaStream, SessionDescription};
use std::sync::Arc;

/// What handling a local event changed, for the session to fold into its state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverOutcome {
    Nothing,
    OfferSent,
    RemoteStreamAttached,
    Connected,
}

/// Outbound negotiation driver
///
/// Decides, per negotiation mode, when the offer and local candidates are
/// transmitted over the signaling link.
#[derive(Debug)]
pub struct OutboundDriver {
    mode: NegotiationMode,
    buffer: CandidateBuffer,
    local_description: Option<SessionDescription>,
    offer_sent: bool,
    // an incremental offer went out or failed to; candidates stream either way
    offer_attempted: bool,
    gathering_complete: bool,
    candidates_sent: usize,
}

impl OutboundDriver {
    pub fn new(mode: NegotiationMode) -> Self {
        Self {
            mode,
            buffer: CandidateBuffer::new(),
            local_description: None,
            offer_sent: false,
            offer_attempted: false,
            gathering_complete: false,
            candidates_sent: 0,
        }
    }

    pub fn mode(&self) -> NegotiationMode {
        self.mode
    }

    pub fn offer_sent(&self) -> bool {
        self.offer_sent
    }

    pub fn gathering_complete(&self) -> bool {
        self.gathering_complete
    }

    pub fn candidates_sent(&self) -> usize {
        self.candidates_sent
    }

    /// Candidates currently held back
    pub fn buffered(&self) -> &[IceCandidate] {
        self.buffer.candidates()
    }

    pub async fn handle(
        &mut self,
        event: PeerEvent,
        lifecycle: &mut ConnectionLifecycle,
    ) -> Result<DriverOutcome, SessionError> {
        match event {
            PeerEvent::LocalDescriptionReady(description) => {
                self.on_local_description(description, lifecycle).await
            }
            PeerEvent::IceCandidate(Some(candidate)) => {
                self.on_local_candidate(candidate, lifecycle).await
            }
            PeerEvent::IceCandidate(None) => self.on_gathering_complete(lifecycle).await,
            PeerEvent::Track(streams) => Ok(self.on_remote_track(streams, lifecycle)),
            PeerEvent::ConnectionStateChanged(state) => {
                log::info!("Peer connection state changed: {:?}", state);
                Ok(if state == ConnectionState::Connected {
                    DriverOutcome::Connected
                } else {
                    DriverOutcome::Nothing
                })
            }
            PeerEvent::DataChannelMessage(message) => {
                lifecycle.observer().on_remote_message(message);
                Ok(DriverOutcome::Nothing)
            }
        }
    }

    async fn on_local_description(
        &mut self,
        description: SessionDescription,
        lifecycle: &mut ConnectionLifecycle,
    ) -> Result<DriverOutcome, SessionError> {
        if self.local_description.is_some() {
            log::warn!("Local description already set, ignoring");
            return Ok(DriverOutcome::Nothing);
        }
        self.local_description = Some(description.clone());

        match self.mode {
            NegotiationMode::Incremental => {
                log::info!("Sending SDP offer");
                let sent = self.transmit_offer(&description, lifecycle).await;
                if let Err(SessionError::SessionClosed) = sent {
                    return Err(SessionError::SessionClosed);
                }
                self.offer_attempted = true;
                // candidates that beat the offer out of the gate
                let early = self.buffer.drain_all();
                for candidate in early {
                    match self.transmit_candidate(&candidate, lifecycle).await {
                        Ok(()) => {}
                        Err(SessionError::SessionClosed) => return Err(SessionError::SessionClosed),
                        Err(e) => log::warn!("Dropping ICE candidate {}: {}", candidate.candidate, e),
                    }
                }
                sent.map(|_| DriverOutcome::OfferSent)
            }
            NegotiationMode::Batched if self.gathering_complete => {
                self.transmit_final_offer(lifecycle).await
            }
            NegotiationMode::Batched => {
                log::info!("Generating ICE candidates before sending the offer");
                Ok(DriverOutcome::Nothing)
            }
        }
    }

    async fn on_local_candidate(
        &mut self,
        candidate: IceCandidate,
        lifecycle: &mut ConnectionLifecycle,
    ) -> Result<DriverOutcome, SessionError> {
        log::debug!("Generated ICE candidate {}", candidate.candidate);
        if self.gathering_complete {
            log::warn!("Candidate generated after gathering completed, ignoring");
            return Ok(DriverOutcome::Nothing);
        }

        if self.mode.streams_candidates() && self.offer_attempted {
            self.transmit_candidate(&candidate, lifecycle).await?;
        } else {
            self.buffer.add(candidate);
        }
        Ok(DriverOutcome::Nothing)
    }

    async fn on_gathering_complete(
        &mut self,
        lifecycle: &mut ConnectionLifecycle,
    ) -> Result<DriverOutcome, SessionError> {
        if self.gathering_complete {
            return Ok(DriverOutcome::Nothing);
        }
        self.gathering_complete = true;
        log::info!("All ICE candidates have been generated");

        if self.mode == NegotiationMode::Batched && self.local_description.is_some() {
            return self.transmit_final_offer(lifecycle).await;
        }
        Ok(DriverOutcome::Nothing)
    }

    fn on_remote_track(
        &mut self,
        streams: Vec<MediaStream>,
        lifecycle: &mut ConnectionLifecycle,
    ) -> DriverOutcome {
        log::info!("Received remote track");
        if lifecycle.has_remote_stream() {
            return DriverOutcome::Nothing;
        }
        let Some(stream) = streams.into_iter().next() else {
            log::debug!("Track event carried no stream");
            return DriverOutcome::Nothing;
        };
        if lifecycle.attach_remote_stream(stream) {
            DriverOutcome::RemoteStreamAttached
        } else {
            DriverOutcome::Nothing
        }
    }

    /// Batched mode: send the complete local description exactly once
    async fn transmit_final_offer(
        &mut self,
        lifecycle: &mut ConnectionLifecycle,
    ) -> Result<DriverOutcome, SessionError> {
        if self.offer_sent {
            return Ok(DriverOutcome::Nothing);
        }
        let peer = Arc::clone(lifecycle.peer()?);
        let description = match peer.local_description().await {
            Some(description) => description,
            None => match self.local_description.clone() {
                Some(description) => description,
                None => return Ok(DriverOutcome::Nothing),
            },
        };
        if !lifecycle.is_active() {
            return Err(SessionError::SessionClosed);
        }
        log::info!(
            "Sending SDP offer with {} embedded candidate(s), {} buffered",
            description.embedded_candidates(),
            self.buffer.len()
        );
        self.transmit_offer(&description, lifecycle).await?;
        Ok(DriverOutcome::OfferSent)
    }

    async fn transmit_offer(
        &mut self,
        description: &SessionDescription,
        lifecycle: &ConnectionLifecycle,
    ) -> Result<(), SessionError> {
        lifecycle.link()?.send_sdp_offer(description).await?;
        self.offer_sent = true;
        Ok(())
    }

    async fn transmit_candidate(
        &mut self,
        candidate: &IceCandidate,
        lifecycle: &ConnectionLifecycle,
    ) -> Result<(), SessionError> {
        log::debug!("Sending ICE candidate");
        lifecycle.link()?.send_ice_candidate(candidate).await?;
        self.candidates_sent += 1;
        Ok(())
    }
}
