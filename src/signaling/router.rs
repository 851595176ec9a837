use super::NegotiationState;
use crate::config::MediaConstraints;
use crate::errors::SessionError;
use crate::lifecycle::ConnectionLifecycle;
use crate::peer::{OfferOptions, PeerEvent, SignalingEvent, SIDE_CHANNEL_LABEL};
use crate::types::{IceCandidate, SessionDescription};
use std::sync::Arc;

/// Signaling event router
///
/// Drives the peer connection from inbound signaling events and owns the
/// negotiation state. Releasing resources is not its job; a `Close` only
/// moves the state to [`NegotiationState::Closed`].
#[derive(Debug)]
pub struct SignalingRouter {
    state: NegotiationState,
    constraints: MediaConstraints,
    open_side_channel: bool,
    remote_description_set: bool,
    link_errors: u32,
}

impl SignalingRouter {
    pub fn new(constraints: MediaConstraints, open_side_channel: bool) -> Self {
        Self {
            state: NegotiationState::Idle,
            constraints,
            open_side_channel,
            remote_description_set: false,
            link_errors: 0,
        }
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    pub fn link_errors(&self) -> u32 {
        self.link_errors
    }

    pub(crate) fn transition(&mut self, next: NegotiationState) {
        if self.state.is_closed() || self.state == next {
            return;
        }
        log::debug!("Negotiation state {} -> {}", self.state, next);
        self.state = next;
    }

    /// Handle one inbound signaling event.
    ///
    /// Returns the local event to hand to the outbound driver, if any.
    pub async fn handle(
        &mut self,
        event: SignalingEvent,
        lifecycle: &mut ConnectionLifecycle,
    ) -> Result<Option<PeerEvent>, SessionError> {
        if self.state.is_closed() && !matches!(event, SignalingEvent::Error(_)) {
            log::debug!("Signaling event after close ignored: {:?}", event);
            return Ok(None);
        }

        match event {
            SignalingEvent::Open => self.on_open(lifecycle).await,
            SignalingEvent::SdpAnswer(answer) => {
                self.on_answer(answer, lifecycle).await?;
                Ok(None)
            }
            SignalingEvent::IceCandidate(candidate) => {
                self.on_remote_candidate(candidate, lifecycle).await?;
                Ok(None)
            }
            SignalingEvent::Close => {
                log::info!("Disconnected from signaling channel");
                self.transition(NegotiationState::Closed);
                Ok(None)
            }
            SignalingEvent::Error(message) => {
                self.link_errors += 1;
                Err(SessionError::SignalingLink(message))
            }
        }
    }

    async fn on_open(
        &mut self,
        lifecycle: &mut ConnectionLifecycle,
    ) -> Result<Option<PeerEvent>, SessionError> {
        log::info!("Connected to signaling service");
        if self.state.has_local_offer() || self.state == NegotiationState::MediaAcquiring {
            return Err(SessionError::OutOfOrderMessage(format!(
                "link reported open while in {}",
                self.state
            )));
        }
        self.transition(NegotiationState::MediaAcquiring);

        let stream = match lifecycle.acquire_local_media(&self.constraints).await {
            Ok(stream) => stream,
            Err(SessionError::SessionClosed) => return Ok(None),
            Err(e) => {
                log::error!("Could not find webcam: {}", e);
                return Err(e);
            }
        };
        lifecycle.attach_tracks(stream).await?;

        if self.open_side_channel {
            lifecycle.open_side_channel(SIDE_CHANNEL_LABEL).await?;
        }

        log::info!("Creating SDP offer");
        let peer = Arc::clone(lifecycle.peer()?);
        let offer = peer.create_offer(OfferOptions::default()).await?;
        if !lifecycle.is_active() {
            return Ok(None);
        }
        peer.set_local_description(offer.clone()).await?;
        if !lifecycle.is_active() {
            return Ok(None);
        }
        self.transition(NegotiationState::OfferCreated);
        Ok(Some(PeerEvent::LocalDescriptionReady(offer)))
    }

    async fn on_answer(
        &mut self,
        answer: SessionDescription,
        lifecycle: &mut ConnectionLifecycle,
    ) -> Result<(), SessionError> {
        log::info!("Received SDP answer");
        if !self.state.has_local_offer() {
            return Err(SessionError::OutOfOrderMessage(format!(
                "answer received in {} before an offer exists",
                self.state
            )));
        }
        if self.remote_description_set {
            return Err(SessionError::OutOfOrderMessage(
                "remote description already set".to_string(),
            ));
        }
        let peer = Arc::clone(lifecycle.peer()?);
        peer.set_remote_description(answer).await?;
        if !lifecycle.is_active() {
            return Ok(());
        }
        self.remote_description_set = true;
        if self.state != NegotiationState::Connected {
            self.transition(NegotiationState::AnswerReceived);
        }
        Ok(())
    }

    async fn on_remote_candidate(
        &mut self,
        candidate: IceCandidate,
        lifecycle: &mut ConnectionLifecycle,
    ) -> Result<(), SessionError> {
        log::debug!("Received ICE candidate");
        let peer = Arc::clone(lifecycle.peer()?);
        peer.add_ice_candidate(candidate).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Resolution;
    use crate::errors::ErrorKind;
    use crate::testing::{scripted_lifecycle, PeerCall, PeerFailures, StaticCapture};
    use crate::types::TrackKind;

    fn constraints() -> MediaConstraints {
        MediaConstraints {
            video: Some(Resolution::WIDESCREEN),
            audio: true,
        }
    }

    #[tokio::test]
    async fn test_open_creates_offer_after_tracks_and_side_channel() {
        let (mut lifecycle, _link, peer, sinks) = scripted_lifecycle(StaticCapture::new(), PeerFailures::default());
        let mut router = SignalingRouter::new(constraints(), true);

        let local = router.handle(SignalingEvent::Open, &mut lifecycle).await.unwrap();

        assert!(matches!(local, Some(PeerEvent::LocalDescriptionReady(_))));
        assert_eq!(router.state(), NegotiationState::OfferCreated);
        assert_eq!(
            peer.calls(),
            vec![
                PeerCall::AddTrack(TrackKind::Audio),
                PeerCall::AddTrack(TrackKind::Video),
                PeerCall::CreateDataChannel(SIDE_CHANNEL_LABEL.to_string()),
                PeerCall::CreateOffer(OfferOptions::default()),
                PeerCall::SetLocalDescription,
            ]
        );
        assert!(sinks.local_view.current().is_some());
        assert!(lifecycle.side_channel().is_some());
    }

    #[tokio::test]
    async fn test_capture_failure_aborts_before_offer() {
        let (mut lifecycle, _link, peer, _sinks) =
            scripted_lifecycle(StaticCapture::failing("no camera"), PeerFailures::default());
        let mut router = SignalingRouter::new(constraints(), false);

        let err = router
            .handle(SignalingEvent::Open, &mut lifecycle)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::DeviceUnavailable);
        assert_eq!(router.state(), NegotiationState::MediaAcquiring);
        assert_eq!(peer.count(&PeerCall::CreateOffer(OfferOptions::default())), 0);
    }

    #[tokio::test]
    async fn test_receive_only_skips_capture() {
        let capture = StaticCapture::new();
        let (mut lifecycle, _link, peer, sinks) = scripted_lifecycle(capture, PeerFailures::default());
        let mut router = SignalingRouter::new(
            MediaConstraints {
                video: None,
                audio: false,
            },
            false,
        );

        router.handle(SignalingEvent::Open, &mut lifecycle).await.unwrap();

        assert_eq!(router.state(), NegotiationState::OfferCreated);
        assert_eq!(peer.calls().first(), Some(&PeerCall::CreateOffer(OfferOptions::default())));
        assert!(sinks.local_view.current().is_none());
        assert!(lifecycle.local_stream().is_none());
    }

    #[tokio::test]
    async fn test_answer_requires_offer_and_is_write_once() {
        let (mut lifecycle, _link, peer, _sinks) = scripted_lifecycle(StaticCapture::new(), PeerFailures::default());
        let mut router = SignalingRouter::new(constraints(), false);
        let answer = SessionDescription::answer("v=0\r\n");

        let err = router
            .handle(SignalingEvent::SdpAnswer(answer.clone()), &mut lifecycle)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OutOfOrderMessage);
        assert_eq!(router.state(), NegotiationState::Idle);

        router.handle(SignalingEvent::Open, &mut lifecycle).await.unwrap();
        router
            .handle(SignalingEvent::SdpAnswer(answer.clone()), &mut lifecycle)
            .await
            .unwrap();
        assert_eq!(router.state(), NegotiationState::AnswerReceived);

        let err = router
            .handle(SignalingEvent::SdpAnswer(answer), &mut lifecycle)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OutOfOrderMessage);
        assert_eq!(peer.count(&PeerCall::SetRemoteDescription), 1);
    }

    #[tokio::test]
    async fn test_remote_candidates_forwarded_in_any_state() {
        let (mut lifecycle, _link, peer, _sinks) = scripted_lifecycle(StaticCapture::new(), PeerFailures::default());
        let mut router = SignalingRouter::new(constraints(), false);
        let candidate = IceCandidate::new("candidate:1 1 udp 2122260223 10.0.0.7 50000 typ host");

        router
            .handle(SignalingEvent::IceCandidate(candidate), &mut lifecycle)
            .await
            .unwrap();

        assert_eq!(router.state(), NegotiationState::Idle);
        assert_eq!(peer.count(&PeerCall::AddIceCandidate), 1);
    }

    #[tokio::test]
    async fn test_close_is_terminal_and_errors_do_not_transition() {
        let (mut lifecycle, _link, peer, _sinks) = scripted_lifecycle(StaticCapture::new(), PeerFailures::default());
        let mut router = SignalingRouter::new(constraints(), false);

        let err = router
            .handle(SignalingEvent::Error("socket reset".to_string()), &mut lifecycle)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SignalingLinkError);
        assert_eq!(router.state(), NegotiationState::Idle);
        assert_eq!(router.link_errors(), 1);

        router.handle(SignalingEvent::Close, &mut lifecycle).await.unwrap();
        assert_eq!(router.state(), NegotiationState::Closed);

        let ignored = router.handle(SignalingEvent::Open, &mut lifecycle).await.unwrap();
        assert!(ignored.is_none());
        assert_eq!(router.state(), NegotiationState::Closed);
        assert!(peer.calls().is_empty());

        // errors still surface after close
        assert!(router
            .handle(SignalingEvent::Error("late".to_string()), &mut lifecycle)
            .await
            .is_err());
        assert_eq!(router.link_errors(), 2);
    }

    #[tokio::test]
    async fn test_second_open_is_out_of_order() {
        let (mut lifecycle, _link, _peer, _sinks) = scripted_lifecycle(StaticCapture::new(), PeerFailures::default());
        let mut router = SignalingRouter::new(constraints(), false);

        router.handle(SignalingEvent::Open, &mut lifecycle).await.unwrap();
        let err = router
            .handle(SignalingEvent::Open, &mut lifecycle)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OutOfOrderMessage);
        assert_eq!(router.state(), NegotiationState::OfferCreated);
    }
}
