//! The viewer session aggregate.
//!
//! A [`Session`] owns the lifecycle manager, the signaling router and the
//! outbound driver, and is the single place events are dispatched from. It
//! is driven by one task at a time (see [`crate::controller`]), so none of
//! its fields need locking.

use crate::config::ViewerConfig;
use crate::errors::{ErrorKind, SessionError};
use crate::lifecycle::{ConnectionLifecycle, ResourceSnapshot};
use crate::media::MediaCapture;
use crate::negotiation::{self, DriverOutcome, NegotiationMode, OutboundDriver};
use crate::peer::{EventSender, PeerEvent, PeerTransport, SessionEvent, SignalingEvent};
use crate::signaling::{NegotiationState, SignalingLink, SignalingRouter};
use crate::sinks::ViewerSinks;
use crate::timing::{ConnectionTiming, SessionClock};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Only role this crate drives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Viewer,
}

pub struct Session {
    id: String,
    role: Role,
    mode: NegotiationMode,
    router: SignalingRouter,
    driver: OutboundDriver,
    lifecycle: ConnectionLifecycle,
    clock: SessionClock,
    timing: Option<ConnectionTiming>,
    last_error: Option<SessionError>,
    published_state: NegotiationState,
    state_tx: Option<watch::Sender<NegotiationState>>,
}

impl Session {
    pub fn new(
        config: &ViewerConfig,
        peer: Arc<dyn PeerTransport>,
        link: Arc<dyn SignalingLink>,
        capture: Arc<dyn MediaCapture>,
        sinks: ViewerSinks,
    ) -> Self {
        let mode = negotiation::mode(config);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role: Role::Viewer,
            mode,
            router: SignalingRouter::new(config.media_constraints(), config.media.open_data_channel),
            driver: OutboundDriver::new(mode),
            lifecycle: ConnectionLifecycle::new(peer, link, capture, sinks),
            clock: SessionClock::new(),
            timing: None,
            last_error: None,
            published_state: NegotiationState::Idle,
            state_tx: None,
        }
    }

    pub(crate) fn with_state_channel(mut self, tx: watch::Sender<NegotiationState>) -> Self {
        tx.send_replace(self.router.state());
        self.state_tx = Some(tx);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn mode(&self) -> NegotiationMode {
        self.mode
    }

    pub fn state(&self) -> NegotiationState {
        self.router.state()
    }

    pub fn driver(&self) -> &OutboundDriver {
        &self.driver
    }

    pub fn router(&self) -> &SignalingRouter {
        &self.router
    }

    pub fn lifecycle(&self) -> &ConnectionLifecycle {
        &self.lifecycle
    }

    pub fn resources(&self) -> ResourceSnapshot {
        self.lifecycle.snapshot()
    }

    pub fn timing(&self) -> Option<&ConnectionTiming> {
        self.timing.as_ref()
    }

    pub fn last_error(&self) -> Option<&SessionError> {
        self.last_error.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.lifecycle.is_active()
    }

    pub(crate) fn active_flag(&self) -> Arc<AtomicBool> {
        self.lifecycle.active_flag()
    }

    pub fn start_stats_polling(&mut self, interval: Duration) -> Result<(), SessionError> {
        self.lifecycle.start_stats_polling(interval)
    }

    /// Open the signaling link with the session inbox as its event target
    pub async fn open_link(&mut self, events: EventSender) -> Result<(), SessionError> {
        log::info!("Starting viewer connection {}", self.id);
        self.router.transition(NegotiationState::LinkOpening);
        self.publish_state();
        self.lifecycle.open_link(events).await
    }

    pub async fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Signaling(event) => self.handle_signaling(event).await,
            SessionEvent::Peer(event) => self.handle_peer(event).await,
        }
    }

    pub async fn handle_signaling(&mut self, event: SignalingEvent) {
        if !self.is_active() {
            return;
        }
        match self.router.handle(event, &mut self.lifecycle).await {
            Ok(Some(local)) => {
                self.publish_state();
                self.handle_peer(local).await;
            }
            Ok(None) => {}
            Err(e) => self.report(e),
        }
        self.publish_state();
    }

    pub async fn handle_peer(&mut self, event: PeerEvent) {
        if !self.is_active() || self.state().is_closed() {
            return;
        }
        match self.driver.handle(event, &mut self.lifecycle).await {
            Ok(DriverOutcome::OfferSent) => {
                if self.router.state() == NegotiationState::OfferCreated {
                    self.router.transition(NegotiationState::OfferSent);
                }
            }
            Ok(DriverOutcome::RemoteStreamAttached) => {
                let timing = self.clock.connection_timing(Instant::now());
                log::info!("Remote stream attached after {:.2}s", timing.connection_secs);
                self.lifecycle.observer().on_remote_stream(&timing);
                self.timing = Some(timing);
                self.router.transition(NegotiationState::Connected);
            }
            Ok(DriverOutcome::Connected) => self.router.transition(NegotiationState::Connected),
            Ok(DriverOutcome::Nothing) => {}
            Err(e) => self.report(e),
        }
        self.publish_state();
    }

    /// Send a text message over the side channel.
    ///
    /// Failures are logged and returned; the session is unaffected.
    pub async fn send_message(&self, message: &str) -> Result<(), SessionError> {
        let Some(channel) = self.lifecycle.side_channel() else {
            let err = SessionError::SideChannelSend("no side channel open".to_string());
            log::warn!("Send DataChannel: {}", err);
            return Err(err);
        };
        channel.send_text(message).await.map_err(|e| {
            let err = match e {
                SessionError::SideChannelSend(_) => e,
                other => SessionError::SideChannelSend(other.to_string()),
            };
            log::error!("Send DataChannel: {}", err);
            err
        })
    }

    /// Release every held resource and close the session. Idempotent.
    pub async fn release(&mut self) {
        self.lifecycle.release().await;
        self.router.transition(NegotiationState::Closed);
        self.publish_state();
    }

    fn report(&mut self, error: SessionError) {
        match error.kind() {
            ErrorKind::SessionClosed => {
                log::debug!("Dropped continuation of a stopped session");
                return;
            }
            ErrorKind::DeviceUnavailable => {
                log::error!("Negotiation aborted: {}", error)
            }
            ErrorKind::SignalingLinkError => log::error!("Signaling client error: {}", error),
            _ => log::warn!("{}", error),
        }
        self.lifecycle.observer().on_error(&error);
        self.last_error = Some(error);
    }

    fn publish_state(&mut self) {
        let state = self.router.state();
        if state == self.published_state {
            return;
        }
        self.published_state = state;
        if let Some(tx) = &self.state_tx {
            tx.send_replace(state);
        }
        self.lifecycle.observer().on_state_change(state);
    }
}
