//! Session controller: `start` / `stop` entry points.
//!
//! `start` wires a fresh [`Session`] to its collaborators and moves it into a
//! single event-loop task. Everything after that is driven by events arriving
//! on the session inbox, one at a time.

use crate::config::ViewerConfig;
use crate::errors::SessionError;
use crate::ice::{build_rtc_configuration, IceServer};
use crate::lifecycle::ResourceSnapshot;
use crate::media::MediaCapture;
use crate::negotiation::NegotiationMode;
use crate::peer::{EventSender, PeerFactory, SessionEvent};
use crate::session::Session;
use crate::signaling::{NegotiationState, SignalingLink};
use crate::sinks::ViewerSinks;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch, Mutex, Notify};
use tokio::task::JoinHandle;

/// External capabilities a session is started against
#[derive(Clone)]
pub struct Collaborators {
    pub link: Arc<dyn SignalingLink>,
    pub peers: Arc<dyn PeerFactory>,
    pub capture: Arc<dyn MediaCapture>,
    /// TURN servers resolved by the channel lookup
    pub relay_servers: Vec<IceServer>,
}

enum Command {
    SendMessage {
        message: String,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
}

enum Lifecycle {
    Running(JoinHandle<ResourceSnapshot>),
    Stopped(ResourceSnapshot),
}

/// Handle to a running viewer session
pub struct SessionHandle {
    id: String,
    mode: NegotiationMode,
    active: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
    commands: mpsc::UnboundedSender<Command>,
    state_rx: watch::Receiver<NegotiationState>,
    task: Mutex<Lifecycle>,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl SessionHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn mode(&self) -> NegotiationMode {
        self.mode
    }

    pub fn is_running(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> NegotiationState {
        *self.state_rx.borrow()
    }

    /// Wait until the session reaches `target`, or return the last state seen
    /// if the session ends first.
    pub async fn wait_for_state(&self, target: NegotiationState) -> NegotiationState {
        let mut rx = self.state_rx.clone();
        let reached = rx.wait_for(|state| *state == target).await.map(|state| *state);
        match reached {
            Ok(state) => state,
            Err(_) => *rx.borrow(),
        }
    }

    /// Send a text message over the side channel
    pub async fn send_message(&self, message: impl Into<String>) -> Result<(), SessionError> {
        if !self.is_running() {
            return Err(SessionError::SessionClosed);
        }
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::SendMessage {
                message: message.into(),
                reply,
            })
            .map_err(|_| SessionError::SessionClosed)?;
        response.await.unwrap_or(Err(SessionError::SessionClosed))
    }

    /// Stop the session and release everything it holds.
    ///
    /// Safe from any state, including while a handler is mid-flight, and safe
    /// to call repeatedly: later calls return the snapshot of the first.
    pub async fn stop(&self) -> ResourceSnapshot {
        let mut task = self.task.lock().await;
        match &mut *task {
            Lifecycle::Stopped(snapshot) => *snapshot,
            Lifecycle::Running(handle) => {
                log::info!("Stopping viewer connection {}", self.id);
                self.active.store(false, Ordering::SeqCst);
                self.shutdown.notify_one();
                let snapshot = match handle.await {
                    Ok(snapshot) => snapshot,
                    Err(e) => {
                        log::error!("Session task ended abnormally: {}", e);
                        ResourceSnapshot::default()
                    }
                };
                *task = Lifecycle::Stopped(snapshot);
                snapshot
            }
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        // the loop still releases on its own
        if self.active.swap(false, Ordering::SeqCst) {
            self.shutdown.notify_one();
        }
    }
}

/// Start a viewer session without single-session bookkeeping.
pub async fn start_session(
    config: ViewerConfig,
    collaborators: Collaborators,
    sinks: ViewerSinks,
) -> Result<SessionHandle, SessionError> {
    config.validate()?;
    log::info!(
        "Starting viewer for channel '{}' as client {}",
        config.channel.channel_name,
        config.channel.client_id
    );

    let (tx, inbox) = mpsc::unbounded_channel();
    let events = EventSender::new(tx);

    let rtc_config = build_rtc_configuration(&config, &collaborators.relay_servers);
    let peer = collaborators.peers.create(&rtc_config, events.clone()).await?;

    let (state_tx, state_rx) = watch::channel(NegotiationState::Idle);
    let mut session = Session::new(
        &config,
        peer,
        collaborators.link,
        collaborators.capture,
        sinks,
    )
    .with_state_channel(state_tx);

    if let Err(e) = session.start_stats_polling(Duration::from_millis(config.stats.poll_interval_ms)) {
        session.release().await;
        return Err(e);
    }
    if let Err(e) = session.open_link(events).await {
        log::error!("Failed to open signaling link: {}", e);
        session.release().await;
        return Err(e);
    }

    let id = session.id().to_string();
    let mode = session.mode();
    let active = session.active_flag();
    let shutdown = Arc::new(Notify::new());
    let (commands, command_rx) = mpsc::unbounded_channel();

    let handle = tokio::spawn(run(session, inbox, command_rx, Arc::clone(&shutdown)));

    Ok(SessionHandle {
        id,
        mode,
        active,
        shutdown,
        commands,
        state_rx,
        task: Mutex::new(Lifecycle::Running(handle)),
    })
}

async fn run(
    mut session: Session,
    mut inbox: mpsc::UnboundedReceiver<SessionEvent>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    shutdown: Arc<Notify>,
) -> ResourceSnapshot {
    loop {
        if !session.is_active() {
            break;
        }
        tokio::select! {
            biased;
            _ = shutdown.notified() => break,
            Some(command) = commands.recv() => match command {
                Command::SendMessage { message, reply } => {
                    let _ = reply.send(session.send_message(&message).await);
                }
            },
            event = inbox.recv() => {
                let Some(event) = event else { break };
                let stopped = tokio::select! {
                    biased;
                    _ = shutdown.notified() => true,
                    _ = session.handle_event(event) => false,
                };
                if stopped {
                    log::debug!("Stop interrupted an in-flight handler");
                    break;
                }
            }
        }
    }
    session.release().await;
    session.resources()
}

/// Keeps at most one viewer session active at a time
#[derive(Default)]
pub struct ViewerController {
    active: Mutex<Option<Arc<SessionHandle>>>,
}

impl ViewerController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a session; rejected while another one is still running
    pub async fn start(
        &self,
        config: ViewerConfig,
        collaborators: Collaborators,
        sinks: ViewerSinks,
    ) -> Result<Arc<SessionHandle>, SessionError> {
        let mut active = self.active.lock().await;
        if let Some(existing) = active.as_ref() {
            if existing.is_running() {
                return Err(SessionError::AlreadyActive(existing.id().to_string()));
            }
        }
        let handle = Arc::new(start_session(config, collaborators, sinks).await?);
        *active = Some(Arc::clone(&handle));
        Ok(handle)
    }

    /// Stop the active session, if any
    pub async fn stop(&self) -> Option<ResourceSnapshot> {
        let handle = self.active.lock().await.take();
        match handle {
            Some(handle) => Some(handle.stop().await),
            None => None,
        }
    }

    pub async fn active_session(&self) -> Option<Arc<SessionHandle>> {
        self.active
            .lock()
            .await
            .as_ref()
            .filter(|handle| handle.is_running())
            .cloned()
    }
}
