//! Session controller: the state machine behind one interactive shell.
//!
//! The controller owns at most one [`Transport`] and one
//! [`TerminalSurface`] at a time and relays between them:
//!
//! ```text
//! surface ──SurfaceInput──► controller ──Data(bytes)────────► transport
//! surface ──SurfaceResize─► controller ──Control(Resize)────► transport
//! transport ─Message──────► controller ──classify──► surface.write(bytes)
//!                                           └─fatal─► highlight + teardown
//! transport ─Error/Close──► controller ──teardown──► Notice
//! surface ──SurfaceClosed─► controller ──teardown──► Notice
//! ```
//!
//! # States
//!
//! ```text
//! Idle ──connect()──► Connecting ──TransportOpen──► Active
//!   ▲                     │                           │
//!   │                     └──── Error/Close/fatal ────┴──► Closed | Errored
//!   └── invalid config (no side effects)
//! any ──disconnect()──► Closing ──► Closed
//! ```
//!
//! All transitions run synchronously inside [`SessionController::handle`],
//! fed by a single consumer (see [`runner`]). Nothing else mutates the
//! controller, so no locking is needed.

pub mod event;
pub mod notice;
pub mod runner;

use tokio::sync::mpsc;

use crate::classify::FatalMarkers;
use crate::config::{ConfigError, SessionConfig};
use crate::protocol::{highlight_error, ControlFrame, OutboundFrame};
use crate::surface::TerminalSurface;
use crate::transport::{EndpointError, RelayTarget, Transport};

pub use event::{EventKind, EventReceiver, EventSink, SessionEvent, SessionId};
pub use notice::Notice;

/// Lifecycle state of a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Never connected.
    #[default]
    Idle,
    /// Transport opening.
    Connecting,
    /// Relaying.
    Active,
    /// Teardown in progress.
    Closing,
    /// Ended normally or by request.
    Closed,
    /// Ended by a failure.
    Errored,
}

impl ConnectionState {
    /// Whether a session is in progress.
    pub fn is_live(self) -> bool {
        matches!(self, Self::Connecting | Self::Active)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Active => "active",
            Self::Closing => "closing",
            Self::Closed => "closed",
            Self::Errored => "errored",
        };
        f.write_str(name)
    }
}

/// Why `connect()` refused to start a session.
#[derive(Debug)]
pub enum SessionError {
    /// A required credential is missing.
    Config(ConfigError),
    /// The relay URL cannot be used.
    Endpoint(EndpointError),
    /// The terminal surface could not be attached.
    Surface(String),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(e) => write!(f, "{e}"),
            Self::Endpoint(e) => write!(f, "{e}"),
            Self::Surface(msg) => write!(f, "Terminal unavailable: {msg}"),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Endpoint(e) => Some(e),
            Self::Surface(_) => None,
        }
    }
}

impl From<ConfigError> for SessionError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

/// Creates the collaborators for each new session.
pub trait SessionFactory {
    /// Transport implementation.
    type Transport: Transport;
    /// Surface implementation.
    type Surface: TerminalSurface;

    /// A fresh, unopened transport.
    fn create_transport(&mut self) -> Self::Transport;

    /// A fresh, unattached surface.
    fn create_surface(&mut self) -> Self::Surface;
}

/// The collaborators of the session in progress.
struct Live<T, S> {
    transport: T,
    surface: S,
}

/// State machine relaying one remote shell session at a time.
pub struct SessionController<F: SessionFactory> {
    factory: F,
    target: RelayTarget,
    markers: FatalMarkers,
    state: ConnectionState,
    session: SessionId,
    live: Option<Live<F::Transport, F::Surface>>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl<F: SessionFactory> std::fmt::Debug for SessionController<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("target", &self.target)
            .field("state", &self.state)
            .field("session", &self.session)
            .field("live", &self.live.is_some())
            .finish_non_exhaustive()
    }
}

impl<F: SessionFactory> SessionController<F> {
    /// A new idle controller and the receiver its collaborators report to.
    pub fn new(factory: F, target: RelayTarget, markers: FatalMarkers) -> (Self, EventReceiver) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let controller = Self {
            factory,
            target,
            markers,
            state: ConnectionState::Idle,
            session: 0,
            live: None,
            events,
        };
        (controller, events_rx)
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Id of the most recent session (0 before the first connect).
    pub fn session_id(&self) -> SessionId {
        self.session
    }

    /// Whether collaborators are held.
    pub fn is_live(&self) -> bool {
        self.live.is_some()
    }

    /// Start a session with `config`.
    ///
    /// Validation happens first and has no side effects on failure. A session
    /// already in progress is torn down before the new transport is opened.
    /// The credentials are consumed and wiped once the transport has them.
    pub fn connect(&mut self, mut config: SessionConfig) -> Result<(), SessionError> {
        if let Err(e) = config.validate() {
            log::warn!("[session] connect refused: missing {}", e.field());
            return Err(e.into());
        }
        let endpoint = self.target.endpoint(&config).map_err(SessionError::Endpoint)?;
        log::info!(
            "[session] connecting {}@{} via {}",
            config.username,
            config.host,
            endpoint.redacted()
        );
        drop(config);

        if self.live.is_some() {
            self.disconnect();
        }

        self.session += 1;
        let sink = EventSink::new(self.session, self.events.clone());

        let mut surface = self.factory.create_surface();
        if let Err(e) = surface.attach(sink.clone()) {
            surface.dispose();
            self.state = ConnectionState::Errored;
            log::error!("[session] surface attach failed: {e:#}");
            return Err(SessionError::Surface(format!("{e:#}")));
        }

        let mut transport = self.factory.create_transport();
        transport.open(endpoint, sink);

        self.live = Some(Live { transport, surface });
        self.set_state(ConnectionState::Connecting);
        Ok(())
    }

    /// End the session in progress, if any. Idempotent.
    ///
    /// Unsent outbound data is discarded; there is no drain.
    pub fn disconnect(&mut self) {
        self.teardown();
        self.set_state(ConnectionState::Closed);
    }

    /// Apply one event. Returns the notice when the event ends the session.
    pub fn handle(&mut self, event: SessionEvent) -> Option<Notice> {
        if event.session != self.session || self.live.is_none() {
            log::debug!(
                "[session] dropping event for session {} (current {}, {})",
                event.session,
                self.session,
                self.state
            );
            return None;
        }

        match event.kind {
            EventKind::TransportOpen => {
                if self.state == ConnectionState::Connecting {
                    self.set_state(ConnectionState::Active);
                    if let Some(live) = self.live.as_mut() {
                        live.surface.clear();
                        live.surface.focus();
                    }
                }
                None
            }
            EventKind::SurfaceInput(bytes) => {
                self.send_if_active(OutboundFrame::Data(bytes));
                None
            }
            EventKind::SurfaceResize(viewport) => {
                self.send_if_active(OutboundFrame::Control(ControlFrame::Resize {
                    cols: viewport.cols,
                    rows: viewport.rows,
                }));
                None
            }
            EventKind::TransportMessage(bytes) => self.on_message(&bytes),
            EventKind::TransportError(cause) => {
                log::warn!("[session] transport error: {cause}");
                self.fail(ConnectionState::Errored);
                Some(Notice::ConnectionError { cause })
            }
            EventKind::TransportClose { code, reason } => {
                let notice = Notice::for_close(code, reason);
                let end = if notice.is_error() {
                    ConnectionState::Errored
                } else {
                    ConnectionState::Closed
                };
                log::info!("[session] transport closed ({code})");
                self.fail(end);
                Some(notice)
            }
            EventKind::SurfaceClosed(reason) => {
                log::warn!("[session] surface input ended: {reason}");
                self.fail(ConnectionState::Errored);
                Some(Notice::InputClosed { reason })
            }
        }
    }

    fn on_message(&mut self, bytes: &[u8]) -> Option<Notice> {
        if self.state != ConnectionState::Active {
            log::debug!("[session] output before open dropped ({} bytes)", bytes.len());
            return None;
        }

        if let Some(failure) = self.markers.classify(bytes) {
            log::warn!("[session] relay failure: {}", failure.marker);
            if let Some(live) = self.live.as_mut() {
                live.surface.write(highlight_error(&failure.text).as_bytes());
            }
            self.fail(ConnectionState::Errored);
            return Some(Notice::RelayFailure(failure));
        }

        if let Some(live) = self.live.as_mut() {
            live.surface.write(bytes);
        }
        None
    }

    fn send_if_active(&mut self, frame: OutboundFrame) {
        if self.state != ConnectionState::Active {
            log::debug!("[session] {} frame dropped while {}", frame_kind(&frame), self.state);
            return;
        }
        if let Some(live) = self.live.as_mut() {
            live.transport.send(frame);
        }
    }

    fn fail(&mut self, end: ConnectionState) {
        self.teardown();
        self.set_state(end);
    }

    /// Close the transport and dispose the surface, each at most once.
    fn teardown(&mut self) {
        if let Some(mut live) = self.live.take() {
            self.set_state(ConnectionState::Closing);
            live.transport.close();
            live.surface.dispose();
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            log::debug!("[session] {} -> {}", self.state, state);
            self.state = state;
        }
    }
}

impl<F: SessionFactory> Drop for SessionController<F> {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn frame_kind(frame: &OutboundFrame) -> &'static str {
    match frame {
        OutboundFrame::Data(_) => "data",
        OutboundFrame::Control(_) => "control",
    }
}

#[cfg(test)]
pub(crate) mod testing;

#[cfg(test)]
mod tests;
