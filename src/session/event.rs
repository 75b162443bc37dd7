//! Unified event channel for the session controller.
//!
//! Every collaborator (the transport task, the stdin pump, the SIGWINCH
//! watcher) reports through one `mpsc::UnboundedSender<SessionEvent>`. A
//! single consumer receives on the other end and runs the controller's
//! transition table one event at a time, so arrival order is processing
//! order.
//!
//! Each event is stamped with the [`SessionId`] of the session whose
//! collaborator produced it. The controller drops events from sessions it
//! has already torn down.

use tokio::sync::mpsc;

use crate::surface::Viewport;

/// Identifies one connect attempt within a controller's lifetime.
pub type SessionId = u64;

/// What happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// Transport handshake completed.
    TransportOpen,
    /// Transport delivered a frame from the relay.
    TransportMessage(Vec<u8>),
    /// Transport failed.
    TransportError(String),
    /// Transport closed.
    TransportClose {
        /// WebSocket close code (1006 = abnormal).
        code: u16,
        /// Close reason supplied by the relay.
        reason: String,
    },
    /// Surface produced keystroke bytes.
    SurfaceInput(Vec<u8>),
    /// Surface viewport changed size.
    SurfaceResize(Viewport),
    /// Surface input ended (EOF, or the input device failed).
    SurfaceClosed(String),
}

/// An [`EventKind`] stamped with the session that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEvent {
    /// Producing session.
    pub session: SessionId,
    /// Payload.
    pub kind: EventKind,
}

/// Receiving half of the event channel.
pub type EventReceiver = mpsc::UnboundedReceiver<SessionEvent>;

/// Sending half handed to a collaborator, bound to one session.
#[derive(Debug, Clone)]
pub struct EventSink {
    session: SessionId,
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl EventSink {
    /// Bind `tx` to `session`.
    pub fn new(session: SessionId, tx: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self { session, tx }
    }

    /// Session this sink reports for.
    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Deliver an event. Returns `false` once the consumer is gone, which
    /// producers treat as a signal to stop.
    pub fn emit(&self, kind: EventKind) -> bool {
        self.tx
            .send(SessionEvent {
                session: self.session,
                kind,
            })
            .is_ok()
    }
}
