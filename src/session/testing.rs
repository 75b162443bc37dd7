//! Recording collaborators for controller tests.
//!
//! Every mock call lands in one shared [`Journal`], so tests can assert on
//! the relative order of transport and surface calls. Repeated `close` and
//! `dispose` calls are recorded too, so "exactly once" is checkable.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::event::{EventKind, EventSink, SessionId};
use super::SessionFactory;
use crate::config::{AuthMode, SessionConfig};
use crate::protocol::OutboundFrame;
use crate::surface::{TerminalSurface, Viewport};
use crate::transport::{Endpoint, RelayTarget, Transport};

/// One recorded collaborator call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Open { session: SessionId, url: String },
    Send(OutboundFrame),
    Close,
    Attach(SessionId),
    Write(Vec<u8>),
    Clear,
    Focus,
    Dispose,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Journal(Arc<Mutex<Vec<Call>>>);

impl Journal {
    fn push(&self, call: Call) {
        self.0.lock().unwrap().push(call);
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.0.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }

    pub(crate) fn sent(&self) -> Vec<OutboundFrame> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Send(frame) => Some(frame),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn written(&self) -> Vec<u8> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Write(bytes) => Some(bytes),
                _ => None,
            })
            .flatten()
            .collect()
    }

    pub(crate) fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

/// Sinks handed to opened transports, so tests can play the relay.
pub(crate) type Sinks = Arc<Mutex<Vec<EventSink>>>;

#[derive(Debug)]
pub(crate) struct MockTransport {
    journal: Journal,
    sinks: Sinks,
    closed: bool,
}

impl Transport for MockTransport {
    fn open(&mut self, endpoint: Endpoint, events: EventSink) {
        self.journal.push(Call::Open {
            session: events.session(),
            url: endpoint.url().to_string(),
        });
        self.sinks.lock().unwrap().push(events);
    }

    fn send(&mut self, frame: OutboundFrame) {
        if !self.closed {
            self.journal.push(Call::Send(frame));
        }
    }

    fn close(&mut self) {
        self.closed = true;
        self.journal.push(Call::Close);
    }
}

#[derive(Debug)]
pub(crate) struct MockSurface {
    journal: Journal,
    fail_attach: bool,
    viewport: Option<Viewport>,
}

impl TerminalSurface for MockSurface {
    fn attach(&mut self, events: EventSink) -> anyhow::Result<()> {
        if self.fail_attach {
            anyhow::bail!("no tty");
        }
        self.journal.push(Call::Attach(events.session()));
        self.viewport = Some(Viewport::new(80, 24));
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) {
        self.journal.push(Call::Write(bytes.to_vec()));
    }

    fn clear(&mut self) {
        self.journal.push(Call::Clear);
    }

    fn focus(&mut self) {
        self.journal.push(Call::Focus);
    }

    fn dispose(&mut self) {
        self.viewport = None;
        self.journal.push(Call::Dispose);
    }

    fn viewport(&self) -> Option<Viewport> {
        self.viewport
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct MockFactory {
    pub(crate) journal: Journal,
    pub(crate) sinks: Sinks,
    pub(crate) fail_attach: bool,
}

impl SessionFactory for MockFactory {
    type Transport = MockTransport;
    type Surface = MockSurface;

    fn create_transport(&mut self) -> MockTransport {
        MockTransport {
            journal: self.journal.clone(),
            sinks: Arc::clone(&self.sinks),
            closed: false,
        }
    }

    fn create_surface(&mut self) -> MockSurface {
        MockSurface {
            journal: self.journal.clone(),
            fail_attach: self.fail_attach,
            viewport: None,
        }
    }
}

pub(crate) const RELAY: &str = "ws://relay.test/api/terminal/ws";

pub(crate) fn target(auth_mode: AuthMode) -> RelayTarget {
    RelayTarget {
        url: RELAY.to_string(),
        auth_mode,
        connect_timeout: Duration::from_secs(5),
    }
}

pub(crate) fn login() -> SessionConfig {
    SessionConfig::new("10.0.0.5", "root", "pw", "")
}

pub(crate) fn event(session: SessionId, kind: EventKind) -> super::SessionEvent {
    super::SessionEvent { session, kind }
}
