//! The single consumer loop that drives a [`SessionController`].
//!
//! Events are drained in batches: the loop waits for one, then takes
//! whatever else is already queued (up to [`BATCH_LIMIT`]). Within a batch,
//! runs of resize events collapse to the last one, so a burst of `SIGWINCH`
//! produces one control frame instead of many.
//!
//! The runner also owns the detach key. The byte is consumed locally and
//! never reaches the relay.

use std::future::Future;

use super::{EventKind, EventReceiver, Notice, SessionController, SessionEvent, SessionFactory};

/// Most events handled per wakeup.
const BATCH_LIMIT: usize = 64;

/// Run `controller` until its session ends.
///
/// Returns the notice for how it ended: from the controller itself, from the
/// detach key, or [`Notice::Terminated`] when `shutdown` resolves first.
pub async fn drive<F, S>(
    controller: &mut SessionController<F>,
    events: &mut EventReceiver,
    detach_key: Option<u8>,
    shutdown: S,
) -> Notice
where
    F: SessionFactory,
    S: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut batch = Vec::with_capacity(BATCH_LIMIT);

    loop {
        // The controller holds a sender, so `recv` never yields `None` here.
        let first = tokio::select! {
            () = &mut shutdown => {
                log::info!("[session] shutdown requested");
                controller.disconnect();
                return Notice::Terminated;
            }
            Some(event) = events.recv() => event,
        };

        batch.push(first);
        while batch.len() < BATCH_LIMIT {
            match events.try_recv() {
                Ok(event) => batch.push(event),
                Err(_) => break,
            }
        }

        for event in coalesce_resizes(batch.drain(..)) {
            if let Some(notice) = dispatch(controller, event, detach_key) {
                return notice;
            }
        }
    }
}

fn dispatch<F: SessionFactory>(
    controller: &mut SessionController<F>,
    event: SessionEvent,
    detach_key: Option<u8>,
) -> Option<Notice> {
    let current = event.session == controller.session_id() && controller.is_live();
    let detach_at = match (&event.kind, detach_key) {
        (EventKind::SurfaceInput(bytes), Some(key)) if current => {
            bytes.iter().position(|b| *b == key)
        }
        _ => None,
    };

    let Some(at) = detach_at else {
        return controller.handle(event);
    };

    if let EventKind::SurfaceInput(mut bytes) = event.kind {
        bytes.truncate(at);
        if !bytes.is_empty() {
            controller.handle(SessionEvent {
                session: event.session,
                kind: EventKind::SurfaceInput(bytes),
            });
        }
    }
    log::info!("[session] detach key pressed");
    controller.disconnect();
    Some(Notice::Detached)
}

/// Collapse consecutive resize events from one session to the last of each run.
pub(crate) fn coalesce_resizes<I>(events: I) -> Vec<SessionEvent>
where
    I: IntoIterator<Item = SessionEvent>,
{
    let mut out: Vec<SessionEvent> = Vec::new();
    for event in events {
        if matches!(event.kind, EventKind::SurfaceResize(_)) {
            if let Some(last) = out.last_mut() {
                if last.session == event.session && matches!(last.kind, EventKind::SurfaceResize(_)) {
                    *last = event;
                    continue;
                }
            }
        }
        out.push(event);
    }
    out
}

/// Production collaborators: a WebSocket to the relay and the local TTY.
#[cfg(unix)]
#[derive(Debug, Default)]
pub struct RelayFactory;

#[cfg(unix)]
impl SessionFactory for RelayFactory {
    type Transport = crate::transport::WebSocketTransport;
    type Surface = crate::surface::ConsoleSurface;

    fn create_transport(&mut self) -> Self::Transport {
        crate::transport::WebSocketTransport::new()
    }

    fn create_surface(&mut self) -> Self::Surface {
        crate::surface::ConsoleSurface::new()
    }
}
