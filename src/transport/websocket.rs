//! WebSocket [`Transport`] to the terminal relay.
//!
//! # Threading Model
//!
//! `open()` spawns one tokio task per connection on the current runtime.
//! The task owns both WebSocket halves: it reports inbound frames as
//! `SessionEvent`s and listens on an `mpsc` channel for outgoing frames.
//! Because a single task does both, outbound frames hit the wire in the
//! order they were queued and inbound frames are reported in the order they
//! arrived.
//!
//! Close travels on its own `oneshot`, checked before anything else on
//! every wakeup. Frames still queued when it fires are discarded, not
//! flushed; at most the one frame already being written completes.
//!
//! # Close semantics
//!
//! | Situation | Reported as |
//! |---|---|
//! | handshake fails / times out | `TransportError` |
//! | relay sends a close frame | `TransportClose { code, reason }` |
//! | stream ends or errors without a close frame | `TransportClose { code: 1006 }` |
//! | a send fails | `TransportError` |
//! | local `close()` | nothing (the caller already knows) |

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::{Endpoint, Transport};
use crate::constants::{CLOSE_ABNORMAL, CLOSE_NORMAL};
use crate::protocol::{OutboundFrame, WireMessage};
use crate::session::event::{EventKind, EventSink};
use crate::ws::{self, WsMessage, WsReader, WsWriter};

#[derive(Debug)]
struct Connection {
    outgoing: mpsc::UnboundedSender<OutboundFrame>,
    close: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// A WebSocket connection to the relay, driven by a background task.
#[derive(Debug, Default)]
pub struct WebSocketTransport {
    connection: Option<Connection>,
}

impl WebSocketTransport {
    /// An unopened transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `open` was called and `close` was not.
    pub fn is_open(&self) -> bool {
        self.connection
            .as_ref()
            .is_some_and(|c| !c.task.is_finished())
    }
}

impl Transport for WebSocketTransport {
    fn open(&mut self, endpoint: Endpoint, events: EventSink) {
        if self.connection.is_some() {
            log::warn!("[transport] open() on an open transport; closing the old connection");
            self.close();
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                events.emit(EventKind::TransportError(format!("no async runtime: {e}")));
                return;
            }
        };

        log::info!(
            "[transport] session {} connecting to {}",
            events.session(),
            endpoint.redacted()
        );

        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let (close, close_rx) = oneshot::channel();
        let task = runtime.spawn(run_connection(endpoint, events, outgoing_rx, close_rx));
        self.connection = Some(Connection {
            outgoing,
            close,
            task,
        });
    }

    fn send(&mut self, frame: OutboundFrame) {
        match &self.connection {
            Some(connection) => {
                if connection.outgoing.send(frame).is_err() {
                    log::debug!("[transport] send after connection ended; dropped");
                }
            }
            None => log::debug!("[transport] send on closed transport; dropped"),
        }
    }

    fn close(&mut self) {
        if let Some(connection) = self.connection.take() {
            // The task sends the close frame itself; if it already exited
            // there is nothing left to close.
            let _ = connection.close.send(());
        }
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        self.close();
    }
}

async fn run_connection(
    endpoint: Endpoint,
    events: EventSink,
    outgoing: mpsc::UnboundedReceiver<OutboundFrame>,
    mut close: oneshot::Receiver<()>,
) {
    let headers = endpoint.headers();
    let handshake = tokio::time::timeout(
        endpoint.connect_timeout(),
        ws::connect(endpoint.url(), &headers),
    );

    let (mut writer, mut reader) = tokio::select! {
        biased;
        _ = &mut close => {
            log::debug!("[transport] closed during handshake");
            return;
        }
        result = handshake => match result {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => {
                log::warn!("[transport] handshake failed: {e:#}");
                events.emit(EventKind::TransportError(format!("{e:#}")));
                return;
            }
            Err(_) => {
                log::warn!("[transport] handshake timed out");
                events.emit(EventKind::TransportError(format!(
                    "connection timed out after {}s",
                    endpoint.connect_timeout().as_secs()
                )));
                return;
            }
        },
    };
    drop(headers);

    if let Some(auth) = endpoint.auth_frame() {
        if let Err(e) = writer.send_text(auth).await {
            events.emit(EventKind::TransportError(format!("{e:#}")));
            return;
        }
    }
    drop(endpoint);

    log::info!("[transport] session {} open", events.session());
    if !events.emit(EventKind::TransportOpen) {
        let _ = writer.send_close(CLOSE_NORMAL, "").await;
        return;
    }

    pump(&mut writer, &mut reader, &events, outgoing, close).await;
}

/// Relay frames both ways until either side ends the connection.
async fn pump(
    writer: &mut WsWriter,
    reader: &mut WsReader,
    events: &EventSink,
    mut outgoing: mpsc::UnboundedReceiver<OutboundFrame>,
    mut close: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            biased;
            _ = &mut close => {
                let pending = outgoing.len();
                drop(outgoing);
                log::info!(
                    "[transport] session {} closing, {pending} queued frame(s) discarded",
                    events.session()
                );
                let _ = writer.send_close(CLOSE_NORMAL, "").await;
                let _ = writer.close().await;
                return;
            }
            frame = reader.recv() => {
                let kind = match frame {
                    Some(Ok(WsMessage::Text(text))) => EventKind::TransportMessage(text.into_bytes()),
                    Some(Ok(WsMessage::Binary(data))) => EventKind::TransportMessage(data),
                    Some(Ok(WsMessage::Heartbeat)) => continue,
                    Some(Ok(WsMessage::Close { code, reason })) => {
                        log::info!("[transport] relay closed ({code}) {reason}");
                        events.emit(EventKind::TransportClose { code, reason });
                        return;
                    }
                    Some(Err(e)) => {
                        log::warn!("[transport] read failed: {e:#}");
                        events.emit(EventKind::TransportClose {
                            code: CLOSE_ABNORMAL,
                            reason: format!("{e:#}"),
                        });
                        return;
                    }
                    None => {
                        log::warn!("[transport] stream ended without a close frame");
                        events.emit(EventKind::TransportClose {
                            code: CLOSE_ABNORMAL,
                            reason: "stream ended".to_string(),
                        });
                        return;
                    }
                };
                if !events.emit(kind) {
                    return;
                }
            }
            Some(frame) = outgoing.recv() => {
                let result = match frame.to_wire() {
                    WireMessage::Text(text) => writer.send_text(&text).await,
                    WireMessage::Binary(data) => writer.send_binary(&data).await,
                };
                if let Err(e) = result {
                    log::warn!("[transport] send failed: {e:#}");
                    events.emit(EventKind::TransportError(format!("{e:#}")));
                    return;
                }
            }
        }
    }
}
