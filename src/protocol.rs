//! Wire format between the client and the terminal relay.
//!
//! The relay shares a single WebSocket between raw shell bytes and
//! structured control messages. Inside the crate every outbound message is
//! an [`OutboundFrame`], so the two kinds can never be confused locally;
//! on the wire they keep the relay's existing shape:
//!
//! ```text
//! Data(bytes)            → text frame (binary if not UTF-8), no envelope
//! Control(Resize)        → text frame {"type":"resize","cols":N,"rows":M}
//! auth (first frame)     → text frame {"type":"auth","host":..,"username":..,"password":..}
//! ```
//!
//! Inbound frames carry no discriminator at all: everything the relay sends
//! is screen output, and failures are only recognisable by their text (see
//! [`crate::classify`]).

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::config::SessionConfig;
use crate::constants::{ANSI_RED, ANSI_RESET, CRLF};

/// Structured out-of-band message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ControlFrame {
    /// Terminal viewport changed size.
    Resize {
        /// Character columns.
        cols: u16,
        /// Character rows.
        rows: u16,
    },
}

impl ControlFrame {
    /// Serialize to the JSON text sent on the wire.
    pub fn to_json(&self) -> String {
        // Integer fields only; serialization is infallible.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Anything the client sends after the channel is open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    /// Keystroke bytes, forwarded verbatim.
    Data(Vec<u8>),
    /// Structured control message.
    Control(ControlFrame),
}

/// Encoded form of an [`OutboundFrame`], ready for a WebSocket writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireMessage {
    /// Text frame.
    Text(String),
    /// Binary frame.
    Binary(Vec<u8>),
}

impl OutboundFrame {
    /// Encode for the wire.
    ///
    /// Data goes out as a text frame when it is valid UTF-8 (what the relay
    /// has always received from keyboards) and as a binary frame otherwise,
    /// so no byte is ever rewritten.
    pub fn to_wire(&self) -> WireMessage {
        match self {
            Self::Data(bytes) => match std::str::from_utf8(bytes) {
                Ok(text) => WireMessage::Text(text.to_string()),
                Err(_) => WireMessage::Binary(bytes.clone()),
            },
            Self::Control(frame) => WireMessage::Text(frame.to_json()),
        }
    }
}

#[derive(Serialize)]
struct AuthFrame<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    host: &'a str,
    username: &'a str,
    password: &'a str,
}

/// JSON for the first frame sent in frame-auth mode.
///
/// The buffer is zeroed when dropped.
pub fn auth_frame(config: &SessionConfig) -> Zeroizing<String> {
    let frame = AuthFrame {
        kind: "auth",
        host: &config.host,
        username: &config.username,
        password: &config.secret,
    };
    Zeroizing::new(serde_json::to_string(&frame).unwrap_or_default())
}

/// Wrap relay failure text the way the terminal shows errors: red, reset,
/// then a line break.
pub fn highlight_error(text: &str) -> String {
    format!("{ANSI_RED}{text}{ANSI_RESET}{CRLF}")
}
