//! Transport channel to the terminal relay.
//!
//! A [`Transport`] is a message-oriented, full-duplex connection. All of its
//! outcomes are reported asynchronously through the [`EventSink`] it is
//! opened with; none of its methods fail synchronously.
//!
//! # Architecture
//!
//! ```text
//! RelayTarget + SessionConfig ──endpoint()──► Endpoint
//!                                               │
//! SessionController ──open(endpoint, sink)──► Transport ──► relay
//!        ▲                                      │
//!        └──── TransportOpen / Message / Error / Close ◄┘
//! ```
//!
//! [`Endpoint`] decides how credentials travel: either as query parameters
//! on the URL (the relay's legacy contract) or as a bearer header plus a
//! first `auth` frame, which keeps the password out of URLs and access logs.

pub mod websocket;

use std::time::Duration;

use url::Url;
use zeroize::Zeroizing;

use crate::config::{AuthMode, SessionConfig};
use crate::protocol::{auth_frame, OutboundFrame};
use crate::session::event::EventSink;

pub use websocket::WebSocketTransport;

/// A bidirectional message channel to the relay.
pub trait Transport: Send {
    /// Start connecting. Success is signalled by `TransportOpen`, failure by
    /// `TransportError`.
    fn open(&mut self, endpoint: Endpoint, events: EventSink);

    /// Queue a frame. Dropped silently once the transport is closed.
    fn send(&mut self, frame: OutboundFrame);

    /// Close the channel. Safe to call repeatedly or before `open`.
    fn close(&mut self);
}

/// Failure to build a connection target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointError(pub String);

impl std::fmt::Display for EndpointError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid relay endpoint: {}", self.0)
    }
}

impl std::error::Error for EndpointError {}

/// Where and how to reach the relay, independent of any one login.
#[derive(Debug, Clone)]
pub struct RelayTarget {
    /// Terminal endpoint URL (`ws://` or `wss://`).
    pub url: String,
    /// Credential transport.
    pub auth_mode: AuthMode,
    /// Handshake timeout.
    pub connect_timeout: Duration,
}

impl RelayTarget {
    /// Target from loaded settings.
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self {
            url: config.relay_ws_url(),
            auth_mode: config.auth_mode,
            connect_timeout: config.connect_timeout(),
        }
    }

    /// Combine with one login into a connection target.
    pub fn endpoint(&self, credentials: &SessionConfig) -> Result<Endpoint, EndpointError> {
        Endpoint::build(&self.url, self.auth_mode, credentials, self.connect_timeout)
    }
}

/// A fully-resolved connection target.
///
/// Holds credentials, so every buffer is zeroed on drop and `Debug` only
/// shows the redacted form.
pub struct Endpoint {
    url: Zeroizing<String>,
    redacted: String,
    headers: Vec<(String, Zeroizing<String>)>,
    auth_frame: Option<Zeroizing<String>>,
    connect_timeout: Duration,
}

impl Endpoint {
    /// Build the target for `credentials` against `relay_url`.
    pub fn build(
        relay_url: &str,
        mode: AuthMode,
        credentials: &SessionConfig,
        connect_timeout: Duration,
    ) -> Result<Self, EndpointError> {
        let base = Url::parse(relay_url).map_err(|e| EndpointError(format!("{relay_url}: {e}")))?;
        if !matches!(base.scheme(), "ws" | "wss") {
            return Err(EndpointError(format!(
                "{relay_url}: expected a ws:// or wss:// URL"
            )));
        }

        match mode {
            AuthMode::Query => {
                let url = with_query(&base, credentials, &credentials.secret, &credentials.token);
                let redacted = with_query(&base, credentials, "***", "***");
                Ok(Self {
                    url: Zeroizing::new(url),
                    redacted,
                    headers: Vec::new(),
                    auth_frame: None,
                    connect_timeout,
                })
            }
            AuthMode::Frame => {
                let mut headers = Vec::new();
                if !credentials.token.is_empty() {
                    headers.push((
                        "Authorization".to_string(),
                        Zeroizing::new(format!("Bearer {}", credentials.token)),
                    ));
                }
                Ok(Self {
                    url: Zeroizing::new(base.to_string()),
                    redacted: base.to_string(),
                    headers,
                    auth_frame: Some(auth_frame(credentials)),
                    connect_timeout,
                })
            }
        }
    }

    /// URL to dial, including any credentials.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// URL with secrets masked, for logs.
    pub fn redacted(&self) -> &str {
        &self.redacted
    }

    /// Extra handshake headers.
    pub fn headers(&self) -> Vec<(&str, &str)> {
        self.headers
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect()
    }

    /// First frame to send after the handshake, if any.
    pub fn auth_frame(&self) -> Option<&str> {
        self.auth_frame.as_deref().map(String::as_str)
    }

    /// Handshake timeout.
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("url", &self.redacted)
            .field("headers", &self.headers.iter().map(|(k, _)| k).collect::<Vec<_>>())
            .field("auth_frame", &self.auth_frame.is_some())
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

fn with_query(base: &Url, credentials: &SessionConfig, secret: &str, token: &str) -> String {
    let mut url = base.clone();
    url.query_pairs_mut()
        .append_pair("host", &credentials.host)
        .append_pair("username", &credentials.username)
        .append_pair("password", secret)
        .append_pair("token", token);
    url.to_string()
}
