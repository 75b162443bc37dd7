//! Shell Relay - interactive remote shell over a WebSocket terminal relay.
//!
//! This crate connects the local terminal to a remote SSH shell proxied by a
//! relay service: keystrokes and viewport changes go up, shell output comes
//! back down and is rendered untouched.
//!
//! # Architecture
//!
//! The crate follows a single-consumer event loop pattern:
//!
//! - **Session** - Controller state machine, owns the live collaborators
//! - **Transport** - WebSocket channel to the relay (one tokio task each)
//! - **Surface** - The local TTY (raw mode, stdin pump, SIGWINCH watcher)
//!
//! Collaborators never call the controller. They report through one event
//! channel and [`session::runner::drive`] applies events in arrival order.
//!
//! # Modules
//!
//! - [`session`] - State machine, events, notices, event loop
//! - [`transport`] - Connection targets and the WebSocket transport
//! - [`surface`] - Terminal surface trait and the console implementation
//! - [`classify`] - Fatal relay failure detection
//! - [`protocol`] - Wire formats
//! - [`config`] - Configuration loading/saving and login validation

// Library modules
pub mod classify;
pub mod protocol;
pub mod session;
pub mod surface;
pub mod transport;
pub mod ws;

pub mod config;
pub mod constants;
pub mod env;

// Re-export commonly used types
pub use classify::{FatalMarkers, RelayFailure};
pub use config::{AuthMode, Config, ConfigError, SessionConfig};
pub use session::{ConnectionState, Notice, SessionController, SessionError};
pub use transport::RelayTarget;
