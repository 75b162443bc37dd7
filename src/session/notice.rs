//! User-visible outcomes of a session.
//!
//! Every path that ends a session produces exactly one [`Notice`]. The
//! runner prints it after the terminal surface has been released, so it
//! lands on the operator's normal screen rather than inside the remote
//! shell's output.

use crate::classify::RelayFailure;
use crate::constants::CLOSE_ABNORMAL;

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// The transport reported an error (handshake failed, send failed).
    ConnectionError {
        /// Underlying cause.
        cause: String,
    },
    /// The channel dropped without a close handshake (code 1006).
    AbnormalClose {
        /// Local description of the drop, if any.
        reason: String,
    },
    /// The relay closed the channel in an orderly way.
    Closed {
        /// Close code.
        code: u16,
        /// Relay-supplied reason.
        reason: String,
    },
    /// The relay reported a backend failure inside the output stream.
    RelayFailure(RelayFailure),
    /// Local keyboard input ended, so the session could not continue.
    InputClosed {
        /// Why input ended.
        reason: String,
    },
    /// The operator pressed the detach key.
    Detached,
    /// The process was asked to stop.
    Terminated,
}

impl Notice {
    /// Notice for a close event with `code`.
    pub fn for_close(code: u16, reason: String) -> Self {
        if code == CLOSE_ABNORMAL {
            Self::AbnormalClose { reason }
        } else {
            Self::Closed { code, reason }
        }
    }

    /// Whether the session ended in failure.
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Self::ConnectionError { .. }
                | Self::AbnormalClose { .. }
                | Self::RelayFailure(_)
                | Self::InputClosed { .. }
        )
    }
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConnectionError { cause } => write!(
                f,
                "Connection error: unable to reach the terminal ({cause}). Check the relay service status."
            ),
            Self::AbnormalClose { .. } => write!(
                f,
                "Connection lost unexpectedly. Check the network connection or the server status."
            ),
            Self::Closed { reason, .. } if reason.is_empty() => write!(f, "Connection closed."),
            Self::Closed { reason, .. } => write!(f, "Connection closed: {reason}"),
            Self::RelayFailure(failure) => {
                write!(f, "Session ended by the relay ({}).", failure.marker)
            }
            Self::InputClosed { reason } => {
                write!(f, "Local terminal input ended ({reason}). Session closed.")
            }
            Self::Detached => write!(f, "Detached from session."),
            Self::Terminated => write!(f, "Session terminated."),
        }
    }
}
