//! Application-wide constants for shell-relay.
//!
//! Groups the protocol numbers, marker strings and timings the session
//! layer depends on, so they can be found in one place.
//!
//! # Categories
//!
//! - **Close codes**: WebSocket close codes with special meaning
//! - **Relay markers**: substrings the relay embeds in output on fatal failures
//! - **ANSI**: escape sequences used when echoing failures to the terminal
//! - **Timing**: handshake and polling intervals

use std::time::Duration;

// ============================================================================
// Close codes
// ============================================================================

/// Orderly close (RFC 6455 "normal closure").
pub const CLOSE_NORMAL: u16 = 1000;

/// Close frame arrived without a status code.
pub const CLOSE_NO_STATUS: u16 = 1005;

/// Connection dropped without a close handshake.
///
/// Never sent on the wire; reported locally when the stream ends or the
/// socket errors out before a close frame is seen.
pub const CLOSE_ABNORMAL: u16 = 1006;

// ============================================================================
// Relay markers
// ============================================================================

/// Substrings the relay writes into the output stream when the backend
/// cannot continue. The first three are the ones browser clients have
/// always watched for; the rest are the relay's other dial/setup failures,
/// each of which is followed by the relay dropping the shell.
pub const FATAL_MARKERS: &[&str] = &[
    "SSH连接失败",
    "创建SSH会话失败",
    "启动shell失败",
    "SSH认证失败",
    "SSH连接被拒绝",
    "SSH连接超时",
    "SSH认证方法不支持",
    "请求伪终端失败",
    "错误: 未提供",
];

// ============================================================================
// ANSI
// ============================================================================

/// Red foreground.
pub const ANSI_RED: &str = "\x1b[31m";

/// Reset all attributes.
pub const ANSI_RESET: &str = "\x1b[0m";

/// Terminal line break (raw mode does not translate `\n`).
pub const CRLF: &str = "\r\n";

// ============================================================================
// Timing
// ============================================================================

/// Default WebSocket handshake timeout.
///
/// The relay itself gives the SSH dial 30 seconds; the client waits the same.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// How long the stdin pump blocks in `poll(2)` before re-checking its stop flag.
pub const STDIN_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Read buffer size for the stdin pump.
pub const STDIN_READ_CHUNK: usize = 1024;

// ============================================================================
// Keys
// ============================================================================

/// Default local detach key (Ctrl-]).
pub const DEFAULT_DETACH_KEY: u8 = 0x1d;
