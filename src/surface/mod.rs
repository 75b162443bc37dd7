//! Terminal surface: the local end of the remote shell.
//!
//! A [`TerminalSurface`] renders bytes from the relay and reports what the
//! operator does to it (keystrokes, viewport resizes) through the
//! [`EventSink`] it was attached with. Escape sequences are the surface's
//! business; the session layer never looks inside output bytes except to
//! classify relay failures.

#[cfg(unix)]
pub mod console;

use crate::session::event::EventSink;

#[cfg(unix)]
pub use console::ConsoleSurface;

/// Character-grid size of a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Viewport {
    /// Columns.
    pub cols: u16,
    /// Rows.
    pub rows: u16,
}

impl Viewport {
    /// A `cols` × `rows` viewport.
    pub fn new(cols: u16, rows: u16) -> Self {
        Self { cols, rows }
    }
}

impl std::fmt::Display for Viewport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.cols, self.rows)
    }
}

/// A terminal emulator the session can drive.
///
/// `write` must render bytes exactly in call order. `onInput` and `onResize`
/// notifications go through the sink as `SurfaceInput` / `SurfaceResize`,
/// unthrottled.
pub trait TerminalSurface: Send {
    /// Bind to the rendering target and start reporting events.
    ///
    /// Calling again first disposes the previous binding.
    fn attach(&mut self, events: EventSink) -> anyhow::Result<()>;

    /// Render output bytes.
    fn write(&mut self, bytes: &[u8]);

    /// Clear the screen.
    fn clear(&mut self);

    /// Take input focus.
    fn focus(&mut self);

    /// Release everything. Safe to call on a disposed surface.
    fn dispose(&mut self);

    /// Current viewport, if attached.
    fn viewport(&self) -> Option<Viewport>;
}
