//! Terminal surface bound to the process's controlling TTY.
//!
//! The local terminal emulator does the rendering; this adapter only moves
//! bytes. Output is written to stdout untouched, keystrokes are read from
//! fd 0 as raw bytes, and viewport changes are picked up from `SIGWINCH`.
//!
//! # Threads
//!
//! ```text
//! surface-stdin  poll(fd 0) → read → SurfaceInput(bytes), SurfaceClosed on EOF
//! surface-winch  SIGWINCH   → terminal::size() → SurfaceResize(viewport)
//! ```
//!
//! Both threads stop on `dispose`. The stdin pump never blocks longer than
//! [`STDIN_POLL_INTERVAL`] so it notices the stop flag promptly and does
//! not swallow keystrokes meant for whatever runs after the session.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::{Context, Result};
use crossterm::{
    cursor, execute,
    terminal::{self, Clear, ClearType},
};
use signal_hook::consts::signal::SIGWINCH;
use signal_hook::iterator::Signals;

use super::{TerminalSurface, Viewport};
use crate::constants::{STDIN_POLL_INTERVAL, STDIN_READ_CHUNK};
use crate::session::event::{EventKind, EventSink};

/// Live binding to the TTY.
struct Binding {
    stop: Arc<AtomicBool>,
    winch: signal_hook::iterator::Handle,
    threads: Vec<JoinHandle<()>>,
}

/// The controlling terminal as a [`TerminalSurface`].
#[derive(Default)]
pub struct ConsoleSurface {
    binding: Option<Binding>,
}

impl std::fmt::Debug for ConsoleSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleSurface")
            .field("attached", &self.binding.is_some())
            .finish()
    }
}

impl ConsoleSurface {
    /// An unattached surface.
    pub fn new() -> Self {
        Self::default()
    }

    fn bind(events: &EventSink) -> Result<Binding> {
        let stop = Arc::new(AtomicBool::new(false));

        let mut signals = Signals::new([SIGWINCH]).context("failed to watch SIGWINCH")?;
        let winch = signals.handle();

        let resize_events = events.clone();
        let mut last = current_viewport();
        let winch_thread = std::thread::Builder::new()
            .name("surface-winch".to_string())
            .spawn(move || {
                for _ in signals.forever() {
                    let Some(viewport) = current_viewport() else {
                        continue;
                    };
                    if last == Some(viewport) {
                        continue;
                    }
                    last = Some(viewport);
                    log::debug!("[surface] viewport {viewport}");
                    if !resize_events.emit(EventKind::SurfaceResize(viewport)) {
                        break;
                    }
                }
            });
        let winch_thread = match winch_thread {
            Ok(thread) => thread,
            Err(e) => {
                winch.close();
                return Err(e).context("failed to spawn SIGWINCH thread");
            }
        };

        let input_events = events.clone();
        let input_stop = Arc::clone(&stop);
        let stdin_thread = std::thread::Builder::new()
            .name("surface-stdin".to_string())
            .spawn(move || pump_stdin(&input_events, &input_stop));
        let stdin_thread = match stdin_thread {
            Ok(thread) => thread,
            Err(e) => {
                winch.close();
                let _ = winch_thread.join();
                return Err(e).context("failed to spawn stdin thread");
            }
        };

        Ok(Binding {
            stop,
            winch,
            threads: vec![winch_thread, stdin_thread],
        })
    }
}

impl TerminalSurface for ConsoleSurface {
    fn attach(&mut self, events: EventSink) -> Result<()> {
        self.dispose();

        terminal::enable_raw_mode().context("failed to enable raw mode")?;
        match Self::bind(&events) {
            Ok(binding) => {
                log::info!("[surface] attached for session {}", events.session());
                self.binding = Some(binding);
                Ok(())
            }
            Err(e) => {
                let _ = terminal::disable_raw_mode();
                Err(e)
            }
        }
    }

    fn write(&mut self, bytes: &[u8]) {
        let mut out = io::stdout().lock();
        if let Err(e) = out.write_all(bytes).and_then(|()| out.flush()) {
            log::warn!("[surface] write failed: {e}");
        }
    }

    fn clear(&mut self) {
        if let Err(e) = execute!(io::stdout(), Clear(ClearType::All), cursor::MoveTo(0, 0)) {
            log::warn!("[surface] clear failed: {e}");
        }
    }

    fn focus(&mut self) {
        if let Err(e) = execute!(io::stdout(), cursor::Show) {
            log::warn!("[surface] focus failed: {e}");
        }
    }

    fn dispose(&mut self) {
        let Some(binding) = self.binding.take() else {
            return;
        };

        binding.stop.store(true, Ordering::Relaxed);
        binding.winch.close();
        for thread in binding.threads {
            if thread.join().is_err() {
                log::warn!("[surface] worker thread panicked");
            }
        }

        if let Err(e) = terminal::disable_raw_mode() {
            log::warn!("[surface] failed to leave raw mode: {e}");
        }
        let _ = execute!(io::stdout(), cursor::Show);
        log::info!("[surface] disposed");
    }

    fn viewport(&self) -> Option<Viewport> {
        self.binding.as_ref().and_then(|_| current_viewport())
    }
}

impl Drop for ConsoleSurface {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn current_viewport() -> Option<Viewport> {
    terminal::size()
        .ok()
        .map(|(cols, rows)| Viewport::new(cols, rows))
}

/// Forward raw stdin bytes until `stop` is set or stdin dies.
///
/// Reads fd 0 directly with `poll` + `read` so bytes reach the relay exactly
/// as the local terminal produced them, escape sequences included.
fn pump_stdin(events: &EventSink, stop: &AtomicBool) {
    pump_fd(libc::STDIN_FILENO, events, stop);
}

/// Forward bytes read from `fd` as `SurfaceInput` until `stop` is set.
///
/// If the fd reaches EOF or fails first, a `SurfaceClosed` event carries the
/// reason so the session ends instead of waiting on input that never comes.
fn pump_fd(fd: libc::c_int, events: &EventSink, stop: &AtomicBool) {
    let mut buf = [0u8; STDIN_READ_CHUNK];
    let timeout_ms = STDIN_POLL_INTERVAL.as_millis() as libc::c_int;

    let reason = loop {
        if stop.load(Ordering::Relaxed) {
            return;
        }

        let mut pollfd = libc::pollfd {
            fd,
            events: libc::POLLIN,
            revents: 0,
        };

        // SAFETY: `pollfd` is a single valid, exclusively borrowed pollfd.
        let ready = unsafe { libc::poll(&mut pollfd, 1, timeout_ms) };
        if ready < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            break format!("stdin poll failed: {err}");
        }
        if ready == 0 {
            continue;
        }
        // POLLHUP alongside POLLIN still has bytes to read first.
        if pollfd.revents & libc::POLLIN == 0 {
            if pollfd.revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0 {
                break format!("stdin closed (revents=0x{:x})", pollfd.revents);
            }
            continue;
        }
        if stop.load(Ordering::Relaxed) {
            return;
        }

        // SAFETY: `buf` is valid for writes of `buf.len()` bytes.
        let n = unsafe { libc::read(fd, buf.as_mut_ptr().cast::<libc::c_void>(), buf.len()) };
        if n == 0 {
            break "stdin EOF".to_string();
        }
        if n < 0 {
            let err = io::Error::last_os_error();
            if matches!(
                err.kind(),
                io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
            ) {
                continue;
            }
            break format!("stdin read failed: {err}");
        }

        if !events.emit(EventKind::SurfaceInput(buf[..n as usize].to_vec())) {
            return;
        }
    };

    if stop.load(Ordering::Relaxed) {
        return;
    }
    log::error!("[surface] {reason}");
    events.emit(EventKind::SurfaceClosed(reason));
}
