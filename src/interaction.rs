// Acting on a live session while it is captured

use std::sync::Arc;

use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use rustix::termios::{tcsetwinsize, Winsize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::pty::{SessionShared, RETRY_BACKOFF};

/// Handle given to interaction handlers. Resizes and writes are serialized
/// per session, so concurrent calls never interleave mid-operation. Once the
/// helper has exited, every call is a silent no-op.
#[derive(Clone)]
pub struct Interaction {
    shared: Arc<SessionShared>,
}

impl Interaction {
    pub(crate) fn new(shared: Arc<SessionShared>) -> Self {
        Interaction { shared }
    }

    pub fn pid(&self) -> Pid {
        self.shared.pid
    }

    pub fn is_running(&self) -> bool {
        self.shared.lock().is_live()
    }

    /// Set the pty window size and notify the helper's process group.
    pub async fn resize(&self, rows: u16, cols: u16) -> Result<()> {
        let _exclusive = self.shared.exclusive.lock().await;
        let control = self.shared.lock();
        let master = match control.live_master() {
            Some(master) => master,
            None => return Ok(()),
        };

        let winsize = Winsize {
            ws_row: rows,
            ws_col: cols,
            ws_xpixel: 0,
            ws_ypixel: 0,
        };
        tcsetwinsize(master, winsize).map_err(Error::Resize)?;

        if let Err(e) = killpg(self.shared.pid, Signal::SIGWINCH) {
            warn!(pid = self.shared.pid.as_raw(), "failed to deliver SIGWINCH: {}", e);
        }

        debug!(rows, cols, "resized pty");
        Ok(())
    }

    /// Write raw bytes (keystrokes, escape sequences) to the helper's input.
    ///
    /// A helper that stops reading fills the pty input queue; the write then
    /// waits without holding the control lock, and gives up silently once
    /// the helper exits.
    pub async fn send(&self, bytes: impl AsRef<[u8]>) -> Result<()> {
        let bytes = bytes.as_ref();
        if bytes.is_empty() {
            return Ok(());
        }

        let _exclusive = self.shared.exclusive.lock().await;
        let mut offset = 0;
        while offset < bytes.len() {
            match self.shared.write_live(&bytes[offset..]) {
                None => {
                    debug!(unsent = bytes.len() - offset, "helper gone, dropping input");
                    return Ok(());
                }
                Some(Ok(n)) => offset += n,
                Some(Err(Errno::EINTR)) => continue,
                Some(Err(Errno::EAGAIN)) => tokio::time::sleep(RETRY_BACKOFF).await,
                Some(Err(e)) => return Err(Error::Write(e)),
            }
        }

        debug!(bytes = bytes.len(), "sent input");
        Ok(())
    }

    /// Send an SGR mouse report: `ESC [ < button ; x ; y M`, or `m` on release.
    /// Coordinates are 1-based, as the protocol defines them.
    pub async fn send_mouse(&self, button: u32, x: u32, y: u32, released: bool) -> Result<()> {
        self.send(mouse_report(button, x, y, released)).await
    }
}

pub fn mouse_report(button: u32, x: u32, y: u32, released: bool) -> String {
    let suffix = if released { 'm' } else { 'M' };
    format!("\x1b[<{};{};{}{}", button, x, y, suffix)
}
