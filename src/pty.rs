// PTY session manager
//
// Owns the pseudo-terminal pair and the helper process, drains the master
// side into a byte buffer and turns the result into a Snapshot.

use std::ffi::OsStr;
use std::future::Future;
use std::os::fd::{AsRawFd, BorrowedFd, OwnedFd};
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg, FdFlag, OFlag};
use nix::pty::{openpty, Winsize};
use nix::sys::signal::{killpg, Signal};
use nix::unistd::{read, setsid, write, Pid};
use tokio::task::{AbortHandle, JoinError, JoinHandle};
use tracing::{debug, trace, warn};

use crate::config::HelperCommand;
use crate::error::{Error, Result};
use crate::interaction::Interaction;
use crate::snapshot::Snapshot;

const READ_CHUNK: usize = 4096;

/// Pause before retrying a read or write that would have blocked.
pub(crate) const RETRY_BACKOFF: Duration = Duration::from_millis(10);

/// A freshly allocated pty pair, not yet attached to a process.
pub struct PtySession {
    master: OwnedFd,
    slave: OwnedFd,
    rows: u16,
    cols: u16,
}

impl PtySession {
    pub fn open(rows: u16, cols: u16) -> Result<Self> {
        let winsize = Winsize {
            ws_row: rows,
            ws_col: cols,
            ws_xpixel: 0,
            ws_ypixel: 0,
        };

        let pty = openpty(Some(&winsize), None).map_err(Error::Allocation)?;

        // The helper gets its own duplicates of the slave; neither original
        // descriptor may leak across exec.
        for fd in [&pty.master, &pty.slave] {
            fcntl(fd.as_raw_fd(), FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC)).map_err(Error::Allocation)?;
        }

        debug!(rows, cols, "opened pty");

        Ok(PtySession {
            master: pty.master,
            slave: pty.slave,
            rows,
            cols,
        })
    }

    pub fn rows(&self) -> u16 {
        self.rows
    }

    pub fn cols(&self) -> u16 {
        self.cols
    }

    /// Start the helper with stdin, stdout and stderr each on an independent
    /// duplicate of the slave, in a new session whose controlling terminal
    /// is the pty.
    pub fn spawn<I, K, V>(self, helper: &HelperCommand, envs: I) -> Result<RunningSession>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<OsStr>,
        V: AsRef<OsStr>,
    {
        let path = helper.resolve()?;

        let stdin = self.slave.try_clone().map_err(Error::Spawn)?;
        let stdout = self.slave.try_clone().map_err(Error::Spawn)?;
        let stderr = self.slave.try_clone().map_err(Error::Spawn)?;
        // Interaction handles write and resize through their own duplicate,
        // which the session drops when the capture ends.
        let control_master = self.master.try_clone().map_err(Error::Spawn)?;

        let mut command = Command::new(&path);
        command
            .args(&helper.args)
            .envs(envs)
            .stdin(Stdio::from(stdin))
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr));

        // SAFETY: only async-signal-safe calls between fork and exec.
        unsafe {
            command.pre_exec(|| {
                setsid()?;
                // stdin is the slave by now; make it the controlling terminal
                let tty = BorrowedFd::borrow_raw(0);
                rustix::process::ioctl_tiocsctty(tty)?;
                Ok(())
            });
        }

        let child = command.spawn().map_err(Error::Spawn)?;
        let pid = Pid::from_raw(child.id() as i32);

        debug!(pid = child.id(), path = %path.display(), "spawned helper");

        let shared = Arc::new(SessionShared {
            pid,
            control: Mutex::new(ControlState {
                running: true,
                closed: false,
                master: Some(control_master),
            }),
            exclusive: tokio::sync::Mutex::new(()),
        });

        Ok(RunningSession {
            child: ChildGuard {
                child,
                shared: Arc::clone(&shared),
            },
            shared,
            master: self.master,
            slave: self.slave,
            rows: self.rows,
            cols: self.cols,
        })
    }
}

/// State shared between the drain loop and interaction handles.
pub(crate) struct SessionShared {
    pub(crate) pid: Pid,
    control: Mutex<ControlState>,
    /// Held for the whole of one resize or send, so concurrent calls never
    /// interleave. The drain loop never takes it.
    pub(crate) exclusive: tokio::sync::Mutex<()>,
}

pub(crate) struct ControlState {
    running: bool,
    closed: bool,
    master: Option<OwnedFd>,
}

impl ControlState {
    /// The master, if the helper can still be written to, resized or signaled.
    pub(crate) fn live_master(&self) -> Option<&OwnedFd> {
        if self.running && !self.closed {
            self.master.as_ref()
        } else {
            None
        }
    }

    pub(crate) fn is_live(&self) -> bool {
        self.live_master().is_some()
    }
}

impl SessionShared {
    /// Enter the session's control domain. Never held across an await.
    pub(crate) fn lock(&self) -> MutexGuard<'_, ControlState> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// One non-blocking write to a live helper. `None` once it is gone.
    pub(crate) fn write_live(&self, bytes: &[u8]) -> Option<nix::Result<usize>> {
        let control = self.lock();
        let master = control.live_master()?;
        Some(write(master.as_raw_fd(), bytes))
    }

    /// Kill a helper that is still running and drop the interaction side's
    /// descriptor, so handles that outlive the capture keep nothing open.
    fn close(&self) {
        let mut control = self.lock();
        if control.running {
            // The helper leads its own session, so its pid is also its group.
            if let Err(e) = killpg(self.pid, Signal::SIGKILL) {
                warn!(pid = self.pid.as_raw(), "failed to kill helper: {}", e);
            }
        }
        control.closed = true;
        control.master = None;
    }
}

/// Owns the helper process. The running flag flips under the control lock
/// whenever the child is reaped, so nothing signals a pid after that.
/// Dropping the guard also releases the interaction side's descriptor.
struct ChildGuard {
    child: Child,
    shared: Arc<SessionShared>,
}

impl ChildGuard {
    fn poll_exit(&mut self) -> Result<Option<ExitStatus>> {
        let mut control = self.shared.lock();
        let status = self.child.try_wait().map_err(Error::Wait)?;
        if status.is_some() {
            control.running = false;
        }
        Ok(status)
    }

    fn wait_exit(&mut self) -> Result<ExitStatus> {
        loop {
            if let Some(status) = self.poll_exit()? {
                return Ok(status);
            }
            thread::sleep(RETRY_BACKOFF);
        }
    }
}

impl Drop for ChildGuard {
    // Kills and reaps the child on any path that did not wait for it.
    fn drop(&mut self) {
        let mut control = self.shared.lock();
        if let Ok(None) = self.child.try_wait() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
        control.running = false;
        control.master = None;
    }
}

/// Tears a capture down however it ends: cancels the interaction task,
/// closes the control domain and kills a helper that is still running
/// (e.g. when the caller drops the capture future on a deadline).
struct CaptureGuard {
    shared: Arc<SessionShared>,
    task: Option<AbortHandle>,
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        if let Some(task) = &self.task {
            task.abort();
        }
        self.shared.close();
    }
}

/// A pty with a live helper attached.
pub struct RunningSession {
    shared: Arc<SessionShared>,
    child: ChildGuard,
    master: OwnedFd,
    // Held open so the master keeps delivering buffered output after the
    // helper exits.
    slave: OwnedFd,
    rows: u16,
    cols: u16,
}

impl RunningSession {
    pub fn pid(&self) -> u32 {
        self.child.child.id()
    }

    /// Handle for acting on the session while it is being captured.
    pub fn interaction(&self) -> Interaction {
        Interaction::new(Arc::clone(&self.shared))
    }

    /// Drain the helper's output until it exits.
    pub async fn capture(self) -> Result<Snapshot> {
        self.finish(None).await
    }

    /// Drain the helper's output while `interactions` runs concurrently
    /// against the live session. A failing handler fails the capture and
    /// kills the helper without waiting for it to exit.
    pub async fn capture_with<F, Fut>(self, interactions: F) -> Result<Snapshot>
    where
        F: FnOnce(Interaction) -> Fut,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let task = tokio::spawn(interactions(self.interaction()));
        self.finish(Some(task)).await
    }

    async fn finish(self, task: Option<JoinHandle<anyhow::Result<()>>>) -> Result<Snapshot> {
        let RunningSession {
            shared,
            mut child,
            master,
            slave,
            rows,
            cols,
        } = self;

        let _guard = CaptureGuard {
            shared: Arc::clone(&shared),
            task: task.as_ref().map(|t| t.abort_handle()),
        };

        set_nonblocking(&master)?;

        // The drain owns the read side and both original descriptors; they
        // close when it returns.
        let mut draining = tokio::task::spawn_blocking(move || drain(&mut child, master, slave));

        let (output, status) = match task {
            None => draining.await.map_err(Error::Join)??,
            Some(mut task) => tokio::select! {
                joined = &mut task => {
                    if let Err(e) = handler_outcome(joined) {
                        shared.close();
                        let _ = draining.await;
                        return Err(e);
                    }
                    draining.await.map_err(Error::Join)??
                }
                drained = &mut draining => {
                    let drained = drained.map_err(Error::Join)??;
                    handler_outcome(task.await)?;
                    drained
                }
            },
        };

        let status = exit_code(status);
        debug!(bytes = output.len(), status, "capture finished");

        if status != 0 {
            return Err(Error::Process { status, output });
        }

        Ok(Snapshot::new(output, rows, cols))
    }
}

fn handler_outcome(joined: std::result::Result<anyhow::Result<()>, JoinError>) -> Result<()> {
    match joined {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(Error::Interaction(e)),
        Err(e) => Err(Error::Join(e)),
    }
}

fn set_nonblocking(fd: &OwnedFd) -> Result<()> {
    let flags = fcntl(fd.as_raw_fd(), FcntlArg::F_GETFL).map_err(Error::Read)?;
    let mut oflags = OFlag::from_bits_truncate(flags);
    oflags.insert(OFlag::O_NONBLOCK);
    fcntl(fd.as_raw_fd(), FcntlArg::F_SETFL(oflags)).map_err(Error::Read)?;
    Ok(())
}

fn drain(child: &mut ChildGuard, master: OwnedFd, _slave: OwnedFd) -> Result<(Vec<u8>, ExitStatus)> {
    let fd = master.as_raw_fd();
    let mut output = Vec::new();
    let mut buf = [0u8; READ_CHUNK];

    while child.poll_exit()?.is_none() {
        match read(fd, &mut buf) {
            Ok(0) => break,
            Ok(n) => {
                trace!(bytes = n, "pty read");
                output.extend_from_slice(&buf[..n]);
            }
            Err(Errno::EAGAIN) | Err(Errno::EINTR) => thread::sleep(RETRY_BACKOFF),
            // Linux reports a hung-up slave as EIO rather than EOF
            Err(Errno::EIO) => break,
            Err(e) => return Err(Error::Read(e)),
        }
    }

    let status = child.wait_exit()?;

    // Pick up whatever the helper wrote just before exiting.
    loop {
        match read(fd, &mut buf) {
            Ok(0) => break,
            Ok(n) => output.extend_from_slice(&buf[..n]),
            Err(Errno::EINTR) => continue,
            Err(_) => break,
        }
    }

    Ok((output, status))
}

fn exit_code(status: ExitStatus) -> i32 {
    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(signal)) => 128 + signal,
        (None, None) => -1,
    }
}
