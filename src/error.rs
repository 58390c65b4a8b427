// Error taxonomy for pty captures

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::snapshot::escape_bytes;

#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to allocate pseudo-terminal: {0}")]
    Allocation(#[source] nix::Error),

    #[error("helper executable not found: {}", .0.display())]
    Discovery(PathBuf),

    #[error("failed to spawn helper: {0}")]
    Spawn(#[source] io::Error),

    #[error("helper exited with status {status}; output: {}", escape_bytes(.output))]
    Process { status: i32, output: Vec<u8> },

    #[error("failed to read from pty: {0}")]
    Read(#[source] nix::Error),

    #[error("failed to write to pty: {0}")]
    Write(#[source] nix::Error),

    #[error("failed to resize pty: {0}")]
    Resize(#[source] rustix::io::Errno),

    #[error("failed to stage command program: {0}")]
    Stage(#[source] io::Error),

    #[error("failed to wait for helper: {0}")]
    Wait(#[source] io::Error),

    #[error("interaction failed: {0:#}")]
    Interaction(anyhow::Error),

    #[error("capture task failed: {0}")]
    Join(#[source] tokio::task::JoinError),
}

impl Error {
    /// Bytes captured before the helper failed, if this is a process failure.
    pub fn partial_output(&self) -> Option<&[u8]> {
        match self {
            Error::Process { output, .. } => Some(output),
            _ => None,
        }
    }

    /// OS error number behind the failure, when there is one.
    pub fn errno(&self) -> Option<i32> {
        match self {
            Error::Allocation(e) | Error::Read(e) | Error::Write(e) => Some(*e as i32),
            Error::Spawn(e) | Error::Stage(e) | Error::Wait(e) => e.raw_os_error(),
            Error::Resize(e) => Some(e.raw_os_error()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_error_reports_partial_output() {
        let err = Error::Process {
            status: 3,
            output: b"\x1b[Hboom\r\n".to_vec(),
        };
        assert_eq!(err.partial_output(), Some(&b"\x1b[Hboom\r\n"[..]));
        let message = err.to_string();
        assert!(message.contains("status 3"));
        assert!(message.contains("\\u{1B}[Hboom\\r\\n"), "got: {}", message);
    }

    #[test]
    fn test_errno_passthrough() {
        let err = Error::Write(nix::errno::Errno::EBADF);
        assert_eq!(err.errno(), Some(nix::errno::Errno::EBADF as i32));
        assert_eq!(Error::Discovery(PathBuf::from("/nope")).errno(), None);
    }
}
