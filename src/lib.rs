//! Snapshot testing for terminal programs.
//!
//! A [`Harness`] stages a [`SnapshotProgram`] for a companion helper, runs
//! the helper on a fresh pseudo-terminal and returns every byte it wrote as
//! a [`Snapshot`]. A [`Screen`] replays those bytes onto a character grid so
//! tests can assert on what a user would see.

pub mod config;
pub mod error;
pub mod harness;
pub mod interaction;
pub mod program;
pub mod pty;
pub mod render;
pub mod screen;
pub mod snapshot;

pub use config::{HarnessConfig, HelperCommand, TerminalSize};
pub use error::{Error, Result};
pub use harness::Harness;
pub use interaction::Interaction;
pub use program::{
    Attribute, Color, Command, IoConfig, MouseMask, ProgramBuilder, SnapshotProgram, WindowBuilder, WindowCommand,
};
pub use pty::{PtySession, RunningSession};
pub use screen::{Charset, Screen};
pub use snapshot::Snapshot;
