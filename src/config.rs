// Harness configuration

use std::env;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{bail, Context};

use crate::error::{Error, Result};

pub const DEFAULT_ROWS: u16 = 24;
pub const DEFAULT_COLS: u16 = 80;
pub const DEFAULT_TERM: &str = "xterm-256color";

/// Environment variable the helper reads the staged program path from.
pub const DEFAULT_SCRIPT_ENV: &str = "PTYSNAP_SCRIPT";

/// Terminal size as written on the command line, `COLSxROWS` (e.g. `80x24`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalSize {
    pub cols: u16,
    pub rows: u16,
}

impl FromStr for TerminalSize {
    type Err = anyhow::Error;

    fn from_str(size: &str) -> anyhow::Result<Self> {
        let parts: Vec<&str> = size.split('x').collect();
        if parts.len() != 2 {
            bail!("Invalid size format, expected COLSxROWS like 80x24");
        }
        let cols = parts[0].parse::<u16>().context("Invalid columns")?;
        let rows = parts[1].parse::<u16>().context("Invalid rows")?;
        Ok(TerminalSize { cols, rows })
    }
}

/// The companion executable that turns a staged program into terminal output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelperCommand {
    pub path: PathBuf,
    pub args: Vec<String>,
}

impl HelperCommand {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        HelperCommand {
            path: path.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Locate the executable. A bare name is looked up on `PATH`; anything
    /// with a directory component is taken as given.
    pub fn resolve(&self) -> Result<PathBuf> {
        let is_bare = self.path.components().count() == 1 && !self.path.is_absolute();
        if !is_bare {
            return if is_executable(&self.path) {
                Ok(self.path.clone())
            } else {
                Err(Error::Discovery(self.path.clone()))
            };
        }

        env::var_os("PATH")
            .iter()
            .flat_map(env::split_paths)
            .map(|dir| dir.join(&self.path))
            .find(|candidate| is_executable(candidate))
            .ok_or_else(|| Error::Discovery(self.path.clone()))
    }
}

fn is_executable(path: &Path) -> bool {
    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub rows: u16,
    pub cols: u16,
    pub term: String,
    pub helper: HelperCommand,
    pub script_env: String,
}

impl HarnessConfig {
    pub fn new(helper: HelperCommand) -> Self {
        HarnessConfig {
            rows: DEFAULT_ROWS,
            cols: DEFAULT_COLS,
            term: DEFAULT_TERM.to_string(),
            helper,
            script_env: DEFAULT_SCRIPT_ENV.to_string(),
        }
    }

    pub fn size(mut self, rows: u16, cols: u16) -> Self {
        self.rows = rows;
        self.cols = cols;
        self
    }

    pub fn term(mut self, term: impl Into<String>) -> Self {
        self.term = term.into();
        self
    }

    pub fn script_env(mut self, name: impl Into<String>) -> Self {
        self.script_env = name.into();
        self
    }
}
