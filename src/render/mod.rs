// Companion renderer: executes a command program against the terminal it
// was started on

mod curses;
pub mod keys;

use std::env;
use std::fs;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::debug;

pub use curses::{terminal_size, truncate_with_ellipsis, Curses, Window};

use crate::program::{Command, SnapshotProgram, WindowCommand};

/// Load the program named by `script_env` and run it.
pub fn run_helper(script_env: &str) -> Result<()> {
    let path = env::var_os(script_env).with_context(|| format!("{} is not set", script_env))?;
    let text = fs::read_to_string(&path).with_context(|| format!("failed to read program {:?}", path))?;
    let program: SnapshotProgram = serde_json::from_str(&text).context("failed to decode program")?;
    run_program(&program)
}

pub fn run_program(program: &SnapshotProgram) -> Result<()> {
    debug!(commands = program.commands.len(), "running program");
    Curses::with_screen(|curses| execute(curses, &program.commands))
}

fn execute(curses: &mut Curses, commands: &[Command]) -> Result<()> {
    for command in commands {
        match command {
            Command::ConfigureIo(config) => curses.configure_io(config)?,
            Command::WithWindow(descriptor) => {
                let mut window = curses.window(descriptor)?;
                execute_window(curses, &mut window, &descriptor.commands)?;
            }
            Command::StartColor => curses.start_color(),
            Command::AllocateColorPair(pair) => {
                curses.allocate_color_pair(&pair.name, pair.foreground, pair.background)?
            }
            Command::EnableMouse(mask) => curses.enable_mouse(*mask),
            Command::DisableMouse => curses.disable_mouse(),
            Command::Wait { milliseconds } => pause(*milliseconds),
            Command::Flush => curses.flush()?,
        }
    }
    Ok(())
}

fn execute_window(curses: &mut Curses, window: &mut Window, commands: &[WindowCommand]) -> Result<()> {
    for command in commands {
        match command {
            WindowCommand::DrawBox => window.draw_box(),
            WindowCommand::MvAdd { string, y, x } => window.mv_add(string, *y, *x)?,
            WindowCommand::MvAddWithEllipsis {
                string,
                max_columns,
                y,
                x,
                ellipsis,
            } => window.mv_add_with_ellipsis(string, *max_columns, *y, *x, ellipsis)?,
            WindowCommand::ReportSize { prefix, y, x } => {
                let text = format!("{}: {}x{}", prefix, window.height(), window.width());
                window.replace_line(&text, *y, *x)?;
            }
            WindowCommand::ReportTerminalSize { prefix, y, x } => {
                let text = match terminal_size() {
                    Some((rows, cols)) => format!("{}: {}x{}", prefix, rows, cols),
                    None => format!("{}: unavailable", prefix),
                };
                window.replace_line(&text, *y, *x)?;
            }
            WindowCommand::SetTimeout { milliseconds } => window.set_timeout(*milliseconds),
            WindowCommand::SetNonBlocking { enabled } => window.set_non_blocking(*enabled),
            WindowCommand::ConfigureKeypad { enabled } => window.set_keypad(*enabled),
            WindowCommand::RecordKey { prefix, y, x, fallback }
            | WindowCommand::RecordMouse { prefix, y, x, fallback } => {
                let description = match curses.read_key(window)? {
                    Some(key) => key.to_string(),
                    None => fallback.clone(),
                };
                debug!(%description, "recorded input");
                window.replace_line(&format!("{}: {}", prefix, description), *y, *x)?;
            }
            WindowCommand::SetAttributes { attributes, color_pair } => {
                let color = color_pair.as_deref().and_then(|name| curses.color_pair(name));
                window.set_attributes(attributes, color);
            }
            WindowCommand::Wait { milliseconds } => pause(*milliseconds),
            WindowCommand::Refresh => curses.refresh(window)?,
            WindowCommand::Flush => curses.flush()?,
        }
    }
    Ok(())
}

fn pause(milliseconds: u32) {
    thread::sleep(Duration::from_millis(u64::from(milliseconds)));
}
