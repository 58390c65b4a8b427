// Curses-style terminal layer for the helper
//
// Only the subset of terminal control the snapshot interpreter understands is
// emitted: absolute positioning, G0 charset switches around line-drawing
// glyphs, CSI b repeats for horizontal runs, and SGR for attributes.

use std::collections::{HashMap, VecDeque};
use std::ffi::c_int;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use rustix::termios::{
    tcgetattr, tcgetwinsize, tcsetattr, InputModes, LocalModes, OptionalActions, SpecialCodeIndex, Termios,
};
use tracing::debug;

use super::keys::{self, ByteSource, Key};
use crate::config::{DEFAULT_COLS, DEFAULT_ROWS};
use crate::program::{Attribute, Color, IoConfig, MouseMask, WindowDescriptor};

/// Terminal state is process-global; one screen at a time.
static SCREEN_LOCK: Mutex<()> = Mutex::new(());

/// Set by SIGWINCH, consumed as a resize key.
static RESIZED: AtomicBool = AtomicBool::new(false);

extern "C" fn note_resize(_: c_int) {
    RESIZED.store(true, Ordering::SeqCst);
}

/// Continuation bytes of an escape sequence must arrive within this delay.
const ESCAPE_DELAY: Duration = Duration::from_millis(100);

pub struct Curses {
    rows: u16,
    cols: u16,
    out: Vec<u8>,
    saved_modes: Option<Termios>,
    applied_timeout: Option<Option<Duration>>,
    read_timeout: Option<Duration>,
    input: VecDeque<u8>,
    color_started: bool,
    color_pairs: HashMap<String, (Color, Color)>,
    mouse: MouseMask,
    keypad_transmit: bool,
    saved_winch: Option<SigAction>,
}

impl Curses {
    /// Run `body` against an initialized screen. The terminal is restored
    /// afterwards whether or not `body` succeeds.
    pub fn with_screen<T>(body: impl FnOnce(&mut Curses) -> Result<T>) -> Result<T> {
        let _guard = SCREEN_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        let mut curses = Curses::init()?;
        let result = body(&mut curses);
        let restored = curses.end();
        let value = result?;
        restored?;
        Ok(value)
    }

    fn init() -> Result<Self> {
        let (rows, cols) = terminal_size().unwrap_or((DEFAULT_ROWS, DEFAULT_COLS));
        let mut curses = Curses {
            rows,
            cols,
            out: Vec::new(),
            saved_modes: tcgetattr(io::stdin()).ok(),
            applied_timeout: None,
            read_timeout: None,
            input: VecDeque::new(),
            color_started: false,
            color_pairs: HashMap::new(),
            mouse: MouseMask::empty(),
            keypad_transmit: false,
            saved_winch: None,
        };

        // No SA_RESTART, so a blocked key read returns early on a resize.
        RESIZED.store(false, Ordering::SeqCst);
        let action = SigAction::new(SigHandler::Handler(note_resize), SaFlags::empty(), SigSet::empty());
        // SAFETY: the handler only stores to an atomic.
        curses.saved_winch = unsafe { sigaction(Signal::SIGWINCH, &action) }
            .map_err(|e| debug!("failed to watch for resizes: {}", e))
            .ok();

        curses.out.extend_from_slice(b"\x1b[?1049h\x1b[1;");
        curses.out.extend_from_slice(format!("{}r", rows).as_bytes());
        curses.out.extend_from_slice(b"\x1b(B\x1b[m\x1b[H\x1b[2J");
        curses.flush()?;

        debug!(rows, cols, "screen initialized");
        Ok(curses)
    }

    fn end(&mut self) -> Result<()> {
        if !self.mouse.is_empty() {
            self.disable_mouse();
        }
        if self.keypad_transmit {
            self.out.extend_from_slice(b"\x1b[?1l\x1b>");
        }
        self.out.extend_from_slice(format!("\x1b[m\x1b[{};1H\x1b[?1049l\r", self.rows).as_bytes());
        self.flush()?;

        if let Some(saved) = self.saved_winch.take() {
            // SAFETY: restores the disposition that was in place before init.
            if let Err(e) = unsafe { sigaction(Signal::SIGWINCH, &saved) } {
                debug!("failed to restore SIGWINCH handler: {}", e);
            }
        }

        if let Some(saved) = &self.saved_modes {
            tcsetattr(io::stdin(), OptionalActions::Now, saved).context("failed to restore terminal modes")?;
        }
        Ok(())
    }

    /// Apply input modes to the terminal on stdin.
    pub fn configure_io(&mut self, config: &IoConfig) -> Result<()> {
        let stdin = io::stdin();
        let mut termios = tcgetattr(&stdin).context("stdin is not a terminal")?;

        if config.raw {
            termios
                .local_modes
                .remove(LocalModes::ICANON | LocalModes::ISIG | LocalModes::IEXTEN);
            termios
                .input_modes
                .remove(InputModes::IXON | InputModes::BRKINT | InputModes::ICRNL);
        } else {
            termios.local_modes.insert(LocalModes::ISIG | LocalModes::IEXTEN);
            termios
                .input_modes
                .insert(InputModes::IXON | InputModes::BRKINT | InputModes::ICRNL);
            termios.local_modes.set(LocalModes::ICANON, !config.cbreak);
        }
        termios.local_modes.set(LocalModes::ECHO, config.echo);

        tcsetattr(&stdin, OptionalActions::Now, &termios).context("failed to set terminal modes")?;
        self.applied_timeout = None;

        if config.keypad && !self.keypad_transmit {
            self.out.extend_from_slice(b"\x1b[?1h\x1b=");
        }
        self.keypad_transmit = config.keypad;

        debug!(raw = config.raw, cbreak = config.cbreak, echo = config.echo, "configured terminal input");
        Ok(())
    }

    pub fn start_color(&mut self) {
        self.color_started = true;
    }

    pub fn allocate_color_pair(&mut self, name: &str, foreground: Color, background: Color) -> Result<()> {
        if !self.color_started {
            bail!("color pair {:?} allocated before colors were started", name);
        }
        self.color_pairs.insert(name.to_string(), (foreground, background));
        Ok(())
    }

    pub fn color_pair(&self, name: &str) -> Option<(Color, Color)> {
        self.color_pairs.get(name).copied()
    }

    pub fn enable_mouse(&mut self, mask: MouseMask) {
        self.out.extend_from_slice(b"\x1b[?1000h");
        if mask.contains(MouseMask::MOVED) {
            self.out.extend_from_slice(b"\x1b[?1003h");
        }
        self.out.extend_from_slice(b"\x1b[?1006h");
        self.mouse = mask;
    }

    pub fn disable_mouse(&mut self) {
        if self.mouse.contains(MouseMask::MOVED) {
            self.out.extend_from_slice(b"\x1b[?1003l");
        }
        self.out.extend_from_slice(b"\x1b[?1006l\x1b[?1000l");
        self.mouse = MouseMask::empty();
    }

    /// Create a window. Zero height or width extends to the terminal edge.
    pub fn window(&self, descriptor: &WindowDescriptor) -> Result<Window> {
        let (top, left) = (descriptor.start_y, descriptor.start_x);
        if top >= self.rows || left >= self.cols {
            bail!(
                "window origin {},{} lies outside the {}x{} terminal",
                top,
                left,
                self.rows,
                self.cols
            );
        }

        let fit = |requested: u16, available: u16| {
            if requested == 0 {
                available
            } else {
                requested.min(available)
            }
        };
        Ok(Window {
            top,
            left,
            height: fit(descriptor.height, self.rows - top),
            width: fit(descriptor.width, self.cols - left),
            pending: Vec::new(),
            attributes: Vec::new(),
            color: None,
            timeout: None,
            keypad: false,
        })
    }

    /// Copy the window's pending output to the terminal.
    pub fn refresh(&mut self, window: &mut Window) -> Result<()> {
        self.out.append(&mut window.pending);
        self.flush()
    }

    pub fn flush(&mut self) -> Result<()> {
        if self.out.is_empty() {
            return Ok(());
        }
        let mut stdout = io::stdout().lock();
        stdout.write_all(&self.out).context("failed to write to terminal")?;
        stdout.flush().context("failed to write to terminal")?;
        self.out.clear();
        Ok(())
    }

    /// Wait for one key using the window's timeout and keypad setting. Mouse
    /// events outside the enabled mask are skipped.
    pub fn read_key(&mut self, window: &mut Window) -> Result<Option<Key>> {
        self.refresh(window)?;
        self.read_timeout = window.timeout;
        let keypad = window.keypad;
        loop {
            match keys::read_key(self, keypad).context("failed to read input")? {
                Some(Key::Mouse(event)) if !event.wanted_by(self.mouse) => {
                    debug!(%event, "ignored unrequested mouse event");
                }
                key => return Ok(key),
            }
        }
    }

    fn apply_timeout(&mut self, timeout: Option<Duration>) {
        if self.applied_timeout == Some(timeout) {
            return;
        }
        let stdin = io::stdin();
        let mut termios = match tcgetattr(&stdin) {
            Ok(termios) => termios,
            Err(_) => return,
        };
        let (min, time) = match timeout {
            None => (1, 0),
            Some(timeout) => (0, deciseconds(timeout)),
        };
        termios.special_codes[SpecialCodeIndex::VMIN] = min;
        termios.special_codes[SpecialCodeIndex::VTIME] = time;
        if let Err(e) = tcsetattr(&stdin, OptionalActions::Now, &termios) {
            debug!("failed to set input timeout: {}", e);
            return;
        }
        self.applied_timeout = Some(timeout);
    }
}

impl ByteSource for Curses {
    fn next_byte(&mut self, first: bool) -> io::Result<Option<u8>> {
        if let Some(byte) = self.input.pop_front() {
            return Ok(Some(byte));
        }

        let timeout = if first { self.read_timeout } else { Some(ESCAPE_DELAY) };
        self.apply_timeout(timeout);

        let mut buf = [0u8; 64];
        loop {
            match io::stdin().read(&mut buf) {
                Ok(0) => return Ok(None),
                Ok(n) => {
                    self.input.extend(&buf[..n]);
                    return Ok(self.input.pop_front());
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                    if first && RESIZED.load(Ordering::SeqCst) {
                        return Err(e);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Picks up the new size, as curses does before reporting the key.
    fn take_resize(&mut self) -> bool {
        if !RESIZED.swap(false, Ordering::SeqCst) {
            return false;
        }
        if let Some((rows, cols)) = terminal_size() {
            self.rows = rows;
            self.cols = cols;
        }
        debug!(rows = self.rows, cols = self.cols, "terminal resized");
        true
    }
}

/// VTIME counts tenths of a second; round up so short timeouts still wait.
fn deciseconds(timeout: Duration) -> u8 {
    let tenths = (timeout.as_millis() + 99) / 100;
    tenths.min(u128::from(u8::MAX)) as u8
}

/// Live size of the terminal on stdout.
pub fn terminal_size() -> Option<(u16, u16)> {
    let winsize = tcgetwinsize(io::stdout()).ok()?;
    if winsize.ws_row == 0 || winsize.ws_col == 0 {
        return None;
    }
    Some((winsize.ws_row, winsize.ws_col))
}

/// A rectangular region of the screen. Drawing is buffered until the window
/// is refreshed.
pub struct Window {
    top: u16,
    left: u16,
    height: u16,
    width: u16,
    pending: Vec<u8>,
    attributes: Vec<Attribute>,
    color: Option<(Color, Color)>,
    timeout: Option<Duration>,
    keypad: bool,
}

impl Window {
    pub fn height(&self) -> u16 {
        self.height
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn draw_box(&mut self) {
        if self.height < 2 || self.width < 2 {
            return;
        }
        let (bottom, right) = (self.height - 1, self.width - 1);

        self.move_to(0, 0);
        self.horizontal_edge(b'l', b'k');
        for row in 1..bottom {
            self.move_to(row, 0);
            self.line_drawing(b"x");
            self.move_to(row, right);
            self.line_drawing(b"x");
        }
        self.move_to(bottom, 0);
        self.horizontal_edge(b'm', b'j');
    }

    fn horizontal_edge(&mut self, first: u8, last: u8) {
        let mut glyphs = vec![first];
        let run = self.width - 2;
        if run > 0 {
            glyphs.push(b'q');
        }
        if run > 1 {
            glyphs.extend_from_slice(format!("\x1b[{}b", run - 1).as_bytes());
        }
        glyphs.push(last);
        self.line_drawing(&glyphs);
    }

    fn line_drawing(&mut self, glyphs: &[u8]) {
        self.pending.extend_from_slice(b"\x1b(0");
        self.pending.extend_from_slice(glyphs);
        self.pending.extend_from_slice(b"\x1b(B");
    }

    /// Write text at a window position. Text past the right edge is clipped.
    pub fn mv_add(&mut self, text: &str, y: u16, x: u16) -> Result<()> {
        if y >= self.height || x >= self.width {
            bail!(
                "position {},{} lies outside the {}x{} window",
                y,
                x,
                self.height,
                self.width
            );
        }
        let room = usize::from(self.width - x);
        let clipped: String = text.chars().take(room).collect();

        self.move_to(y, x);
        let styled = !self.attributes.is_empty() || self.color.is_some();
        if styled {
            self.emit_style();
        }
        self.pending.extend_from_slice(clipped.as_bytes());
        if styled {
            self.pending.extend_from_slice(b"\x1b[m");
        }
        Ok(())
    }

    pub fn mv_add_with_ellipsis(&mut self, text: &str, max_columns: u16, y: u16, x: u16, ellipsis: &str) -> Result<()> {
        self.mv_add(&truncate_with_ellipsis(text, usize::from(max_columns), ellipsis), y, x)
    }

    /// Clear from the position to the right edge, then write text there.
    pub fn replace_line(&mut self, text: &str, y: u16, x: u16) -> Result<()> {
        let room = usize::from(self.width.saturating_sub(x));
        let padded = format!("{:<width$}", text, width = room);
        self.mv_add(&padded, y, x)
    }

    /// A negative timeout blocks until input arrives.
    pub fn set_timeout(&mut self, milliseconds: i32) {
        self.timeout = u64::try_from(milliseconds).ok().map(Duration::from_millis);
    }

    pub fn set_non_blocking(&mut self, enabled: bool) {
        self.timeout = if enabled { Some(Duration::ZERO) } else { None };
    }

    pub fn set_keypad(&mut self, enabled: bool) {
        self.keypad = enabled;
    }

    pub fn set_attributes(&mut self, attributes: &[Attribute], color: Option<(Color, Color)>) {
        self.attributes = attributes.to_vec();
        self.color = color;
    }

    fn move_to(&mut self, y: u16, x: u16) {
        let row = u32::from(self.top) + u32::from(y) + 1;
        let col = u32::from(self.left) + u32::from(x) + 1;
        self.pending.extend_from_slice(format!("\x1b[{};{}H", row, col).as_bytes());
    }

    fn emit_style(&mut self) {
        let codes: Vec<&str> = self.attributes.iter().map(|a| sgr_code(*a)).collect();
        if codes.is_empty() {
            self.pending.extend_from_slice(b"\x1b[0m");
        } else {
            self.pending
                .extend_from_slice(format!("\x1b[0;{}m", codes.join(";")).as_bytes());
        }
        if let Some((foreground, background)) = self.color {
            self.pending.extend_from_slice(
                format!("\x1b[3{}m\x1b[4{}m", foreground.index(), background.index()).as_bytes(),
            );
        }
    }
}

fn sgr_code(attribute: Attribute) -> &'static str {
    match attribute {
        Attribute::Bold => "1",
        Attribute::Dim => "2",
        Attribute::Italic => "3",
        Attribute::Underline => "4",
        Attribute::Blink => "5",
        Attribute::Reverse | Attribute::Standout => "7",
        Attribute::Invisible => "8",
    }
}

/// Cut `text` to `max_columns` characters, ending in `ellipsis` when cut.
pub fn truncate_with_ellipsis(text: &str, max_columns: usize, ellipsis: &str) -> String {
    if text.chars().count() <= max_columns {
        return text.to_string();
    }
    let keep = max_columns.saturating_sub(ellipsis.chars().count());
    text.chars()
        .take(keep)
        .chain(ellipsis.chars().take(max_columns - keep))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(height: u16, width: u16, top: u16, left: u16) -> Window {
        Window {
            top,
            left,
            height,
            width,
            pending: Vec::new(),
            attributes: Vec::new(),
            color: None,
            timeout: None,
            keypad: false,
        }
    }

    fn pending(window: &Window) -> String {
        String::from_utf8_lossy(&window.pending).into_owned()
    }

    #[test]
    fn test_truncate_with_ellipsis() {
        assert_eq!(truncate_with_ellipsis("Snapshot testing harness", 18, "..."), "Snapshot testin...");
        assert_eq!(truncate_with_ellipsis("short", 18, "..."), "short");
        assert_eq!(truncate_with_ellipsis("abcdef", 2, "..."), "..");
        assert_eq!(truncate_with_ellipsis("abcdef", 4, ""), "abcd");
    }

    #[test]
    fn test_box_uses_line_drawing_and_repeat() {
        let mut w = window(3, 6, 2, 3);
        w.draw_box();
        assert_eq!(
            pending(&w),
            "\x1b[3;4H\x1b(0lq\x1b[3bk\x1b(B\
             \x1b[4;4H\x1b(0x\x1b(B\x1b[4;9H\x1b(0x\x1b(B\
             \x1b[5;4H\x1b(0mq\x1b[3bj\x1b(B"
        );
    }

    #[test]
    fn test_narrow_box_has_no_repeat() {
        let mut w = window(2, 3, 0, 0);
        w.draw_box();
        assert_eq!(pending(&w), "\x1b[1;1H\x1b(0lqk\x1b(B\x1b[2;1H\x1b(0mqj\x1b(B");
    }

    #[test]
    fn test_mv_add_clips_and_rejects_outside() {
        let mut w = window(2, 5, 0, 0);
        w.mv_add("abcdefgh", 1, 2).unwrap();
        assert_eq!(pending(&w), "\x1b[2;3Habc");
        assert!(w.mv_add("x", 2, 0).is_err());
        assert!(w.mv_add("x", 0, 5).is_err());
    }

    #[test]
    fn test_styled_text_emits_sgr() {
        let mut w = window(4, 20, 1, 1);
        w.set_attributes(&[Attribute::Bold], Some((Color::Yellow, Color::Blue)));
        w.mv_add("hi", 0, 0).unwrap();
        assert_eq!(pending(&w), "\x1b[2;2H\x1b[0;1m\x1b[33m\x1b[44mhi\x1b[m");
    }

    #[test]
    fn test_replace_line_pads_to_edge() {
        let mut w = window(2, 8, 0, 0);
        w.replace_line("ab", 0, 3).unwrap();
        assert_eq!(pending(&w), "\x1b[1;4Hab   ");
    }

    #[test]
    fn test_timeouts() {
        let mut w = window(1, 1, 0, 0);
        w.set_timeout(500);
        assert_eq!(w.timeout, Some(Duration::from_millis(500)));
        w.set_timeout(-1);
        assert_eq!(w.timeout, None);
        w.set_non_blocking(true);
        assert_eq!(w.timeout, Some(Duration::ZERO));

        assert_eq!(deciseconds(Duration::ZERO), 0);
        assert_eq!(deciseconds(Duration::from_millis(1)), 1);
        assert_eq!(deciseconds(Duration::from_millis(500)), 5);
        assert_eq!(deciseconds(Duration::from_secs(60)), 255);
    }
}
