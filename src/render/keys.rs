// Keyboard and mouse input decoding

use std::fmt;

use crate::program::MouseMask;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseEvent {
    Pressed { button: u8, y: u16, x: u16 },
    Released { button: u8, y: u16, x: u16 },
    Moved { y: u16, x: u16 },
}

impl MouseEvent {
    /// Decode the body of an SGR report (`<b;x;y` plus final `M` or `m`).
    /// Buttons come out 1-based and coordinates 0-based.
    pub fn from_sgr(body: &[u8], final_byte: u8) -> Option<Self> {
        let body = std::str::from_utf8(body).ok()?.strip_prefix('<')?;
        let mut fields = body.split(';').map(|f| f.parse::<u16>().ok());
        let code = fields.next()??;
        let x = fields.next()??.saturating_sub(1);
        let y = fields.next()??.saturating_sub(1);
        if fields.next().is_some() {
            return None;
        }

        if code & 32 != 0 {
            return Some(MouseEvent::Moved { y, x });
        }
        let button = if code & 64 != 0 {
            4
        } else {
            match code & 3 {
                3 => return None,
                b => b as u8 + 1,
            }
        };
        match final_byte {
            b'M' => Some(MouseEvent::Pressed { button, y, x }),
            b'm' => Some(MouseEvent::Released { button, y, x }),
            _ => None,
        }
    }

    /// Whether a mouse mask asks for this event.
    pub fn wanted_by(&self, mask: MouseMask) -> bool {
        let flag = match *self {
            MouseEvent::Moved { .. } => return mask.contains(MouseMask::MOVED),
            MouseEvent::Pressed { button, .. } => match button {
                1 => MouseMask::BUTTON1_PRESSED,
                2 => MouseMask::BUTTON2_PRESSED,
                3 => MouseMask::BUTTON3_PRESSED,
                _ => MouseMask::BUTTON4_PRESSED,
            },
            MouseEvent::Released { button, .. } => match button {
                1 => MouseMask::BUTTON1_RELEASED,
                2 => MouseMask::BUTTON2_RELEASED,
                3 => MouseMask::BUTTON3_RELEASED,
                _ => MouseMask::BUTTON4_RELEASED,
            },
        };
        mask.contains(flag)
    }
}

impl fmt::Display for MouseEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MouseEvent::Pressed { button, y, x } => write!(f, "pressed(btn:{},y:{},x:{})", button, y, x),
            MouseEvent::Released { button, y, x } => write!(f, "released(btn:{},y:{},x:{})", button, y, x),
            MouseEvent::Moved { y, x } => write!(f, "moved(y:{},x:{})", y, x),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Enter,
    Backspace,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
    F(u8),
    Escape,
    /// ESC followed by a key that is not part of a known sequence
    Meta(char),
    /// `ESC [` followed by an unrecognized tail
    UnknownCsi(String),
    Mouse(MouseEvent),
    /// The terminal window changed size while waiting for input
    Resize,
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Char(c) => write!(f, "char({})", render_char(*c)),
            Key::Enter => write!(f, "enter"),
            Key::Backspace => write!(f, "backspace"),
            Key::Up => write!(f, "up"),
            Key::Down => write!(f, "down"),
            Key::Left => write!(f, "left"),
            Key::Right => write!(f, "right"),
            Key::Home => write!(f, "home"),
            Key::End => write!(f, "end"),
            Key::PageUp => write!(f, "pageUp"),
            Key::PageDown => write!(f, "pageDown"),
            Key::F(n) => write!(f, "f{}", n),
            Key::Escape => write!(f, "esc"),
            Key::Meta(c) => write!(f, "esc+{}", render_char(*c)),
            Key::UnknownCsi(tail) => write!(f, "esc[+{}", tail),
            Key::Mouse(event) => write!(f, "{}", event),
            Key::Resize => write!(f, "resize"),
        }
    }
}

fn render_char(c: char) -> String {
    if (c as u32) < 0x20 || c == '\x7f' {
        format!("0x{:02X}", c as u32)
    } else {
        c.to_string()
    }
}

/// Source of input bytes with a per-read timeout. `None` means the read
/// timed out (or the input is exhausted).
/// The first read of a key may fail with `Interrupted` when the window was
/// resized; `take_resize` then reports it.
pub trait ByteSource {
    fn next_byte(&mut self, first: bool) -> std::io::Result<Option<u8>>;

    /// Consume a pending window-size change.
    fn take_resize(&mut self) -> bool {
        false
    }
}

/// Read one key. With `keypad` off only single-byte `ESC [` tails are
/// recognized, as a terminal library without keypad translation would
/// report them; mouse reports need keypad mode.
pub fn read_key<S: ByteSource>(source: &mut S, keypad: bool) -> std::io::Result<Option<Key>> {
    if source.take_resize() {
        return Ok(Some(Key::Resize));
    }
    let first = match source.next_byte(true) {
        Ok(Some(b)) => b,
        Ok(None) => return Ok(None),
        Err(e) if e.kind() == std::io::ErrorKind::Interrupted && source.take_resize() => {
            return Ok(Some(Key::Resize));
        }
        Err(e) => return Err(e),
    };

    let key = match first {
        0x1b => decode_escape(source, keypad)?,
        b'\n' | b'\r' => Key::Enter,
        0x7f | 0x08 => Key::Backspace,
        b if b < 0x80 => Key::Char(b as char),
        b => Key::Char(decode_utf8(source, b)?),
    };
    Ok(Some(key))
}

fn decode_utf8<S: ByteSource>(source: &mut S, lead: u8) -> std::io::Result<char> {
    let len = match lead {
        0xc0..=0xdf => 2,
        0xe0..=0xef => 3,
        0xf0..=0xf7 => 4,
        _ => 1,
    };
    let mut bytes = vec![lead];
    while bytes.len() < len {
        match source.next_byte(false)? {
            Some(b) => bytes.push(b),
            None => break,
        }
    }
    Ok(std::str::from_utf8(&bytes)
        .ok()
        .and_then(|s| s.chars().next())
        .unwrap_or(char::REPLACEMENT_CHARACTER))
}

fn decode_escape<S: ByteSource>(source: &mut S, keypad: bool) -> std::io::Result<Key> {
    let next = match source.next_byte(false)? {
        Some(b) => b,
        None => return Ok(Key::Escape),
    };

    match next {
        b'[' => decode_csi(source, keypad),
        b'O' if keypad => {
            let code = match source.next_byte(false)? {
                Some(b) => b,
                None => return Ok(Key::Meta('O')),
            };
            Ok(match code {
                b'A' => Key::Up,
                b'B' => Key::Down,
                b'C' => Key::Right,
                b'D' => Key::Left,
                b'H' => Key::Home,
                b'F' => Key::End,
                b'P'..=b'S' => Key::F(code - b'P' + 1),
                other => Key::UnknownCsi(format!("O{}", other as char)),
            })
        }
        other => Ok(Key::Meta(other as char)),
    }
}

fn decode_csi<S: ByteSource>(source: &mut S, keypad: bool) -> std::io::Result<Key> {
    let mut body = Vec::new();
    let final_byte = loop {
        match source.next_byte(false)? {
            Some(b) if (0x40..=0x7e).contains(&b) => break b,
            Some(b) if keypad => body.push(b),
            // Without keypad translation only the first byte is examined
            Some(b) => return Ok(Key::UnknownCsi((b as char).to_string())),
            None => return Ok(Key::UnknownCsi(String::from_utf8_lossy(&body).into_owned())),
        }
    };

    let key = match (body.as_slice(), final_byte) {
        (b"", b'A') => Key::Up,
        (b"", b'B') => Key::Down,
        (b"", b'C') => Key::Right,
        (b"", b'D') => Key::Left,
        (b"", b'H') | (b"1", b'~') | (b"7", b'~') => Key::Home,
        (b"", b'F') | (b"4", b'~') | (b"8", b'~') => Key::End,
        (b"5", b'~') => Key::PageUp,
        (b"6", b'~') => Key::PageDown,
        (b"11", b'~') => Key::F(1),
        (b"12", b'~') => Key::F(2),
        (b"13", b'~') => Key::F(3),
        (b"14", b'~') => Key::F(4),
        (body, b'M') | (body, b'm') if body.first() == Some(&b'<') => {
            match MouseEvent::from_sgr(body, final_byte) {
                Some(event) => Key::Mouse(event),
                None => Key::UnknownCsi(format!("{}{}", String::from_utf8_lossy(body), final_byte as char)),
            }
        }
        (body, other) => Key::UnknownCsi(format!("{}{}", String::from_utf8_lossy(body), other as char)),
    };
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct Scripted(VecDeque<u8>);

    impl ByteSource for Scripted {
        fn next_byte(&mut self, _first: bool) -> std::io::Result<Option<u8>> {
            Ok(self.0.pop_front())
        }
    }

    fn keys(input: &[u8], keypad: bool) -> Vec<String> {
        let mut source = Scripted(input.iter().copied().collect());
        let mut out = Vec::new();
        while let Some(key) = read_key(&mut source, keypad).unwrap() {
            out.push(key.to_string());
        }
        out
    }

    #[test]
    fn test_arrow_then_char() {
        assert_eq!(keys(b"\x1b[Ax", true), vec!["up", "char(x)"]);
        assert_eq!(keys(b"\x1b[Ax", false), vec!["up", "char(x)"]);
    }

    #[test]
    fn test_control_and_editing_keys() {
        assert_eq!(keys(b"\r\x7f\x01", true), vec!["enter", "backspace", "char(0x01)"]);
    }

    #[test]
    fn test_function_and_paging_keys() {
        assert_eq!(
            keys(b"\x1bOP\x1b[5~\x1b[6~\x1b[F", true),
            vec!["f1", "pageUp", "pageDown", "end"]
        );
    }

    #[test]
    fn test_escape_variants() {
        assert_eq!(keys(b"\x1b", true), vec!["esc"]);
        assert_eq!(keys(b"\x1bz", true), vec!["esc+z"]);
        assert_eq!(keys(b"\x1b[Z", true), vec!["esc[+Z"]);
    }

    #[test]
    fn test_utf8_char() {
        assert_eq!(keys("\u{e9}".as_bytes(), true), vec!["char(\u{e9})"]);
    }

    #[test]
    fn test_sgr_mouse_press_and_release() {
        assert_eq!(
            keys(b"\x1b[<0;5;3M\x1b[<2;10;1m", true),
            vec!["pressed(btn:1,y:2,x:4)", "released(btn:3,y:0,x:9)"]
        );
    }

    #[test]
    fn test_mouse_needs_keypad() {
        assert_eq!(keys(b"\x1b[<0;5;3M", false)[0], "esc[+<");
    }

    #[test]
    fn test_mouse_motion_and_mask() {
        let moved = MouseEvent::from_sgr(b"<32;2;2", b'M').unwrap();
        assert_eq!(moved, MouseEvent::Moved { y: 1, x: 1 });
        assert!(!moved.wanted_by(MouseMask::BUTTON1_PRESSED));
        assert!(moved.wanted_by(MouseMask::all()));

        let press = MouseEvent::from_sgr(b"<0;1;1", b'M').unwrap();
        assert!(press.wanted_by(MouseMask::BUTTON1_PRESSED));
        assert!(!press.wanted_by(MouseMask::BUTTON1_RELEASED));
    }

    /// Interrupts the first read once, the way SIGWINCH does.
    struct Resized {
        interrupt: bool,
        pending: bool,
        bytes: VecDeque<u8>,
    }

    impl ByteSource for Resized {
        fn next_byte(&mut self, first: bool) -> std::io::Result<Option<u8>> {
            if first && self.interrupt {
                self.interrupt = false;
                self.pending = true;
                return Err(std::io::ErrorKind::Interrupted.into());
            }
            Ok(self.bytes.pop_front())
        }

        fn take_resize(&mut self) -> bool {
            std::mem::take(&mut self.pending)
        }
    }

    #[test]
    fn test_resize_interrupts_key_wait() {
        let mut source = Resized {
            interrupt: true,
            pending: false,
            bytes: b"q".iter().copied().collect(),
        };
        assert_eq!(read_key(&mut source, true).unwrap(), Some(Key::Resize));
        assert_eq!(read_key(&mut source, true).unwrap(), Some(Key::Char('q')));
        assert_eq!(Key::Resize.to_string(), "resize");
    }

    #[test]
    fn test_pending_resize_is_reported_first() {
        let mut source = Resized {
            interrupt: false,
            pending: true,
            bytes: b"q".iter().copied().collect(),
        };
        assert_eq!(read_key(&mut source, false).unwrap(), Some(Key::Resize));
        assert_eq!(read_key(&mut source, false).unwrap(), Some(Key::Char('q')));
    }

    #[test]
    fn test_other_interrupts_are_errors() {
        struct Broken;
        impl ByteSource for Broken {
            fn next_byte(&mut self, _first: bool) -> std::io::Result<Option<u8>> {
                Err(std::io::ErrorKind::Interrupted.into())
            }
        }
        assert!(read_key(&mut Broken, true).is_err());
    }

    #[test]
    fn test_malformed_mouse_report() {
        assert_eq!(MouseEvent::from_sgr(b"<x;1;1", b'M'), None);
        assert_eq!(MouseEvent::from_sgr(b"<0;1", b'M'), None);
        assert_eq!(MouseEvent::from_sgr(b"0;1;1", b'M'), None);
    }
}
