// Captured terminal output

use crate::screen::Screen;

/// Raw bytes captured from one pty session, plus the dimensions the
/// session was opened with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    bytes: Vec<u8>,
    rows: u16,
    cols: u16,
}

impl Snapshot {
    pub fn new(bytes: Vec<u8>, rows: u16, cols: u16) -> Self {
        Snapshot { bytes, rows, cols }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn rows(&self) -> u16 {
        self.rows
    }

    pub fn cols(&self) -> u16 {
        self.cols
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn utf8_lossy(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }

    /// Printable rendering with control characters spelled out, e.g.
    /// `\u{1B}[1;1H` for a cursor move. Useful for asserting on raw
    /// sequences such as SGR attributes that the grid does not model.
    pub fn escaped(&self) -> String {
        escape_bytes(&self.bytes)
    }

    pub fn screen(&self) -> Screen {
        Screen::from_snapshot(self)
    }
}

pub(crate) fn escape_bytes(bytes: &[u8]) -> String {
    let mut result = String::new();
    for c in String::from_utf8_lossy(bytes).chars() {
        match c {
            '\x1b' => result.push_str("\\u{1B}"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            c if (c as u32) < 0x20 => result.push_str(&format!("\\u{{{:02X}}}", c as u32)),
            c => result.push(c),
        }
    }
    result
}
