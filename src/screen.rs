// Virtual terminal screen for snapshot assertions
//
// Interprets the ANSI/VT100 subset that curses emits into a fixed-size
// character grid. Only glyphs and the cursor are tracked; attributes,
// scroll regions and mode switches are consumed and ignored.

use vte::Perform;

use crate::snapshot::Snapshot;

/// Active G0 character set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Charset {
    #[default]
    Ascii,
    LineDrawing,
}

impl Charset {
    /// Map a printable character through the charset. Line-drawing glyphs
    /// collapse to plain ASCII so box borders are easy to assert on.
    pub fn map(self, c: char) -> char {
        match self {
            Charset::Ascii => c,
            Charset::LineDrawing => match c {
                'l' | 'k' | 'm' | 'j' | 't' | 'u' | 'v' | 'w' | 'n' => '+',
                'q' => '-',
                'x' => '|',
                other => other,
            },
        }
    }
}

/// A parsed CSI sequence. Parameters the stream left empty read as 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlSequence {
    pub private_marker: Option<char>,
    pub params: Vec<u16>,
    pub final_byte: char,
}

impl ControlSequence {
    /// `has_params` is false when no digit or `;` came between `ESC [` and the
    /// final byte. vte reports a lone zero in that case too.
    fn from_vte(params: &vte::Params, intermediates: &[u8], action: char, has_params: bool) -> Self {
        let private_marker = intermediates
            .iter()
            .map(|b| *b as char)
            .find(|c| *c == '?' || *c == '>');
        ControlSequence {
            private_marker,
            params: if has_params {
                params.iter().map(|p| p.first().copied().unwrap_or(0)).collect()
            } else {
                Vec::new()
            },
            final_byte: action,
        }
    }

    /// Parameter at `index`, or `default` when the sequence did not supply it.
    pub fn param_or(&self, index: usize, default: u16) -> u16 {
        self.params.get(index).copied().unwrap_or(default)
    }
}

pub struct Screen {
    rows: usize,
    cols: usize,
    cells: Vec<Vec<char>>,
    cursor_row: usize,
    cursor_col: usize,
    last_glyph: Option<char>,
    charset: Charset,
    parser: vte::Parser,
    // Parameter bytes seen since the last ESC
    csi_has_params: bool,
}

impl Screen {
    pub fn new(rows: usize, cols: usize) -> Self {
        Screen {
            rows,
            cols,
            cells: vec![vec![' '; cols]; rows],
            cursor_row: 0,
            cursor_col: 0,
            last_glyph: None,
            charset: Charset::Ascii,
            parser: vte::Parser::new(),
            csi_has_params: false,
        }
    }

    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let mut screen = Screen::new(snapshot.rows() as usize, snapshot.cols() as usize);
        screen.process_bytes(snapshot.bytes());
        screen
    }

    /// Feed raw pty output. Parser state carries over between calls, so a
    /// sequence split across two chunks is still recognized.
    pub fn process_bytes(&mut self, bytes: &[u8]) {
        let mut parser = std::mem::take(&mut self.parser);
        for byte in bytes {
            match byte {
                0x1b => self.csi_has_params = false,
                b'0'..=b'9' | b';' => self.csi_has_params = true,
                _ => {}
            }
            parser.advance(self, *byte);
        }
        self.parser = parser;
    }

    /// Row content padded with spaces to the full column count. Rows outside
    /// the grid read as empty.
    pub fn line(&self, index: usize) -> String {
        self.cells
            .get(index)
            .map(|row| row.iter().collect())
            .unwrap_or_default()
    }

    pub fn trimmed_line(&self, index: usize) -> String {
        self.line(index).trim_end_matches(' ').to_string()
    }

    pub fn lines(&self) -> Vec<String> {
        (0..self.rows).map(|i| self.line(i)).collect()
    }

    pub fn trimmed_lines(&self) -> Vec<String> {
        (0..self.rows).map(|i| self.trimmed_line(i)).collect()
    }

    /// Trimmed lines with blank rows dropped, the usual assertion surface.
    pub fn non_empty_lines(&self) -> Vec<String> {
        self.trimmed_lines()
            .into_iter()
            .filter(|line| !line.is_empty())
            .collect()
    }

    /// Whole grid as text, one trimmed row per line.
    pub fn contents(&self) -> String {
        self.trimmed_lines().join("\n")
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<char> {
        self.cells.get(row).and_then(|r| r.get(col)).copied()
    }

    /// Cursor position (row, col), 0-indexed
    pub fn cursor_position(&self) -> (usize, usize) {
        (self.cursor_row, self.cursor_col)
    }

    /// Grid dimensions (rows, cols)
    pub fn dimensions(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn charset(&self) -> Charset {
        self.charset
    }

    fn is_empty(&self) -> bool {
        self.rows == 0 || self.cols == 0
    }

    fn put_glyph(&mut self, glyph: char) {
        if self.is_empty() {
            return;
        }
        self.cells[self.cursor_row][self.cursor_col] = glyph;
        // No autowrap: the last column absorbs everything past the edge.
        self.cursor_col = (self.cursor_col + 1).min(self.cols - 1);
        self.last_glyph = Some(glyph);
    }

    fn move_cursor(&mut self, row: usize, col: usize) {
        if self.is_empty() {
            return;
        }
        self.cursor_row = row.min(self.rows - 1);
        self.cursor_col = col.min(self.cols - 1);
    }

    fn clear_line_from_cursor(&mut self) {
        if self.is_empty() {
            return;
        }
        for col in self.cursor_col..self.cols {
            self.cells[self.cursor_row][col] = ' ';
        }
    }

    fn clear_below_cursor(&mut self) {
        self.clear_line_from_cursor();
        for row in (self.cursor_row + 1)..self.rows {
            self.cells[row].fill(' ');
        }
    }

    fn clear_all(&mut self) {
        for row in &mut self.cells {
            row.fill(' ');
        }
        self.cursor_row = 0;
        self.cursor_col = 0;
    }

    fn execute_sequence(&mut self, seq: &ControlSequence) {
        match seq.final_byte {
            'H' | 'f' => {
                let row = seq.param_or(0, 1).saturating_sub(1) as usize;
                let col = seq.param_or(1, 1).saturating_sub(1) as usize;
                self.move_cursor(row, col);
            }
            'J' => match seq.param_or(0, 0) {
                0 => self.clear_below_cursor(),
                2 => self.clear_all(),
                _ => {}
            },
            'K' => self.clear_line_from_cursor(),
            'b' => {
                if let Some(glyph) = self.last_glyph {
                    for _ in 0..seq.param_or(0, 1) {
                        self.put_glyph(glyph);
                    }
                }
            }
            'd' => {
                let row = seq.param_or(0, 1).saturating_sub(1) as usize;
                self.move_cursor(row, self.cursor_col);
            }
            // Attributes, scroll region, window ops, modes, reports, save/restore
            'm' | 'r' | 't' | 'h' | 'l' | 'n' | 's' | 'u' => {}
            _ => {}
        }
    }
}

impl Perform for Screen {
    fn print(&mut self, c: char) {
        let glyph = self.charset.map(c);
        self.put_glyph(glyph);
    }

    fn execute(&mut self, byte: u8) {
        match byte {
            b'\n' => {
                if !self.is_empty() {
                    self.cursor_row = (self.cursor_row + 1).min(self.rows - 1);
                }
            }
            b'\r' => {
                self.cursor_col = 0;
            }
            _ => {}
        }
    }

    fn hook(&mut self, _: &vte::Params, _: &[u8], _: bool, _: char) {}
    fn put(&mut self, _: u8) {}
    fn unhook(&mut self) {}
    fn osc_dispatch(&mut self, _: &[&[u8]], _: bool) {}

    fn csi_dispatch(&mut self, params: &vte::Params, intermediates: &[u8], ignore: bool, action: char) {
        if ignore {
            return;
        }
        let seq = ControlSequence::from_vte(params, intermediates, action, self.csi_has_params);
        self.execute_sequence(&seq);
    }

    fn esc_dispatch(&mut self, intermediates: &[u8], _ignore: bool, byte: u8) {
        match intermediates {
            [b'('] => {
                self.charset = if byte == b'0' {
                    Charset::LineDrawing
                } else {
                    Charset::Ascii
                };
            }
            [b')'] => {
                // G1 is not modeled separately
                self.charset = Charset::Ascii;
            }
            _ => {}
        }
    }
}
