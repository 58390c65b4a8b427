// Declarative command programs executed by the helper
//
// Encoded as JSON with an explicit discriminator and payload:
// {"type": "mvAdd", "parameters": {"string": "hi", "y": 1, "x": 2}}

use bitflags::bitflags;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotProgram {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub term: Option<String>,
    #[serde(default)]
    pub commands: Vec<Command>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Color {
    Black,
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
    White,
}

impl Color {
    /// ANSI color index (0-7)
    pub fn index(self) -> u8 {
        match self {
            Color::Black => 0,
            Color::Red => 1,
            Color::Green => 2,
            Color::Yellow => 3,
            Color::Blue => 4,
            Color::Magenta => 5,
            Color::Cyan => 6,
            Color::White => 7,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Attribute {
    Bold,
    Dim,
    Underline,
    Reverse,
    Blink,
    Standout,
    Italic,
    Invisible,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MouseMask: u32 {
        const BUTTON1_PRESSED = 1 << 0;
        const BUTTON1_RELEASED = 1 << 1;
        const BUTTON2_PRESSED = 1 << 2;
        const BUTTON2_RELEASED = 1 << 3;
        const BUTTON3_PRESSED = 1 << 4;
        const BUTTON3_RELEASED = 1 << 5;
        const BUTTON4_PRESSED = 1 << 6;
        const BUTTON4_RELEASED = 1 << 7;
        const MOVED = 1 << 8;
    }
}

// Encoded as the raw bit set so the wire format stays a plain integer.
impl Serialize for MouseMask {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.bits().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for MouseMask {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        u32::deserialize(deserializer).map(MouseMask::from_bits_truncate)
    }
}

/// Terminal input modes applied before anything is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IoConfig {
    pub raw: bool,
    pub cbreak: bool,
    pub echo: bool,
    pub keypad: bool,
}

impl Default for IoConfig {
    fn default() -> Self {
        IoConfig {
            raw: true,
            cbreak: true,
            echo: false,
            keypad: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorPairDescriptor {
    pub name: String,
    pub foreground: Color,
    pub background: Color,
}

/// A window and the commands run inside it. A zero height or width
/// extends the window to the edge of the terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowDescriptor {
    pub height: u16,
    pub width: u16,
    pub start_y: u16,
    pub start_x: u16,
    pub commands: Vec<WindowCommand>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "parameters", rename_all = "camelCase")]
pub enum Command {
    #[serde(rename = "configureIO")]
    ConfigureIo(IoConfig),
    WithWindow(WindowDescriptor),
    StartColor,
    AllocateColorPair(ColorPairDescriptor),
    EnableMouse(MouseMask),
    DisableMouse,
    Wait { milliseconds: u32 },
    Flush,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "parameters", rename_all = "camelCase")]
pub enum WindowCommand {
    DrawBox,
    MvAdd {
        string: String,
        y: u16,
        x: u16,
    },
    #[serde(rename_all = "camelCase")]
    MvAddWithEllipsis {
        string: String,
        max_columns: u16,
        y: u16,
        x: u16,
        ellipsis: String,
    },
    ReportSize {
        prefix: String,
        y: u16,
        x: u16,
    },
    ReportTerminalSize {
        prefix: String,
        y: u16,
        x: u16,
    },
    /// Input timeout; negative blocks indefinitely.
    SetTimeout { milliseconds: i32 },
    SetNonBlocking { enabled: bool },
    ConfigureKeypad { enabled: bool },
    RecordKey {
        prefix: String,
        y: u16,
        x: u16,
        fallback: String,
    },
    RecordMouse {
        prefix: String,
        y: u16,
        x: u16,
        fallback: String,
    },
    #[serde(rename_all = "camelCase")]
    SetAttributes {
        attributes: Vec<Attribute>,
        color_pair: Option<String>,
    },
    Wait { milliseconds: u32 },
    Refresh,
    Flush,
}

pub const DEFAULT_ELLIPSIS: &str = "...";
pub const DEFAULT_FALLBACK: &str = "none";

impl WindowCommand {
    pub fn mv_add(string: impl Into<String>, y: u16, x: u16) -> Self {
        WindowCommand::MvAdd {
            string: string.into(),
            y,
            x,
        }
    }

    pub fn mv_add_with_ellipsis(string: impl Into<String>, max_columns: u16, y: u16, x: u16) -> Self {
        WindowCommand::MvAddWithEllipsis {
            string: string.into(),
            max_columns,
            y,
            x,
            ellipsis: DEFAULT_ELLIPSIS.to_string(),
        }
    }

    pub fn record_key(prefix: impl Into<String>, y: u16, x: u16) -> Self {
        WindowCommand::RecordKey {
            prefix: prefix.into(),
            y,
            x,
            fallback: DEFAULT_FALLBACK.to_string(),
        }
    }

    pub fn record_mouse(prefix: impl Into<String>, y: u16, x: u16) -> Self {
        WindowCommand::RecordMouse {
            prefix: prefix.into(),
            y,
            x,
            fallback: DEFAULT_FALLBACK.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProgramBuilder {
    program: SnapshotProgram,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn term(mut self, term: impl Into<String>) -> Self {
        self.program.term = Some(term.into());
        self
    }

    pub fn configure_io(mut self, io: IoConfig) -> Self {
        self.program.commands.push(Command::ConfigureIo(io));
        self
    }

    pub fn with_window(
        mut self,
        height: u16,
        width: u16,
        start_y: u16,
        start_x: u16,
        build: impl FnOnce(WindowBuilder) -> WindowBuilder,
    ) -> Self {
        let commands = build(WindowBuilder::default()).commands;
        self.program.commands.push(Command::WithWindow(WindowDescriptor {
            height,
            width,
            start_y,
            start_x,
            commands,
        }));
        self
    }

    pub fn start_color(mut self) -> Self {
        self.program.commands.push(Command::StartColor);
        self
    }

    pub fn allocate_color_pair(mut self, name: impl Into<String>, foreground: Color, background: Color) -> Self {
        self.program.commands.push(Command::AllocateColorPair(ColorPairDescriptor {
            name: name.into(),
            foreground,
            background,
        }));
        self
    }

    pub fn enable_mouse(mut self, mask: MouseMask) -> Self {
        self.program.commands.push(Command::EnableMouse(mask));
        self
    }

    pub fn disable_mouse(mut self) -> Self {
        self.program.commands.push(Command::DisableMouse);
        self
    }

    pub fn wait(mut self, milliseconds: u32) -> Self {
        self.program.commands.push(Command::Wait { milliseconds });
        self
    }

    pub fn flush(mut self) -> Self {
        self.program.commands.push(Command::Flush);
        self
    }

    pub fn build(self) -> SnapshotProgram {
        self.program
    }
}

#[derive(Debug, Clone, Default)]
pub struct WindowBuilder {
    commands: Vec<WindowCommand>,
}

impl WindowBuilder {
    pub fn push(mut self, command: WindowCommand) -> Self {
        self.commands.push(command);
        self
    }

    pub fn draw_box(self) -> Self {
        self.push(WindowCommand::DrawBox)
    }

    pub fn mv_add(self, string: impl Into<String>, y: u16, x: u16) -> Self {
        self.push(WindowCommand::mv_add(string, y, x))
    }

    pub fn mv_add_with_ellipsis(self, string: impl Into<String>, max_columns: u16, y: u16, x: u16) -> Self {
        self.push(WindowCommand::mv_add_with_ellipsis(string, max_columns, y, x))
    }

    pub fn report_size(self, prefix: impl Into<String>, y: u16, x: u16) -> Self {
        self.push(WindowCommand::ReportSize { prefix: prefix.into(), y, x })
    }

    pub fn report_terminal_size(self, prefix: impl Into<String>, y: u16, x: u16) -> Self {
        self.push(WindowCommand::ReportTerminalSize { prefix: prefix.into(), y, x })
    }

    pub fn set_timeout(self, milliseconds: i32) -> Self {
        self.push(WindowCommand::SetTimeout { milliseconds })
    }

    pub fn set_non_blocking(self, enabled: bool) -> Self {
        self.push(WindowCommand::SetNonBlocking { enabled })
    }

    pub fn configure_keypad(self, enabled: bool) -> Self {
        self.push(WindowCommand::ConfigureKeypad { enabled })
    }

    pub fn record_key(self, prefix: impl Into<String>, y: u16, x: u16) -> Self {
        self.push(WindowCommand::record_key(prefix, y, x))
    }

    pub fn record_mouse(self, prefix: impl Into<String>, y: u16, x: u16) -> Self {
        self.push(WindowCommand::record_mouse(prefix, y, x))
    }

    pub fn set_attributes(self, attributes: &[Attribute], color_pair: Option<&str>) -> Self {
        self.push(WindowCommand::SetAttributes {
            attributes: attributes.to_vec(),
            color_pair: color_pair.map(str::to_string),
        })
    }

    pub fn wait(self, milliseconds: u32) -> Self {
        self.push(WindowCommand::Wait { milliseconds })
    }

    pub fn refresh(self) -> Self {
        self.push(WindowCommand::Refresh)
    }

    pub fn flush(self) -> Self {
        self.push(WindowCommand::Flush)
    }
}
