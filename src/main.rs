// ptysnap: snapshot testing for terminal programs
//
// Runs command programs under a fresh pseudo-terminal, captures what they
// draw and replays captures onto a character grid.

use std::env;
use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser as ClapParser, Subcommand};
use tracing_subscriber::EnvFilter;

use ptysnap::config::{HarnessConfig, HelperCommand, TerminalSize, DEFAULT_SCRIPT_ENV, DEFAULT_TERM};
use ptysnap::{render, Error, Harness, Screen, Snapshot, SnapshotProgram};

/// Environment variable holding the log filter.
const LOG_ENV: &str = "PTYSNAP_LOG";

#[derive(ClapParser)]
#[command(name = "ptysnap")]
#[command(about = "Snapshot testing for terminal programs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a staged command program on this terminal (companion executable)
    Helper {
        /// Environment variable holding the program path
        #[arg(long, default_value = DEFAULT_SCRIPT_ENV)]
        script_env: String,
    },

    /// Run a command program under a fresh pty and print what it drew
    Capture(CaptureArgs),

    /// Replay captured bytes onto a grid and print it
    Render {
        /// Terminal size (e.g., 80x24)
        #[arg(long, default_value = "80x24")]
        size: String,

        /// Cursor display mode (none, inverse, print, both)
        #[arg(long, default_value = "none")]
        cursor: String,

        /// Captured bytes (stdin if omitted)
        file: Option<PathBuf>,
    },
}

#[derive(Args)]
struct CaptureArgs {
    /// JSON command program
    #[arg(long, required = true)]
    program: PathBuf,

    /// Terminal size (e.g., 80x24)
    #[arg(long, default_value = "80x24")]
    size: String,

    /// TERM for the helper, unless the program sets one
    #[arg(long, default_value = DEFAULT_TERM)]
    term: String,

    /// Helper executable (default: this executable's helper mode)
    #[arg(long)]
    helper: Option<PathBuf>,

    /// Output format (screen, raw, escaped or json)
    #[arg(long, default_value = "screen")]
    format: String,

    /// Milliseconds to wait before resizing or sending input
    #[arg(long, default_value = "200")]
    delay: u64,

    /// Resize the terminal during the capture (e.g., 40x12)
    #[arg(long)]
    resize: Option<String>,

    /// Input to send after the delay, in order
    /// Supports: \n \r \t \a \b \f \v \\ \e \xHH
    #[arg(long)]
    input: Vec<String>,
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// Unescape C-style escape sequences in a string.
/// Supports: \n \r \t \a \b \f \v \\ \e \xHH
fn unescape(s: &str) -> Result<Vec<u8>> {
    let mut result = Vec::new();
    let mut chars = s.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            let mut buf = [0u8; 4];
            result.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            continue;
        }
        match chars.next() {
            Some('n') => result.push(b'\n'),
            Some('r') => result.push(b'\r'),
            Some('t') => result.push(b'\t'),
            Some('a') => result.push(0x07),
            Some('b') => result.push(0x08),
            Some('f') => result.push(0x0C),
            Some('v') => result.push(0x0B),
            Some('\\') => result.push(b'\\'),
            Some('e') | Some('E') => result.push(0x1B),
            Some('x') => {
                let hex: String = chars.by_ref().take(2).collect();
                if hex.chars().count() != 2 {
                    bail!("incomplete \\x escape");
                }
                let byte = u8::from_str_radix(&hex, 16).with_context(|| format!("invalid hex escape: \\x{}", hex))?;
                result.push(byte);
            }
            // Unknown escape, kept as-is
            Some(other) => {
                result.push(b'\\');
                let mut buf = [0u8; 4];
                result.extend_from_slice(other.encode_utf8(&mut buf).as_bytes());
            }
            None => result.push(b'\\'),
        }
    }

    Ok(result)
}

fn cmd_capture(args: CaptureArgs) -> Result<()> {
    let text = fs::read_to_string(&args.program)
        .with_context(|| format!("Failed to read program {}", args.program.display()))?;
    let program: SnapshotProgram = serde_json::from_str(&text).context("Invalid command program")?;

    let size: TerminalSize = args.size.parse()?;
    let resize = args.resize.as_deref().map(str::parse::<TerminalSize>).transpose()?;
    let inputs = args.input.iter().map(|s| unescape(s)).collect::<Result<Vec<_>>>()?;
    let delay = Duration::from_millis(args.delay);

    let helper = match args.helper {
        Some(path) => HelperCommand::new(path),
        None => HelperCommand::new(env::current_exe().context("Failed to locate the ptysnap executable")?).arg("helper"),
    };
    let harness = Harness::new(HarnessConfig::new(helper).size(size.rows, size.cols).term(args.term));

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let result = runtime.block_on(async {
        if resize.is_none() && inputs.is_empty() {
            return harness.capture(&program).await;
        }
        harness
            .capture_with(&program, move |ctx| async move {
                tokio::time::sleep(delay).await;
                if let Some(size) = resize {
                    ctx.resize(size.rows, size.cols).await?;
                }
                for input in inputs {
                    ctx.send(input).await?;
                }
                Ok::<_, anyhow::Error>(())
            })
            .await
    });

    match result {
        Ok(snapshot) => print_snapshot(&snapshot, &args.format),
        Err(Error::Process { status, output }) => {
            eprintln!("Error: helper exited with status {}", status);
            println!("{}", Snapshot::new(output, size.rows, size.cols).escaped());
            std::process::exit(1);
        }
        Err(e) => Err(e).context("Capture failed"),
    }
}

fn print_snapshot(snapshot: &Snapshot, format: &str) -> Result<()> {
    match format {
        "screen" => println!("{}", snapshot.screen().contents()),
        "raw" => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(snapshot.bytes())?;
            stdout.flush()?;
        }
        "escaped" => println!("{}", snapshot.escaped()),
        "json" => {
            let screen = snapshot.screen();
            let (row, col) = screen.cursor_position();
            let data = serde_json::json!({
                "screen": screen.trimmed_lines(),
                "cursor": {
                    "row": row,
                    "col": col
                },
                "size": {
                    "rows": snapshot.rows(),
                    "cols": snapshot.cols()
                },
                "escaped": snapshot.escaped()
            });
            println!("{}", serde_json::to_string_pretty(&data)?);
        }
        other => bail!("Unknown format '{}', expected screen, raw, escaped or json", other),
    }
    Ok(())
}

fn cmd_render(size: String, cursor: String, file: Option<PathBuf>) -> Result<()> {
    let size: TerminalSize = size.parse()?;
    if !matches!(cursor.as_str(), "none" | "inverse" | "print" | "both") {
        bail!("Unknown cursor mode '{}', expected none, inverse, print or both", cursor);
    }

    let bytes = match &file {
        Some(path) => fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut buf = Vec::new();
            io::stdin().read_to_end(&mut buf).context("Failed to read stdin")?;
            buf
        }
    };

    let mut screen = Screen::new(usize::from(size.rows), usize::from(size.cols));
    screen.process_bytes(&bytes);
    let (row, col) = screen.cursor_position();

    // Cursor is 1-based for display
    if cursor == "print" || cursor == "both" {
        println!("Cursor: row {}, col {}", row + 1, col + 1);
    }

    if cursor == "inverse" || cursor == "both" {
        println!("{}", apply_cursor_inverse(&screen, row, col));
    } else {
        println!("{}", screen.contents());
    }
    Ok(())
}

/// Trimmed grid with the cell under the cursor in inverse video. The cursor
/// row keeps its trailing blanks up to the cursor so the mark stays visible.
fn apply_cursor_inverse(screen: &Screen, cursor_row: usize, cursor_col: usize) -> String {
    let mut lines = screen.trimmed_lines();
    if let Some(line) = lines.get_mut(cursor_row) {
        let mut chars: Vec<char> = screen.line(cursor_row).chars().collect();
        let keep = line.chars().count().max(cursor_col + 1).min(chars.len());
        chars.truncate(keep);

        let mut marked = String::new();
        for (idx, ch) in chars.into_iter().enumerate() {
            if idx == cursor_col {
                marked.push_str("\x1b[7m");
                marked.push(ch);
                marked.push_str("\x1b[27m");
            } else {
                marked.push(ch);
            }
        }
        *line = marked;
    }
    lines.join("\n")
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    match cli.command {
        Commands::Helper { script_env } => {
            if let Err(e) = render::run_helper(&script_env) {
                eprintln!("snapshot helper failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Commands::Capture(args) => cmd_capture(args)?,
        Commands::Render { size, cursor, file } => cmd_render(size, cursor, file)?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unescape() {
        assert_eq!(unescape("a\\nb").unwrap(), b"a\nb");
        assert_eq!(unescape("\\e[A").unwrap(), b"\x1b[A");
        assert_eq!(unescape("\\x1b\\x7f").unwrap(), b"\x1b\x7f");
        assert_eq!(unescape("\\q").unwrap(), b"\\q");
        assert_eq!(unescape("tail\\").unwrap(), b"tail\\");
        assert!(unescape("\\x1").is_err());
        assert!(unescape("\\xzz").is_err());
    }

    #[test]
    fn test_apply_cursor_inverse() {
        let mut screen = Screen::new(2, 6);
        screen.process_bytes(b"ab\x1b[1;4H");
        assert_eq!(apply_cursor_inverse(&screen, 0, 3), "ab \x1b[7m \x1b[27m\n");
    }
}
