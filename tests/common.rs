use ptysnap::config::HelperCommand;
use ptysnap::{Harness, HarnessConfig, Screen};

/// Get the ptysnap binary path to use for testing.
///
/// This allows testing an alternative helper build by setting the
/// OVERRIDE_CARGO_BIN_EXE_ptysnap environment variable.
///
/// # Example
///
/// ```bash
/// # Test the binary built from this crate (default)
/// cargo test
///
/// # Test another build
/// OVERRIDE_CARGO_BIN_EXE_ptysnap=/path/to/ptysnap cargo test
/// ```
pub fn ptysnap_bin() -> String {
    std::env::var("OVERRIDE_CARGO_BIN_EXE_ptysnap")
        .unwrap_or_else(|_| env!("CARGO_BIN_EXE_ptysnap").to_string())
}

/// Harness running the real companion helper at the given size.
// Not every test file uses every helper here
#[allow(dead_code)]
pub fn helper_harness(rows: u16, cols: u16) -> Harness {
    let helper = HelperCommand::new(ptysnap_bin()).arg("helper");
    Harness::new(HarnessConfig::new(helper).size(rows, cols))
}

/// Feed raw bytes into a fresh grid.
#[allow(dead_code)]
pub fn screen_of(rows: usize, cols: usize, bytes: &[u8]) -> Screen {
    let mut screen = Screen::new(rows, cols);
    screen.process_bytes(bytes);
    screen
}
