use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

use ptysnap::{IoConfig, ProgramBuilder, SnapshotProgram};

mod common;
use common::ptysnap_bin;

fn program_file(program: &SnapshotProgram) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(serde_json::to_string(program).unwrap().as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn hello_program() -> SnapshotProgram {
    ProgramBuilder::new()
        .configure_io(IoConfig {
            raw: false,
            cbreak: true,
            echo: false,
            keypad: false,
        })
        .with_window(5, 20, 1, 1, |w| w.draw_box().mv_add("Hello CLI", 1, 2).refresh())
        .build()
}

#[test]
fn test_render_from_stdin() {
    Command::new(ptysnap_bin())
        .arg("render")
        .arg("--size")
        .arg("20x3")
        .write_stdin("\x1b[2;3Hhi\x1b(0\x1b[3;1Hlqk\x1b(B")
        .timeout(Duration::from_secs(5))
        .assert()
        .success()
        .stdout("\n  hi\n+-+\n");
}

#[test]
fn test_render_prints_cursor() {
    Command::new(ptysnap_bin())
        .arg("render")
        .arg("--size")
        .arg("10x2")
        .arg("--cursor")
        .arg("print")
        .write_stdin("ab\x1b[2;5H")
        .timeout(Duration::from_secs(5))
        .assert()
        .success()
        .stdout(predicate::str::starts_with("Cursor: row 2, col 5\nab\n"));
}

#[test]
fn test_render_from_file() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(b"\x1b[H\x1b[2Jfrom file").unwrap();
    file.flush().unwrap();

    Command::new(ptysnap_bin())
        .arg("render")
        .arg("--size")
        .arg("12x1")
        .arg(file.path())
        .timeout(Duration::from_secs(5))
        .assert()
        .success()
        .stdout("from file\n");
}

#[test]
fn test_render_rejects_unknown_cursor_mode() {
    Command::new(ptysnap_bin())
        .arg("render")
        .arg("--cursor")
        .arg("blink")
        .write_stdin("")
        .timeout(Duration::from_secs(5))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown cursor mode"));
}

#[test]
fn test_invalid_terminal_size() {
    Command::new(ptysnap_bin())
        .arg("render")
        .arg("--size")
        .arg("notasize")
        .write_stdin("")
        .timeout(Duration::from_secs(5))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid size"));
}

#[test]
fn test_capture_prints_screen() {
    let file = program_file(&hello_program());

    Command::new(ptysnap_bin())
        .arg("capture")
        .arg("--program")
        .arg(file.path())
        .arg("--size")
        .arg("30x8")
        .timeout(Duration::from_secs(10))
        .assert()
        .success()
        .stdout(predicate::str::contains(" +------------------+"))
        .stdout(predicate::str::contains(" | Hello CLI        |"));
}

#[test]
fn test_capture_json_format() {
    let file = program_file(&hello_program());

    let output = Command::new(ptysnap_bin())
        .arg("capture")
        .arg("--program")
        .arg(file.path())
        .arg("--size")
        .arg("30x8")
        .arg("--format")
        .arg("json")
        .timeout(Duration::from_secs(10))
        .output()
        .unwrap();
    assert!(output.status.success());

    let data: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(data["size"]["rows"], 8);
    assert_eq!(data["size"]["cols"], 30);
    assert_eq!(data["screen"][2], " | Hello CLI        |");
    assert!(data["escaped"].as_str().unwrap().contains("\\u{1B}(0"));
}

#[test]
fn test_capture_sends_input() {
    let program = ProgramBuilder::new()
        .configure_io(IoConfig {
            raw: false,
            cbreak: true,
            echo: false,
            keypad: true,
        })
        .with_window(4, 30, 0, 0, |w| {
            w.configure_keypad(true)
                .set_timeout(3000)
                .record_key("First", 0, 0)
                .record_key("Second", 1, 0)
                .refresh()
        })
        .build();
    let file = program_file(&program);

    Command::new(ptysnap_bin())
        .arg("capture")
        .arg("--program")
        .arg(file.path())
        .arg("--size")
        .arg("30x4")
        .arg("--delay")
        .arg("300")
        .arg("--input")
        .arg("\\e[A")
        .arg("--input")
        .arg("\\x7f")
        .timeout(Duration::from_secs(10))
        .assert()
        .success()
        .stdout(predicate::str::contains("First: up"))
        .stdout(predicate::str::contains("Second: backspace"));
}

#[test]
fn test_capture_reports_helper_failure() {
    let file = program_file(&hello_program());

    Command::new(ptysnap_bin())
        .arg("capture")
        .arg("--program")
        .arg(file.path())
        .arg("--helper")
        .arg("false")
        .timeout(Duration::from_secs(10))
        .assert()
        .failure()
        .stderr(predicate::str::contains("helper exited with status 1"));
}

#[test]
fn test_capture_rejects_invalid_program() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(br#"{"commands": [{"type": "beep"}]}"#).unwrap();
    file.flush().unwrap();

    Command::new(ptysnap_bin())
        .arg("capture")
        .arg("--program")
        .arg(file.path())
        .timeout(Duration::from_secs(5))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid command program"));
}

#[test]
fn test_helper_requires_program() {
    Command::new(ptysnap_bin())
        .arg("helper")
        .arg("--script-env")
        .arg("PTYSNAP_TEST_MISSING_SCRIPT")
        .timeout(Duration::from_secs(5))
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "snapshot helper failed: PTYSNAP_TEST_MISSING_SCRIPT is not set",
        ));
}
