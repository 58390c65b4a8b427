mod common;
use common::screen_of;

#[test]
fn test_cursor_position_is_one_based() {
    let screen = screen_of(5, 10, b"\x1b[2;3HX");
    assert_eq!(screen.cell(1, 2), Some('X'));
    assert_eq!(screen.cursor_position(), (1, 3));
}

#[test]
fn test_cursor_position_f_alias() {
    let screen = screen_of(5, 10, b"\x1b[4;2fY");
    assert_eq!(screen.cell(3, 1), Some('Y'));
}

#[test]
fn test_cursor_position_missing_column_defaults_to_one() {
    let screen = screen_of(5, 10, b"abc\x1b[3HZ");
    assert_eq!(screen.cell(2, 0), Some('Z'));
}

#[test]
fn test_cursor_position_clamped_to_grid() {
    let cases: [(&[u8], (usize, usize)); 5] = [
        (b"\x1b[99;99H", (4, 9)),
        (b"\x1b[0;0H", (0, 0)),
        (b"\x1b[6;11H", (4, 9)),
        (b"\x1b[1;500f", (0, 9)),
        (b"\x1b[;3H", (0, 2)),
    ];
    for (input, expected) in cases {
        let screen = screen_of(5, 10, input);
        assert_eq!(screen.cursor_position(), expected, "for {:?}", input);
    }
    let screen = screen_of(5, 10, b"\x1b[99;99HQ");
    assert_eq!(screen.cell(4, 9), Some('Q'));
}

#[test]
fn test_printing_never_leaves_the_grid() {
    let long = "x".repeat(200);
    let screen = screen_of(3, 7, format!("{}\r\n{}\n\n\n\n{}", long, long, long).as_bytes());
    assert_eq!(screen.cursor_position(), (2, 6));
    for line in screen.lines() {
        assert_eq!(line.chars().count(), 7);
    }
}

#[test]
fn test_clear_screen_blanks_and_homes() {
    let screen = screen_of(4, 6, b"abcdef\r\nghijkl\x1b[3;3H\x1b[2J");
    assert_eq!(screen.cursor_position(), (0, 0));
    assert!(screen.non_empty_lines().is_empty());
    assert_eq!(screen.contents(), "\n\n\n");
}

#[test]
fn test_clear_after_redraw_only_keeps_new_text() {
    let screen = screen_of(3, 10, b"old text\x1b[H\x1b[2Jnew");
    assert_eq!(screen.non_empty_lines(), vec!["new"]);
}

#[test]
fn test_repeat_previous_glyph() {
    let screen = screen_of(2, 10, b"a\x1b[4bz");
    assert_eq!(screen.trimmed_line(0), "aaaaaz");
}

#[test]
fn test_repeat_defaults_to_one() {
    let screen = screen_of(1, 10, b"q\x1b[b");
    assert_eq!(screen.trimmed_line(0), "qq");
}

#[test]
fn test_repeat_explicit_zero_repeats_nothing() {
    let screen = screen_of(1, 10, b"a\x1b[0bz");
    assert_eq!(screen.trimmed_line(0), "az");
}

#[test]
fn test_repeat_count_split_across_chunks() {
    let mut screen = screen_of(1, 10, b"a\x1b[");
    screen.process_bytes(b"0b");
    assert_eq!(screen.trimmed_line(0), "a");
    screen.process_bytes(b"\x1b[b");
    assert_eq!(screen.trimmed_line(0), "aa");
}

#[test]
fn test_repeat_stops_at_right_edge() {
    let screen = screen_of(1, 5, b"ab\x1b[50b");
    assert_eq!(screen.line(0), "abbbb");
    assert_eq!(screen.cursor_position(), (0, 4));
}

#[test]
fn test_vertical_position_keeps_column() {
    let screen = screen_of(5, 10, b"\x1b[1;4H\x1b[4dv");
    assert_eq!(screen.cell(3, 3), Some('v'));
}

#[test]
fn test_erase_to_end_of_line_keeps_other_rows() {
    let screen = screen_of(3, 5, b"11111\r\n22222\r\n33333\x1b[2;2H\x1b[K");
    assert_eq!(screen.trimmed_lines(), vec!["11111", "2", "33333"]);
}

#[test]
fn test_unsupported_sequences_are_ignored() {
    let screen = screen_of(3, 10, b"a\x1b[5Ab\x1b[2Cc\x1b[Ld\x1b[Pe");
    assert_eq!(screen.trimmed_line(0), "abcde");
}
