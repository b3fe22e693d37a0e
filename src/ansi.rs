//! ANSI-aware cursor overlay (spec.md §4.5, §9: "isolate in a pure function
//! with a clear state machine over CSI / OSC / DCS / SS3 escape sequences
//! plus East-Asian width handling").
//!
//! `overlay_cursor` takes a captured pane (escape sequences preserved) plus
//! a logical `(column, row)` and returns the same text with a solid block
//! glyph burned into that cell, walking escape sequences so the glyph lands
//! on the correct *visible* column rather than the correct byte offset.

use unicode_width::UnicodeWidthChar;

const CURSOR_GLYPH: char = '█';

#[derive(Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Normal,
    Escape,
    Csi,
    Osc,
    DcsOrSs3,
}

/// Overlay a cursor glyph at `(col, row)` (0-indexed, logical/visible
/// columns) onto `text`. Rows shorter than `col` are padded with spaces.
pub fn overlay_cursor(text: &str, col: usize, row: usize) -> String {
    let mut lines: Vec<String> = text.split('\n').map(|l| l.to_string()).collect();
    while lines.len() <= row {
        lines.push(String::new());
    }
    lines[row] = overlay_in_line(&lines[row], col);
    lines.join("\n")
}

fn overlay_in_line(line: &str, target_col: usize) -> String {
    let mut out = String::with_capacity(line.len() + 4);
    let mut visible_col = 0usize;
    let mut state = ScanState::Normal;
    let mut inserted = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match state {
            ScanState::Normal => {
                if ch == '\u{1b}' {
                    state = ScanState::Escape;
                    out.push(ch);
                    continue;
                }
                let width = UnicodeWidthChar::width(ch).unwrap_or(0);
                if !inserted && visible_col <= target_col && target_col < visible_col + width.max(1) {
                    out.push(CURSOR_GLYPH);
                    inserted = true;
                } else {
                    out.push(ch);
                }
                visible_col += width.max(if width == 0 { 0 } else { width });
                if width == 0 {
                    // zero-width combining character: don't advance column
                }
            }
            ScanState::Escape => {
                out.push(ch);
                state = match ch {
                    '[' => ScanState::Csi,
                    ']' => ScanState::Osc,
                    'P' | 'O' => ScanState::DcsOrSs3,
                    _ => ScanState::Normal,
                };
            }
            ScanState::Csi => {
                out.push(ch);
                if ch.is_ascii_alphabetic() || ch == '~' {
                    state = ScanState::Normal;
                }
            }
            ScanState::Osc => {
                out.push(ch);
                if ch == '\u{7}' {
                    state = ScanState::Normal;
                } else if ch == '\u{1b}' {
                    // ST terminator (ESC \\) — peek next char
                    if chars.peek() == Some(&'\\') {
                        out.push(chars.next().unwrap());
                        state = ScanState::Normal;
                    }
                }
            }
            ScanState::DcsOrSs3 => {
                out.push(ch);
                if ch == '\u{1b}' {
                    if chars.peek() == Some(&'\\') {
                        out.push(chars.next().unwrap());
                        state = ScanState::Normal;
                    }
                } else if state == ScanState::DcsOrSs3 && ch.is_ascii_alphabetic() {
                    // SS3 sequences are a single following char; DCS
                    // sequences are terminated by ST above. Treat a lone
                    // following letter as SS3's end.
                    state = ScanState::Normal;
                }
            }
        }
    }

    if !inserted {
        // Pad with spaces out to target_col, then append the glyph.
        for _ in visible_col..target_col {
            out.push(' ');
        }
        out.push(CURSOR_GLYPH);
    }

    out
}

/// Strip CSI/OSC/DCS/SS3 escape sequences, leaving plain text. Used before
/// pattern-matching a captured pane for agent-state classification.
pub fn strip_ansi(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut state = ScanState::Normal;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        match state {
            ScanState::Normal => {
                if ch == '\u{1b}' {
                    state = ScanState::Escape;
                } else {
                    out.push(ch);
                }
            }
            ScanState::Escape => {
                state = match ch {
                    '[' => ScanState::Csi,
                    ']' => ScanState::Osc,
                    'P' | 'O' => ScanState::DcsOrSs3,
                    _ => ScanState::Normal,
                };
            }
            ScanState::Csi => {
                if ch.is_ascii_alphabetic() || ch == '~' {
                    state = ScanState::Normal;
                }
            }
            ScanState::Osc => {
                if ch == '\u{7}' {
                    state = ScanState::Normal;
                } else if ch == '\u{1b}' && chars.peek() == Some(&'\\') {
                    chars.next();
                    state = ScanState::Normal;
                }
            }
            ScanState::DcsOrSs3 => {
                if ch == '\u{1b}' && chars.peek() == Some(&'\\') {
                    chars.next();
                    state = ScanState::Normal;
                } else if ch.is_ascii_alphabetic() {
                    state = ScanState::Normal;
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlays_on_plain_text() {
        let result = overlay_cursor("hello", 1, 0);
        assert_eq!(result, "h█llo");
    }

    #[test]
    fn pads_short_rows_with_spaces() {
        let result = overlay_cursor("hi", 5, 0);
        assert_eq!(result, "hi   █");
    }

    #[test]
    fn skips_over_csi_sequences() {
        let line = "\u{1b}[31mhello\u{1b}[0m";
        let result = overlay_cursor(line, 1, 0);
        assert_eq!(result, "\u{1b}[31mh█llo\u{1b}[0m");
    }

    #[test]
    fn grows_missing_rows() {
        let result = overlay_cursor("only-row", 0, 2);
        assert_eq!(result, "only-row\n\n█");
    }

    #[test]
    fn strip_ansi_removes_color_codes() {
        let line = "\u{1b}[1;32mReady\u{1b}[0m for your next instruction.";
        assert_eq!(strip_ansi(line), "Ready for your next instruction.");
    }
}
