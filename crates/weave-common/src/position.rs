//! Source positions shared by the lexer and parser error types.

use serde::Serialize;

/// A 1-based line/column position plus its 0-based byte offset, as carried
/// on every token (spec §3: `start_line, start_column, start_offset`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
    pub offset: usize,
}

impl Position {
    pub fn new(line: usize, column: usize, offset: usize) -> Self {
        Self {
            line,
            column,
            offset,
        }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Maps byte offsets to 1-based `(line, column)` pairs without rescanning
/// the source on every lookup.
///
/// Built once per source string from the positions of its newlines; lookup
/// is a binary search over those positions. Column is a 1-based byte
/// offset within the line (not a grapheme count) — good enough for
/// provenance and editor tooling, and consistent with how offsets are
/// used everywhere else in this crate.
#[derive(Debug, Clone)]
pub struct LineIndex {
    /// Byte offset of the start of each line; `line_starts[0] == 0`.
    line_starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let mut line_starts = vec![0];
        for (i, b) in text.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        Self { line_starts }
    }

    /// Resolve a byte offset to a `Position`. Offsets past the end of the
    /// text resolve against the last known line.
    pub fn position_at(&self, offset: usize) -> Position {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        let column = offset - self.line_starts[line] + 1;
        Position::new(line + 1, column, offset)
    }
}

#[cfg(test)]
mod line_index_tests {
    use super::*;

    #[test]
    fn first_line_first_column() {
        let idx = LineIndex::new("hello\nworld");
        assert_eq!(idx.position_at(0), Position::new(1, 1, 0));
    }

    #[test]
    fn second_line_offset() {
        let idx = LineIndex::new("hello\nworld");
        // 'w' is at byte offset 6, start of line 2.
        assert_eq!(idx.position_at(6), Position::new(2, 1, 6));
    }

    #[test]
    fn mid_line_column() {
        let idx = LineIndex::new("hello\nworld");
        // 'o' in "world" is at offset 9 -> column 4 (w=1,o=2,r=3,l=4? let's check)
        // w(6) o(7) r(8) l(9) d(10); offset 9 -> column 9-6+1=4 -> 'l'
        assert_eq!(idx.position_at(9), Position::new(2, 4, 9));
    }
}
