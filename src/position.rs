//! Source position tracking shared by every phase of the toolchain.

use once_cell::unsync::OnceCell;
use std::fmt::{Display, Formatter};

/// A 1-based line/column pair.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl Display for Position {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A source held as UTF-8 bytes with lazily-computed line-break offsets.
///
/// Positions are computed on demand rather than during tokenization since most
/// callers only need them for the handful of tokens that end up in an error.
pub struct Code<'c> {
    pub value: &'c [u8],
    line_breaks: OnceCell<Vec<usize>>,
}

impl<'c> From<&'c [u8]> for Code<'c> {
    fn from(value: &'c [u8]) -> Self {
        Code::new(value)
    }
}

impl<'c> From<&'c str> for Code<'c> {
    fn from(value: &'c str) -> Self {
        Code::new(value.as_bytes())
    }
}

impl<'c> Code<'c> {
    pub fn new(value: &'c [u8]) -> Self {
        Self {
            value,
            line_breaks: OnceCell::new(),
        }
    }

    fn line_breaks(&self) -> &Vec<usize> {
        self.line_breaks.get_or_init(|| {
            self.value
                .iter()
                .enumerate()
                .filter_map(|(i, b)| if *b == b'\n' { Some(i) } else { None })
                .collect()
        })
    }

    /// Resolve a byte offset into the source to a line/column position.
    pub fn position_at(&self, pointer: usize) -> Position {
        let breaks = self.line_breaks();
        let index = match breaks.binary_search(&pointer) {
            Ok(i) | Err(i) => i,
        };

        if index == 0 {
            let s = unsafe { std::str::from_utf8_unchecked(&self.value[..pointer]) };
            Position::new(1, s.chars().count() + 1)
        } else {
            let break_point = breaks[index - 1] + 1;
            let s = unsafe { std::str::from_utf8_unchecked(&self.value[break_point..pointer]) };
            Position::new(index + 1, s.chars().count() + 1)
        }
    }

    /// The source line (without its terminator) containing `line` (1-based).
    pub fn line_text(&self, line: usize) -> Option<&str> {
        let text = unsafe { std::str::from_utf8_unchecked(self.value) };
        text.lines().nth(line - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_at_start_of_file() {
        let code = Code::from("abc\ndef");
        assert_eq!(code.position_at(0), Position::new(1, 1));
    }

    #[test]
    fn position_after_line_break() {
        let code = Code::from("abc\ndef");
        assert_eq!(code.position_at(4), Position::new(2, 1));
    }

    #[test]
    fn line_text_returns_requested_line() {
        let code = Code::from("[Foo]\nI32 foo\n");
        assert_eq!(code.line_text(2), Some("I32 foo"));
    }
}
