//! Source location tracking.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A 1-based range in the submitted source text.
///
/// Columns count characters, not bytes, so a location can be shown to the
/// user verbatim.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub line: usize,
    pub column: usize,
    pub end_line: usize,
    pub end_column: usize,
}

impl Location {
    pub fn new(line: usize, column: usize, end_line: usize, end_column: usize) -> Self {
        Self {
            line,
            column,
            end_line,
            end_column,
        }
    }

    /// A zero-width location at a single point.
    pub fn point(line: usize, column: usize) -> Self {
        Self::new(line, column, line, column)
    }

    /// Location used for diagnostics that are not tied to source text.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_none(&self) -> bool {
        self.line == 0
    }

    /// Smallest location covering both `self` and `other`.
    pub fn to(&self, other: Location) -> Location {
        if self.is_none() {
            return other;
        }
        if other.is_none() {
            return *self;
        }
        let (line, column) = (self.line, self.column).min((other.line, other.column));
        let (end_line, end_column) =
            (self.end_line, self.end_column).max((other.end_line, other.end_column));
        Location::new(line, column, end_line, end_column)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.line, self.column)
    }
}

/// Maps byte offsets of a source text to [`Location`]s.
#[derive(Debug, Clone)]
pub struct LineIndex<'a> {
    source: &'a str,
    line_starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    pub fn new(source: &'a str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            source
                .bytes()
                .enumerate()
                .filter(|(_, b)| *b == b'\n')
                .map(|(i, _)| i + 1),
        );
        Self {
            source,
            line_starts,
        }
    }

    /// Converts a byte offset to a 1-based `(line, column)` pair.
    pub fn position(&self, byte: usize) -> (usize, usize) {
        let byte = byte.min(self.source.len());
        let line = self.line_starts.partition_point(|&start| start <= byte);
        let line_start = self.line_starts[line - 1];
        let column = self
            .source
            .get(line_start..byte)
            .map(|prefix| prefix.chars().count())
            .unwrap_or(byte - line_start);
        (line, column + 1)
    }

    pub fn location(&self, start_byte: usize, end_byte: usize) -> Location {
        let (line, column) = self.position(start_byte);
        let (end_line, end_column) = self.position(end_byte.max(start_byte));
        Location::new(line, column, end_line, end_column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positions_are_one_based() {
        let index = LineIndex::new("ab\ncd");
        assert_eq!(index.position(0), (1, 1));
        assert_eq!(index.position(1), (1, 2));
        assert_eq!(index.position(3), (2, 1));
        assert_eq!(index.position(5), (2, 3));
    }

    #[test]
    fn test_columns_count_characters() {
        let index = LineIndex::new("é = 1;");
        // 'é' is two bytes; '=' starts at byte 3.
        assert_eq!(index.position(3), (1, 3));
    }

    #[test]
    fn test_location_display_and_merge() {
        let a = Location::new(1, 5, 1, 9);
        let b = Location::new(2, 1, 2, 4);
        assert_eq!(a.to_string(), "(1,5)");
        assert_eq!(a.to(b), Location::new(1, 5, 2, 4));
        assert_eq!(Location::none().to(b), b);
    }
}
