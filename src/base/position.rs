//! Position tracking for parse diagnostics
//!
//! Stores the source location (line/column) of MoML elements so that
//! structural errors can point back into the document.

/// A position in source text (0-indexed)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Human-facing output is 1-indexed.
        write!(f, "{}:{}", self.line + 1, self.column + 1)
    }
}
