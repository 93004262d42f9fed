use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash, Serialize, Deserialize)]
pub struct Location {
    /// The line number (1-based).
    pub line: usize,
    /// The column number (1-based).
    pub column: usize,
}

impl Location {
    /// Creates a new `Location`.
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A contiguous region of a source file, from `begin` to `end` inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
pub struct Span {
    /// The file the span belongs to.
    pub file: String,
    /// The first position covered by the span.
    pub begin: Location,
    /// The last position covered by the span.
    pub end: Location,
}

impl Span {
    /// Creates a new `Span` from two `Location`s.
    pub fn new(file: impl Into<String>, begin: Location, end: Location) -> Self {
        Self { file: file.into(), begin, end }
    }

    /// A one-position span.
    pub fn point(file: impl Into<String>, at: Location) -> Self {
        Self { file: file.into(), begin: at, end: at }
    }

    /// The smallest span covering both `self` and `other`.
    pub fn cover(&self, other: &Span) -> Span {
        Span {
            file: self.file.clone(),
            begin: self.begin.min(other.begin),
            end: self.end.max(other.end),
        }
    }

    /// Whether `other` lies fully inside this span.
    pub fn contains(&self, other: &Span) -> bool {
        self.begin <= other.begin && other.end <= self.end
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.begin == self.end {
            write!(f, "{}:{}", self.file, self.begin)
        } else {
            write!(f, "{}:{}..{}", self.file, self.begin, self.end)
        }
    }
}
