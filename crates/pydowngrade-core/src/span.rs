//! Byte spans and immutable source text

use std::fmt;
use std::sync::Arc;

/// A contiguous byte range `start..end` within a [`SourceText`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end, "span start {start} after end {end}");
        Self { start, end }
    }

    /// A zero-width span marking an insertion point
    pub fn empty(at: usize) -> Self {
        Self { start: at, end: at }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// `other` lies entirely within `self` (equal spans contain each other)
    pub fn contains(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// `other` lies within `self` and the two are not equal
    pub fn strictly_contains(&self, other: &Span) -> bool {
        self.contains(other) && self != other
    }

    /// Both spans share at least one byte
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// The spans are identical, or overlap without one containing the other.
    ///
    /// Syntax-tree spans either nest or are disjoint, so in practice this only
    /// fires for two matches on the same range.
    pub fn conflicts_with(&self, other: &Span) -> bool {
        if self == other {
            return !self.is_empty();
        }
        self.overlaps(other) && !self.contains(other) && !other.contains(self)
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// 1-based line and column of a byte offset, for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub line: usize,
    pub column: usize,
    pub offset: usize,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Immutable source text with an optional file identity.
///
/// Never mutated in place: every rewrite produces a new `SourceText`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceText {
    name: Option<Arc<str>>,
    text: Arc<str>,
}

impl SourceText {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            name: None,
            text: Arc::from(text.into()),
        }
    }

    /// Create source text tagged with a file identity (usually a path)
    pub fn named(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: Some(Arc::from(name.into())),
            text: Arc::from(text.into()),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Text covered by `span`; empty when the span is out of bounds
    pub fn slice(&self, span: Span) -> &str {
        self.text.get(span.start..span.end).unwrap_or("")
    }

    /// Derive new source text that keeps this file's identity
    pub fn with_text(&self, text: impl Into<String>) -> Self {
        Self {
            name: self.name.clone(),
            text: Arc::from(text.into()),
        }
    }

    /// Convert a byte offset to a 1-based line/column position
    pub fn position(&self, offset: usize) -> Position {
        let mut line = 1;
        let mut column = 1;

        for (i, ch) in self.text.char_indices() {
            if i >= offset {
                break;
            }
            if ch == '\n' {
                line += 1;
                column = 1;
            } else {
                column += 1;
            }
        }

        Position {
            line,
            column,
            offset,
        }
    }

    /// Byte offset where the line containing `offset` starts
    pub fn line_start(&self, offset: usize) -> usize {
        self.text[..offset.min(self.text.len())]
            .rfind('\n')
            .map(|i| i + 1)
            .unwrap_or(0)
    }

    /// Byte offset of the line break ending the line that contains
    /// `offset` (before any `\r`), or the text length on the last line
    pub fn line_end(&self, offset: usize) -> usize {
        let offset = offset.min(self.text.len());
        let end = self.text[offset..]
            .find('\n')
            .map(|i| offset + i)
            .unwrap_or(self.text.len());
        if end > offset && self.text[..end].ends_with('\r') {
            end - 1
        } else {
            end
        }
    }
}
