//! Span-based source code editing with format preservation

use thiserror::Error;

use crate::span::Span;

/// Errors that can occur during edit application
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EditError {
    #[error("Overlapping edits detected at offset {0}")]
    OverlappingEdits(usize),

    #[error("Edit span {start}..{end} out of bounds for source length {len}")]
    SpanOutOfBounds { start: usize, end: usize, len: usize },
}

/// Represents a single code edit operation
///
/// An empty span is a pure insertion at `span.start`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    /// The source span to replace
    pub span: Span,
    /// The replacement text
    pub replacement: String,
    /// Human-readable description of the edit
    pub message: String,
}

impl Edit {
    /// Create a new edit
    pub fn new(span: Span, replacement: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            span,
            replacement: replacement.into(),
            message: message.into(),
        }
    }

    /// Create an insertion at `offset`
    pub fn insert(offset: usize, text: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Span::empty(offset), text, message)
    }

    /// Get the byte offset where this edit starts
    pub fn start_offset(&self) -> usize {
        self.span.start
    }

    /// Get the byte offset where this edit ends
    pub fn end_offset(&self) -> usize {
        self.span.end
    }
}

/// An ordered, validated, non-overlapping set of edits
#[derive(Debug, Clone, Default)]
pub struct EditPlan {
    edits: Vec<Edit>,
}

impl EditPlan {
    /// Sort edits by start offset and verify that no two overlap
    pub fn new(mut edits: Vec<Edit>, source_len: usize) -> Result<Self, EditError> {
        // Stable: insertions at one offset keep their relative order
        edits.sort_by_key(|e| (e.start_offset(), e.end_offset()));

        let mut prev_end: Option<usize> = None;
        for edit in &edits {
            if edit.end_offset() > source_len {
                return Err(EditError::SpanOutOfBounds {
                    start: edit.start_offset(),
                    end: edit.end_offset(),
                    len: source_len,
                });
            }
            if let Some(end) = prev_end {
                if edit.start_offset() < end {
                    return Err(EditError::OverlappingEdits(edit.start_offset()));
                }
            }
            prev_end = Some(edit.end_offset());
        }

        Ok(Self { edits })
    }

    pub fn edits(&self) -> &[Edit] {
        &self.edits
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    /// Apply the plan in a single pass from the highest offset to the lowest
    pub fn apply(&self, source: &str) -> String {
        let mut result = source.to_string();
        for edit in self.edits.iter().rev() {
            result.replace_range(edit.start_offset()..edit.end_offset(), &edit.replacement);
        }
        result
    }
}

/// Apply edits to source code, preserving surrounding formatting
///
/// Edits are applied in reverse order (from end to start) to maintain
/// valid offsets throughout the process.
///
/// # Returns
/// * `Ok(String)` - The modified source code
/// * `Err(EditError)` - If edits overlap or are out of bounds
pub fn apply_edits(source: &str, edits: &[Edit]) -> Result<String, EditError> {
    if edits.is_empty() {
        return Ok(source.to_string());
    }
    let plan = EditPlan::new(edits.to_vec(), source.len())?;
    Ok(plan.apply(source))
}

/// Text of `range` with every edit that lies inside it applied.
///
/// Offsets in `edits` are absolute; edits outside `range` are ignored. The
/// caller guarantees the edits inside `range` are pairwise non-overlapping.
pub fn render_range(source: &str, range: Span, edits: &[&Edit]) -> String {
    let mut inside: Vec<&Edit> = edits
        .iter()
        .copied()
        .filter(|e| lies_within(e, range))
        .collect();
    inside.sort_by_key(|e| (e.start_offset(), e.end_offset()));

    let mut out = String::with_capacity(range.len());
    let mut cursor = range.start;
    for edit in inside {
        out.push_str(&source[cursor..edit.start_offset()]);
        out.push_str(&edit.replacement);
        cursor = edit.end_offset();
    }
    out.push_str(&source[cursor..range.end]);
    out
}

/// Whether `edit` is fully carried by a render of `range`.
///
/// Insertions belong to the range that starts at or before them and ends
/// after them, so an insertion on a boundary is rendered exactly once.
pub fn lies_within(edit: &Edit, range: Span) -> bool {
    if edit.span.is_empty() {
        range.start <= edit.start_offset() && edit.start_offset() < range.end
    } else {
        range.contains(&edit.span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_replacement() {
        let source = "type Pair[T] = tuple[T, T]";
        let edit = Edit::new(Span::new(0, 12), "Pair: TypeAlias", "rewrite alias");

        let result = apply_edits(source, &[edit]).unwrap();
        assert_eq!(result, "Pair: TypeAlias = tuple[T, T]");
    }

    #[test]
    fn test_multiple_edits() {
        let source = "def f[T](x): ...\ndef g[U](y): ...";
        let edits = vec![
            Edit::new(Span::new(5, 8), "", "first"),
            Edit::new(Span::new(22, 25), "", "second"),
        ];

        let result = apply_edits(source, &edits).unwrap();
        assert_eq!(result, "def f(x): ...\ndef g(y): ...");
    }

    #[test]
    fn test_insertion_before_replacement_at_same_offset() {
        let source = "class A[T]: pass";
        let edits = vec![
            Edit::new(Span::new(0, 16), "class A(Generic[T]): pass", "rewrite"),
            Edit::insert(0, "T = TypeVar(\"T\")\n", "declare"),
        ];

        let result = apply_edits(source, &edits).unwrap();
        assert_eq!(result, "T = TypeVar(\"T\")\nclass A(Generic[T]): pass");
    }

    #[test]
    fn test_empty_edits() {
        let source = "unchanged";
        let result = apply_edits(source, &[]).unwrap();
        assert_eq!(result, "unchanged");
    }

    #[test]
    fn test_overlapping_edits() {
        let source = "abcdefgh";
        let edits = vec![
            Edit::new(Span::new(0, 4), "x", "a"),
            Edit::new(Span::new(2, 6), "y", "b"),
        ];
        let result = apply_edits(source, &edits);
        assert!(matches!(result, Err(EditError::OverlappingEdits(2))));
    }

    #[test]
    fn test_out_of_bounds() {
        let source = "short";
        let edit = Edit::new(Span::new(0, 100), "replacement", "oob");

        let result = apply_edits(source, &[edit]);
        assert!(matches!(result, Err(EditError::SpanOutOfBounds { .. })));
    }

    #[test]
    fn test_render_range_applies_inner_edits_only() {
        let source = "0123456789";
        let inner = Edit::new(Span::new(3, 5), "XY", "inner");
        let outer = Edit::new(Span::new(7, 9), "Z", "outside");
        let rendered = render_range(source, Span::new(2, 6), &[&inner, &outer]);
        assert_eq!(rendered, "2XY5");
    }

    #[test]
    fn test_insertion_on_boundary_belongs_to_following_range() {
        let insert = Edit::insert(4, "!", "ins");
        assert!(!lies_within(&insert, Span::new(0, 4)));
        assert!(lies_within(&insert, Span::new(4, 8)));
    }
}
