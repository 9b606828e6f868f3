//! Ordered text edits over one unit's source text.
//!
//! Every rewrite in the pipeline is expressed as a set of [`SourceEdit`]s
//! computed against the unit's current text and applied in one step. Edits in
//! one set must be disjoint; intersecting edits are reported back to the caller
//! as an [`EditConflict`] instead of being repaired.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Half-open byte range `[start, end)` into a unit's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Zero-length span used for insertions.
    pub const fn at(offset: usize) -> Self {
        Self {
            start: offset,
            end: offset,
        }
    }

    pub const fn len(&self) -> usize {
        self.end - self.start
    }

    pub const fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Whether `offset` falls inside the span.
    pub const fn contains(&self, offset: usize) -> bool {
        self.start <= offset && offset < self.end
    }

    /// Whether `other` lies entirely within this span.
    pub const fn encloses(&self, other: &Self) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Whether two edits over these spans would touch the same text.
    ///
    /// Two insertions at one offset intersect because their relative order is
    /// undefined, and so does an insertion at the start of a replacement.
    pub const fn intersects(&self, other: &Self) -> bool {
        if self.start < other.end && other.start < self.end {
            return true;
        }
        self.start == other.start && (self.is_empty() || other.is_empty())
    }

    /// The text covered by this span, if it lies on character boundaries.
    pub fn slice<'a>(&self, text: &'a str) -> Option<&'a str> {
        text.get(self.start..self.end)
    }

    pub const fn join(self, other: Self) -> Self {
        let start = if self.start < other.start {
            self.start
        } else {
            other.start
        };
        let end = if self.end > other.end {
            self.end
        } else {
            other.end
        };
        Self { start, end }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// A replacement of one span of a unit's text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceEdit {
    pub span: Span,
    pub replacement: String,
}

impl SourceEdit {
    pub fn replace(span: Span, replacement: impl Into<String>) -> Self {
        Self {
            span,
            replacement: replacement.into(),
        }
    }

    pub fn insert(offset: usize, text: impl Into<String>) -> Self {
        Self::replace(Span::at(offset), text)
    }

    pub fn delete(span: Span) -> Self {
        Self::replace(span, String::new())
    }
}

/// Structured report of an edit set that could not be applied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditConflict {
    /// Intersecting pairs, ordered by the start offset of the first edit.
    pub pairs: Vec<(SourceEdit, SourceEdit)>,
    /// Edits whose span is outside the text or splits a character.
    pub out_of_bounds: Vec<SourceEdit>,
}

impl EditConflict {
    pub fn len(&self) -> usize {
        self.pairs.len() + self.out_of_bounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty() && self.out_of_bounds.is_empty()
    }
}

impl fmt::Display for EditConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} overlapping pair(s)", self.pairs.len())?;
        for (a, b) in &self.pairs {
            write!(f, "; {} vs {}", a.span, b.span)?;
        }
        if !self.out_of_bounds.is_empty() {
            write!(f, "; {} edit(s) out of bounds", self.out_of_bounds.len())?;
        }
        Ok(())
    }
}

impl std::error::Error for EditConflict {}

/// Applies a disjoint edit set to `text`.
///
/// Edits may be given in any order. On any intersection nothing is applied and
/// the full list of intersecting pairs is returned.
pub fn apply_edits(text: &str, edits: &[SourceEdit]) -> Result<String, EditConflict> {
    let mut sorted: Vec<&SourceEdit> = edits.iter().collect();
    sorted.sort_by_key(|e| (e.span.start, e.span.end));

    let mut conflict = EditConflict::default();
    for edit in &sorted {
        let span = edit.span;
        if span.start > span.end
            || span.end > text.len()
            || !text.is_char_boundary(span.start)
            || !text.is_char_boundary(span.end)
        {
            conflict.out_of_bounds.push((*edit).clone());
        }
    }

    for (i, first) in sorted.iter().enumerate() {
        for second in &sorted[i + 1..] {
            if second.span.start > first.span.end {
                break;
            }
            if first.span.intersects(&second.span) {
                conflict.pairs.push(((*first).clone(), (*second).clone()));
            }
        }
    }

    if !conflict.is_empty() {
        return Err(conflict);
    }

    let growth: usize = sorted.iter().map(|e| e.replacement.len()).sum();
    let mut out = String::with_capacity(text.len() + growth);
    let mut cursor = 0;
    for edit in sorted {
        out.push_str(&text[cursor..edit.span.start]);
        out.push_str(&edit.replacement);
        cursor = edit.span.end;
    }
    out.push_str(&text[cursor..]);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn applies_unordered_edits() {
        let text = "class Widget { void Greet() {} }";
        let edits = vec![
            SourceEdit::replace(Span::new(20, 25), "B"),
            SourceEdit::replace(Span::new(6, 12), "A"),
        ];
        let out = apply_edits(text, &edits).unwrap();
        assert_eq!(out, "class A { void B() {} }");
    }

    #[test]
    fn adjacent_edits_do_not_conflict() {
        let text = "abcdef";
        let edits = vec![
            SourceEdit::replace(Span::new(0, 3), "x"),
            SourceEdit::replace(Span::new(3, 6), "y"),
            SourceEdit::insert(6, "!"),
        ];
        assert_eq!(apply_edits(text, &edits).unwrap(), "xy!");
    }

    #[test]
    fn reports_every_overlapping_pair_in_start_order() {
        let text = "0123456789";
        let edits = vec![
            SourceEdit::replace(Span::new(5, 8), "c"),
            SourceEdit::replace(Span::new(0, 4), "a"),
            SourceEdit::replace(Span::new(2, 6), "b"),
        ];
        let conflict = apply_edits(text, &edits).unwrap_err();
        assert_eq!(conflict.pairs.len(), 2);
        assert_eq!(conflict.pairs[0].0.span, Span::new(0, 4));
        assert_eq!(conflict.pairs[0].1.span, Span::new(2, 6));
        assert_eq!(conflict.pairs[1].0.span, Span::new(2, 6));
        assert_eq!(conflict.pairs[1].1.span, Span::new(5, 8));
    }

    #[test]
    fn inserts_at_the_same_offset_conflict() {
        let edits = vec![SourceEdit::insert(2, "a"), SourceEdit::insert(2, "b")];
        assert_eq!(apply_edits("abcd", &edits).unwrap_err().pairs.len(), 1);
    }

    #[test]
    fn out_of_bounds_edit_is_reported() {
        let edits = vec![SourceEdit::replace(Span::new(2, 40), "x")];
        let conflict = apply_edits("abcd", &edits).unwrap_err();
        assert_eq!(conflict.out_of_bounds.len(), 1);
        assert!(conflict.pairs.is_empty());
    }
}
