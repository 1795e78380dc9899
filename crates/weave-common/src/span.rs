//! Character-offset spans and the flat span table.
//!
//! Every syntactic token or node in a document — Markdown inline styles,
//! heading/list markers, fenced code blocks, and every DSL token emitted by
//! the lexer — contributes one [`SpanEntry`] to a document's [`SpanTable`].
//! Editor tooling consumes the table as a flat `[start, end, kind, id, ...]`
//! sequence (spec §6), four entries per span.

use serde::Serialize;

/// A half-open byte-offset range into the flattened document text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// A zero-width span at a single offset, used for headings/list items
    /// (spec §4.1: "push a zero-width span at (start, start)").
    pub fn point(at: usize) -> Self {
        Self { start: at, end: at }
    }

    pub fn len(self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(self) -> bool {
        self.len() == 0
    }
}

/// The kind tag carried by a span. Markdown kinds come from the extractor;
/// DSL kinds come from the lexer's token labels (spec §3 "label").
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SpanKind {
    Emph,
    Strong,
    Link,
    Heading,
    Item,
    CodeBlock,
    Code,
    /// A lexed DSL token, tagged with its human-facing label (identifier,
    /// infix, comparison, equality, ...).
    Token(String),
}

impl std::fmt::Display for SpanKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpanKind::Emph => write!(f, "emph"),
            SpanKind::Strong => write!(f, "strong"),
            SpanKind::Link => write!(f, "link"),
            SpanKind::Heading => write!(f, "heading"),
            SpanKind::Item => write!(f, "item"),
            SpanKind::CodeBlock => write!(f, "code_block"),
            SpanKind::Code => write!(f, "code"),
            SpanKind::Token(label) => write!(f, "{label}"),
        }
    }
}

/// One quadruple in the span table: `(start, end, kind, id)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpanEntry {
    pub start: usize,
    pub end: usize,
    pub kind: SpanKind,
    pub id: String,
}

/// A single flattened value in the table's `[start0, end0, kind0, id0, ...]`
/// wire representation (spec §6: "Span table format").
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FlatSpanValue {
    Offset(usize),
    Text(String),
}

/// Accumulates span entries for an entire document, in document order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SpanTable {
    entries: Vec<SpanEntry>,
}

impl SpanTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, start: usize, end: usize, kind: SpanKind, id: impl Into<String>) {
        self.entries.push(SpanEntry {
            start,
            end,
            kind,
            id: id.into(),
        });
    }

    pub fn entries(&self) -> &[SpanEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The flat `[start, end, kind, id, ...]` sequence, four entries per span.
    pub fn flatten(&self) -> Vec<FlatSpanValue> {
        let mut out = Vec::with_capacity(self.entries.len() * 4);
        for entry in &self.entries {
            out.push(FlatSpanValue::Offset(entry.start));
            out.push(FlatSpanValue::Offset(entry.end));
            out.push(FlatSpanValue::Text(entry.kind.to_string()));
            out.push(FlatSpanValue::Text(entry.id.clone()));
        }
        out
    }

    pub fn extend(&mut self, other: SpanTable) {
        self.entries.extend(other.entries);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn point_span_is_zero_width() {
        let s = Span::point(5);
        assert!(s.is_empty());
        assert_eq!(s.start, 5);
        assert_eq!(s.end, 5);
    }

    #[test]
    fn flatten_emits_four_values_per_span() {
        let mut table = SpanTable::new();
        table.push(0, 5, SpanKind::Heading, "doc|0");
        table.push(5, 10, SpanKind::Token("identifier".into()), "blk|1");
        let flat = table.flatten();
        assert_eq!(flat.len(), 8);
        assert_eq!(flat[0], FlatSpanValue::Offset(0));
        assert_eq!(flat[2], FlatSpanValue::Text("heading".to_string()));
        assert_eq!(flat[7], FlatSpanValue::Text("blk|1".to_string()));
    }
}
