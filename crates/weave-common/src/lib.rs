//! Shared types for the weave front end: spans, ids, and source positions.
//!
//! This crate has no parsing logic of its own — it is the vocabulary that
//! `weave-lexer`, `weave-ir` and `weave-parser` all share, mirroring how the
//! teacher keeps `rope::span::Span` as a leaf module under the engine crate.

pub mod ids;
pub mod position;
pub mod span;

pub use ids::{block_id, markdown_span_id, next_doc_id, node_id, sub_block_id, token_id};
pub use position::{LineIndex, Position};
pub use span::{FlatSpanValue, Span, SpanEntry, SpanKind, SpanTable};
