//! # weave-markdown
//!
//! Walks a CommonMark document with `pulldown-cmark`, flattening it into a
//! single span-tracked text buffer and a list of fenced DSL blocks ready for
//! `weave-lexer`/`weave-parser` (spec §4.1, §4.5).

pub mod extractor;
pub mod model;

pub use extractor::{extract, MarkdownError, MarkdownExtractor};
pub use model::{ExtraInfo, ExtractResult, FencedBlock, ListData};
