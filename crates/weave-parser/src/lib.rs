//! # weave-parser
//!
//! The recursive-descent grammar ([`grammar::Parser`]) that lowers a lexed
//! DSL block straight into `weave-ir`, plus the document-level driver
//! ([`document::parse_doc`]) that ties it to `weave-markdown` extraction.

pub mod cursor;
pub mod document;
pub mod error;
pub mod grammar;

pub use document::{parse_block, parse_block_at, parse_doc, BlockResult, DocResult, TokenRecord};
pub use error::{BlockError, InvariantError, ParseError};
pub use grammar::Parser;
