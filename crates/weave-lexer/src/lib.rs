//! # weave-lexer
//!
//! A mode-switching tokenizer for the weave DSL, built the same way the
//! teacher builds its Markdown tokenizer — a `#[derive(Logos)]` enum per
//! lexical context — except here there are three contexts instead of one,
//! and [`logos::Lexer::morph`] switches between them as push/pop tokens
//! fire (spec §4.2).
//!
//! ## Public API
//!
//! - [`lex_block`] — tokenize an already-extracted fenced block, starting
//!   in `code` mode (the path the document driver uses, spec §4.5).
//! - [`lex_document`] — tokenize raw document text from scratch, starting
//!   in `doc` mode and recognizing fences itself.
//! - [`Token`] — a lexed token with its kind, text, and source position.

pub mod lexer;
pub mod mode;
pub mod token;

pub use lexer::{lex_block, lex_document, lex_in_mode, LexError, LexResult, Token};
pub use mode::{Mode, ModeStack};
pub use token::TokenKind;
