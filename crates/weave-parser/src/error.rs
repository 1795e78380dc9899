//! Parser-level error kinds (spec §7).
//!
//! Split the same way the teacher splits `IoError`/`ConfigError`: one
//! `thiserror` enum per failure domain, `#[error(...)]` messages terse and
//! user-facing, `#[from]` only where the wrapped error is truly foreign.

use weave_common::Position;
use weave_lexer::LexError;

/// A grammar mismatch: the parser expected one of a set of token labels and
/// found something else (spec §7: "ParseError — grammar mismatch at a
/// token").
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("{position}: expected {expected}, found {found}")]
pub struct ParseError {
    pub position: Position,
    pub expected: String,
    pub found: String,
}

/// A fatal, non-recoverable invariant violation (spec §7: "InvariantError").
/// Unlike [`ParseError`], these never originate from malformed user input —
/// they signal a bug in the parser's own bookkeeping (an `asValue` call on a
/// node with no value view, a left parenthesis with nothing to pair it
/// with, a block pushed and never popped).
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum InvariantError {
    #[error("{position}: asValue called on a node with no value view")]
    NotAValue { position: Position },
    #[error("{position}: left parenthesis without if or function on right")]
    DanglingParenthesisLhs { position: Position },
    #[error("{position}: block stack unbalanced — pushed block was never popped")]
    UnbalancedBlockStack { position: Position },
}

/// Any failure surfaced while parsing one block: lexing, grammar, or a
/// fatal invariant break. Accumulated on the parser instance rather than
/// returned early (spec §7 policy: "recovery is disabled... reports errors
/// through an accumulator").
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum BlockError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Invariant(#[from] InvariantError),
}
