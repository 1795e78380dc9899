//! Token kinds produced by each of the lexer's modes.
//!
//! Following the teacher's `lexer.rs` pattern (a small Logos enum per
//! lexical context, converted into one shared kind), we define three
//! `#[derive(Logos)]` enums — one per mode-table in spec §4.2 — and unify
//! them into a single [`TokenKind`] that the parser consumes. Mode
//! transitions are driven by [`logos::Lexer::morph`] rather than by a
//! single enum, since each mode really does recognize a different
//! alphabet (doc prose vs. DSL operators vs. string contents).
//!
//! `string-embed` is not a fourth Logos enum: spec §4.2 pushes it as the
//! **code** mode (an embed is a code expression terminated by `}}`
//! instead of by a closing fence), so [`CodeToken`] carries both the
//! close-fence and the embed-close variants and the mode stack below it
//! decides which one actually fired.

use logos::Logos;

/// The unified, mode-independent token kind the parser matches against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // --- doc mode ---
    Fence,
    DocContent,

    // --- code mode ---
    CloseFence,
    StringEmbedClose,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Comment,
    StringOpen,
    KwBind,
    KwCommit,
    KwMatch,
    KwIs,
    KwIf,
    KwElse,
    KwThen,
    KwNot,
    KwTrue,
    KwFalse,
    KwNone,
    Set,        // :=
    Merge,      // <-
    PlusEq,     // +=
    MinusEq,    // -=
    Equality,   // : or =
    Gte,
    Lte,
    Neq,
    Gt,
    Lt,
    AddInfix,   // +
    SubInfix,   // -
    MultInfix,  // *
    DivInfix,   // /
    Dot,
    Pipe,
    Identifier,
    Number,
    Uuid,
    Name, // @
    Tag,  // #

    // --- string mode ---
    StringClose,
    StringEmbedOpen,
    StringChars,

    Eof,
}

impl TokenKind {
    /// Human-facing category, per spec §3 ("label is a human-facing
    /// category: identifier, infix, comparison, equality, etc.").
    pub fn label(self) -> &'static str {
        use TokenKind::*;
        match self {
            Fence | CloseFence => "fence",
            DocContent => "content",
            StringEmbedClose | StringEmbedOpen => "string-embed",
            LBracket | RBracket | LParen | RParen => "bracket",
            Comment => "comment",
            StringOpen | StringClose => "string-delimiter",
            KwBind | KwCommit | KwMatch | KwIs | KwIf | KwElse | KwThen | KwNot | KwTrue
            | KwFalse | KwNone => "keyword",
            Set => "set",
            Merge => "merge",
            PlusEq | MinusEq => "mutate",
            Equality => "equality",
            Gte | Lte | Neq | Gt | Lt => "comparison",
            AddInfix | SubInfix => "add-infix",
            MultInfix | DivInfix => "mult-infix",
            Dot => "dot",
            Pipe => "pipe",
            Identifier => "identifier",
            Number => "number",
            Uuid => "uuid",
            Name => "name",
            Tag => "tag",
            StringChars => "string-chars",
            Eof => "eof",
        }
    }
}

/// Tokens recognized in the `doc` mode (document prose).
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n]+")]
pub enum DocTok {
    #[regex("`{3,}|~{3,}")]
    Fence,
    #[regex(r"[^\n]+")]
    Content,
}

impl DocTok {
    pub fn to_kind(self) -> TokenKind {
        match self {
            DocTok::Fence => TokenKind::Fence,
            DocTok::Content => TokenKind::DocContent,
        }
    }
}

/// Tokens recognized in the `code` mode (and, doing double duty, in a
/// string-embed — spec §4.2).
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n,]+")]
pub enum CodeTok {
    #[regex("`{3,}|~{3,}")]
    CloseFence,
    #[token("}}")]
    StringEmbedClose,
    #[regex(r"//[^\n]*")]
    Comment,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("\"")]
    StringOpen,

    #[token(":=")]
    Set,
    #[token("<-")]
    Merge,
    #[token("+=")]
    PlusEq,
    #[token("-=")]
    MinusEq,
    #[token(":")]
    #[token("=")]
    Equality,
    #[token(">=")]
    Gte,
    #[token("<=")]
    Lte,
    #[token("!=")]
    Neq,
    #[token(">")]
    Gt,
    #[token("<")]
    Lt,
    #[token("+")]
    AddInfix,
    #[token("-")]
    SubInfix,
    #[token("*")]
    MultInfix,
    #[token("/")]
    DivInfix,
    #[token(".")]
    Dot,
    #[token("|")]
    Pipe,

    #[token("bind")]
    KwBind,
    #[token("commit")]
    KwCommit,
    #[token("match")]
    KwMatch,
    #[token("is")]
    KwIs,
    #[token("if")]
    KwIf,
    #[token("else")]
    KwElse,
    #[token("then")]
    KwThen,
    #[token("not")]
    KwNot,
    #[token("true")]
    KwTrue,
    #[token("false")]
    KwFalse,
    #[token("none")]
    KwNone,

    #[regex(r"-?\d+(\.\d+)?", priority = 3)]
    Number,
    #[regex(r"⦑[^⦒]*⦒")]
    Uuid,
    #[token("@")]
    Name,
    #[token("#")]
    Tag,

    // Sign-prefixed identifier: a sign operator directly glued to more
    // non-break characters, e.g. `+foo`, `-bar?`.
    #[regex(r#"[+\-*/][^\s@#.,()\[\]\{\}⦑⦒:"]+"#, priority = 2)]
    // Ordinary identifier: anything else that isn't a digit, a sign
    // operator, or a break character, followed by any run of non-breaks.
    #[regex(r#"[^\s0-9@#.,()\[\]\{\}⦑⦒:"+\-*/][^\s@#.,()\[\]\{\}⦑⦒:"]*"#, priority = 2)]
    Identifier,
}

impl CodeTok {
    pub fn to_kind(self) -> TokenKind {
        match self {
            CodeTok::CloseFence => TokenKind::CloseFence,
            CodeTok::StringEmbedClose => TokenKind::StringEmbedClose,
            CodeTok::Comment => TokenKind::Comment,
            CodeTok::LBracket => TokenKind::LBracket,
            CodeTok::RBracket => TokenKind::RBracket,
            CodeTok::LParen => TokenKind::LParen,
            CodeTok::RParen => TokenKind::RParen,
            CodeTok::StringOpen => TokenKind::StringOpen,
            CodeTok::Set => TokenKind::Set,
            CodeTok::Merge => TokenKind::Merge,
            CodeTok::PlusEq => TokenKind::PlusEq,
            CodeTok::MinusEq => TokenKind::MinusEq,
            CodeTok::Equality => TokenKind::Equality,
            CodeTok::Gte => TokenKind::Gte,
            CodeTok::Lte => TokenKind::Lte,
            CodeTok::Neq => TokenKind::Neq,
            CodeTok::Gt => TokenKind::Gt,
            CodeTok::Lt => TokenKind::Lt,
            CodeTok::AddInfix => TokenKind::AddInfix,
            CodeTok::SubInfix => TokenKind::SubInfix,
            CodeTok::MultInfix => TokenKind::MultInfix,
            CodeTok::DivInfix => TokenKind::DivInfix,
            CodeTok::Dot => TokenKind::Dot,
            CodeTok::Pipe => TokenKind::Pipe,
            CodeTok::KwBind => TokenKind::KwBind,
            CodeTok::KwCommit => TokenKind::KwCommit,
            CodeTok::KwMatch => TokenKind::KwMatch,
            CodeTok::KwIs => TokenKind::KwIs,
            CodeTok::KwIf => TokenKind::KwIf,
            CodeTok::KwElse => TokenKind::KwElse,
            CodeTok::KwThen => TokenKind::KwThen,
            CodeTok::KwNot => TokenKind::KwNot,
            CodeTok::KwTrue => TokenKind::KwTrue,
            CodeTok::KwFalse => TokenKind::KwFalse,
            CodeTok::KwNone => TokenKind::KwNone,
            CodeTok::Number => TokenKind::Number,
            CodeTok::Uuid => TokenKind::Uuid,
            CodeTok::Name => TokenKind::Name,
            CodeTok::Tag => TokenKind::Tag,
            CodeTok::Identifier => TokenKind::Identifier,
        }
    }
}

/// Tokens recognized in the `string` mode (inside a `"..."` literal).
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrTok {
    #[token("\"")]
    StringClose,
    #[token("{{")]
    StringEmbedOpen,
    // A lone `{` not immediately followed by another `{` falls through to
    // here (the two-char `{{` token above always wins on longest match,
    // reproducing the spec's `{(?=[^{])` lookahead without needing one from
    // logos, which has no lookaround support). The driver in `lexer.rs`
    // coalesces this back into its neighboring `StringChars` runs so the
    // parser only ever sees one `StringChars` token per maximal run, per
    // spec §4.2.
    #[token("{")]
    LoneBrace,
    #[regex(r#"(\\.|[^"\\{])+"#)]
    StringChars,
}

impl StrTok {
    pub fn to_kind(self) -> TokenKind {
        match self {
            StrTok::StringClose => TokenKind::StringClose,
            StrTok::StringEmbedOpen => TokenKind::StringEmbedOpen,
            StrTok::LoneBrace => TokenKind::StringChars,
            StrTok::StringChars => TokenKind::StringChars,
        }
    }
}
