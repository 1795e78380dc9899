//! The modal lexer itself: drives `logos::Lexer::morph` across the three
//! per-mode token enums, following a push/pop [`ModeStack`].

use logos::Logos;
use weave_common::{LineIndex, Position};

use crate::mode::{Mode, ModeStack};
use crate::token::{CodeTok, DocTok, StrTok, TokenKind};

/// A single lexed token, with its text borrowed from the original source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'s> {
    pub kind: TokenKind,
    pub text: &'s str,
    pub position: Position,
}

impl Token<'_> {
    pub fn label(&self) -> &'static str {
        self.kind.label()
    }
}

/// A lexer failure: no token class matched at the current position in the
/// current mode (spec §7: "LexError").
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum LexError {
    #[error("{position}: no token matches in {mode:?} mode")]
    NoMatch { position: Position, mode: Mode },
    #[error("{position}: unbalanced close token, mode stack is empty")]
    UnbalancedClose { position: Position },
}

enum AnyLexer<'s> {
    Doc(logos::Lexer<'s, DocTok>),
    Code(logos::Lexer<'s, CodeTok>),
    Str(logos::Lexer<'s, StrTok>),
}

enum ModeAction {
    Push(Mode),
    Pop,
}

fn doc_action(t: DocTok) -> Option<ModeAction> {
    match t {
        DocTok::Fence => Some(ModeAction::Push(Mode::Code)),
        DocTok::Content => None,
    }
}

fn code_action(t: CodeTok) -> Option<ModeAction> {
    match t {
        CodeTok::CloseFence => Some(ModeAction::Pop),
        CodeTok::StringEmbedClose => Some(ModeAction::Pop),
        CodeTok::StringOpen => Some(ModeAction::Push(Mode::Str)),
        _ => None,
    }
}

fn str_action(t: StrTok) -> Option<ModeAction> {
    match t {
        StrTok::StringClose => Some(ModeAction::Pop),
        StrTok::StringEmbedOpen => Some(ModeAction::Push(Mode::Code)),
        _ => None,
    }
}

fn morph_to(cur: AnyLexer<'_>, target: Mode) -> AnyLexer<'_> {
    match (cur, target) {
        (AnyLexer::Doc(lx), Mode::Doc) => AnyLexer::Doc(lx),
        (AnyLexer::Doc(lx), Mode::Code) => AnyLexer::Code(lx.morph()),
        (AnyLexer::Doc(lx), Mode::Str) => AnyLexer::Str(lx.morph()),
        (AnyLexer::Code(lx), Mode::Doc) => AnyLexer::Doc(lx.morph()),
        (AnyLexer::Code(lx), Mode::Code) => AnyLexer::Code(lx),
        (AnyLexer::Code(lx), Mode::Str) => AnyLexer::Str(lx.morph()),
        (AnyLexer::Str(lx), Mode::Doc) => AnyLexer::Doc(lx.morph()),
        (AnyLexer::Str(lx), Mode::Code) => AnyLexer::Code(lx.morph()),
        (AnyLexer::Str(lx), Mode::Str) => AnyLexer::Str(lx),
    }
}

/// The result of lexing a span of source: the tokens recognized plus any
/// errors hit along the way. Lexing never stops at the first error — each
/// unmatched byte is skipped so the caller sees the full list of failures,
/// but a non-empty `errors` means the token stream must not be trusted
/// (spec §7 policy, extended to the lexer boundary for diagnostics).
#[derive(Debug, Clone, Default)]
pub struct LexResult<'s> {
    pub tokens: Vec<Token<'s>>,
    pub errors: Vec<LexError>,
}

/// Tokenize `source`, starting in the given mode.
pub fn lex_in_mode(source: &str, start: Mode) -> LexResult<'_> {
    let line_index = LineIndex::new(source);
    let mut modes = ModeStack::starting_in(start);
    let mut cur = match start {
        Mode::Doc => AnyLexer::Doc(DocTok::lexer(source)),
        Mode::Code => AnyLexer::Code(CodeTok::lexer(source)),
        Mode::Str => AnyLexer::Str(StrTok::lexer(source)),
    };

    let mut tokens = Vec::new();
    let mut errors = Vec::new();
    // `StrTok` can emit a maximal `StringChars` run as several adjacent
    // logos tokens (lone `{` included, spec §4.2 note on lookahead-free
    // matching) — track the run's byte range here so we can flush it as one
    // token once something else interrupts it.
    let mut pending_chars: Option<std::ops::Range<usize>> = None;

    macro_rules! flush_pending {
        () => {
            if let Some(range) = pending_chars.take() {
                tokens.push(Token {
                    kind: TokenKind::StringChars,
                    text: &source[range.clone()],
                    position: line_index.position_at(range.start),
                });
            }
        };
    }

    loop {
        let outcome = match &mut cur {
            AnyLexer::Doc(lx) => lx.next().map(|res| {
                let span = lx.span();
                let slice = lx.slice();
                (res.map(DocTok::to_kind), span, slice, res.ok().and_then(doc_action))
            }),
            AnyLexer::Code(lx) => lx.next().map(|res| {
                let span = lx.span();
                let slice = lx.slice();
                (
                    res.map(CodeTok::to_kind),
                    span,
                    slice,
                    res.ok().and_then(code_action),
                )
            }),
            AnyLexer::Str(lx) => lx.next().map(|res| {
                let span = lx.span();
                let slice = lx.slice();
                (res.map(StrTok::to_kind), span, slice, res.ok().and_then(str_action))
            }),
        };

        let Some((kind_result, span, slice, action)) = outcome else {
            break;
        };

        let position = line_index.position_at(span.start);
        match kind_result {
            Ok(TokenKind::StringChars) => {
                match &mut pending_chars {
                    Some(range) if range.end == span.start => range.end = span.end,
                    _ => {
                        flush_pending!();
                        pending_chars = Some(span.clone());
                    }
                }
            }
            Ok(kind) => {
                flush_pending!();
                tokens.push(Token {
                    kind,
                    text: slice,
                    position,
                });
            }
            Err(()) => {
                flush_pending!();
                errors.push(LexError::NoMatch {
                    position,
                    mode: modes.current(),
                });
            }
        }

        match action {
            Some(ModeAction::Push(mode)) => {
                modes.push(mode);
                cur = morph_to(cur, mode);
            }
            Some(ModeAction::Pop) => match modes.pop() {
                Some(mode) => cur = morph_to(cur, mode),
                None => errors.push(LexError::UnbalancedClose { position }),
            },
            None => {}
        }
    }

    flush_pending!();
    tokens.push(Token {
        kind: TokenKind::Eof,
        text: "",
        position: line_index.position_at(source.len()),
    });

    LexResult { tokens, errors }
}

/// Lex a fenced DSL block's literal text. Per spec §4.5, per-block lexing
/// always starts in `code` mode — the surrounding fence markers have
/// already been stripped by the Markdown extractor.
pub fn lex_block(source: &str) -> LexResult<'_> {
    lex_in_mode(source, Mode::Code)
}

/// Lex a whole raw document, recognizing fences itself. This entry point
/// exists for completeness of the `doc` mode table (spec §4.2); the
/// primary pipeline (spec §4.5) uses [`lex_block`] on already-extracted
/// block text instead.
pub fn lex_document(source: &str) -> LexResult<'_> {
    lex_in_mode(source, Mode::Doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds(result: &LexResult<'_>) -> Vec<TokenKind> {
        result.tokens.iter().map(|t| t.kind).collect()
    }

    #[test]
    fn lexes_a_tag_and_record() {
        let result = lex_block("[#person name: \"alice\"]");
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        assert_eq!(
            kinds(&result),
            vec![
                TokenKind::LBracket,
                TokenKind::Tag,
                TokenKind::Identifier,
                TokenKind::Identifier,
                TokenKind::Equality,
                TokenKind::StringOpen,
                TokenKind::StringChars,
                TokenKind::StringClose,
                TokenKind::RBracket,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn keywords_win_over_identifiers_at_exact_match() {
        let result = lex_block("match bind commit is if else then not true false none");
        let kinds = kinds(&result);
        assert_eq!(
            kinds,
            vec![
                TokenKind::KwMatch,
                TokenKind::KwBind,
                TokenKind::KwCommit,
                TokenKind::KwIs,
                TokenKind::KwIf,
                TokenKind::KwElse,
                TokenKind::KwThen,
                TokenKind::KwNot,
                TokenKind::KwTrue,
                TokenKind::KwFalse,
                TokenKind::KwNone,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn longer_identifier_beats_keyword_prefix() {
        // "ifx" must lex as one identifier, not `if` + `x`.
        let result = lex_block("ifx");
        assert_eq!(kinds(&result), vec![TokenKind::Identifier, TokenKind::Eof]);
        assert_eq!(result.tokens[0].text, "ifx");
    }

    #[test]
    fn string_embed_round_trips_through_code_mode() {
        let result = lex_block("\"hello {{name}}!\"");
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        assert_eq!(
            kinds(&result),
            vec![
                TokenKind::StringOpen,
                TokenKind::StringChars,
                TokenKind::StringEmbedOpen,
                TokenKind::Identifier,
                TokenKind::StringEmbedClose,
                TokenKind::StringChars,
                TokenKind::StringClose,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lone_brace_not_followed_by_brace_collapses_into_one_string_chars_token() {
        let result = lex_block("\"a{b\"");
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        assert_eq!(
            kinds(&result),
            vec![
                TokenKind::StringOpen,
                TokenKind::StringChars,
                TokenKind::StringClose,
                TokenKind::Eof,
            ]
        );
        let texts: Vec<&str> = result.tokens.iter().map(|t| t.text).collect();
        assert_eq!(texts, vec!["\"", "a{b", "\"", ""]);
    }

    #[test]
    fn negative_number_beats_sign_prefixed_identifier() {
        let result = lex_block("-30");
        assert_eq!(kinds(&result), vec![TokenKind::Number, TokenKind::Eof]);
    }

    #[test]
    fn comparison_and_equality_operators() {
        let result = lex_block(">= <= != > < := <- += -= : =");
        assert_eq!(
            kinds(&result),
            vec![
                TokenKind::Gte,
                TokenKind::Lte,
                TokenKind::Neq,
                TokenKind::Gt,
                TokenKind::Lt,
                TokenKind::Set,
                TokenKind::Merge,
                TokenKind::PlusEq,
                TokenKind::MinusEq,
                TokenKind::Equality,
                TokenKind::Equality,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn unbalanced_close_is_reported() {
        let result = lex_block("}}");
        assert_eq!(result.errors.len(), 1);
    }
}
