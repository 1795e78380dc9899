//! The document driver (spec §4.5, §6 "Document result"): wires
//! `weave-markdown`'s extractor, `weave-lexer`'s tokenizer, and this crate's
//! grammar together, one fenced block at a time.
//!
//! Grounded on the teacher's top-level `parse` entry point (`lex` then
//! `Parser::new(...).parse()` chained per file) — generalized from "one
//! file, one syntax tree" into "one document, many independently-lowered
//! blocks".

use serde::Serialize;
use weave_common::{block_id, token_id, Position, SpanKind, SpanTable};
use weave_ir::NodeArena;
use weave_lexer::lex_block;
use weave_markdown::{extract, ExtractResult, MarkdownError};

use crate::error::BlockError;
use crate::grammar::Parser;

/// An owned, externally-serializable snapshot of one lexed token (spec §3
/// "Tokens"): `id` is assigned once lexing finishes, `"<blockId>|<n>"`,
/// matching the per-block index a node's `from` list references via
/// `FromRef::Token`.
///
/// The spec's `BlockResult.lex` field bundles tokens and lex errors
/// together; here lex errors are folded into `BlockResult::errors` instead
/// (spec §7's single accumulator policy), so this is just the token list.
#[derive(Debug, Clone, Serialize)]
pub struct TokenRecord {
    pub id: String,
    pub label: String,
    pub image: String,
    pub position: Position,
}

/// The lowered result of one fenced DSL block (spec §6): its finished
/// [`ParseBlock`](weave_ir::ParseBlock) tree, the arena every node in that
/// tree lives in, the token records lexing assigned ids to, and any errors
/// hit while lexing or lowering it.
#[derive(Debug, Clone, Serialize)]
pub struct BlockResult {
    pub id: String,
    /// The most recent content line preceding this block's fence, or
    /// `"Unnamed block"` (spec §4.4 "Document").
    pub name: String,
    pub block: weave_ir::ParseBlock,
    pub arena: NodeArena,
    pub tokens: Vec<TokenRecord>,
    pub errors: Vec<BlockError>,
}

/// The full result of parsing one document (spec §6 "Document result"):
/// the flattened markdown extraction plus a lowered [`BlockResult`] per
/// fenced block it found, in source order.
#[derive(Debug, Clone, Serialize)]
pub struct DocResult {
    pub doc_id: String,
    pub extract: ExtractResult,
    pub blocks: Vec<BlockResult>,
}

/// Parse one already-extracted fenced block, with no surrounding document
/// offset and a throwaway span table. The common case for callers handed a
/// single block in isolation (spec §6: `parseBlock(source, blockId,
/// offset=0, spans=[])`).
pub fn parse_block(block_id: String, content: &str) -> BlockResult {
    let mut spans = SpanTable::new();
    parse_block_at(block_id, "Unnamed block".to_string(), content, 0, &mut spans)
}

/// Parse one already-extracted fenced block: lex its content starting in
/// `code` mode, then drive [`Parser`] over the resulting tokens (spec §4.5
/// step 2: "Lexer (start in code mode)... → Parser"). Each token is given an
/// id and pushed into `spans`, shifted by `offset` so the span's range lands
/// in the surrounding document's flattened text rather than this block's own
/// content string.
pub fn parse_block_at(
    block_id: String,
    name: String,
    content: &str,
    offset: usize,
    spans: &mut SpanTable,
) -> BlockResult {
    let lexed = lex_block(content);
    let mut errors: Vec<BlockError> = lexed.errors.iter().cloned().map(BlockError::from).collect();

    let tokens: Vec<TokenRecord> = lexed
        .tokens
        .iter()
        .enumerate()
        .map(|(n, token)| {
            let id = token_id(&block_id, n);
            if !token.text.is_empty() {
                let start = offset + token.position.offset;
                let end = start + token.text.len();
                spans.push(start, end, SpanKind::Token(token.label().to_string()), id.clone());
            }
            TokenRecord {
                id,
                label: token.label().to_string(),
                image: token.text.to_string(),
                position: token.position,
            }
        })
        .collect();

    let parser = Parser::new(lexed.tokens, block_id.clone());
    let (block, arena, parse_errors) = parser.parse_code_block();
    errors.extend(parse_errors);

    BlockResult {
        id: block_id,
        name,
        block,
        arena,
        tokens,
        errors,
    }
}

/// Parse a whole markdown document (spec §4.5, §6): extract its fenced DSL
/// blocks with `weave-markdown`, then lower each one independently. A
/// failure in the markdown layer is fatal for the whole document — there is
/// no block-level content to recover without it.
pub fn parse_doc(source: &str, doc_id: Option<String>) -> Result<DocResult, MarkdownError> {
    let doc_id = doc_id.unwrap_or_else(weave_common::next_doc_id);
    let mut extract_result = extract(source, doc_id.as_str())?;

    let blocks: Vec<BlockResult> = extract_result
        .blocks
        .iter()
        .enumerate()
        .map(|(n, fenced)| {
            let id = block_id(&doc_id, n);
            parse_block_at(
                id,
                fenced.name.clone(),
                &fenced.content,
                fenced.start_offset,
                &mut extract_result.spans,
            )
        })
        .collect();

    Ok(DocResult {
        doc_id,
        extract: extract_result,
        blocks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_block_lowers_a_simple_match_section() {
        let result = parse_block("doc|0|0|block".to_string(), "match\n  x = 1\n");
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        assert_eq!(result.block.equalities.len(), 1);
    }

    #[test]
    fn parse_doc_finds_no_blocks_in_plain_prose() {
        let result = parse_doc("just some *text*, no fences here", None).unwrap();
        assert!(result.blocks.is_empty());
    }

    #[test]
    fn parse_doc_lowers_each_fenced_block_independently() {
        let source = "# Title\n\n```dsl\nmatch\n  x = 1\n```\n\nmore text\n\n```dsl\nmatch\n  y = 2\n```\n";
        let result = parse_doc(source, Some("doc|test".to_string())).unwrap();
        assert_eq!(result.blocks.len(), 2);
        assert_eq!(result.blocks[0].id, "doc|test|0|block");
        assert_eq!(result.blocks[1].id, "doc|test|1|block");
        assert!(result.blocks.iter().all(|b| b.errors.is_empty()));
    }

    #[test]
    fn parse_doc_default_id_is_monotonic() {
        let a = parse_doc("", None).unwrap();
        let b = parse_doc("", None).unwrap();
        assert_ne!(a.doc_id, b.doc_id);
    }
}
