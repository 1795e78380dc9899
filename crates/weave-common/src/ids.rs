//! Id formats (stable contracts, spec §6).
//!
//! - Document spans for markdown nodes: `"<docId>|<n>"`, with an optional
//!   `"|block"` suffix for code blocks.
//! - Block ids: `"<docId>|<n>|block"`.
//! - Lex tokens: `"<blockId>|<n>"`.
//! - IR nodes: `"<blockId>|<n>"`; sub-blocks: `"<parentId>|sub<n>"`.
//!
//! These are plain string formats rather than a newtype-per-kind because
//! downstream consumers (planner, runtime, editor tooling) treat ids as
//! opaque strings that merely need to be unique and stable within a
//! document — spec §8 property 1.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Monotonically increasing counter used to manufacture a default `docId`
/// (spec §6: `docId` defaults to a monotonically increasing `"doc|<n>"`).
static NEXT_DOC_ID: AtomicUsize = AtomicUsize::new(0);

/// Allocate the next default document id, `"doc|<n>"`.
///
/// Callers parsing documents in parallel must either supply their own
/// `docId` or accept that this counter is a single, process-wide atomic
/// (spec §5: "the global document index used to manufacture default docIds
/// must be atomically incremented or supplied explicitly").
pub fn next_doc_id() -> String {
    let n = NEXT_DOC_ID.fetch_add(1, Ordering::Relaxed);
    format!("doc|{n}")
}

/// A span id for a markdown node: `"<docId>|<n>"`.
pub fn markdown_span_id(doc_id: &str, n: usize) -> String {
    format!("{doc_id}|{n}")
}

/// A block id, derived from the document id and the code block's ordinal
/// position: `"<docId>|<n>|block"`.
pub fn block_id(doc_id: &str, n: usize) -> String {
    format!("{doc_id}|{n}|block")
}

/// A lex token id: `"<blockId>|<n>"`.
pub fn token_id(block_id: &str, n: usize) -> String {
    format!("{block_id}|{n}")
}

/// An IR node id: `"<blockId>|<n>"`. Shares a format with token ids, but the
/// two id spaces are never compared against each other by consumers.
pub fn node_id(block_id: &str, n: usize) -> String {
    format!("{block_id}|{n}")
}

/// A sub-block id: `"<parentId>|sub<n>"`.
pub fn sub_block_id(parent_id: &str, n: usize) -> String {
    format!("{parent_id}|sub{n}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doc_ids_are_monotonic_and_unique() {
        let a = next_doc_id();
        let b = next_doc_id();
        assert_ne!(a, b);
        assert!(a.starts_with("doc|"));
    }

    #[test]
    fn block_id_has_block_suffix() {
        assert_eq!(block_id("doc|0", 3), "doc|0|3|block");
    }

    #[test]
    fn sub_block_id_nests() {
        let root = block_id("doc|0", 1);
        let sub = sub_block_id(&root, 0);
        assert_eq!(sub, format!("{root}|sub0"));
        let nested = sub_block_id(&sub, 0);
        assert_eq!(nested, format!("{sub}|sub0"));
    }
}
