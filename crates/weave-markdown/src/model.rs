//! Output types of the markdown extractor (spec §3 "Document result", §4.1).

use std::collections::HashMap;

use serde::Serialize;
use weave_common::SpanTable;

/// Nesting metadata for a list item span, recorded in [`ExtraInfo`] (spec
/// §4.1: "record `level`/`listData` in `extraInfo`").
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListData {
    pub ordered: bool,
    pub start: Option<u64>,
}

/// Out-of-band detail for a span that doesn't fit the flat `(start, end,
/// kind, id)` span table shape (spec §3: `extraInfo: map<spanId, {level?,
/// listData?, destination?}>`).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExtraInfo {
    pub level: Option<u8>,
    pub list_data: Option<ListData>,
    pub destination: Option<String>,
}

/// A fenced code block discovered while walking the tree, ready to be
/// handed to the lexer/parser (spec §4.5: "for each block, Lexer... →
/// Parser").
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FencedBlock {
    pub id: String,
    /// Offset into the flattened `text`, where this block's content begins.
    pub start_offset: usize,
    pub info_string: String,
    pub content: String,
    /// The most recent content line preceding this fence, or `"Unnamed
    /// block"` if the fence opens with no prior prose (spec §4.4 "Document":
    /// "A fenced block's `name` is the most recent content line, else
    /// `\"Unnamed block\"`").
    pub name: String,
}

/// The full result of walking one document (spec §3 "Document result"),
/// minus the `blocks` field's IR — markdown extraction only locates fenced
/// regions; lowering them into `ParseBlock`s is `weave-parser`'s job.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExtractResult {
    pub text: String,
    pub blocks: Vec<FencedBlock>,
    pub spans: SpanTable,
    pub extra_info: HashMap<String, ExtraInfo>,
}
