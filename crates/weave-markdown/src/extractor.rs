//! The CommonMark walker (spec §4.1).
//!
//! Grounded on the teacher's `PulldownMarkdownParser` (`domain/parsing/
//! markdown.rs`) — a single forward pass over `pulldown_cmark::Parser`
//! events maintaining small ad hoc stacks — generalized from an outline
//! builder into a span-table-and-flattened-text builder, and switched to
//! [`pulldown_cmark::OffsetIter`] so every event carries its original byte
//! range.

use std::collections::HashMap;

use pulldown_cmark::{CodeBlockKind, CowStr, Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use weave_common::{block_id, markdown_span_id, LineIndex, SpanKind, SpanTable};

use crate::model::{ExtraInfo, ExtractResult, FencedBlock, ListData};

/// A markdown extraction failure: the walker's internal container stack
/// discipline was violated (spec §4.1: "leaving event MUST pop the
/// container that matches the event's node; mismatch is a fatal invariant
/// violation"). This can only happen if pulldown-cmark itself emits
/// unbalanced Start/End events, which would be a bug in that crate rather
/// than in caller input — hence a hard error rather than a recoverable one.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum MarkdownError {
    #[error("unbalanced container: expected to close {expected}, found {found}")]
    ContainerMismatch { expected: String, found: String },
    #[error("leaving event with no open container")]
    EmptyContainerStack,
}

/// The kind of container currently open on the stack, enough to know how to
/// close it.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ContainerKind {
    Emph,
    Strong,
    Link,
    Heading(HeadingLevel),
    Item,
    List,
    CodeBlock(usize),
    Other(&'static str),
}

impl ContainerKind {
    fn label(&self) -> String {
        match self {
            ContainerKind::Emph => "emphasis".into(),
            ContainerKind::Strong => "strong".into(),
            ContainerKind::Link => "link".into(),
            ContainerKind::Heading(_) => "heading".into(),
            ContainerKind::Item => "item".into(),
            ContainerKind::List => "list".into(),
            ContainerKind::CodeBlock(_) => "code_block".into(),
            ContainerKind::Other(name) => (*name).into(),
        }
    }
}

struct Frame {
    kind: ContainerKind,
    start: usize,
    destination: Option<String>,
}

/// Walks `source` as CommonMark, producing flattened text, a span table,
/// and the list of fenced DSL blocks to hand to the lexer/parser.
pub struct MarkdownExtractor<'a> {
    source: &'a str,
    source_lines: LineIndex,
    doc_id: String,
    text: String,
    pos: usize,
    last_line: usize,
    next_span_seq: usize,
    containers: Vec<Frame>,
    list_ordered: Vec<(bool, Option<u64>)>,
    spans: SpanTable,
    blocks: Vec<FencedBlock>,
    extra_info: HashMap<String, ExtraInfo>,
    /// The most recent non-blank line of prose seen outside a code block,
    /// used to name the next fenced block (spec §4.4 "Document": a fenced
    /// block's `name` is "the most recent content line").
    last_content_line: Option<String>,
}

impl<'a> MarkdownExtractor<'a> {
    pub fn new(source: &'a str, doc_id: impl Into<String>) -> Self {
        Self {
            source,
            source_lines: LineIndex::new(source),
            doc_id: doc_id.into(),
            text: String::new(),
            pos: 0,
            last_line: 1,
            next_span_seq: 0,
            containers: Vec::new(),
            list_ordered: Vec::new(),
            spans: SpanTable::new(),
            blocks: Vec::new(),
            extra_info: HashMap::new(),
            last_content_line: None,
        }
    }

    pub fn extract(mut self) -> Result<ExtractResult, MarkdownError> {
        let options = Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH;
        let parser = Parser::new_ext(self.source, options);

        for (event, range) in parser.into_offset_iter() {
            self.handle_event(event, range)?;
        }

        Ok(ExtractResult {
            text: self.text,
            blocks: self.blocks,
            spans: self.spans,
            extra_info: self.extra_info,
        })
    }

    fn next_span_id(&mut self) -> String {
        let id = markdown_span_id(&self.doc_id, self.next_span_seq);
        self.next_span_seq += 1;
        id
    }

    fn line_at(&self, offset: usize) -> usize {
        self.source_lines.position_at(offset.min(self.source.len())).line
    }

    /// Realign the flattened text with the original document's line
    /// structure by emitting synthetic newlines up to `target_line` (spec
    /// §4.1: "emit synthetic newlines to `text`... until `lastLine ==
    /// line`").
    fn realign_to(&mut self, target_line: usize) {
        while self.last_line < target_line {
            self.text.push('\n');
            self.pos += 1;
            self.last_line += 1;
        }
    }

    fn append_verbatim(&mut self, s: &str) {
        self.text.push_str(s);
        self.pos += s.len();
    }

    fn push_span(&mut self, start: usize, end: usize, kind: SpanKind) -> String {
        let id = self.next_span_id();
        self.spans.push(start, end, kind, id.clone());
        id
    }

    fn open(&mut self, kind: ContainerKind, start: usize, destination: Option<String>) {
        self.containers.push(Frame {
            kind,
            start,
            destination,
        });
    }

    fn close(&mut self, expected_label: &str) -> Result<Frame, MarkdownError> {
        let frame = self.containers.pop().ok_or(MarkdownError::EmptyContainerStack)?;
        if frame.kind.label() != expected_label {
            return Err(MarkdownError::ContainerMismatch {
                expected: expected_label.to_string(),
                found: frame.kind.label(),
            });
        }
        Ok(frame)
    }

    fn handle_event(&mut self, event: Event<'a>, range: std::ops::Range<usize>) -> Result<(), MarkdownError> {
        match event {
            Event::Start(tag) => self.handle_start(tag, range),
            Event::End(tag_end) => self.handle_end(tag_end),
            Event::Text(text) => self.handle_text(text, range),
            Event::Code(text) => self.handle_inline_code(text, range),
            Event::SoftBreak | Event::HardBreak => {
                self.text.push('\n');
                self.pos += 1;
                self.last_line += 1;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn handle_start(&mut self, tag: Tag<'a>, range: std::ops::Range<usize>) -> Result<(), MarkdownError> {
        let line = self.line_at(range.start);
        self.realign_to(line);
        let start = self.pos;

        match tag {
            Tag::Emphasis => self.open(ContainerKind::Emph, start, None),
            Tag::Strong => self.open(ContainerKind::Strong, start, None),
            Tag::Link { dest_url, .. } => {
                self.open(ContainerKind::Link, start, Some(dest_url.to_string()))
            }
            Tag::Heading { level, .. } => self.open(ContainerKind::Heading(level), start, None),
            Tag::List(first_item) => {
                self.list_ordered.push((first_item.is_some(), first_item));
                self.open(ContainerKind::List, start, None);
            }
            Tag::Item => self.open(ContainerKind::Item, start, None),
            Tag::CodeBlock(kind) => {
                let info_string = match &kind {
                    CodeBlockKind::Fenced(info) => info.to_string(),
                    CodeBlockKind::Indented => String::new(),
                };
                self.push_span(start, start, SpanKind::CodeBlock);

                let end_line = self.line_at(range.end.saturating_sub(1).max(range.start));
                self.last_line = end_line + 1;

                let name = self
                    .last_content_line
                    .clone()
                    .unwrap_or_else(|| "Unnamed block".to_string());
                let block_index = self.blocks.len();
                self.blocks.push(FencedBlock {
                    id: block_id(&self.doc_id, block_index),
                    start_offset: start,
                    info_string,
                    content: String::new(),
                    name,
                });
                self.open(ContainerKind::CodeBlock(block_index), start, None);
            }
            _ => self.open(ContainerKind::Other("other"), start, None),
        }
        Ok(())
    }

    fn handle_end(&mut self, tag_end: TagEnd) -> Result<(), MarkdownError> {
        match tag_end {
            TagEnd::Emphasis => {
                let frame = self.close("emphasis")?;
                self.push_span(frame.start, self.pos, SpanKind::Emph);
            }
            TagEnd::Strong => {
                let frame = self.close("strong")?;
                self.push_span(frame.start, self.pos, SpanKind::Strong);
            }
            TagEnd::Link => {
                let frame = self.close("link")?;
                let id = self.push_span(frame.start, self.pos, SpanKind::Link);
                if let Some(destination) = frame.destination {
                    self.extra_info.entry(id).or_default().destination = Some(destination);
                }
            }
            TagEnd::Heading(_) => {
                let frame = self.close("heading")?;
                let id = self.push_span(frame.start, frame.start, SpanKind::Heading);
                let level = match frame.kind {
                    ContainerKind::Heading(level) => Some(level as u8),
                    _ => None,
                };
                self.extra_info.entry(id).or_default().level = level;
            }
            TagEnd::Item => {
                let frame = self.close("item")?;
                let id = self.push_span(frame.start, frame.start, SpanKind::Item);
                if let Some((ordered, start)) = self.list_ordered.last() {
                    self.extra_info.entry(id).or_default().list_data = Some(ListData {
                        ordered: *ordered,
                        start: *start,
                    });
                }
            }
            TagEnd::List(_) => {
                self.close("list")?;
                self.list_ordered.pop();
            }
            TagEnd::CodeBlock => {
                self.close("code_block")?;
            }
            _ => {
                self.close("other")?;
            }
        }
        Ok(())
    }

    fn handle_text(&mut self, text: CowStr<'a>, range: std::ops::Range<usize>) -> Result<(), MarkdownError> {
        if let Some(Frame {
            kind: ContainerKind::CodeBlock(block_index),
            ..
        }) = self.containers.last()
        {
            let block_index = *block_index;
            self.text.push_str(&text);
            self.pos += text.len();
            self.blocks[block_index].content.push_str(&text);
            return Ok(());
        }

        let line = self.line_at(range.start);
        self.realign_to(line);
        self.append_verbatim(&text);
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            self.last_content_line = Some(trimmed.to_string());
        }
        Ok(())
    }

    fn handle_inline_code(&mut self, text: CowStr<'a>, range: std::ops::Range<usize>) -> Result<(), MarkdownError> {
        let line = self.line_at(range.start);
        self.realign_to(line);
        let start = self.pos;
        self.append_verbatim(&text);
        self.push_span(start, self.pos, SpanKind::Code);
        Ok(())
    }
}

/// Extract `source` into flattened text, a span table, and fenced DSL
/// blocks. `doc_id` seeds every span/block id minted during the walk.
pub fn extract(source: &str, doc_id: impl Into<String>) -> Result<ExtractResult, MarkdownError> {
    MarkdownExtractor::new(source, doc_id).extract()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn flattens_a_simple_paragraph() {
        let result = extract("hello world", "doc|0").unwrap();
        assert_eq!(result.text, "hello world");
        assert!(result.blocks.is_empty());
    }

    #[test]
    fn records_emphasis_span() {
        let result = extract("a *b* c", "doc|0").unwrap();
        let emph = result
            .spans
            .entries()
            .iter()
            .find(|e| e.kind == SpanKind::Emph)
            .expect("emphasis span present");
        assert_eq!(&result.text[emph.start..emph.end], "b");
    }

    #[test]
    fn heading_span_is_zero_width_and_has_level() {
        let result = extract("## Title", "doc|0").unwrap();
        let heading = result
            .spans
            .entries()
            .iter()
            .find(|e| e.kind == SpanKind::Heading)
            .expect("heading span present");
        assert_eq!(heading.start, heading.end);
        assert_eq!(result.extra_info[&heading.id].level, Some(2));
    }

    #[test]
    fn fenced_block_is_captured_with_info_string_and_content() {
        let source = "intro\n\n```dsl\nmatch\n  [#person]\n```\n";
        let result = extract(source, "doc|0").unwrap();
        assert_eq!(result.blocks.len(), 1);
        let block = &result.blocks[0];
        assert_eq!(block.info_string, "dsl");
        assert!(block.content.contains("match"));
        assert_eq!(block.id, "doc|0|0|block");
        assert_eq!(block.name, "intro");
    }

    #[test]
    fn fenced_block_with_no_preceding_prose_is_unnamed() {
        let source = "```dsl\nmatch\n  [#person]\n```\n";
        let result = extract(source, "doc|0").unwrap();
        assert_eq!(result.blocks[0].name, "Unnamed block");
    }

    #[test]
    fn start_offset_is_byte_based_across_multi_byte_prose() {
        // "caf\u{e9}" ("café") is 4 bytes and 4 chars, but the 'é' itself is 2
        // bytes — so a char-counted offset undercounts by one byte here.
        let source = "café\n\n```dsl\nmatch\n  [#person]\n```\n";
        let result = extract(source, "doc|0").unwrap();
        let block = &result.blocks[0];
        assert_eq!(
            &result.text[block.start_offset..block.start_offset + 5],
            "match",
            "start_offset must index text by bytes, not chars"
        );
    }

    #[test]
    fn link_destination_is_recorded_in_extra_info() {
        let result = extract("[text](https://example.com)", "doc|0").unwrap();
        let link = result
            .spans
            .entries()
            .iter()
            .find(|e| e.kind == SpanKind::Link)
            .expect("link span present");
        assert_eq!(
            result.extra_info[&link.id].destination.as_deref(),
            Some("https://example.com")
        );
    }
}
