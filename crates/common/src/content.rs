// Interface model of the rich-text content tree.
//
// The editing engine itself lives outside this workspace. The engine crates
// consume its tree through this model: ordered top-level blocks, each a list
// of inline spans, each span carrying text plus the set of thread-id marks
// attached to it. Positions are character offsets over the concatenated
// block text with one separator character per block boundary.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A rich-text document as the thread engine sees it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ContentTree {
    pub blocks: Vec<Block>,
}

/// A top-level structural node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Block {
    pub kind: BlockKind,
    pub spans: Vec<InlineSpan>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Paragraph,
    Heading { level: u8 },
    Code,
    Quote,
}

/// A run of text with the comment-thread marks attached to it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InlineSpan {
    pub text: String,
    /// Thread ids anchored to this run.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub marks: Vec<Uuid>,
}

impl InlineSpan {
    pub fn plain(text: impl Into<String>) -> Self {
        Self { text: text.into(), marks: Vec::new() }
    }

    pub fn marked(text: impl Into<String>, thread_id: Uuid) -> Self {
        Self { text: text.into(), marks: vec![thread_id] }
    }

    fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

impl Block {
    pub fn paragraph(text: impl Into<String>) -> Self {
        Self { kind: BlockKind::Paragraph, spans: vec![InlineSpan::plain(text)] }
    }

    pub fn heading(level: u8, text: impl Into<String>) -> Self {
        Self { kind: BlockKind::Heading { level }, spans: vec![InlineSpan::plain(text)] }
    }

    pub fn with_spans(kind: BlockKind, spans: Vec<InlineSpan>) -> Self {
        Self { kind, spans }
    }

    /// Concatenated text of all spans.
    pub fn text(&self) -> String {
        self.spans.iter().map(|span| span.text.as_str()).collect()
    }

    pub fn has_text(&self) -> bool {
        self.spans.iter().any(|span| !span.text.trim().is_empty())
    }

    fn char_len(&self) -> usize {
        self.spans.iter().map(InlineSpan::char_len).sum()
    }
}

/// A character range over the whole document. `start == end` is a caret.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Selection {
    pub start: usize,
    pub end: usize,
}

impl Selection {
    pub fn new(start: usize, end: usize) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self { start: end, end: start }
        }
    }

    pub fn caret(offset: usize) -> Self {
        Self { start: offset, end: offset }
    }

    pub fn is_caret(&self) -> bool {
        self.start == self.end
    }
}

/// One (span, mark) occurrence in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkSpan {
    pub thread_id: Uuid,
    pub text: String,
    /// Document character offset of the span's first character.
    pub offset: usize,
}

impl ContentTree {
    pub fn new(blocks: Vec<Block>) -> Self {
        Self { blocks }
    }

    /// Full document text; blocks joined with a single newline so character
    /// offsets line up with [`ContentTree::block_ranges`].
    pub fn text(&self) -> String {
        self.blocks.iter().map(Block::text).collect::<Vec<_>>().join("\n")
    }

    /// Character range `[start, end)` of each block's text, excluding the
    /// separator that follows it.
    pub fn block_ranges(&self) -> Vec<(usize, usize)> {
        let mut ranges = Vec::with_capacity(self.blocks.len());
        let mut offset = 0usize;
        for block in &self.blocks {
            let len = block.char_len();
            ranges.push((offset, offset + len));
            offset += len + 1;
        }
        ranges
    }

    /// Index of the block whose range contains `offset`. A caret sitting on
    /// a block separator belongs to the preceding block.
    pub fn block_index_at(&self, offset: usize) -> Option<usize> {
        self.block_ranges()
            .iter()
            .position(|(start, end)| offset >= *start && offset <= *end)
    }

    /// Every (span, mark) pair in document order.
    pub fn mark_spans(&self) -> Vec<MarkSpan> {
        let mut result = Vec::new();
        let mut offset = 0usize;
        for block in &self.blocks {
            for span in &block.spans {
                for thread_id in &span.marks {
                    result.push(MarkSpan {
                        thread_id: *thread_id,
                        text: span.text.clone(),
                        offset,
                    });
                }
                offset += span.char_len();
            }
            offset += 1; // block separator
        }
        result
    }

    /// Text covered by `selection`, clamped to the document.
    pub fn selection_text(&self, selection: Selection) -> String {
        if selection.is_caret() {
            return String::new();
        }
        self.text()
            .chars()
            .skip(selection.start)
            .take(selection.end.saturating_sub(selection.start))
            .collect()
    }

    /// Heading text in document order, one entry per heading block.
    pub fn headings(&self) -> Vec<(u8, String)> {
        self.blocks
            .iter()
            .filter_map(|block| match block.kind {
                BlockKind::Heading { level } => Some((level, block.text())),
                _ => None,
            })
            .collect()
    }

    /// Attach `thread_id` to the text covered by `selection`, splitting
    /// partially covered spans at the range boundaries.
    pub fn apply_mark(&mut self, selection: Selection, thread_id: Uuid) {
        if selection.is_caret() {
            return;
        }
        let mut offset = 0usize;
        for block in &mut self.blocks {
            let mut rebuilt = Vec::with_capacity(block.spans.len());
            for span in block.spans.drain(..) {
                let span_len = span.char_len();
                let (span_start, span_end) = (offset, offset + span_len);
                offset = span_end;

                let overlap_start = selection.start.max(span_start);
                let overlap_end = selection.end.min(span_end);
                if overlap_start >= overlap_end {
                    rebuilt.push(span);
                    continue;
                }

                let chars: Vec<char> = span.text.chars().collect();
                let cut = |from: usize, to: usize| -> String {
                    chars[from - span_start..to - span_start].iter().collect()
                };

                if overlap_start > span_start {
                    rebuilt.push(InlineSpan {
                        text: cut(span_start, overlap_start),
                        marks: span.marks.clone(),
                    });
                }
                let mut marks = span.marks.clone();
                if !marks.contains(&thread_id) {
                    marks.push(thread_id);
                }
                rebuilt.push(InlineSpan { text: cut(overlap_start, overlap_end), marks });
                if overlap_end < span_end {
                    rebuilt.push(InlineSpan { text: cut(overlap_end, span_end), marks: span.marks });
                }
            }
            block.spans = rebuilt;
            offset += 1; // block separator
        }
    }

    /// Remove every occurrence of `thread_id`. Returns true when any span
    /// changed.
    pub fn remove_mark(&mut self, thread_id: Uuid) -> bool {
        self.retain_marks(&|id| id != thread_id) > 0
    }

    /// Drop every mark whose thread id fails the predicate. Returns the
    /// number of mark occurrences removed.
    pub fn retain_marks(&mut self, keep: &dyn Fn(Uuid) -> bool) -> usize {
        let mut removed = 0usize;
        for block in &mut self.blocks {
            for span in &mut block.spans {
                let before = span.marks.len();
                span.marks.retain(|id| keep(*id));
                removed += before - span.marks.len();
            }
        }
        removed
    }
}
