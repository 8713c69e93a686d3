// Context-pack extraction for AI requests.
//
// Pulls the selection, its local surroundings, and the document's heading
// outline out of the content tree. Every extraction degrades to an empty
// string or an omitted field; building a pack can never take down the
// editing session.

use marginalia_common::content::{ContentTree, Selection};
use marginalia_common::protocol::collab::ContextPack;

/// How many text-bearing blocks before the selection's block to include.
const PRECEDING_BLOCKS: usize = 2;
/// How many text-bearing blocks after the selection's block to include.
const FOLLOWING_BLOCKS: usize = 1;
/// Outline includes heading levels 1 through this depth.
const MAX_OUTLINE_LEVEL: u8 = 3;

/// Build a fresh context pack for one AI request.
///
/// `include_full_doc` attaches the whole document text; everything else is
/// derived from the selection and the tree.
pub fn build_context_pack(
    tree: &ContentTree,
    selection: Option<Selection>,
    include_full_doc: bool,
) -> ContextPack {
    let selected_text = selection
        .filter(|selection| !selection.is_caret())
        .map(|selection| tree.selection_text(selection).trim().to_string())
        .unwrap_or_default();

    ContextPack {
        selected_text,
        local_context: selection.and_then(|selection| local_context(tree, selection)),
        outline: outline(tree),
        full_doc_text: include_full_doc.then(|| tree.text()),
        sources: None,
    }
}

/// The block containing the selection plus two preceding and one following
/// text-bearing block, joined with blank lines. A "block" here is any
/// top-level node with text content.
fn local_context(tree: &ContentTree, selection: Selection) -> Option<String> {
    let containing = tree.block_index_at(selection.start)?;

    let textual: Vec<usize> = (0..tree.blocks.len())
        .filter(|index| tree.blocks[*index].has_text())
        .collect();
    let position = textual.iter().position(|index| *index == containing)?;

    let from = position.saturating_sub(PRECEDING_BLOCKS);
    let to = (position + FOLLOWING_BLOCKS).min(textual.len().saturating_sub(1));

    let window: Vec<String> =
        textual[from..=to].iter().map(|index| tree.blocks[*index].text()).collect();
    Some(window.join("\n\n"))
}

/// Depth-first heading outline for levels 1–3, one `#`-prefixed line per
/// heading.
fn outline(tree: &ContentTree) -> Option<String> {
    let lines: Vec<String> = tree
        .headings()
        .into_iter()
        .filter(|(level, _)| (1..=MAX_OUTLINE_LEVEL).contains(level))
        .map(|(level, text)| format!("{} {}", "#".repeat(level as usize), text))
        .collect();

    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}
