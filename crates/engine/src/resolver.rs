// Live anchor resolution.
//
// A thread never persists its own coordinates. This module derives every
// thread's current anchored text and position from the content tree's marks
// on demand, in a single document-order pass.

use std::collections::HashMap;

use uuid::Uuid;

use marginalia_common::types::Thread;

use crate::editor::ContentCapabilities;

/// A thread's currently anchored text and location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAnchor {
    /// Concatenation, in document order, of every span carrying the thread
    /// id. Disjoint ranges merge into one string.
    pub text: String,
    /// Document character offset of the earliest such span.
    pub position: usize,
}

/// Resolve the live anchor of every thread id present in marks.
///
/// Threads with no marks produce no entry.
pub fn resolve_positions<C: ContentCapabilities + ?Sized>(
    content: &C,
) -> HashMap<Uuid, ResolvedAnchor> {
    let mut anchors: HashMap<Uuid, ResolvedAnchor> = HashMap::new();
    for span in content.mark_spans() {
        match anchors.get_mut(&span.thread_id) {
            Some(anchor) => anchor.text.push_str(&span.text),
            None => {
                anchors.insert(
                    span.thread_id,
                    ResolvedAnchor { text: span.text, position: span.offset },
                );
            }
        }
    }
    anchors
}

/// Order threads for presentation: ascending by first-occurrence position,
/// threads without a resolvable anchor after all positioned ones, stable
/// otherwise.
pub fn presentation_order(threads: &mut [Thread], anchors: &HashMap<Uuid, ResolvedAnchor>) {
    threads.sort_by_key(|thread| {
        anchors.get(&thread.id).map(|anchor| anchor.position).unwrap_or(usize::MAX)
    });
}

#[cfg(test)]
mod tests {
    use marginalia_common::content::{Block, ContentTree, Selection};
    use marginalia_common::types::Message;
    use proptest::prelude::*;

    use super::*;

    fn tree_with_marks() -> (ContentTree, Uuid, Uuid) {
        let mut tree = ContentTree::new(vec![
            Block::paragraph("alpha beta gamma"),
            Block::paragraph("delta epsilon"),
        ]);
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        // first: "alpha" (0..5) and "delta" (17..22) — two disjoint ranges.
        tree.apply_mark(Selection::new(0, 5), first);
        tree.apply_mark(Selection::new(17, 22), first);
        // second: "gamma" (11..16).
        tree.apply_mark(Selection::new(11, 16), second);
        (tree, first, second)
    }

    #[test]
    fn disjoint_ranges_merge_at_earliest_position() {
        let (tree, first, second) = tree_with_marks();
        let anchors = resolve_positions(&tree);

        assert_eq!(anchors.len(), 2);
        assert_eq!(anchors[&first].text, "alphadelta");
        assert_eq!(anchors[&first].position, 0);
        assert_eq!(anchors[&second].text, "gamma");
        assert_eq!(anchors[&second].position, 11);
    }

    #[test]
    fn unmarked_threads_produce_no_entry() {
        let tree = ContentTree::new(vec![Block::paragraph("no marks here")]);
        assert!(resolve_positions(&tree).is_empty());
    }

    #[test]
    fn presentation_order_sorts_by_position_with_absent_last() {
        let (tree, first, second) = tree_with_marks();
        let anchors = resolve_positions(&tree);
        let doc_id = Uuid::new_v4();

        let mut unpositioned = Thread::new(doc_id, "gone", Message::human("orphaned"));
        unpositioned.id = Uuid::new_v4();
        let mut threads = vec![
            unpositioned.clone(),
            thread_with_id(doc_id, second),
            thread_with_id(doc_id, first),
        ];

        presentation_order(&mut threads, &anchors);

        assert_eq!(threads[0].id, first); // position 0
        assert_eq!(threads[1].id, second); // position 11
        assert_eq!(threads[2].id, unpositioned.id); // no anchor, sorts last
    }

    #[test]
    fn presentation_order_is_stable_for_unpositioned_threads() {
        let doc_id = Uuid::new_v4();
        let a = thread_with_id(doc_id, Uuid::new_v4());
        let b = thread_with_id(doc_id, Uuid::new_v4());
        let mut threads = vec![a.clone(), b.clone()];

        presentation_order(&mut threads, &HashMap::new());

        assert_eq!(threads[0].id, a.id);
        assert_eq!(threads[1].id, b.id);
    }

    fn thread_with_id(doc_id: Uuid, id: Uuid) -> Thread {
        let mut thread = Thread::new(doc_id, "snapshot", Message::human("root"));
        thread.id = id;
        thread
    }

    proptest! {
        #[test]
        fn ordering_is_ascending_over_arbitrary_positions(positions in prop::collection::vec(0usize..10_000, 1..20)) {
            let doc_id = Uuid::new_v4();
            let mut anchors = HashMap::new();
            let mut threads = Vec::new();
            for position in positions {
                let thread = thread_with_id(doc_id, Uuid::new_v4());
                anchors.insert(
                    thread.id,
                    ResolvedAnchor { text: "x".to_string(), position },
                );
                threads.push(thread);
            }

            presentation_order(&mut threads, &anchors);

            let ordered: Vec<usize> =
                threads.iter().map(|thread| anchors[&thread.id].position).collect();
            prop_assert!(ordered.windows(2).all(|pair| pair[0] <= pair[1]));
        }
    }
}
