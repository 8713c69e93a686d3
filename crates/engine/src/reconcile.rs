// Reconciliation between content-tree marks and persisted threads.
//
// Two independent corrective passes at different cadences:
//
// - Mark cleanup runs synchronously on the same change cycle that produced
//   an edit. A newly typed character adjacent to a stale mark silently
//   inherits it, so orphaned marks must go before the next keystroke can
//   propagate them into fresh content.
// - Thread cleanup runs debounced (the autosave pipeline schedules it
//   ~800ms after the last edit) so a thread is not deleted during a
//   transient intermediate state such as mid-undo or mid-paste.
//
// Both passes are idempotent: re-running either on an unchanged tree
// performs no mutation and emits no notification.

use std::collections::HashSet;

use uuid::Uuid;

use crate::editor::ContentCapabilities;
use crate::resolver;
use crate::threads::{ThreadError, ThreadStore};

/// Strip every mark whose thread id is not in `live`. Returns the number of
/// mark occurrences removed.
pub fn strip_orphan_marks<C: ContentCapabilities + ?Sized>(
    content: &mut C,
    live: &HashSet<Uuid>,
) -> usize {
    content.retain_marks(&|id| live.contains(&id))
}

/// Delete every non-AI thread of `doc_id` with no remaining mark anywhere in
/// content. AI threads have no anchor requirement and are exempt.
///
/// Saves the thread array once, wholesale, and emits one deletion
/// notification per deleted thread. When nothing is orphaned, neither the
/// store nor subscribers hear anything.
pub fn sweep_orphan_threads<C: ContentCapabilities + ?Sized>(
    content: &C,
    threads: &ThreadStore,
    doc_id: Uuid,
) -> Result<Vec<Uuid>, ThreadError> {
    let anchors = resolver::resolve_positions(content);
    let all = threads.threads_for(doc_id)?;

    let mut kept = Vec::with_capacity(all.len());
    let mut orphaned = Vec::new();
    for thread in all {
        if thread.is_ai_thread || anchors.contains_key(&thread.id) {
            kept.push(thread);
        } else {
            orphaned.push(thread.id);
        }
    }

    if orphaned.is_empty() {
        return Ok(orphaned);
    }

    threads.save_threads(doc_id, &kept)?;
    for thread_id in &orphaned {
        threads.emit_deleted(doc_id, *thread_id);
    }
    Ok(orphaned)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use marginalia_common::content::{Block, ContentTree, Selection};
    use marginalia_common::types::AiMode;

    use super::*;
    use crate::store::{KvStore, MemoryStore, THREADS_COLLECTION};
    use crate::threads::ThreadEvent;

    fn setup() -> (ThreadStore, Arc<MemoryStore>, Uuid) {
        let store = Arc::new(MemoryStore::new());
        let threads = ThreadStore::new(store.clone());
        (threads, store, Uuid::new_v4())
    }

    #[test]
    fn orphan_marks_are_stripped_and_live_marks_survive() {
        let (threads, _store, doc_id) = setup();
        let live = threads.create_thread(doc_id, "alpha", "root").expect("create");
        let stale_id = Uuid::new_v4(); // never stored

        let mut tree = ContentTree::new(vec![Block::paragraph("alpha beta gamma")]);
        tree.apply_mark(Selection::new(0, 5), live.id);
        tree.apply_mark(Selection::new(6, 10), stale_id);

        let known = threads.live_thread_ids(doc_id).expect("ids");
        let removed = strip_orphan_marks(&mut tree, &known);

        assert_eq!(removed, 1);
        let spans = tree.mark_spans();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].thread_id, live.id);
    }

    #[test]
    fn mark_cleanup_is_idempotent() {
        let (threads, _store, doc_id) = setup();
        let live = threads.create_thread(doc_id, "alpha", "root").expect("create");

        let mut tree = ContentTree::new(vec![Block::paragraph("alpha beta")]);
        tree.apply_mark(Selection::new(0, 5), live.id);
        tree.apply_mark(Selection::new(6, 10), Uuid::new_v4());

        let known = threads.live_thread_ids(doc_id).expect("ids");
        assert_eq!(strip_orphan_marks(&mut tree, &known), 1);
        assert_eq!(strip_orphan_marks(&mut tree, &known), 0);
    }

    #[test]
    fn unanchored_thread_is_deleted_exactly_once_with_one_notification() {
        let (threads, _store, doc_id) = setup();
        let anchored = threads.create_thread(doc_id, "alpha", "kept").expect("create");
        let orphan = threads.create_thread(doc_id, "gone", "deleted").expect("create");

        let mut tree = ContentTree::new(vec![Block::paragraph("alpha beta")]);
        tree.apply_mark(Selection::new(0, 5), anchored.id);
        // No mark for `orphan`.

        let mut events = threads.subscribe();
        let deleted = sweep_orphan_threads(&tree, &threads, doc_id).expect("sweep");

        assert_eq!(deleted, vec![orphan.id]);
        assert_eq!(
            events.try_recv().expect("one deletion event"),
            ThreadEvent::Deleted { doc_id, thread_id: orphan.id }
        );
        assert!(events.try_recv().is_err());

        let remaining = threads.threads_for(doc_id).expect("load");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, anchored.id);
    }

    #[test]
    fn ai_threads_survive_the_sweep_without_marks() {
        let (threads, _store, doc_id) = setup();
        threads.create_ai_thread(doc_id, AiMode::Critique, "thoughts?").expect("create ai");

        let tree = ContentTree::new(vec![Block::paragraph("no marks at all")]);
        let deleted = sweep_orphan_threads(&tree, &threads, doc_id).expect("sweep");

        assert!(deleted.is_empty());
        assert_eq!(threads.threads_for(doc_id).expect("load").len(), 1);
    }

    #[test]
    fn second_sweep_on_unchanged_tree_mutates_and_notifies_nothing() {
        let (threads, store, doc_id) = setup();
        let anchored = threads.create_thread(doc_id, "alpha", "kept").expect("create");
        threads.create_thread(doc_id, "gone", "deleted").expect("create");

        let mut tree = ContentTree::new(vec![Block::paragraph("alpha beta")]);
        tree.apply_mark(Selection::new(0, 5), anchored.id);

        sweep_orphan_threads(&tree, &threads, doc_id).expect("first sweep");

        // Second pass: no store write, no thread event.
        let mut store_changes = store.subscribe(THREADS_COLLECTION);
        let mut events = threads.subscribe();
        let deleted = sweep_orphan_threads(&tree, &threads, doc_id).expect("second sweep");

        assert!(deleted.is_empty());
        assert!(store_changes.try_recv().is_err());
        assert!(events.try_recv().is_err());
    }
}
