// Capability interface over the live content engine.
//
// The engine components never look up a global "current editor". Callers
// construct them with an explicit handle implementing this trait; the
// in-repo `ContentTree` model implements it directly, and an embedding
// application adapts its own editing engine the same way.

use serde_json::Value;
use uuid::Uuid;

use marginalia_common::content::{ContentTree, MarkSpan, Selection};

pub trait ContentCapabilities: Send {
    /// One entry per (span, mark) pair, in document order.
    fn mark_spans(&self) -> Vec<MarkSpan>;

    /// Attach `thread_id` to the text covered by `selection`.
    fn apply_mark(&mut self, selection: Selection, thread_id: Uuid);

    /// Remove every mark carrying `thread_id`. Returns true when any span
    /// changed.
    fn remove_mark(&mut self, thread_id: Uuid) -> bool;

    /// Drop marks whose thread id fails the predicate. Returns the number of
    /// mark occurrences removed.
    fn retain_marks(&mut self, keep: &dyn Fn(Uuid) -> bool) -> usize;

    /// Serialized form persisted by the autosave pipeline.
    fn serialize(&self) -> Value;
}

impl ContentCapabilities for ContentTree {
    fn mark_spans(&self) -> Vec<MarkSpan> {
        ContentTree::mark_spans(self)
    }

    fn apply_mark(&mut self, selection: Selection, thread_id: Uuid) {
        ContentTree::apply_mark(self, selection, thread_id);
    }

    fn remove_mark(&mut self, thread_id: Uuid) -> bool {
        ContentTree::remove_mark(self, thread_id)
    }

    fn retain_marks(&mut self, keep: &dyn Fn(Uuid) -> bool) -> usize {
        ContentTree::retain_marks(self, keep)
    }

    fn serialize(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
