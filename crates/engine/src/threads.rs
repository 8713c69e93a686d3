// Thread operations over the persisted store.
//
// Threads live in the `threads` collection as one array per document,
// written wholesale on any mutation. Position is never stored; callers
// derive it through the resolver.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::broadcast;
use uuid::Uuid;

use marginalia_common::types::{AiMode, Message, MessageStatus, Thread};

use crate::editor::ContentCapabilities;
use crate::resolver;
use crate::store::{KvStore, StoreError, THREADS_COLLECTION};

const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum ThreadError {
    #[error("thread {0} not found")]
    NotFound(Uuid),
    #[error("message {0} not found")]
    MessageNotFound(Uuid),
    #[error("thread {0} is resolved; reopen it before replying")]
    Resolved(Uuid),
    #[error("thread {0} is already resolved")]
    AlreadyResolved(Uuid),
    #[error("thread {0} is already open")]
    AlreadyOpen(Uuid),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Thread-level notifications, separate from the store's collection-level
/// change feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThreadEvent {
    Deleted { doc_id: Uuid, thread_id: Uuid },
}

#[derive(Clone)]
pub struct ThreadStore {
    store: Arc<dyn KvStore>,
    events: broadcast::Sender<ThreadEvent>,
}

impl ThreadStore {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { store, events }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ThreadEvent> {
        self.events.subscribe()
    }

    pub(crate) fn emit_deleted(&self, doc_id: Uuid, thread_id: Uuid) {
        let _ = self.events.send(ThreadEvent::Deleted { doc_id, thread_id });
    }

    /// All threads of a document, in stored order.
    pub fn threads_for(&self, doc_id: Uuid) -> Result<Vec<Thread>, ThreadError> {
        match self.store.get(THREADS_COLLECTION, &doc_id.to_string())? {
            Some(value) => Ok(serde_json::from_value(value).map_err(StoreError::Corrupt)?),
            None => Ok(Vec::new()),
        }
    }

    /// Replace a document's whole thread array.
    pub fn save_threads(&self, doc_id: Uuid, threads: &[Thread]) -> Result<(), ThreadError> {
        let value = serde_json::to_value(threads).map_err(StoreError::Corrupt)?;
        self.store.set(THREADS_COLLECTION, &doc_id.to_string(), &value)?;
        Ok(())
    }

    /// Thread ids currently known to the store for a document.
    pub fn live_thread_ids(&self, doc_id: Uuid) -> Result<HashSet<Uuid>, ThreadError> {
        Ok(self.threads_for(doc_id)?.into_iter().map(|thread| thread.id).collect())
    }

    /// Create a human comment thread anchored on `highlighted_text`.
    pub fn create_thread(
        &self,
        doc_id: Uuid,
        highlighted_text: &str,
        first_message: &str,
    ) -> Result<Thread, ThreadError> {
        let thread = Thread::new(doc_id, highlighted_text, Message::human(first_message));
        let mut threads = self.threads_for(doc_id)?;
        threads.push(thread.clone());
        self.save_threads(doc_id, &threads)?;
        Ok(thread)
    }

    /// Create an AI discussion thread rooted at the user's prompt, with a
    /// pending model reply slot appended.
    pub fn create_ai_thread(
        &self,
        doc_id: Uuid,
        mode: AiMode,
        prompt: &str,
    ) -> Result<Thread, ThreadError> {
        let mut thread = Thread::new_ai(doc_id, mode, Message::human(prompt));
        thread.messages.push(Message::model("", MessageStatus::Pending));
        let mut threads = self.threads_for(doc_id)?;
        threads.push(thread.clone());
        self.save_threads(doc_id, &threads)?;
        Ok(thread)
    }

    /// Append a reply. Resolved threads accept no new messages.
    pub fn reply(
        &self,
        doc_id: Uuid,
        thread_id: Uuid,
        message: Message,
    ) -> Result<Message, ThreadError> {
        self.mutate_thread(doc_id, thread_id, |thread| {
            if thread.resolved {
                return Err(ThreadError::Resolved(thread_id));
            }
            thread.messages.push(message.clone());
            Ok(message.clone())
        })
    }

    /// Edit a message's content in place. Order never changes.
    pub fn edit_message(
        &self,
        doc_id: Uuid,
        thread_id: Uuid,
        message_id: Uuid,
        content: &str,
    ) -> Result<(), ThreadError> {
        self.mutate_thread(doc_id, thread_id, |thread| {
            let message = thread
                .messages
                .iter_mut()
                .find(|message| message.id == message_id)
                .ok_or(ThreadError::MessageNotFound(message_id))?;
            message.content = content.to_string();
            message.updated_at = Utc::now();
            Ok(())
        })
    }

    /// Fill in a model message once the provider answers (or fails).
    pub fn complete_model_message(
        &self,
        doc_id: Uuid,
        thread_id: Uuid,
        message_id: Uuid,
        content: &str,
        status: MessageStatus,
    ) -> Result<(), ThreadError> {
        self.mutate_thread(doc_id, thread_id, |thread| {
            let message = thread
                .messages
                .iter_mut()
                .find(|message| message.id == message_id)
                .ok_or(ThreadError::MessageNotFound(message_id))?;
            message.content = content.to_string();
            message.status = Some(status);
            message.updated_at = Utc::now();
            Ok(())
        })
    }

    pub fn resolve(&self, doc_id: Uuid, thread_id: Uuid) -> Result<(), ThreadError> {
        self.mutate_thread(doc_id, thread_id, |thread| {
            if thread.resolved {
                return Err(ThreadError::AlreadyResolved(thread_id));
            }
            thread.resolved = true;
            Ok(())
        })
    }

    pub fn reopen(&self, doc_id: Uuid, thread_id: Uuid) -> Result<(), ThreadError> {
        self.mutate_thread(doc_id, thread_id, |thread| {
            if !thread.resolved {
                return Err(ThreadError::AlreadyOpen(thread_id));
            }
            thread.resolved = false;
            Ok(())
        })
    }

    /// Delete a thread and strip its marks from content in the same step,
    /// so the next reconciliation cycle finds nothing to correct.
    pub fn delete_with_marks<C: ContentCapabilities + ?Sized>(
        &self,
        doc_id: Uuid,
        thread_id: Uuid,
        content: &mut C,
    ) -> Result<(), ThreadError> {
        content.remove_mark(thread_id);
        self.delete(doc_id, thread_id)
    }

    /// Delete a thread and emit a deletion notification.
    pub fn delete(&self, doc_id: Uuid, thread_id: Uuid) -> Result<(), ThreadError> {
        let mut threads = self.threads_for(doc_id)?;
        let before = threads.len();
        threads.retain(|thread| thread.id != thread_id);
        if threads.len() == before {
            return Err(ThreadError::NotFound(thread_id));
        }
        self.save_threads(doc_id, &threads)?;
        self.emit_deleted(doc_id, thread_id);
        Ok(())
    }

    /// Threads ordered for presentation: ascending by live anchor position,
    /// unanchored threads last.
    pub fn threads_in_display_order<C: ContentCapabilities + ?Sized>(
        &self,
        doc_id: Uuid,
        content: &C,
    ) -> Result<Vec<Thread>, ThreadError> {
        let mut threads = self.threads_for(doc_id)?;
        let anchors = resolver::resolve_positions(content);
        resolver::presentation_order(&mut threads, &anchors);
        Ok(threads)
    }

    fn mutate_thread<T>(
        &self,
        doc_id: Uuid,
        thread_id: Uuid,
        mutate: impl FnOnce(&mut Thread) -> Result<T, ThreadError>,
    ) -> Result<T, ThreadError> {
        let mut threads = self.threads_for(doc_id)?;
        let thread = threads
            .iter_mut()
            .find(|thread| thread.id == thread_id)
            .ok_or(ThreadError::NotFound(thread_id))?;
        let result = mutate(thread)?;
        thread.touch();
        self.save_threads(doc_id, &threads)?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use marginalia_common::content::{Block, ContentTree, Selection};

    use super::*;
    use crate::store::MemoryStore;

    fn store() -> ThreadStore {
        ThreadStore::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn created_thread_round_trips_through_the_store() {
        let threads = store();
        let doc_id = Uuid::new_v4();

        threads.create_thread(doc_id, "hi", "hello").expect("create should succeed");

        let loaded = threads.threads_for(doc_id).expect("load should succeed");
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].highlighted_text, "hi");
        assert_eq!(loaded[0].messages.len(), 1);
        assert_eq!(loaded[0].messages[0].content, "hello");
    }

    #[test]
    fn resolved_thread_rejects_replies_until_reopened() {
        let threads = store();
        let doc_id = Uuid::new_v4();
        let thread = threads.create_thread(doc_id, "text", "root").expect("create");

        threads.resolve(doc_id, thread.id).expect("resolve");
        let error = threads
            .reply(doc_id, thread.id, Message::human("blocked"))
            .expect_err("reply on resolved thread must fail");
        assert!(matches!(error, ThreadError::Resolved(id) if id == thread.id));

        threads.reopen(doc_id, thread.id).expect("reopen");
        threads.reply(doc_id, thread.id, Message::human("allowed")).expect("reply after reopen");

        let loaded = threads.threads_for(doc_id).expect("load");
        assert_eq!(loaded[0].messages.len(), 2);
        assert_eq!(loaded[0].messages[1].content, "allowed");
    }

    #[test]
    fn double_resolve_and_double_reopen_are_rejected() {
        let threads = store();
        let doc_id = Uuid::new_v4();
        let thread = threads.create_thread(doc_id, "text", "root").expect("create");

        assert!(matches!(
            threads.reopen(doc_id, thread.id),
            Err(ThreadError::AlreadyOpen(_))
        ));
        threads.resolve(doc_id, thread.id).expect("resolve");
        assert!(matches!(
            threads.resolve(doc_id, thread.id),
            Err(ThreadError::AlreadyResolved(_))
        ));
    }

    #[test]
    fn edit_message_mutates_in_place_without_reordering() {
        let threads = store();
        let doc_id = Uuid::new_v4();
        let thread = threads.create_thread(doc_id, "text", "first").expect("create");
        threads.reply(doc_id, thread.id, Message::human("second")).expect("reply");

        let loaded = threads.threads_for(doc_id).expect("load");
        let first_id = loaded[0].messages[0].id;

        threads.edit_message(doc_id, thread.id, first_id, "first, edited").expect("edit");

        let loaded = threads.threads_for(doc_id).expect("load");
        assert_eq!(loaded[0].messages[0].id, first_id);
        assert_eq!(loaded[0].messages[0].content, "first, edited");
        assert_eq!(loaded[0].messages[1].content, "second");
        assert!(loaded[0].messages[0].updated_at >= loaded[0].messages[0].created_at);
    }

    #[test]
    fn delete_emits_exactly_one_notification() {
        let threads = store();
        let doc_id = Uuid::new_v4();
        let thread = threads.create_thread(doc_id, "text", "root").expect("create");
        let mut events = threads.subscribe();

        threads.delete(doc_id, thread.id).expect("delete");

        assert_eq!(
            events.try_recv().expect("one deletion event"),
            ThreadEvent::Deleted { doc_id, thread_id: thread.id }
        );
        assert!(events.try_recv().is_err());
        assert!(matches!(
            threads.delete(doc_id, thread.id),
            Err(ThreadError::NotFound(_))
        ));
    }

    #[test]
    fn ai_thread_starts_with_prompt_and_pending_reply() {
        let threads = store();
        let doc_id = Uuid::new_v4();
        let thread = threads
            .create_ai_thread(doc_id, AiMode::Critique, "Is this clear?")
            .expect("create ai thread");

        assert!(thread.is_ai_thread);
        assert_eq!(thread.ai_mode, Some(AiMode::Critique));
        assert_eq!(thread.messages.len(), 2);
        assert_eq!(thread.messages[1].status, Some(MessageStatus::Pending));

        let reply_id = thread.messages[1].id;
        threads
            .complete_model_message(doc_id, thread.id, reply_id, "Quite clear.", MessageStatus::Complete)
            .expect("complete");

        let loaded = threads.threads_for(doc_id).expect("load");
        assert_eq!(loaded[0].messages[1].content, "Quite clear.");
        assert_eq!(loaded[0].messages[1].status, Some(MessageStatus::Complete));
    }

    #[test]
    fn delete_with_marks_detaches_content_and_record_together() {
        let threads = store();
        let doc_id = Uuid::new_v4();
        let thread = threads.create_thread(doc_id, "alpha", "root").expect("create");

        let mut tree = ContentTree::new(vec![Block::paragraph("alpha beta")]);
        tree.apply_mark(Selection::new(0, 5), thread.id);

        threads.delete_with_marks(doc_id, thread.id, &mut tree).expect("delete");

        assert!(tree.mark_spans().is_empty());
        assert!(threads.threads_for(doc_id).expect("load").is_empty());
    }

    #[test]
    fn display_order_follows_live_anchor_positions() {
        let threads = store();
        let doc_id = Uuid::new_v4();
        let late = threads.create_thread(doc_id, "gamma", "on gamma").expect("create");
        let early = threads.create_thread(doc_id, "alpha", "on alpha").expect("create");
        let unanchored = threads.create_thread(doc_id, "gone", "no mark").expect("create");

        let mut tree = ContentTree::new(vec![Block::paragraph("alpha beta gamma")]);
        tree.apply_mark(Selection::new(11, 16), late.id);
        tree.apply_mark(Selection::new(0, 5), early.id);

        let ordered = threads.threads_in_display_order(doc_id, &tree).expect("order");
        assert_eq!(ordered[0].id, early.id);
        assert_eq!(ordered[1].id, late.id);
        assert_eq!(ordered[2].id, unanchored.id);
    }
}
