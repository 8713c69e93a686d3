// Persisted key-value store.
//
// A generic, synchronous get/set over named collections. Records are
// written wholesale (whole-record read-modify-write; no partial-field
// patches at the storage layer) and every write publishes a change
// notification keyed by collection name, so independent editing surfaces
// can reload derived state. Last writer wins.

pub mod memory;
pub mod sqlite;

use std::collections::HashMap;
use std::sync::Mutex as StdMutex;

use serde_json::Value;
use tokio::sync::broadcast;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Collection mapping document id → thread array.
pub const THREADS_COLLECTION: &str = "threads";
/// Collection mapping project id → Project Brain record.
pub const BRAINS_COLLECTION: &str = "brains";

const CHANGE_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),
    #[error("stored record is not valid JSON: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Notification emitted after every wholesale write or removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreChange {
    pub collection: String,
    pub key: String,
}

pub trait KvStore: Send + Sync {
    fn get(&self, collection: &str, key: &str) -> Result<Option<Value>, StoreError>;

    /// Replace the whole record under (collection, key) and publish a change
    /// notification for the collection.
    fn set(&self, collection: &str, key: &str, value: &Value) -> Result<(), StoreError>;

    fn remove(&self, collection: &str, key: &str) -> Result<(), StoreError>;

    /// Subscribe to change notifications for one collection.
    fn subscribe(&self, collection: &str) -> broadcast::Receiver<StoreChange>;
}

/// Per-collection broadcast of [`StoreChange`]s, shared by both backends.
#[derive(Default)]
pub(crate) struct ChangeBus {
    senders: StdMutex<HashMap<String, broadcast::Sender<StoreChange>>>,
}

impl ChangeBus {
    fn sender(&self, collection: &str) -> broadcast::Sender<StoreChange> {
        let mut senders = self.senders.lock().expect("change bus lock poisoned");
        senders
            .entry(collection.to_string())
            .or_insert_with(|| broadcast::channel(CHANGE_CHANNEL_CAPACITY).0)
            .clone()
    }

    pub(crate) fn subscribe(&self, collection: &str) -> broadcast::Receiver<StoreChange> {
        self.sender(collection).subscribe()
    }

    pub(crate) fn publish(&self, collection: &str, key: &str) {
        // No receivers is fine; notifications are best-effort.
        let _ = self.sender(collection).send(StoreChange {
            collection: collection.to_string(),
            key: key.to_string(),
        });
    }
}
