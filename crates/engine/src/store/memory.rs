// In-memory store backend, used by tests and ephemeral sessions.

use std::collections::HashMap;
use std::sync::Mutex as StdMutex;

use serde_json::Value;
use tokio::sync::broadcast;

use super::{ChangeBus, KvStore, StoreChange, StoreError};

#[derive(Default)]
pub struct MemoryStore {
    records: StdMutex<HashMap<(String, String), Value>>,
    bus: ChangeBus,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, collection: &str, key: &str) -> Result<Option<Value>, StoreError> {
        let records = self.records.lock().expect("memory store lock poisoned");
        Ok(records.get(&(collection.to_string(), key.to_string())).cloned())
    }

    fn set(&self, collection: &str, key: &str, value: &Value) -> Result<(), StoreError> {
        let mut records = self.records.lock().expect("memory store lock poisoned");
        records.insert((collection.to_string(), key.to_string()), value.clone());
        drop(records);
        self.bus.publish(collection, key);
        Ok(())
    }

    fn remove(&self, collection: &str, key: &str) -> Result<(), StoreError> {
        let mut records = self.records.lock().expect("memory store lock poisoned");
        let removed = records.remove(&(collection.to_string(), key.to_string())).is_some();
        drop(records);
        if removed {
            self.bus.publish(collection, key);
        }
        Ok(())
    }

    fn subscribe(&self, collection: &str) -> broadcast::Receiver<StoreChange> {
        self.bus.subscribe(collection)
    }
}
