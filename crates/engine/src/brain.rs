// Project Brain access over the persisted store.
//
// One record per document/project in the `brains` collection, replaced
// wholesale on any mutation. The brain is read-only input to AI requests.

use std::sync::Arc;

use uuid::Uuid;

use marginalia_common::types::ProjectBrain;

use crate::store::{KvStore, StoreError, BRAINS_COLLECTION};

#[derive(Clone)]
pub struct BrainStore {
    store: Arc<dyn KvStore>,
}

impl BrainStore {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// Load a project's brain, defaulting to an empty record when absent.
    pub fn load(&self, project_id: Uuid) -> Result<ProjectBrain, StoreError> {
        match self.store.get(BRAINS_COLLECTION, &project_id.to_string())? {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(ProjectBrain::default()),
        }
    }

    /// Replace the whole brain record.
    pub fn replace(&self, project_id: Uuid, brain: &ProjectBrain) -> Result<(), StoreError> {
        let value = serde_json::to_value(brain)?;
        self.store.set(BRAINS_COLLECTION, &project_id.to_string(), &value)
    }
}
