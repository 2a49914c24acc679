use dashmap::DashMap;

use crate::character::Character;
use crate::id::PlayerId;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),
    #[error("corrupt character document: {0}")]
    Corrupt(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Corrupt(e.to_string())
    }
}

/// Durable character storage, keyed by normalized player id.
pub trait CharacterStore: Send + Sync {
    fn get(&self, id: &PlayerId) -> Result<Option<Character>, StoreError>;

    fn save(&self, id: &PlayerId, character: &Character) -> Result<(), StoreError>;
}

/// Keeps serialized documents in memory. Used by tests and throwaway servers.
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: DashMap<PlayerId, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

impl CharacterStore for MemoryStore {
    fn get(&self, id: &PlayerId) -> Result<Option<Character>, StoreError> {
        match self.documents.get(id) {
            Some(doc) => Ok(Some(serde_json::from_str(doc.value())?)),
            None => Ok(None),
        }
    }

    fn save(&self, id: &PlayerId, character: &Character) -> Result<(), StoreError> {
        let doc = serde_json::to_string(character)?;
        self.documents.insert(id.clone(), doc);
        Ok(())
    }
}
