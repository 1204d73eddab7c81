use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use serde_json::Value;
use uuid::Uuid;

use crate::document::{document_id, Document, Filter, Update, ID_FIELD};
use crate::store::{Collection, DocumentStore, StoreError};

type Collections = HashMap<Collection, Vec<Document>>;

/// In-process document store.
///
/// Documents keep their insertion order. `set_online(false)` makes every call
/// fail with [`StoreError::Unavailable`], which lets callers exercise their
/// failure paths without a real connection.
pub struct MemoryStore {
    collections: Mutex<Collections>,
    online: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            collections: Mutex::new(HashMap::new()),
            online: AtomicBool::new(true),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Collections>, StoreError> {
        if !self.is_online() {
            return Err(StoreError::Unavailable("memory store is offline".to_string()));
        }
        self.collections
            .lock()
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentStore for MemoryStore {
    fn find_one(
        &self,
        collection: Collection,
        filter: &Filter,
    ) -> Result<Option<Document>, StoreError> {
        let collections = self.lock()?;
        Ok(collections
            .get(&collection)
            .and_then(|docs| docs.iter().find(|d| filter.matches(d)))
            .cloned())
    }

    fn find(&self, collection: Collection, filter: &Filter) -> Result<Vec<Document>, StoreError> {
        let collections = self.lock()?;
        Ok(collections
            .get(&collection)
            .map(|docs| docs.iter().filter(|d| filter.matches(d)).cloned().collect())
            .unwrap_or_default())
    }

    fn insert_one(&self, collection: Collection, mut doc: Document) -> Result<String, StoreError> {
        let mut collections = self.lock()?;
        let id = match document_id(&doc) {
            Some(id) => id.to_string(),
            None => {
                let id = Uuid::new_v4().to_string();
                doc.insert(ID_FIELD.to_string(), Value::String(id.clone()));
                id
            }
        };
        let docs = collections.entry(collection).or_default();
        if docs.iter().any(|d| document_id(d) == Some(id.as_str())) {
            return Err(StoreError::DuplicateId { collection, id });
        }
        docs.push(doc);
        Ok(id)
    }

    fn update_one(
        &self,
        collection: Collection,
        filter: &Filter,
        update: &Update,
    ) -> Result<bool, StoreError> {
        let mut collections = self.lock()?;
        let Some(doc) = collections
            .get_mut(&collection)
            .and_then(|docs| docs.iter_mut().find(|d| filter.matches(d)))
        else {
            return Ok(false);
        };
        // Apply to a copy so a failing operator leaves the stored document intact.
        let mut updated = doc.clone();
        update.apply(&mut updated)?;
        *doc = updated;
        Ok(true)
    }

    fn delete_many(&self, collection: Collection, filter: &Filter) -> Result<usize, StoreError> {
        let mut collections = self.lock()?;
        let Some(docs) = collections.get_mut(&collection) else {
            return Ok(0);
        };
        let before = docs.len();
        docs.retain(|d| !filter.matches(d));
        Ok(before - docs.len())
    }
}
