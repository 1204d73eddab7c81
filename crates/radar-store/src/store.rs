use serde::{Deserialize, Serialize};

use crate::document::{Document, Filter, Update};

/// The two collections the radar persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Scenes,
    Items,
}

impl Collection {
    pub const ALL: [Collection; 2] = [Collection::Scenes, Collection::Items];

    /// Wire name of the collection (also the SQLite table name).
    pub fn name(self) -> &'static str {
        match self {
            Collection::Scenes => "scenes",
            Collection::Items => "items",
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// The gateway every document backend implements.
///
/// Calls block until the backend answers. Implementations do not retry;
/// a transport failure surfaces as [`StoreError::Unavailable`].
pub trait DocumentStore: Send + Sync {
    /// First document matching the filter, in insertion order.
    fn find_one(&self, collection: Collection, filter: &Filter)
        -> Result<Option<Document>, StoreError>;

    /// All documents matching the filter, in insertion order.
    fn find(&self, collection: Collection, filter: &Filter) -> Result<Vec<Document>, StoreError>;

    /// Insert a document. Assigns a fresh `_id` when missing. Returns the id.
    fn insert_one(&self, collection: Collection, doc: Document) -> Result<String, StoreError>;

    /// Apply a partial update to the first matching document.
    /// Returns `false` when nothing matched.
    fn update_one(
        &self,
        collection: Collection,
        filter: &Filter,
        update: &Update,
    ) -> Result<bool, StoreError>;

    /// Delete every matching document. Returns how many were removed.
    fn delete_many(&self, collection: Collection, filter: &Filter) -> Result<usize, StoreError>;

    /// Count matching documents without decoding them.
    fn count(&self, collection: Collection, filter: &Filter) -> Result<usize, StoreError> {
        Ok(self.find(collection, filter)?.len())
    }
}

/// Errors from a document store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Document already exists in {collection}: {id}")]
    DuplicateId { collection: Collection, id: String },

    #[error("Malformed document: {0}")]
    Malformed(String),
}
