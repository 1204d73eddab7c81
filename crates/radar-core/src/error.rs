//! Error types for radar-core

use radar_store::StoreError;
use thiserror::Error;

use crate::item::ItemId;
use crate::scene::SceneId;

/// Result type alias for radar operations
pub type Result<T> = std::result::Result<T, RadarError>;

/// Main error type for scene and item operations
#[derive(Error, Debug)]
pub enum RadarError {
    /// The item id has no record in the bound scene
    #[error("Item not found: {0}")]
    NotFound(ItemId),

    /// The handle's scene was deleted
    #[error("Scene {0} is no longer valid")]
    InvalidScene(SceneId),

    /// The handle has no backing scene record
    #[error("No scene bound to this handle")]
    NoSceneBound,

    /// A value the store cannot represent, such as a NaN coordinate
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// Transport or connectivity failure in the document store
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// A stored document does not have the expected shape
    #[error("Decode error: {0}")]
    Decode(String),

    /// Export file could not be read or written
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Export document could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<StoreError> for RadarError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(msg) => {
                tracing::warn!("Document store unavailable: {}", msg);
                RadarError::StoreUnavailable(msg)
            }
            StoreError::DuplicateId { collection, id } => RadarError::StoreUnavailable(format!(
                "insert rejected, duplicate id {} in {}",
                id, collection
            )),
            StoreError::Malformed(msg) => RadarError::Decode(msg),
        }
    }
}
