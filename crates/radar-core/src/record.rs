//! Conversion between typed records and store documents.

use radar_store::Document;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{RadarError, Result};

pub(crate) fn to_document<T: Serialize>(record: &T) -> Result<Document> {
    match serde_json::to_value(record)? {
        Value::Object(doc) => Ok(doc),
        other => Err(RadarError::Decode(format!(
            "record did not serialize to an object: {}",
            other
        ))),
    }
}

pub(crate) fn from_document<T: DeserializeOwned>(doc: Document) -> Result<T> {
    serde_json::from_value(Value::Object(doc)).map_err(|e| RadarError::Decode(e.to_string()))
}

/// Make `locked` agree with `locked_by`. The owner wins: a named owner means
/// locked, and a lock with no (or a blank) owner is released.
pub(crate) fn normalize_lock(locked: &mut bool, locked_by: &mut Option<String>) {
    if locked_by.as_deref().is_some_and(|user| user.trim().is_empty()) {
        *locked_by = None;
    }
    if *locked != locked_by.is_some() {
        tracing::debug!(
            "Lock flag {} disagrees with owner {:?}, using owner",
            locked,
            locked_by
        );
        *locked = locked_by.is_some();
    }
}

/// Serialize one field value for a partial update.
pub(crate) fn to_value<T: Serialize>(value: &T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}
