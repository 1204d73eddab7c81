use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::store::StoreError;

/// A stored record: a JSON object keyed by wire field names.
pub type Document = Map<String, Value>;

/// Field holding the document identifier in every collection.
pub const ID_FIELD: &str = "_id";

/// Read the `_id` of a document, if it has a string one.
pub fn document_id(doc: &Document) -> Option<&str> {
    doc.get(ID_FIELD).and_then(Value::as_str)
}

/// Conjunction of field-equality clauses.
///
/// An empty filter matches every document. A clause comparing against
/// `Value::Null` also matches documents where the field is absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub clauses: Vec<(String, Value)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter on the document identifier.
    pub fn by_id(id: impl ToString) -> Self {
        Self::new().eq(ID_FIELD, Value::String(id.to_string()))
    }

    /// Add an equality clause.
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.clauses.push((field.into(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.clauses.iter().all(|(field, expected)| match doc.get(field) {
            Some(actual) => actual == expected,
            None => expected.is_null(),
        })
    }
}

/// One partial-update operator, in the spirit of `$set`, `$push`,
/// `$addToSet` and `$pull`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UpdateOp {
    Set(String, Value),
    Push(String, Value),
    AddToSet(String, Value),
    Pull(String, Value),
}

/// Ordered list of operators applied atomically to one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Update {
    pub ops: Vec<UpdateOp>,
}

impl Update {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.ops.push(UpdateOp::Set(field.into(), value.into()));
        self
    }

    pub fn push(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.ops.push(UpdateOp::Push(field.into(), value.into()));
        self
    }

    pub fn add_to_set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.ops.push(UpdateOp::AddToSet(field.into(), value.into()));
        self
    }

    pub fn pull(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.ops.push(UpdateOp::Pull(field.into(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Apply every operator to `doc` in order.
    ///
    /// `_id` can never be rewritten. Array operators create the field when it
    /// is missing and fail with `Malformed` when it holds a non-array value.
    pub fn apply(&self, doc: &mut Document) -> Result<(), StoreError> {
        for op in &self.ops {
            match op {
                UpdateOp::Set(field, value) => {
                    guard_id(field)?;
                    doc.insert(field.clone(), value.clone());
                }
                UpdateOp::Push(field, value) => {
                    guard_id(field)?;
                    array_field(doc, field)?.push(value.clone());
                }
                UpdateOp::AddToSet(field, value) => {
                    guard_id(field)?;
                    let array = array_field(doc, field)?;
                    if !array.contains(value) {
                        array.push(value.clone());
                    }
                }
                UpdateOp::Pull(field, value) => {
                    guard_id(field)?;
                    array_field(doc, field)?.retain(|v| v != value);
                }
            }
        }
        Ok(())
    }
}

fn guard_id(field: &str) -> Result<(), StoreError> {
    if field == ID_FIELD {
        return Err(StoreError::Malformed("_id is immutable".to_string()));
    }
    Ok(())
}

fn array_field<'a>(doc: &'a mut Document, field: &str) -> Result<&'a mut Vec<Value>, StoreError> {
    let slot = doc
        .entry(field.to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    match slot {
        Value::Array(items) => Ok(items),
        other => Err(StoreError::Malformed(format!(
            "field '{}' is not an array: {}",
            field, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(Filter::new().matches(&doc(json!({"name": "a"}))));
    }

    #[test]
    fn filter_is_a_conjunction() {
        let d = doc(json!({"_id": "1", "scene_id": "s"}));
        assert!(Filter::by_id("1").eq("scene_id", "s").matches(&d));
        assert!(!Filter::by_id("1").eq("scene_id", "t").matches(&d));
    }

    #[test]
    fn null_clause_matches_missing_field() {
        let d = doc(json!({"_id": "1"}));
        assert!(Filter::new().eq("locked_by", Value::Null).matches(&d));
    }

    #[test]
    fn set_merges_without_touching_other_fields() {
        let mut d = doc(json!({"_id": "1", "name": "old", "link": "x"}));
        Update::new().set("name", "new").apply(&mut d).unwrap();
        assert_eq!(d, doc(json!({"_id": "1", "name": "new", "link": "x"})));
    }

    #[test]
    fn array_operators() {
        let mut d = doc(json!({"tags": ["a"]}));
        Update::new()
            .add_to_set("tags", "a")
            .add_to_set("tags", "b")
            .push("comments", json!({"text": "hi"}))
            .pull("tags", "a")
            .apply(&mut d)
            .unwrap();
        assert_eq!(d["tags"], json!(["b"]));
        assert_eq!(d["comments"], json!([{"text": "hi"}]));
    }

    #[test]
    fn push_onto_scalar_is_malformed() {
        let mut d = doc(json!({"name": "x"}));
        let err = Update::new().push("name", 1).apply(&mut d).unwrap_err();
        assert!(matches!(err, StoreError::Malformed(_)));
    }

    #[test]
    fn id_cannot_be_rewritten() {
        let mut d = doc(json!({"_id": "1"}));
        assert!(Update::new().set("_id", "2").apply(&mut d).is_err());
        assert_eq!(document_id(&d), Some("1"));
    }
}
