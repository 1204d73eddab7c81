use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use radar_store::Document;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::SceneTemplate;
use crate::error::Result;
use crate::record;

/// Scene identifier (UUID v4, stored as its string form in `_id`).
pub type SceneId = Uuid;

/// A named collection of items with ownership and subscriber metadata.
///
/// Field names follow the `scenes` collection wire contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    #[serde(rename = "_id")]
    pub id: SceneId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub locked_by: Option<String>,
    pub created_on: DateTime<Utc>,
    pub created_by: String,
    #[serde(default)]
    pub subscribers: BTreeSet<String>,
}

impl Scene {
    pub fn from_template(template: &SceneTemplate, created_by: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: template.name.clone(),
            description: template.description.clone(),
            locked: false,
            locked_by: None,
            created_on: Utc::now(),
            created_by: created_by.to_string(),
            subscribers: BTreeSet::new(),
        }
    }

    pub fn to_document(&self) -> Result<Document> {
        record::to_document(self)
    }

    pub fn from_document(doc: Document) -> Result<Self> {
        let mut scene: Scene = record::from_document(doc)?;
        record::normalize_lock(&mut scene.locked, &mut scene.locked_by);
        Ok(scene)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn template_defaults() {
        let scene = Scene::from_template(&SceneTemplate::default(), "dmoulder");
        assert_eq!(scene.name, "Untitled");
        assert_eq!(scene.created_by, "dmoulder");
        assert!(scene.subscribers.is_empty());
        assert!(scene.locked_by.is_none());
    }

    #[test]
    fn document_round_trip() {
        let mut scene = Scene::from_template(&SceneTemplate::default(), "dmoulder");
        scene.subscribers.insert("alice".into());
        let doc = scene.to_document().unwrap();
        assert_eq!(doc["_id"], json!(scene.id.to_string()));
        assert_eq!(doc["subscribers"], json!(["alice"]));
        assert_eq!(Scene::from_document(doc).unwrap(), scene);
    }

    #[test]
    fn duplicate_subscribers_collapse_on_read() {
        let doc = json!({
            "_id": Uuid::new_v4().to_string(),
            "name": "Radar",
            "created_on": "2015-06-01T12:00:00Z",
            "created_by": "dmoulder",
            "subscribers": ["bob", "bob"]
        });
        let serde_json::Value::Object(doc) = doc else {
            unreachable!()
        };
        let scene = Scene::from_document(doc).unwrap();
        assert_eq!(scene.subscribers.len(), 1);
    }

    #[test]
    fn lock_follows_owner_on_read() {
        let doc = json!({
            "_id": Uuid::new_v4().to_string(),
            "name": "Radar",
            "locked_by": "bob",
            "created_on": "2015-06-01T12:00:00Z",
            "created_by": "dmoulder"
        });
        let serde_json::Value::Object(mut doc) = doc else {
            unreachable!()
        };
        let scene = Scene::from_document(doc.clone()).unwrap();
        assert!(scene.locked);

        doc.insert("locked".into(), json!(true));
        doc.insert("locked_by".into(), serde_json::Value::Null);
        let scene = Scene::from_document(doc).unwrap();
        assert!(!scene.locked);
    }
}
