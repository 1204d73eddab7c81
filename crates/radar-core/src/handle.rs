//! Scene handle: lifecycle and field mutators for one scene and its items.
//!
//! Every write is a partial update followed by a full re-read, so callers
//! always get the store's present value back rather than a locally assumed
//! one.

use chrono::Utc;
use radar_store::{Collection, Document, Filter, Update};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{RadarError, Result};
use crate::export::ExportSnapshot;
use crate::item::{Colour, Comment, Item, ItemId, Position};
use crate::record;
use crate::scene::{Scene, SceneId};
use crate::session::Session;
use crate::tags::{normalize_tag, TagSet};

/// The item field a change touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemField {
    Name,
    Position,
    Comments,
    Description,
    Link,
    Tags,
    Colour,
    Lock,
}

/// A single field write against an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldChange {
    Name(String),
    Position(Position),
    Comment(String),
    Description(String),
    Link(String),
    AddTag(String),
    RemoveTag(String),
    SetTags(Vec<String>),
    ClearTags,
    Colour(Colour),
    Lock(bool),
}

impl FieldChange {
    pub fn field(&self) -> ItemField {
        match self {
            FieldChange::Name(_) => ItemField::Name,
            FieldChange::Position(_) => ItemField::Position,
            FieldChange::Comment(_) => ItemField::Comments,
            FieldChange::Description(_) => ItemField::Description,
            FieldChange::Link(_) => ItemField::Link,
            FieldChange::AddTag(_)
            | FieldChange::RemoveTag(_)
            | FieldChange::SetTags(_)
            | FieldChange::ClearTags => ItemField::Tags,
            FieldChange::Colour(_) => ItemField::Colour,
            FieldChange::Lock(_) => ItemField::Lock,
        }
    }
}

#[derive(Debug, Clone)]
enum Binding {
    Unbound,
    Bound(Scene),
    Deleted(SceneId),
}

/// Operations on one scene and its items, against the session's store.
#[derive(Debug, Clone)]
pub struct SceneHandle {
    session: Session,
    binding: Binding,
}

impl SceneHandle {
    /// A handle with no backing scene.
    pub fn unbound(session: &Session) -> Self {
        Self {
            session: session.clone(),
            binding: Binding::Unbound,
        }
    }

    /// Insert a scene from the session's template and bind to the re-read
    /// record.
    pub fn create_scene(session: &Session) -> Result<Self> {
        let scene = Scene::from_template(&session.templates().scene, session.user());
        let id = scene.id;
        session
            .store()
            .insert_one(Collection::Scenes, scene.to_document()?)?;
        let scene = session.find_scene(id)?.ok_or(RadarError::InvalidScene(id))?;
        tracing::info!("Created scene {} ({})", scene.id, scene.name);
        Ok(Self {
            session: session.clone(),
            binding: Binding::Bound(scene),
        })
    }

    /// Bind to an existing scene. `None` if no such scene is persisted.
    pub fn open(session: &Session, id: SceneId) -> Result<Option<Self>> {
        Ok(session.find_scene(id)?.map(|scene| Self {
            session: session.clone(),
            binding: Binding::Bound(scene),
        }))
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// The last record read for the bound scene.
    pub fn scene(&self) -> Option<&Scene> {
        match &self.binding {
            Binding::Bound(scene) => Some(scene),
            _ => None,
        }
    }

    pub fn scene_id(&self) -> Option<SceneId> {
        self.scene().map(|s| s.id)
    }

    fn bound(&self) -> Result<&Scene> {
        match &self.binding {
            Binding::Bound(scene) => Ok(scene),
            Binding::Deleted(id) => Err(RadarError::InvalidScene(*id)),
            Binding::Unbound => Err(RadarError::NoSceneBound),
        }
    }

    /// Whether the handle points at a scene that still exists in the store.
    pub fn is_valid_scene(&self) -> Result<bool> {
        match &self.binding {
            Binding::Bound(scene) => Ok(self
                .session
                .store()
                .find_one(Collection::Scenes, &Filter::by_id(scene.id))?
                .is_some()),
            _ => Ok(false),
        }
    }

    /// Re-read the bound scene record.
    pub fn reload(&mut self) -> Result<Scene> {
        let id = self.bound()?.id;
        match self.session.find_scene(id)? {
            Some(scene) => {
                self.binding = Binding::Bound(scene.clone());
                Ok(scene)
            }
            None => {
                self.binding = Binding::Deleted(id);
                Err(RadarError::InvalidScene(id))
            }
        }
    }

    fn write_scene(&mut self, update: Update) -> Result<Scene> {
        let id = self.bound()?.id;
        let matched =
            self.session
                .store()
                .update_one(Collection::Scenes, &Filter::by_id(id), &update)?;
        if !matched {
            self.binding = Binding::Deleted(id);
            return Err(RadarError::InvalidScene(id));
        }
        self.reload()
    }

    /// Rename the scene. Blank names are the caller's concern.
    pub fn rename(&mut self, name: &str) -> Result<Scene> {
        self.write_scene(Update::new().set("name", name))
    }

    pub fn set_description(&mut self, description: &str) -> Result<Scene> {
        self.write_scene(Update::new().set("description", description))
    }

    /// Add a subscriber. Adding one twice leaves a single entry.
    pub fn add_subscription(&mut self, user: &str) -> Result<Scene> {
        self.write_scene(Update::new().add_to_set("subscribers", user))
    }

    /// Record `user` as the scene's owner (`locked_by`).
    pub fn set_owner(&mut self, user: &str) -> Result<Scene> {
        if user.trim().is_empty() {
            return Err(RadarError::InvalidValue("owner must not be blank".into()));
        }
        self.write_scene(
            Update::new()
                .set("locked_by", user)
                .set("locked", true),
        )
    }

    /// Delete every item of the scene, then the scene, then invalidate the
    /// handle. Does nothing when the handle has no valid persisted scene.
    ///
    /// Other handles open on the same scene are not consulted; they find out
    /// on their next write.
    pub fn delete(&mut self) -> Result<()> {
        if !self.is_valid_scene()? {
            return Ok(());
        }
        let id = self.bound()?.id;
        let store = self.session.store();
        let items = store.delete_many(Collection::Items, &scene_items(id))?;
        store.delete_many(Collection::Scenes, &Filter::by_id(id))?;
        tracing::info!("Deleted scene {} and {} item(s)", id, items);
        self.binding = Binding::Deleted(id);
        Ok(())
    }

    /// Create an item from the template at the origin.
    pub fn new_item(&mut self) -> Result<Item> {
        self.new_item_at(0.0, 0.0)
    }

    /// Create an item from the template at `(x, y)`.
    ///
    /// The scene is re-checked first, so a handle whose scene was deleted
    /// elsewhere fails `InvalidScene` instead of inserting an orphan.
    pub fn new_item_at(&mut self, x: f64, y: f64) -> Result<Item> {
        let Binding::Bound(scene) = &self.binding else {
            return Err(RadarError::NoSceneBound);
        };
        let scene_id = scene.id;
        let position = finite_position(x, y)?;
        self.ensure_scene_exists()?;
        let item = Item::from_template(
            scene_id,
            &self.session.templates().item,
            position,
            self.session.user(),
        );
        self.session
            .store()
            .insert_one(Collection::Items, item.to_document()?)?;
        tracing::debug!("Created item {} in scene {}", item.id, scene_id);
        self.find_item(item.id)?.ok_or(RadarError::NotFound(item.id))
    }

    /// Fail `InvalidScene`, and invalidate the handle, if the bound scene is
    /// no longer persisted.
    fn ensure_scene_exists(&mut self) -> Result<()> {
        let id = self.bound()?.id;
        if self.session.find_scene(id)?.is_none() {
            tracing::warn!("Scene {} was deleted elsewhere", id);
            self.binding = Binding::Deleted(id);
            return Err(RadarError::InvalidScene(id));
        }
        Ok(())
    }

    /// The error for an item lookup that matched nothing: `NotFound` when
    /// the scene still exists, `InvalidScene` when it is gone.
    fn missing_item(&mut self, id: ItemId) -> RadarError {
        match self.ensure_scene_exists() {
            Ok(()) => RadarError::NotFound(id),
            Err(err) => err,
        }
    }

    /// All items of the scene, in creation order.
    pub fn items(&self) -> Result<Vec<Item>> {
        let id = self.bound()?.id;
        self.session
            .store()
            .find(Collection::Items, &scene_items(id))?
            .into_iter()
            .map(Item::from_document)
            .collect()
    }

    /// The item with `id` if it belongs to this scene.
    pub fn find_item(&self, id: ItemId) -> Result<Option<Item>> {
        let filter = self.item_filter(id)?;
        self.session
            .store()
            .find_one(Collection::Items, &filter)?
            .map(Item::from_document)
            .transpose()
    }

    fn require_item(&mut self, id: ItemId) -> Result<Item> {
        match self.find_item(id)? {
            Some(item) => Ok(item),
            None => Err(self.missing_item(id)),
        }
    }

    /// The stored document of an item, before decoding.
    fn raw_item(&mut self, id: ItemId) -> Result<Document> {
        let filter = self.item_filter(id)?;
        match self.session.store().find_one(Collection::Items, &filter)? {
            Some(doc) => Ok(doc),
            None => Err(self.missing_item(id)),
        }
    }

    fn item_filter(&self, id: ItemId) -> Result<Filter> {
        let scene_id = self.bound()?.id;
        Ok(Filter::by_id(id).eq("scene_id", scene_id.to_string()))
    }

    pub fn delete_item(&mut self, id: ItemId) -> Result<()> {
        let filter = self.item_filter(id)?;
        if self.session.store().delete_many(Collection::Items, &filter)? == 0 {
            return Err(self.missing_item(id));
        }
        tracing::debug!("Deleted item {}", id);
        Ok(())
    }

    /// Apply a partial update to an item and re-read it.
    fn write_item(&mut self, id: ItemId, update: Update) -> Result<Item> {
        let filter = self.item_filter(id)?;
        if !self
            .session
            .store()
            .update_one(Collection::Items, &filter, &update)?
        {
            return Err(self.missing_item(id));
        }
        tracing::debug!("Updated item {} ({} op(s))", id, update.ops.len());
        self.require_item(id)
    }

    pub fn update_name(&mut self, id: ItemId, name: &str) -> Result<Item> {
        self.write_item(id, Update::new().set("name", name))
    }

    /// Move an item. Distance is written in the same update.
    pub fn update_position(&mut self, id: ItemId, x: f64, y: f64) -> Result<Item> {
        let position = finite_position(x, y)?;
        self.write_item(
            id,
            Update::new()
                .set("pos", record::to_value(&position)?)
                .set("distance", position.distance()),
        )
    }

    /// Append a comment by the session user. History is append-only.
    pub fn post_comment(&mut self, id: ItemId, text: &str) -> Result<Item> {
        let comment = Comment {
            date: Utc::now(),
            user: self.session.user().to_string(),
            text: text.to_string(),
        };
        self.write_item(id, Update::new().push("comments", record::to_value(&comment)?))
    }

    pub fn update_description(&mut self, id: ItemId, description: &str) -> Result<Item> {
        self.write_item(id, Update::new().set("description", description))
    }

    pub fn update_link(&mut self, id: ItemId, link: &str) -> Result<Item> {
        self.write_item(id, Update::new().set("link", link))
    }

    /// Add a tag (lower-cased). Present or blank tags leave the record as is.
    pub fn add_tag(&mut self, id: ItemId, tag: &str) -> Result<Item> {
        let item = self.require_item(id)?;
        match normalize_tag(tag) {
            Some(tag) if !item.tags.contains(&tag) => {
                self.write_item(id, Update::new().add_to_set("tags", tag))
            }
            _ => Ok(item),
        }
    }

    /// Remove a tag. Absent tags leave the record as is.
    ///
    /// Stored spellings are matched after normalization, so a legacy `"Ops"`
    /// goes away when `"ops"` is removed.
    pub fn remove_tag(&mut self, id: ItemId, tag: &str) -> Result<Item> {
        let doc = self.raw_item(id)?;
        let Some(tag) = normalize_tag(tag) else {
            return Item::from_document(doc);
        };
        let stored: Vec<String> = doc
            .get("tags")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
            .filter(|raw| normalize_tag(raw).as_deref() == Some(tag.as_str()))
            .map(str::to_string)
            .collect();
        if stored.is_empty() {
            return Item::from_document(doc);
        }
        let update = stored
            .into_iter()
            .fold(Update::new(), |update, raw| update.pull("tags", raw));
        self.write_item(id, update)
    }

    /// Replace the whole tag set. Input goes through the same normalization
    /// as `add_tag`, so duplicates differing in case collapse.
    pub fn set_tags<S: AsRef<str>>(&mut self, id: ItemId, tags: &[S]) -> Result<Item> {
        let tags: TagSet = tags.iter().map(AsRef::as_ref).collect();
        self.write_item(id, Update::new().set("tags", tags.to_vec()))
    }

    pub fn clear_tags(&mut self, id: ItemId) -> Result<Item> {
        let item = self.require_item(id)?;
        if item.tags.is_empty() {
            return Ok(item);
        }
        self.write_item(id, Update::new().set("tags", Value::Array(Vec::new())))
    }

    pub fn update_colour(&mut self, id: ItemId, colour: Colour) -> Result<Item> {
        self.write_item(id, Update::new().set("colour", record::to_value(&colour)?))
    }

    /// Take or release the advisory lock for the session user. Nothing
    /// enforces it; it only tells other editors someone is working here.
    pub fn set_lock(&mut self, id: ItemId, locked: bool) -> Result<Item> {
        let locked_by = if locked {
            Value::String(self.session.user().to_string())
        } else {
            Value::Null
        };
        self.write_item(
            id,
            Update::new().set("locked", locked).set("locked_by", locked_by),
        )
    }

    /// Dispatch a typed change to the matching mutator.
    pub fn apply(&mut self, id: ItemId, change: &FieldChange) -> Result<Item> {
        match change {
            FieldChange::Name(name) => self.update_name(id, name),
            FieldChange::Position(p) => self.update_position(id, p.x, p.y),
            FieldChange::Comment(text) => self.post_comment(id, text),
            FieldChange::Description(text) => self.update_description(id, text),
            FieldChange::Link(link) => self.update_link(id, link),
            FieldChange::AddTag(tag) => self.add_tag(id, tag),
            FieldChange::RemoveTag(tag) => self.remove_tag(id, tag),
            FieldChange::SetTags(tags) => self.set_tags(id, tags.as_slice()),
            FieldChange::ClearTags => self.clear_tags(id),
            FieldChange::Colour(colour) => self.update_colour(id, *colour),
            FieldChange::Lock(locked) => self.set_lock(id, *locked),
        }
    }

    /// Union of every item's tags, for filter menus.
    pub fn all_tags(&self) -> Result<TagSet> {
        let mut tags = TagSet::new();
        for item in self.items()? {
            tags.extend(item.tags.to_vec());
        }
        Ok(tags)
    }

    /// Read the scene and its items. Not isolated: a concurrent writer can
    /// leave some items before and others after its update.
    pub fn export_snapshot(&self) -> Result<ExportSnapshot> {
        let id = self.bound()?.id;
        let scene = self
            .session
            .find_scene(id)?
            .ok_or(RadarError::InvalidScene(id))?;
        let items = self.items()?;
        Ok(ExportSnapshot { scene, items })
    }
}

/// Positions must survive a JSON round trip, which NaN and infinities do not.
fn finite_position(x: f64, y: f64) -> Result<Position> {
    if x.is_finite() && y.is_finite() {
        Ok(Position::new(x, y))
    } else {
        Err(RadarError::InvalidValue(format!("position ({}, {}) is not finite", x, y)))
    }
}

fn scene_items(scene_id: SceneId) -> Filter {
    Filter::new().eq("scene_id", scene_id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use radar_store::MemoryStore;
    use std::sync::Arc;

    fn session() -> Session {
        Session::new(Arc::new(MemoryStore::new()), "tester")
    }

    #[test]
    fn create_scene_reads_back_template() {
        let handle = SceneHandle::create_scene(&session()).unwrap();
        let scene = handle.scene().unwrap();
        assert_eq!(scene.name, "Untitled");
        assert_eq!(scene.created_by, "tester");
        assert!(handle.is_valid_scene().unwrap());
    }

    #[test]
    fn rename_and_subscribe() {
        let mut handle = SceneHandle::create_scene(&session()).unwrap();
        assert_eq!(handle.rename("Demo Scene 01").unwrap().name, "Demo Scene 01");
        handle.add_subscription("alice").unwrap();
        let scene = handle.add_subscription("alice").unwrap();
        assert_eq!(scene.subscribers.len(), 1);
        let scene = handle.set_owner("bob").unwrap();
        assert_eq!(scene.locked_by.as_deref(), Some("bob"));
        assert!(scene.locked);
        assert!(matches!(handle.set_owner(" "), Err(RadarError::InvalidValue(_))));
        assert_eq!(handle.scene().unwrap().locked_by.as_deref(), Some("bob"));
    }

    #[test]
    fn unbound_handle_cannot_create_items() {
        let mut handle = SceneHandle::unbound(&session());
        assert!(matches!(handle.new_item(), Err(RadarError::NoSceneBound)));
        assert!(!handle.is_valid_scene().unwrap());
    }

    #[test]
    fn field_change_dispatch() {
        let mut handle = SceneHandle::create_scene(&session()).unwrap();
        let item = handle.new_item().unwrap();
        let got = handle
            .apply(item.id, &FieldChange::Name("Kubernetes".into()))
            .unwrap();
        assert_eq!(got.name, "Kubernetes");
        let got = handle
            .apply(item.id, &FieldChange::Position(Position::new(3.0, 4.0)))
            .unwrap();
        assert_eq!(got.distance, 5.0);
        assert_eq!(FieldChange::ClearTags.field(), ItemField::Tags);
    }

    #[test]
    fn items_of_other_scenes_are_invisible() {
        let s = session();
        let mut a = SceneHandle::create_scene(&s).unwrap();
        let mut b = SceneHandle::create_scene(&s).unwrap();
        let item = a.new_item().unwrap();
        assert!(b.find_item(item.id).unwrap().is_none());
        assert!(matches!(
            b.update_name(item.id, "x"),
            Err(RadarError::NotFound(_))
        ));
    }

    #[test]
    fn non_finite_position_rejected() {
        let mut handle = SceneHandle::create_scene(&session()).unwrap();
        let item = handle.new_item().unwrap();
        assert!(matches!(
            handle.update_position(item.id, f64::NAN, 1.0),
            Err(RadarError::InvalidValue(_))
        ));
        assert!(handle.new_item_at(f64::INFINITY, 0.0).is_err());
        assert_eq!(handle.find_item(item.id).unwrap().unwrap().position, Position::ORIGIN);
    }

    #[test]
    fn lock_records_session_user() {
        let mut handle = SceneHandle::create_scene(&session()).unwrap();
        let item = handle.new_item().unwrap();
        let locked = handle.set_lock(item.id, true).unwrap();
        assert!(locked.locked);
        assert_eq!(locked.locked_by.as_deref(), Some("tester"));
        let unlocked = handle.set_lock(item.id, false).unwrap();
        assert!(!unlocked.locked);
        assert!(unlocked.locked_by.is_none());
    }

    fn seed_tags(handle: &SceneHandle, id: ItemId, tags: Value) {
        let filter = Filter::by_id(id);
        let matched = handle
            .session()
            .store()
            .update_one(Collection::Items, &filter, &Update::new().set("tags", tags))
            .unwrap();
        assert!(matched);
    }

    #[test]
    fn legacy_mixed_case_tags_are_removed() {
        let mut handle = SceneHandle::create_scene(&session()).unwrap();
        let item = handle.new_item().unwrap();
        seed_tags(&handle, item.id, serde_json::json!(["Ops", "OPS ", "infra"]));
        assert_eq!(
            handle.find_item(item.id).unwrap().unwrap().tags.to_vec(),
            vec!["infra".to_string(), "ops".to_string()]
        );

        let record = handle.remove_tag(item.id, "ops").unwrap();
        assert_eq!(record.tags.to_vec(), vec!["infra".to_string()]);

        let stored = handle
            .session()
            .store()
            .find_one(Collection::Items, &Filter::by_id(item.id))
            .unwrap()
            .unwrap();
        assert_eq!(stored["tags"], serde_json::json!(["infra"]));
    }

    #[test]
    fn legacy_mixed_case_tag_blocks_duplicate_add() {
        let mut handle = SceneHandle::create_scene(&session()).unwrap();
        let item = handle.new_item().unwrap();
        seed_tags(&handle, item.id, serde_json::json!(["Ops"]));
        let record = handle.add_tag(item.id, "OPS").unwrap();
        assert_eq!(record.tags.to_vec(), vec!["ops".to_string()]);
        assert!(handle.remove_tag(item.id, "absent").is_ok());
    }

    #[test]
    fn stale_handle_cannot_orphan_items() {
        let s = session();
        let mut first = SceneHandle::create_scene(&s).unwrap();
        let scene_id = first.scene_id().unwrap();
        first.new_item().unwrap();
        let mut stale = SceneHandle::open(&s, scene_id).unwrap().unwrap();

        first.delete().unwrap();

        assert!(matches!(
            stale.new_item(),
            Err(RadarError::InvalidScene(id)) if id == scene_id
        ));
        assert!(stale.scene().is_none());
        let orphans = s
            .store()
            .count(Collection::Items, &scene_items(scene_id))
            .unwrap();
        assert_eq!(orphans, 0);
        assert!(SceneHandle::open(&s, scene_id).unwrap().is_none());
    }

    #[test]
    fn stale_handle_item_write_reports_invalid_scene() {
        let s = session();
        let mut first = SceneHandle::create_scene(&s).unwrap();
        let scene_id = first.scene_id().unwrap();
        let item = first.new_item().unwrap();
        let mut stale = SceneHandle::open(&s, scene_id).unwrap().unwrap();

        first.delete().unwrap();

        assert!(matches!(
            stale.update_name(item.id, "late"),
            Err(RadarError::InvalidScene(id)) if id == scene_id
        ));
        assert!(matches!(stale.items(), Err(RadarError::InvalidScene(_))));
        assert!(matches!(stale.new_item(), Err(RadarError::NoSceneBound)));
    }
}
