//! Per-scene item projection cache.
//!
//! The cache is the only mutable local copy of scene data. Every write it
//! performs goes through the scene handle and the cached record is then
//! replaced by the handle's re-read, so the cache never holds a value the
//! store did not return.

use std::collections::HashMap;
use std::rc::Rc;

use crate::bus::{ChangeBus, Delivery, ItemChange, SceneEvent};
use crate::error::{RadarError, Result};
use crate::handle::{FieldChange, SceneHandle};
use crate::item::{Item, ItemId};
use crate::scene::SceneId;
use crate::tags::TagSet;

/// Items in insertion order with an id index.
#[derive(Debug, Clone, Default)]
pub struct ItemIndex {
    items: Vec<Item>,
    positions: HashMap<ItemId, usize>,
}

impl ItemIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_items(items: Vec<Item>) -> Self {
        let mut index = Self::new();
        for item in items {
            index.upsert(item);
        }
        index
    }

    pub fn get(&self, id: ItemId) -> Option<&Item> {
        self.positions.get(&id).map(|&i| &self.items[i])
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.positions.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Item> {
        self.items.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.items.iter().map(|i| i.id)
    }

    /// Replace the record in its slot, or append it. Returns `true` when
    /// the record was new.
    pub fn upsert(&mut self, item: Item) -> bool {
        match self.positions.get(&item.id) {
            Some(&i) => {
                self.items[i] = item;
                false
            }
            None => {
                self.positions.insert(item.id, self.items.len());
                self.items.push(item);
                true
            }
        }
    }

    pub fn remove(&mut self, id: ItemId) -> Option<Item> {
        let i = self.positions.remove(&id)?;
        let item = self.items.remove(i);
        for (pos, later) in self.items.iter().enumerate().skip(i) {
            self.positions.insert(later.id, pos);
        }
        Some(item)
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.positions.clear();
    }

    /// Union of the cached items' tags.
    pub fn all_tags(&self) -> TagSet {
        let mut tags = TagSet::new();
        for item in &self.items {
            tags.extend(item.tags.to_vec());
        }
        tags
    }
}

impl<'a> IntoIterator for &'a ItemIndex {
    type Item = &'a Item;
    type IntoIter = std::slice::Iter<'a, Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// The cache for one open scene, publishing on the shared bus.
pub struct ItemProjection {
    scene_id: SceneId,
    handle: SceneHandle,
    items: ItemIndex,
    bus: Rc<ChangeBus>,
    last_delivery: Delivery,
}

impl ItemProjection {
    /// Open a cache over a bound handle and load it.
    pub fn open(handle: SceneHandle, bus: Rc<ChangeBus>) -> Result<Self> {
        let scene_id = handle.scene_id().ok_or(RadarError::NoSceneBound)?;
        let mut projection = Self {
            scene_id,
            handle,
            items: ItemIndex::new(),
            bus,
            last_delivery: Delivery::default(),
        };
        projection.sync()?;
        Ok(projection)
    }

    pub fn scene_id(&self) -> SceneId {
        self.scene_id
    }

    pub fn handle(&self) -> &SceneHandle {
        &self.handle
    }

    /// Scene-level operations (rename, subscriptions). Item writes should go
    /// through [`apply_field_change`](Self::apply_field_change) so the cache
    /// and subscribers see them.
    pub fn handle_mut(&mut self) -> &mut SceneHandle {
        &mut self.handle
    }

    pub fn bus(&self) -> &Rc<ChangeBus> {
        &self.bus
    }

    pub fn items(&self) -> &ItemIndex {
        &self.items
    }

    /// Fan-out report of the most recent publish. Subscribers listed as
    /// skipped missed that event and need a resync.
    pub fn last_delivery(&self) -> &Delivery {
        &self.last_delivery
    }

    pub fn get(&self, id: ItemId) -> Option<&Item> {
        self.items.get(id)
    }

    /// Replace the whole cache with a fresh bulk read.
    pub fn sync(&mut self) -> Result<()> {
        let items = self.handle.items()?;
        tracing::debug!("Synced scene {} ({} item(s))", self.scene_id, items.len());
        self.items = ItemIndex::from_items(items);
        self.last_delivery = self
            .bus
            .publish(self.scene_id, &SceneEvent::Resynced, &self.items);
        Ok(())
    }

    /// Write one field through the handle, cache the re-read record and fan
    /// the change out. Subscribers have all seen it when this returns.
    pub fn apply_field_change(&mut self, id: ItemId, change: FieldChange) -> Result<Item> {
        let record = self.handle.apply(id, &change)?;
        if self.items.upsert(record.clone()) {
            tracing::warn!("Item {} was not cached before {:?}", id, change.field());
        }
        let event = ItemChange {
            item_id: id,
            field: change.field(),
            record: record.clone(),
        };
        self.last_delivery = self.bus.publish_change(self.scene_id, event, &self.items);
        Ok(record)
    }

    /// Append an item created through the handle.
    pub fn add(&mut self, item: Item) {
        if self.items.upsert(item.clone()) {
            self.last_delivery =
                self.bus
                    .publish(self.scene_id, &SceneEvent::ItemAdded(item), &self.items);
        }
    }

    pub fn create_item(&mut self) -> Result<Item> {
        let item = self.handle.new_item()?;
        self.add(item.clone());
        Ok(item)
    }

    pub fn create_item_at(&mut self, x: f64, y: f64) -> Result<Item> {
        let item = self.handle.new_item_at(x, y)?;
        self.add(item.clone());
        Ok(item)
    }

    pub fn delete_item(&mut self, id: ItemId) -> Result<()> {
        self.handle.delete_item(id)?;
        if self.items.remove(id).is_some() {
            self.last_delivery =
                self.bus
                    .publish(self.scene_id, &SceneEvent::ItemRemoved(id), &self.items);
        }
        Ok(())
    }

    /// Cascade-delete the scene and empty the cache.
    pub fn delete_scene(&mut self) -> Result<()> {
        self.handle.delete()?;
        self.items.clear();
        self.last_delivery = self
            .bus
            .publish(self.scene_id, &SceneEvent::SceneDeleted, &self.items);
        Ok(())
    }
}
