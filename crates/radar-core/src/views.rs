//! Live view registry.
//!
//! Canvas markers and similar per-item views implement [`Trackable`]. The
//! registry maps item ids to those views, subscribes each one on the bus and
//! keeps the optimistic move cache: while a marker is dragged its position
//! lives only in the view, and one position write is issued when the drag
//! ends.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::bus::{ChangeBus, ItemChange, SceneEvent, SceneObserver, SubscriptionId};
use crate::error::{RadarError, Result};
use crate::handle::{FieldChange, ItemField};
use crate::item::{Colour, Item, ItemId, Position};
use crate::projection::{ItemIndex, ItemProjection};
use crate::scene::SceneId;

/// A view bound to one item that mirrors its position and colour.
pub trait Trackable {
    fn id(&self) -> ItemId;

    fn position(&self) -> Position;

    fn set_position(&mut self, position: Position);

    fn set_colour(&mut self, colour: Colour);

    /// Bring the view in line with a committed change. Never writes back.
    fn reconcile(&mut self, change: &ItemChange) {
        match change.field {
            ItemField::Colour => self.set_colour(change.record.colour),
            ItemField::Position => self.set_position(change.record.position),
            _ => {}
        }
    }
}

struct Entry {
    view: Rc<RefCell<dyn Trackable>>,
    subscription: SubscriptionId,
    move_origin: Option<Position>,
}

/// Item id to live view, for one open scene.
pub struct ViewRegistry {
    scene_id: SceneId,
    bus: Rc<ChangeBus>,
    views: HashMap<ItemId, Entry>,
}

impl ViewRegistry {
    pub fn new(scene_id: SceneId, bus: Rc<ChangeBus>) -> Self {
        Self {
            scene_id,
            bus,
            views: HashMap::new(),
        }
    }

    pub fn for_projection(projection: &ItemProjection) -> Self {
        Self::new(projection.scene_id(), Rc::clone(projection.bus()))
    }

    pub fn scene_id(&self) -> SceneId {
        self.scene_id
    }

    /// Register a view under its item id, replacing any previous view for
    /// that item.
    pub fn register(&mut self, view: Rc<RefCell<dyn Trackable>>) {
        let id = view.borrow().id();
        let subscription = self.bus.subscribe_item(self.scene_id, id, Rc::clone(&view));
        let entry = Entry {
            view,
            subscription,
            move_origin: None,
        };
        if let Some(old) = self.views.insert(id, entry) {
            self.bus.unsubscribe(self.scene_id, old.subscription);
        }
    }

    pub fn unregister(&mut self, id: ItemId) -> Option<Rc<RefCell<dyn Trackable>>> {
        let entry = self.views.remove(&id)?;
        self.bus.unsubscribe(self.scene_id, entry.subscription);
        Some(entry.view)
    }

    pub fn get(&self, id: ItemId) -> Option<Rc<RefCell<dyn Trackable>>> {
        self.views.get(&id).map(|e| Rc::clone(&e.view))
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.views.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.views.keys().copied()
    }

    /// Snapshot the view's position at the start of a drag.
    pub fn begin_move(&mut self, id: ItemId) -> Result<()> {
        let entry = self.views.get_mut(&id).ok_or(RadarError::NotFound(id))?;
        let origin = entry.view.borrow().position();
        entry.move_origin = Some(origin);
        Ok(())
    }

    pub fn is_moving(&self, id: ItemId) -> bool {
        self.views
            .get(&id)
            .is_some_and(|e| e.move_origin.is_some())
    }

    /// Abandon a drag and put the view back where it started.
    pub fn cancel_move(&mut self, id: ItemId) {
        if let Some(entry) = self.views.get_mut(&id) {
            if let Some(origin) = entry.move_origin.take() {
                entry.view.borrow_mut().set_position(origin);
            }
        }
    }

    /// Finish a drag. Writes the view's position once if it moved, and
    /// returns the re-read record; `None` if nothing was written.
    pub fn end_move(&mut self, id: ItemId, projection: &mut ItemProjection) -> Result<Option<Item>> {
        let entry = self.views.get_mut(&id).ok_or(RadarError::NotFound(id))?;
        let Some(origin) = entry.move_origin.take() else {
            return Ok(None);
        };
        let position = entry.view.borrow().position();
        if position == origin {
            return Ok(None);
        }
        projection
            .apply_field_change(id, FieldChange::Position(position))
            .map(Some)
    }

    /// Push cached records into every registered view, for use after a sync.
    /// Returns the ids of views that were busy and left untouched.
    pub fn refresh(&self, items: &ItemIndex) -> Vec<ItemId> {
        let mut busy = Vec::new();
        for (id, entry) in &self.views {
            let Some(item) = items.get(*id) else {
                tracing::warn!("View registered for uncached item {}", id);
                continue;
            };
            match entry.view.try_borrow_mut() {
                Ok(mut view) => {
                    view.set_position(item.position);
                    view.set_colour(item.colour);
                }
                Err(_) => {
                    tracing::warn!("View for item {} is busy, skipping refresh", id);
                    busy.push(*id);
                }
            }
        }
        busy
    }

    pub fn clear(&mut self) {
        for (_, entry) in self.views.drain() {
            self.bus.unsubscribe(self.scene_id, entry.subscription);
        }
    }
}

impl Drop for ViewRegistry {
    fn drop(&mut self) {
        self.clear();
    }
}

/// Attribute editor panel state: the selected item's current record.
#[derive(Debug, Clone, Default)]
pub struct ItemEditor {
    selected: Option<ItemId>,
    record: Option<Item>,
}

impl ItemEditor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(&mut self, id: Option<ItemId>, items: &ItemIndex) {
        self.selected = id;
        self.record = id.and_then(|id| items.get(id)).cloned();
    }

    pub fn selected(&self) -> Option<ItemId> {
        self.selected
    }

    pub fn record(&self) -> Option<&Item> {
        self.record.as_ref()
    }
}

impl SceneObserver for ItemEditor {
    fn on_scene_event(&mut self, event: &SceneEvent, items: &ItemIndex) {
        let Some(selected) = self.selected else {
            return;
        };
        match event {
            SceneEvent::ItemChanged(change) if change.item_id == selected => {
                self.record = Some(change.record.clone());
            }
            SceneEvent::ItemRemoved(id) if *id == selected => {
                self.selected = None;
                self.record = None;
            }
            SceneEvent::SceneDeleted => {
                self.selected = None;
                self.record = None;
            }
            SceneEvent::Resynced => {
                self.record = items.get(selected).cloned();
                if self.record.is_none() {
                    self.selected = None;
                }
            }
            _ => {}
        }
    }
}
