//! Change notification bus.
//!
//! A typed publish/subscribe channel keyed by scene id. Delivery is
//! synchronous: every live subscriber has seen an event before `publish`
//! returns. Per-item subscribers for the changed item go first, then scene
//! subscribers, each group in subscription order.
//!
//! Subscribers are held weakly, so dropping a view unsubscribes it.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};

use crate::handle::ItemField;
use crate::item::{Item, ItemId};
use crate::projection::ItemIndex;
use crate::scene::SceneId;
use crate::views::Trackable;

/// A committed field write: which item, which field, and the re-read record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemChange {
    pub item_id: ItemId,
    pub field: ItemField,
    pub record: Item,
}

/// What scene subscribers are told about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SceneEvent {
    ItemChanged(ItemChange),
    ItemAdded(Item),
    ItemRemoved(ItemId),
    /// The cache was replaced wholesale by a bulk read.
    Resynced,
    SceneDeleted,
}

/// Aggregate consumers (filtered lists, editors). They get read access to
/// the already-updated cache with each event.
pub trait SceneObserver {
    fn on_scene_event(&mut self, event: &SceneEvent, items: &ItemIndex);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct ItemSubscriber {
    id: SubscriptionId,
    item_id: ItemId,
    view: Weak<RefCell<dyn Trackable>>,
}

struct SceneSubscriber {
    id: SubscriptionId,
    observer: Weak<RefCell<dyn SceneObserver>>,
}

#[derive(Default)]
struct Topic {
    items: Vec<ItemSubscriber>,
    scene: Vec<SceneSubscriber>,
}

impl Topic {
    fn prune(&mut self) {
        self.items.retain(|s| s.view.strong_count() > 0);
        self.scene.retain(|s| s.observer.strong_count() > 0);
    }
}

#[derive(Default)]
pub struct ChangeBus {
    topics: RefCell<HashMap<SceneId, Topic>>,
    next_id: Cell<u64>,
}

impl ChangeBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> SubscriptionId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        SubscriptionId(id)
    }

    /// Subscribe a live view to changes of one item.
    pub fn subscribe_item(
        &self,
        scene: SceneId,
        item_id: ItemId,
        view: Rc<RefCell<dyn Trackable>>,
    ) -> SubscriptionId {
        let id = self.next_id();
        self.topics
            .borrow_mut()
            .entry(scene)
            .or_default()
            .items
            .push(ItemSubscriber {
                id,
                item_id,
                view: Rc::downgrade(&view),
            });
        id
    }

    /// Subscribe an aggregate view to every event of a scene.
    pub fn subscribe_scene(
        &self,
        scene: SceneId,
        observer: Rc<RefCell<dyn SceneObserver>>,
    ) -> SubscriptionId {
        let id = self.next_id();
        self.topics
            .borrow_mut()
            .entry(scene)
            .or_default()
            .scene
            .push(SceneSubscriber {
                id,
                observer: Rc::downgrade(&observer),
            });
        id
    }

    pub fn unsubscribe(&self, scene: SceneId, id: SubscriptionId) -> bool {
        let mut topics = self.topics.borrow_mut();
        let Some(topic) = topics.get_mut(&scene) else {
            return false;
        };
        let before = topic.items.len() + topic.scene.len();
        topic.items.retain(|s| s.id != id);
        topic.scene.retain(|s| s.id != id);
        before != topic.items.len() + topic.scene.len()
    }

    /// Number of live subscribers for a scene.
    pub fn subscriber_count(&self, scene: SceneId) -> usize {
        let mut topics = self.topics.borrow_mut();
        match topics.get_mut(&scene) {
            Some(topic) => {
                topic.prune();
                topic.items.len() + topic.scene.len()
            }
            None => 0,
        }
    }

    /// Drop every subscription of a scene.
    pub fn close_scene(&self, scene: SceneId) {
        self.topics.borrow_mut().remove(&scene);
    }

    /// Deliver a committed field change to the item's views, then to the
    /// scene's aggregate subscribers.
    pub fn publish_change(
        &self,
        scene: SceneId,
        change: ItemChange,
        items: &ItemIndex,
    ) -> Delivery {
        let views: Vec<_> = {
            let mut topics = self.topics.borrow_mut();
            match topics.get_mut(&scene) {
                Some(topic) => {
                    topic.prune();
                    topic
                        .items
                        .iter()
                        .filter(|s| s.item_id == change.item_id)
                        .filter_map(|s| s.view.upgrade().map(|view| (s.id, view)))
                        .collect()
                }
                None => Vec::new(),
            }
        };
        let mut delivery = Delivery::default();
        for (id, view) in views {
            match view.try_borrow_mut() {
                Ok(mut view) => {
                    view.reconcile(&change);
                    delivery.delivered += 1;
                }
                Err(_) => {
                    tracing::warn!(
                        "View for item {} is busy, skipping {:?} change",
                        change.item_id,
                        change.field
                    );
                    delivery.skipped.push(id);
                }
            }
        }
        delivery.merge(self.publish(scene, &SceneEvent::ItemChanged(change), items));
        delivery
    }

    /// Deliver an event to the scene's aggregate subscribers.
    pub fn publish(&self, scene: SceneId, event: &SceneEvent, items: &ItemIndex) -> Delivery {
        // Snapshot the subscriber list so observers may (un)subscribe while
        // handling the event; such changes apply from the next event on.
        let observers: Vec<_> = {
            let mut topics = self.topics.borrow_mut();
            match topics.get_mut(&scene) {
                Some(topic) => {
                    topic.prune();
                    topic
                        .scene
                        .iter()
                        .filter_map(|s| s.observer.upgrade().map(|observer| (s.id, observer)))
                        .collect()
                }
                None => Vec::new(),
            }
        };
        let mut delivery = Delivery::default();
        for (id, observer) in observers {
            match observer.try_borrow_mut() {
                Ok(mut observer) => {
                    observer.on_scene_event(event, items);
                    delivery.delivered += 1;
                }
                Err(_) => {
                    tracing::warn!("Scene observer {:?} is busy, skipping event", id);
                    delivery.skipped.push(id);
                }
            }
        }
        delivery
    }
}

/// Outcome of one publish.
///
/// A subscriber whose cell is already borrowed (it is mid-callback further
/// up the stack) cannot take the event; it is listed in `skipped` and the
/// host must resync it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub skipped: Vec<SubscriptionId>,
}

impl Delivery {
    /// True when every live subscriber saw the event.
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }

    fn merge(&mut self, other: Delivery) {
        self.delivered += other.delivered;
        self.skipped.extend(other.skipped);
    }
}
