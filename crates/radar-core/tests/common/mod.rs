//! Shared fixtures for radar-core integration tests

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use radar_core::{
    ChangeBus, Colour, Item, ItemId, ItemIndex, ItemProjection, Position, SceneEvent,
    SceneHandle, SceneObserver, Session, Trackable,
};
use radar_store::MemoryStore;

pub const USER: &str = "dmoulder";

/// A session over a fresh in-memory store, plus the store for fault injection.
pub fn memory_session() -> (Session, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    (Session::new(store.clone(), USER), store)
}

/// A new scene opened through a projection on its own bus.
#[allow(dead_code)]
pub fn open_scene(session: &Session) -> ItemProjection {
    let handle = SceneHandle::create_scene(session).expect("create scene");
    ItemProjection::open(handle, Rc::new(ChangeBus::new())).expect("open projection")
}

/// Canvas marker stand-in that counts what it was told.
#[allow(dead_code)]
pub struct Marker {
    pub id: ItemId,
    pub position: Position,
    pub colour: Colour,
    pub colour_updates: usize,
}

#[allow(dead_code)]
impl Marker {
    pub fn for_item(item: &Item) -> Rc<RefCell<Marker>> {
        Rc::new(RefCell::new(Marker {
            id: item.id,
            position: item.position,
            colour: item.colour,
            colour_updates: 0,
        }))
    }
}

impl Trackable for Marker {
    fn id(&self) -> ItemId {
        self.id
    }

    fn position(&self) -> Position {
        self.position
    }

    fn set_position(&mut self, position: Position) {
        self.position = position;
    }

    fn set_colour(&mut self, colour: Colour) {
        self.colour = colour;
        self.colour_updates += 1;
    }
}

/// Scene observer that records every event and the cache size it saw.
#[allow(dead_code)]
#[derive(Default)]
pub struct EventLog {
    pub events: Vec<SceneEvent>,
    pub cache_sizes: Vec<usize>,
}

impl SceneObserver for EventLog {
    fn on_scene_event(&mut self, event: &SceneEvent, items: &ItemIndex) {
        self.events.push(event.clone());
        self.cache_sizes.push(items.len());
    }
}
