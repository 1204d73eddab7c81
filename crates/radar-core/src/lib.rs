//! Scene and item synchronization for item radar.
//!
//! A [`SceneHandle`] talks to the document store; an [`ItemProjection`]
//! caches one scene's items and publishes every committed write on a
//! [`ChangeBus`]. Views ([`Trackable`] markers, [`FilteredItemList`],
//! [`ItemEditor`]) subscribe to the bus and never touch the store themselves.

pub mod bus;
pub mod config;
pub mod derived;
pub mod error;
pub mod export;
pub mod filter;
pub mod handle;
pub mod item;
pub mod projection;
pub mod scene;
pub mod session;
pub mod tags;
pub mod views;

mod record;

pub use bus::{ChangeBus, Delivery, ItemChange, SceneEvent, SceneObserver, SubscriptionId};
pub use config::{
    ConfigError, ItemTemplate, RadarConfig, SceneTemplate, StoreConfig, TemplateConfig,
};
pub use derived::{distance, zone, Zone};
pub use error::{RadarError, Result};
pub use export::ExportSnapshot;
pub use filter::{FilteredItemList, ItemFilter, SortDescriptor, SortKey};
pub use handle::{FieldChange, ItemField, SceneHandle};
pub use item::{Colour, Comment, Item, ItemId, Position};
pub use projection::{ItemIndex, ItemProjection};
pub use scene::{Scene, SceneId};
pub use session::Session;
pub use tags::{normalize_tag, TagSet};
pub use views::{ItemEditor, Trackable, ViewRegistry};
