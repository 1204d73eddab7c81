use chrono::{DateTime, Utc};
use radar_store::Document;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::ItemTemplate;
use crate::derived::{self, Zone};
use crate::error::Result;
use crate::record;
use crate::scene::SceneId;
use crate::tags::TagSet;

/// Item identifier (UUID v4, stored as its string form in `_id`).
pub type ItemId = Uuid;

/// Position on the radar plane, origin at the centre. Stored as `[x, y]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub const ORIGIN: Position = Position { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self) -> f64 {
        derived::distance(self.x, self.y)
    }

    pub fn zone(&self) -> Zone {
        Zone::of(self.x, self.y)
    }
}

impl From<[f64; 2]> for Position {
    fn from([x, y]: [f64; 2]) -> Self {
        Self { x, y }
    }
}

impl From<Position> for [f64; 2] {
    fn from(p: Position) -> Self {
        [p.x, p.y]
    }
}

/// RGB marker colour. Stored as `[r, g, b]`.
///
/// Reading also accepts the legacy `[r, g, b, a]` form and drops the alpha.
/// Non-integral or out-of-range components are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "[u8; 3]")]
pub struct Colour {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Colour {
    pub const WHITE: Colour = Colour::new(255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl TryFrom<Vec<f64>> for Colour {
    type Error = String;

    fn try_from(components: Vec<f64>) -> std::result::Result<Self, Self::Error> {
        if components.len() != 3 && components.len() != 4 {
            return Err(format!(
                "colour needs 3 or 4 components, got {}",
                components.len()
            ));
        }
        let mut rgb = [0u8; 3];
        for (slot, value) in rgb.iter_mut().zip(&components) {
            if value.fract() != 0.0 || !(0.0..=255.0).contains(value) {
                return Err(format!("colour component {} outside 0..=255", value));
            }
            *slot = *value as u8;
        }
        Ok(Colour::new(rgb[0], rgb[1], rgb[2]))
    }
}

impl From<Colour> for [u8; 3] {
    fn from(c: Colour) -> Self {
        [c.r, c.g, c.b]
    }
}

/// One entry in an item's append-only comment history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub date: DateTime<Utc>,
    pub user: String,
    pub text: String,
}

/// A positioned, coloured, tagged marker belonging to one scene.
///
/// Field names follow the `items` collection wire contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    #[serde(rename = "_id")]
    pub id: ItemId,
    pub scene_id: SceneId,
    pub name: String,
    #[serde(rename = "pos")]
    pub position: Position,
    /// Always `position.distance()`; rewritten with every position write.
    #[serde(default = "missing_distance")]
    pub distance: f64,
    pub colour: Colour,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub comments: Vec<Comment>,
    #[serde(default)]
    pub tags: TagSet,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub locked_by: Option<String>,
    pub created_on: DateTime<Utc>,
    pub created_by: String,
}

fn missing_distance() -> f64 {
    f64::NAN
}

impl Item {
    /// A new record from the template, at `position`.
    pub fn from_template(
        scene_id: SceneId,
        template: &ItemTemplate,
        position: Position,
        created_by: &str,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            scene_id,
            name: template.name.clone(),
            position,
            distance: position.distance(),
            colour: template.colour,
            link: String::new(),
            description: String::new(),
            comments: Vec::new(),
            tags: TagSet::new(),
            locked: false,
            locked_by: None,
            created_on: Utc::now(),
            created_by: created_by.to_string(),
        }
    }

    pub fn zone(&self) -> Zone {
        self.position.zone()
    }

    pub fn to_document(&self) -> Result<Document> {
        record::to_document(self)
    }

    /// Decode a stored item. Documents written before distance was persisted
    /// get it computed from their position, and the lock flag is derived
    /// from `locked_by`.
    pub fn from_document(doc: Document) -> Result<Self> {
        let mut item: Item = record::from_document(doc)?;
        if item.distance.is_nan() {
            item.distance = item.position.distance();
        }
        record::normalize_lock(&mut item.locked, &mut item.locked_by);
        Ok(item)
    }
}
