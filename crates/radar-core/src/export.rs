//! JSON export of a scene and its items.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::item::Item;
use crate::scene::Scene;

/// A scene with every item it held at read time.
///
/// The two reads are not isolated, so a concurrent writer can leave the
/// snapshot torn across its update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportSnapshot {
    pub scene: Scene,
    pub items: Vec<Item>,
}

impl ExportSnapshot {
    /// Pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_json()?)?;
        tracing::info!(
            "Exported scene {} ({} item(s)) to {}",
            self.scene.id,
            self.items.len(),
            path.display()
        );
        Ok(())
    }

    pub fn read_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }
}
