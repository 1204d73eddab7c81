//! Configuration for radar-core
//!
//! Who the current user is, what new scenes and items look like, and which
//! document store backs them.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use radar_store::{DocumentStore, MemoryStore};
use serde::{Deserialize, Serialize};

use crate::error::RadarError;
use crate::item::Colour;

/// System-wide configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadarConfig {
    /// Name recorded on comments, locks and created records.
    /// Falls back to the login name when unset.
    pub user: Option<String>,
    /// Defaults for new records
    pub templates: TemplateConfig,
    /// Document store selection
    pub store: StoreConfig,
}

/// Record templates
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateConfig {
    pub scene: SceneTemplate,
    pub item: ItemTemplate,
}

/// Defaults for a freshly created scene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneTemplate {
    pub name: String,
    pub description: String,
}

impl Default for SceneTemplate {
    fn default() -> Self {
        Self {
            name: "Untitled".to_string(),
            description: String::new(),
        }
    }
}

/// Defaults for a freshly created item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemTemplate {
    pub name: String,
    pub colour: Colour,
}

impl Default for ItemTemplate {
    fn default() -> Self {
        Self {
            name: "New".to_string(),
            colour: Colour::WHITE,
        }
    }
}

/// Which document store to open
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StoreConfig {
    /// Process-local store, lost on exit
    #[default]
    Memory,
    /// SQLite file; defaults to `<data dir>/item-radar/radar.db`
    Sqlite { path: Option<PathBuf> },
}

impl StoreConfig {
    /// Default location of the SQLite database
    pub fn default_database_path() -> Option<PathBuf> {
        dirs::data_dir().map(|dir| dir.join("item-radar").join("radar.db"))
    }

    /// Open the configured store. Called once at startup; the handle is then
    /// passed to every scene session.
    pub fn open(&self) -> Result<Arc<dyn DocumentStore>, RadarError> {
        match self {
            StoreConfig::Memory => Ok(Arc::new(MemoryStore::new())),
            #[cfg(feature = "sqlite")]
            StoreConfig::Sqlite { path } => {
                let path = path
                    .clone()
                    .or_else(Self::default_database_path)
                    .ok_or_else(|| {
                        RadarError::StoreUnavailable("no data directory for database".to_string())
                    })?;
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                Ok(Arc::new(radar_store::SqliteDocumentStore::open(&path)?))
            }
            #[cfg(not(feature = "sqlite"))]
            StoreConfig::Sqlite { .. } => Err(RadarError::StoreUnavailable(
                "sqlite backend not compiled in (enable the `sqlite` feature)".to_string(),
            )),
        }
    }
}

impl RadarConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Serialize configuration to TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load configuration from a JSON string
    pub fn from_json(json_str: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json_str).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Serialize configuration to JSON
    pub fn to_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load and validate a configuration file. `.json` files are read as
    /// JSON, everything else as TOML.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        let config = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&text)?,
            _ => Self::from_toml(&text)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// The effective current user
    pub fn current_user(&self) -> String {
        self.user
            .clone()
            .filter(|u| !u.trim().is_empty())
            .or_else(|| std::env::var("USER").ok())
            .or_else(|| std::env::var("USERNAME").ok())
            .unwrap_or_else(|| "unknown".to_string())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(user) = &self.user {
            if user.trim().is_empty() {
                return Err(ConfigError::InvalidValue("user must not be blank".to_string()));
            }
        }
        if self.templates.item.name.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "templates.item.name must not be blank".to_string(),
            ));
        }
        if self.templates.scene.name.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "templates.scene.name must not be blank".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration loading or validation error
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Config parse error: {0}")]
    Parse(String),

    #[error("Config IO error: {0}")]
    Io(String),

    #[error("Invalid config value: {0}")]
    InvalidValue(String),
}
