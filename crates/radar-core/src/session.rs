use std::sync::Arc;

use radar_store::{Collection, DocumentStore, Filter};

use crate::config::{RadarConfig, TemplateConfig};
use crate::error::Result;
use crate::scene::{Scene, SceneId};

/// Everything a scene handle needs from the outside world: the store
/// connection, the acting user and the record templates.
///
/// Built once at startup and cloned into each handle. The caller owns the
/// store's lifecycle.
#[derive(Clone)]
pub struct Session {
    store: Arc<dyn DocumentStore>,
    user: String,
    templates: TemplateConfig,
}

impl Session {
    pub fn new(store: Arc<dyn DocumentStore>, user: impl Into<String>) -> Self {
        Self {
            store,
            user: user.into(),
            templates: TemplateConfig::default(),
        }
    }

    /// Open the configured store and take user and templates from `config`.
    pub fn from_config(config: &RadarConfig) -> Result<Self> {
        let store = config.store.open()?;
        Ok(Self::with_store(store, config))
    }

    /// Use an already-open store with the user and templates from `config`.
    pub fn with_store(store: Arc<dyn DocumentStore>, config: &RadarConfig) -> Self {
        Self {
            store,
            user: config.current_user(),
            templates: config.templates.clone(),
        }
    }

    pub fn with_templates(mut self, templates: TemplateConfig) -> Self {
        self.templates = templates;
        self
    }

    pub fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn templates(&self) -> &TemplateConfig {
        &self.templates
    }

    /// Every persisted scene, in creation order.
    pub fn list_scenes(&self) -> Result<Vec<Scene>> {
        self.store
            .find(Collection::Scenes, &Filter::new())?
            .into_iter()
            .map(Scene::from_document)
            .collect()
    }

    pub fn find_scene(&self, id: SceneId) -> Result<Option<Scene>> {
        self.store
            .find_one(Collection::Scenes, &Filter::by_id(id))?
            .map(Scene::from_document)
            .transpose()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("user", &self.user)
            .field("templates", &self.templates)
            .finish_non_exhaustive()
    }
}
