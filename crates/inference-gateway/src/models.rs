//! Model records and the repository the dispatcher resolves them from

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A model known to the gateway
///
/// `engine` names exactly one engine in the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRecord {
    pub id: String,
    pub engine: String,
    /// Weights on disk (local engine only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_path: Option<PathBuf>,
    /// Engine-specific load settings, forwarded as-is
    #[serde(default)]
    pub settings: Map<String, Value>,
    /// Chat template with `{system_message}` and `{prompt}` markers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_template: Option<String>,
}

impl ModelRecord {
    pub fn new(id: impl Into<String>, engine: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            engine: engine.into(),
            model_path: None,
            settings: Map::new(),
            prompt_template: None,
        }
    }

    pub fn with_model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.model_path = Some(path.into());
        self
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: Value) -> Self {
        self.settings.insert(key.into(), value);
        self
    }

    pub fn with_prompt_template(mut self, template: impl Into<String>) -> Self {
        self.prompt_template = Some(template.into());
        self
    }
}

/// Lookup of model records by id
#[async_trait]
pub trait ModelRepository: Send + Sync {
    async fn find_one(&self, id: &str) -> Option<ModelRecord>;

    async fn find_all(&self) -> Vec<ModelRecord>;
}

/// Repository backed by a map
#[derive(Default)]
pub struct InMemoryModelRepository {
    models: RwLock<HashMap<String, ModelRecord>>,
}

impl InMemoryModelRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_models(models: impl IntoIterator<Item = ModelRecord>) -> Self {
        let repository = Self::new();
        for model in models {
            repository.insert(model);
        }
        repository
    }

    pub fn insert(&self, model: ModelRecord) {
        self.models.write().insert(model.id.clone(), model);
    }

    pub fn remove(&self, id: &str) -> Option<ModelRecord> {
        self.models.write().remove(id)
    }
}

#[async_trait]
impl ModelRepository for InMemoryModelRepository {
    async fn find_one(&self, id: &str) -> Option<ModelRecord> {
        self.models.read().get(id).cloned()
    }

    async fn find_all(&self) -> Vec<ModelRecord> {
        let mut models: Vec<_> = self.models.read().values().cloned().collect();
        models.sort_by(|a, b| a.id.cmp(&b.id));
        models
    }
}
