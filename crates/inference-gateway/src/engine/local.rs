//! Local engine capability
//!
//! Wraps the [`LocalEngineSupervisor`] and talks to the subprocess over its
//! loopback HTTP API. Chat goes through the same [`RemoteAdapter`] as the
//! hosted providers, with the OpenAI translator.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde_json::{json, Map, Value};

use super::{EngineCapability, EngineDescriptor, EngineError, EngineStatus};
use crate::adapter::RemoteAdapter;
use crate::constants::{endpoints, engine_names};
use crate::context::GatewayContext;
use crate::models::ModelRecord;
use crate::supervisor::{LocalEngineSupervisor, SubprocessState};
use crate::translate::OpenAiTranslator;
use crate::types::{ChatRequest, EmbeddingRequest, InferenceOutput, StreamMode};

const SYSTEM_MARKER: &str = "{system_message}";
const PROMPT_MARKER: &str = "{prompt}";

/// Prompt pieces the engine wraps around a conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptParts {
    pub system_prompt: Option<String>,
    pub user_prompt: String,
    pub ai_prompt: String,
}

/// Split a chat template on its `{system_message}` and `{prompt}` markers
///
/// Everything before `{system_message}` is the system prompt, the text
/// between the markers is the user prompt and the rest is the AI prompt.
/// Templates without `{prompt}` cannot be split.
pub fn split_prompt_template(template: &str) -> Result<PromptParts, EngineError> {
    let Some(prompt_at) = template.find(PROMPT_MARKER) else {
        return Err(EngineError::Config(
            "Cannot split prompt template".to_string(),
        ));
    };
    let ai_prompt = template[prompt_at + PROMPT_MARKER.len()..].to_string();

    match template.find(SYSTEM_MARKER) {
        Some(system_at) => {
            let user_start = system_at + SYSTEM_MARKER.len();
            Ok(PromptParts {
                system_prompt: Some(template[..system_at].to_string()),
                user_prompt: template.get(user_start..prompt_at).unwrap_or_default().to_string(),
                ai_prompt,
            })
        }
        None => Ok(PromptParts {
            system_prompt: None,
            user_prompt: template[..prompt_at].to_string(),
            ai_prompt,
        }),
    }
}

/// The native inference engine running as a supervised subprocess
pub struct LocalEngine {
    supervisor: LocalEngineSupervisor,
    adapter: RemoteAdapter,
}

impl LocalEngine {
    pub fn new(ctx: &GatewayContext) -> Self {
        Self {
            supervisor: LocalEngineSupervisor::new(
                ctx.config.local.clone(),
                ctx.spawner.clone(),
                ctx.http.clone(),
            ),
            adapter: RemoteAdapter::new(ctx.http.clone()),
        }
    }

    pub fn supervisor(&self) -> &LocalEngineSupervisor {
        &self.supervisor
    }

    /// Start the subprocess if it is not already running
    pub async fn start(&self) -> Result<(), EngineError> {
        self.supervisor.start().await
    }

    pub async fn stop(&self) {
        self.supervisor.stop().await
    }

    pub fn status(&self) -> EngineStatus {
        if self.supervisor.resolve_binary().is_some() {
            EngineStatus::Ready
        } else {
            EngineStatus::NotInitialized
        }
    }

    /// Models currently loaded in the engine
    pub async fn models(&self) -> Result<Value, EngineError> {
        self.ensure_running()?;
        self.adapter.get_json(&self.url(endpoints::MODELS)).await
    }

    /// Body of a load request: model settings plus the resolved paths
    pub fn load_settings(model: &ModelRecord) -> Result<Map<String, Value>, EngineError> {
        let mut settings = Map::new();
        settings.insert("cpu_threads".into(), json!(1));
        settings.extend(model.settings.clone());
        settings.insert("model".into(), json!(model.id));
        if let Some(path) = &model.model_path {
            settings.insert("llama_model_path".into(), json!(path.display().to_string()));

            // Projector files live beside the weights
            let mmproj = model.settings.get("mmproj").and_then(|m| m.as_str());
            if let (Some(mmproj), Some(folder)) = (mmproj, path.parent()) {
                settings.insert("mmproj".into(), json!(folder.join(mmproj).display().to_string()));
            }
        }

        let template = model.prompt_template.as_deref().or_else(|| {
            model.settings.get("prompt_template").and_then(|t| t.as_str())
        });
        if let Some(template) = template {
            let parts = split_prompt_template(template)?;
            if let Some(system_prompt) = parts.system_prompt {
                settings.insert("system_prompt".into(), json!(system_prompt));
            }
            settings.insert("user_prompt".into(), json!(parts.user_prompt));
            settings.insert("ai_prompt".into(), json!(parts.ai_prompt));
        }

        Ok(settings)
    }

    fn url(&self, path: &str) -> String {
        self.supervisor.config().url(path)
    }

    fn ensure_running(&self) -> Result<(), EngineError> {
        match self.supervisor.state() {
            SubprocessState::Running => Ok(()),
            state => Err(EngineError::NotRunning(format!(
                "local engine is {:?}",
                state
            ))),
        }
    }
}

#[async_trait]
impl EngineCapability for LocalEngine {
    fn name(&self) -> &str {
        engine_names::LOCAL
    }

    fn descriptor(&self) -> EngineDescriptor {
        EngineDescriptor {
            name: engine_names::LOCAL.to_string(),
            product_name: Some("Local Inference Engine".to_string()),
            description: Some("Native inference engine running as a local subprocess".to_string()),
            version: Some(env!("CARGO_PKG_VERSION").to_string()),
            status: self.status(),
        }
    }

    async fn on_load(&self) {}

    async fn on_unload(&self) {
        self.supervisor.stop().await;
    }

    /// Starts the subprocess first if needed, then loads the model into it
    async fn load_model(&self, model: &ModelRecord) -> Result<(), EngineError> {
        let settings = Self::load_settings(model)?;
        self.supervisor.start().await?;
        log::info!("Loading model {} into local engine", model.id);
        self.adapter
            .post_json(&self.url(endpoints::LOAD_MODEL), HeaderMap::new(), &settings)
            .await?;
        Ok(())
    }

    async fn unload_model(&self, model_id: &str) -> Result<(), EngineError> {
        self.ensure_running()?;
        log::info!("Unloading model {} from local engine", model_id);
        self.adapter
            .post_json(
                &self.url(endpoints::UNLOAD_MODEL),
                HeaderMap::new(),
                &json!({ "model": model_id }),
            )
            .await?;
        Ok(())
    }

    async fn inference(
        &self,
        request: &ChatRequest,
        headers: &HeaderMap,
        mode: StreamMode,
    ) -> Result<InferenceOutput, EngineError> {
        self.ensure_running()?;
        self.adapter
            .send(
                &self.url(endpoints::CHAT_COMPLETION),
                RemoteAdapter::forwarded_headers(headers),
                request,
                Arc::new(OpenAiTranslator),
                mode,
            )
            .await
    }

    async fn embeddings(
        &self,
        request: &EmbeddingRequest,
        headers: &HeaderMap,
    ) -> Result<Value, EngineError> {
        self.ensure_running()?;
        self.adapter
            .post_json(
                &self.url(endpoints::EMBEDDING),
                RemoteAdapter::forwarded_headers(headers),
                request,
            )
            .await
    }
}
