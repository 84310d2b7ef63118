//! Inference Gateway - single entry point for all inference operations
//!
//! The gateway owns the engine registry and the dispatcher. Hosts boot it
//! once, then hand requests to `dispatch` without knowing which engine
//! serves a model.

use std::sync::Arc;

use reqwest::header::HeaderMap;
use serde_json::Value;

use crate::constants::engine_names;
use crate::context::GatewayContext;
use crate::crash::CrashReporter;
use crate::credentials::CredentialService;
use crate::dispatcher::{DispatchError, InferenceDispatcher};
use crate::engine::{EngineCapability, EngineDescriptor, EngineRegistry, LocalEngine};
use crate::models::ModelRepository;
use crate::types::{ChatRequest, EmbeddingRequest, InferenceOutput, StreamMode};

/// The single entry point for ALL inference operations.
///
/// Application code should only interact with `InferenceGateway`, never
/// with engines directly.
pub struct InferenceGateway {
    ctx: GatewayContext,
    registry: Arc<EngineRegistry>,
    dispatcher: InferenceDispatcher,
}

impl InferenceGateway {
    /// Build the registry and load every engine
    pub async fn boot(
        ctx: GatewayContext,
        models: Arc<dyn ModelRepository>,
        crash_reporter: Arc<dyn CrashReporter>,
    ) -> Self {
        let registry = Arc::new(EngineRegistry::with_builtins(&ctx));
        Self::with_registry(ctx, registry, models, crash_reporter).await
    }

    /// Boot around a registry the host has already populated
    pub async fn with_registry(
        ctx: GatewayContext,
        registry: Arc<EngineRegistry>,
        models: Arc<dyn ModelRepository>,
        crash_reporter: Arc<dyn CrashReporter>,
    ) -> Self {
        for engine in registry.all() {
            engine.on_load().await;
            log::debug!("Loaded engine {} ({:?})", engine.name(), engine.descriptor().status);
        }
        log::info!("Inference gateway ready with {} engines", registry.all().len());

        let dispatcher = InferenceDispatcher::new(models, registry.clone(), crash_reporter);
        Self {
            ctx,
            registry,
            dispatcher,
        }
    }

    /// Run a chat completion
    pub async fn dispatch(
        &self,
        request: &ChatRequest,
        headers: &HeaderMap,
        mode: StreamMode,
    ) -> Result<InferenceOutput, DispatchError> {
        self.dispatcher.dispatch(request, headers, mode).await
    }

    /// Generate embeddings
    pub async fn dispatch_embeddings(
        &self,
        request: &EmbeddingRequest,
        headers: &HeaderMap,
    ) -> Result<Value, DispatchError> {
        self.dispatcher.dispatch_embeddings(request, headers).await
    }

    /// Load a model into the engine that owns it
    pub async fn load_model(&self, model_id: &str) -> Result<(), DispatchError> {
        let (model, engine) = self.dispatcher.resolve(model_id).await?;
        engine.load_model(&model).await?;
        Ok(())
    }

    /// Unload a model from the engine that owns it
    pub async fn unload_model(&self, model_id: &str) -> Result<(), DispatchError> {
        let (model, engine) = self.dispatcher.resolve(model_id).await?;
        engine.unload_model(&model.id).await?;
        Ok(())
    }

    /// The local engine, when the registry holds the built-in one
    pub fn local_engine(&self) -> Option<Arc<LocalEngine>> {
        self.registry.local()
    }

    /// Start the local engine subprocess and wait until it is healthy
    pub async fn start_local(&self) -> Result<(), DispatchError> {
        let local = self
            .local_engine()
            .ok_or_else(|| DispatchError::EngineNotFound(engine_names::LOCAL.to_string()))?;
        local.start().await?;
        Ok(())
    }

    /// Stop the local engine subprocess. A gateway without one has nothing to stop.
    pub async fn stop_local(&self) {
        if let Some(local) = self.local_engine() {
            local.stop().await;
        }
    }

    /// Descriptors of every registered engine
    pub fn engines(&self) -> Vec<EngineDescriptor> {
        self.registry.list()
    }

    /// Look up one engine
    pub fn engine(&self, name: &str) -> Option<Arc<dyn EngineCapability>> {
        self.registry.find_one(name)
    }

    pub fn registry(&self) -> &Arc<EngineRegistry> {
        &self.registry
    }

    pub fn credentials(&self) -> &Arc<CredentialService> {
        &self.ctx.credentials
    }

    /// Unload every engine. The local subprocess is stopped.
    pub async fn shutdown(&self) {
        log::info!("Shutting down inference gateway");
        for engine in self.registry.all() {
            engine.on_unload().await;
        }
    }
}

/// Thread-safe wrapper for sharing the gateway across tasks
pub type SharedGateway = Arc<InferenceGateway>;
