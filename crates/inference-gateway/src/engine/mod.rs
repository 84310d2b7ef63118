//! Engine capability abstraction
//!
//! Every engine, whether the supervised local subprocess or a remote
//! provider, implements [`EngineCapability`]. The dispatcher only ever sees
//! this trait, so adding a provider never touches dispatch code.

pub mod local;
pub mod registry;
pub mod remote;

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::GatewayContext;
use crate::models::ModelRecord;
use crate::types::{ChatRequest, EmbeddingRequest, InferenceOutput, StreamMode};

pub use local::LocalEngine;
pub use registry::EngineRegistry;
pub use remote::{AuthScheme, ProviderProfile, RemoteEngine};

/// Error types for engine operations
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Engine not running: {0}")]
    NotRunning(String),

    #[error("Missing configuration for engine: {0}")]
    MissingConfiguration(String),

    #[error("Engine binary not found: {0}")]
    BinaryMissing(String),

    #[error("Startup failed: {0}")]
    StartupFailed(String),

    #[error("Upstream returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("Nothing to send: request produced an empty payload")]
    EmptyPayload,

    #[error("Operation not supported by {engine}: {operation}")]
    Unsupported {
        engine: String,
        operation: &'static str,
    },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Readiness of an engine as reported to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EngineStatus {
    /// Credentials present (remote) or binary resolvable (local)
    Ready,
    /// Remote engine without an API key
    MissingConfiguration,
    /// Local engine binary not installed
    NotInitialized,
}

/// Engine information for listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineDescriptor {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub status: EngineStatus,
}

/// The trait every inference engine implements.
///
/// Engines are shared behind `Arc` and called concurrently, so all
/// operations take `&self` and keep their mutable state behind locks.
#[async_trait]
pub trait EngineCapability: Send + Sync {
    // ─── IDENTITY ───────────────────────────────────────────────────

    /// Registry key (e.g. "openai", "local")
    fn name(&self) -> &str;

    /// Current descriptor, including live status
    fn descriptor(&self) -> EngineDescriptor;

    // ─── LIFECYCLE ──────────────────────────────────────────────────

    /// Called once at boot. Must be safe to call again.
    async fn on_load(&self);

    /// Release resources. Never fails.
    async fn on_unload(&self);

    /// Prepare a model for inference
    async fn load_model(&self, _model: &ModelRecord) -> Result<(), EngineError> {
        Ok(())
    }

    /// Release a loaded model
    async fn unload_model(&self, _model_id: &str) -> Result<(), EngineError> {
        Ok(())
    }

    // ─── INFERENCE ──────────────────────────────────────────────────

    /// Run a chat completion
    ///
    /// Returns the whole normalized body when `request.stream` is false,
    /// otherwise a stream shaped by `mode`.
    async fn inference(
        &self,
        request: &ChatRequest,
        headers: &HeaderMap,
        mode: StreamMode,
    ) -> Result<InferenceOutput, EngineError>;

    /// Generate embeddings (OpenAI response shape)
    async fn embeddings(
        &self,
        _request: &EmbeddingRequest,
        _headers: &HeaderMap,
    ) -> Result<Value, EngineError> {
        Err(EngineError::Unsupported {
            engine: self.name().to_string(),
            operation: "embeddings",
        })
    }
}

/// Link-time registration of an additional engine.
///
/// The `build` field is a function pointer that constructs the engine from
/// the gateway context when the registry is populated.
///
/// # Example
///
/// ```ignore
/// inventory::submit!(inference_gateway::EngineExtension {
///     name: "my-engine",
///     build: |ctx| std::sync::Arc::new(MyEngine::new(ctx)),
/// });
/// ```
pub struct EngineExtension {
    /// Registry key of the engine this extension builds
    pub name: &'static str,
    /// Factory function that creates the engine instance
    pub build: fn(&GatewayContext) -> Arc<dyn EngineCapability>,
}

inventory::collect!(EngineExtension);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_serialization() {
        let descriptor = EngineDescriptor {
            name: "openai".into(),
            product_name: Some("OpenAI Inference Engine".into()),
            description: None,
            version: Some("0.1.0".into()),
            status: EngineStatus::MissingConfiguration,
        };
        let json = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(json["productName"], "OpenAI Inference Engine");
        assert_eq!(json["status"], "missingConfiguration");
        assert!(json.get("description").is_none());
    }

    #[test]
    fn test_error_messages() {
        let err = EngineError::Upstream {
            status: 401,
            body: "unauthorized".into(),
        };
        assert_eq!(err.to_string(), "Upstream returned 401: unauthorized");

        let err = EngineError::Unsupported {
            engine: "anthropic".into(),
            operation: "embeddings",
        };
        assert!(err.to_string().contains("anthropic"));
    }
}
