//! Inference gateway for local and remote LLM engines
//!
//! This library routes OpenAI-shaped chat and embedding requests to one of
//! several engines behind a single capability interface:
//! - **Local engine**: a supervised native inference subprocess
//! - **Remote providers**: OpenAI, Anthropic, Cohere, Mistral, Groq, Nvidia
//!
//! Every engine streams back the same normalized events, so the client-facing
//! layer never sees a provider's native wire format.
//!
//! # Example
//!
//! ```rust,ignore
//! use inference_gateway::{GatewayConfig, GatewayContext, InferenceGateway, StreamMode};
//! use std::sync::Arc;
//!
//! let ctx = GatewayContext::new(GatewayConfig::default());
//! let gateway = InferenceGateway::boot(ctx, models, Arc::new(LogCrashReporter)).await;
//!
//! let output = gateway
//!     .dispatch(&request, &headers, StreamMode::Normalized)
//!     .await?;
//! ```

pub mod adapter;
pub mod config;
pub mod constants;
pub mod context;
pub mod credentials;
pub mod crash;
pub mod dispatcher;
pub mod engine;
pub mod gateway;
pub mod models;
pub mod process;
pub mod sse;
pub mod supervisor;
pub mod translate;
pub mod types;

// Re-exports for convenience
pub use adapter::RemoteAdapter;
pub use config::{GatewayConfig, LocalEngineConfig, ProviderOverride};
pub use context::GatewayContext;
pub use credentials::{CredentialListener, CredentialService, CredentialUpdate};
pub use crash::{CrashReporter, LogCrashReporter};
pub use dispatcher::{DispatchError, InferenceDispatcher};
pub use engine::{
    EngineCapability, EngineDescriptor, EngineError, EngineExtension, EngineRegistry,
    EngineStatus, LocalEngine, ProviderProfile, RemoteEngine,
};
pub use gateway::{InferenceGateway, SharedGateway};
pub use models::{InMemoryModelRepository, ModelRecord, ModelRepository};
pub use process::{ProcessEvent, ProcessHandle, ProcessSpawner, SpawnRequest};
pub use supervisor::{LocalEngineSupervisor, SubprocessState};
pub use translate::{ProviderPayload, StreamDelta, Translator};
pub use types::{
    ChatMessage, ChatRequest, EmbeddingRequest, EventStream, InferenceOutput, RawStream,
    StreamEvent, StreamMode,
};

#[cfg(feature = "std-process")]
pub use process::TokioProcessSpawner;
