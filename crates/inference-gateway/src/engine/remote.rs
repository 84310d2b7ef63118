//! Remote provider engines
//!
//! One [`RemoteEngine`] type serves every hosted provider. What differs
//! between providers (endpoint, auth scheme, wire format) lives in a
//! [`ProviderProfile`].

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use serde_json::Value;

use super::{EngineCapability, EngineDescriptor, EngineError, EngineStatus};
use crate::adapter::RemoteAdapter;
use crate::config::ProviderOverride;
use crate::constants::{defaults, engine_names};
use crate::context::GatewayContext;
use crate::credentials::{CredentialListener, CredentialService, CredentialUpdate};
use crate::translate::{AnthropicTranslator, CohereTranslator, OpenAiTranslator, Translator};
use crate::types::{ChatRequest, EmbeddingRequest, InferenceOutput, StreamMode};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// How a provider expects its API key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthScheme {
    /// `Authorization: Bearer <key>`
    Bearer,
    /// Key in a named header, plus fixed headers the provider requires
    Header {
        name: &'static str,
        extra: Vec<(&'static str, &'static str)>,
    },
}

/// Everything that distinguishes one hosted provider from another
#[derive(Clone)]
pub struct ProviderProfile {
    pub name: String,
    pub product_name: String,
    pub description: String,
    pub version: String,
    pub chat_url: String,
    pub embeddings_url: Option<String>,
    pub auth: AuthScheme,
    pub translator: Arc<dyn Translator>,
}

impl ProviderProfile {
    fn openai_compatible(
        name: &str,
        product_name: &str,
        description: &str,
        chat_url: &str,
        embeddings_url: Option<&str>,
    ) -> Self {
        Self {
            name: name.to_string(),
            product_name: product_name.to_string(),
            description: description.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            chat_url: chat_url.to_string(),
            embeddings_url: embeddings_url.map(str::to_string),
            auth: AuthScheme::Bearer,
            translator: Arc::new(OpenAiTranslator),
        }
    }

    pub fn openai() -> Self {
        Self::openai_compatible(
            engine_names::OPENAI,
            "OpenAI Inference Engine",
            "This extension enables OpenAI chat completion API calls",
            "https://api.openai.com/v1/chat/completions",
            Some("https://api.openai.com/v1/embeddings"),
        )
    }

    pub fn groq() -> Self {
        Self::openai_compatible(
            engine_names::GROQ,
            "Groq Inference Engine",
            "This extension enables fast Groq chat completion API calls",
            "https://api.groq.com/openai/v1/chat/completions",
            None,
        )
    }

    pub fn mistral() -> Self {
        Self::openai_compatible(
            engine_names::MISTRAL,
            "Mistral Inference Engine",
            "This extension enables Mistral chat completion API calls",
            "https://api.mistral.ai/v1/chat/completions",
            Some("https://api.mistral.ai/v1/embeddings"),
        )
    }

    pub fn nvidia() -> Self {
        Self::openai_compatible(
            engine_names::NVIDIA,
            "Nvidia Inference Engine",
            "This extension enables Nvidia chat completion API calls",
            "https://integrate.api.nvidia.com/v1/chat/completions",
            Some("https://integrate.api.nvidia.com/v1/embeddings"),
        )
    }

    pub fn anthropic() -> Self {
        Self {
            name: engine_names::ANTHROPIC.to_string(),
            product_name: "Anthropic Inference Engine".to_string(),
            description: "This extension enables Anthropic chat completion API calls".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            chat_url: "https://api.anthropic.com/v1/messages".to_string(),
            embeddings_url: None,
            auth: AuthScheme::Header {
                name: "x-api-key",
                extra: vec![("anthropic-version", ANTHROPIC_VERSION)],
            },
            translator: Arc::new(AnthropicTranslator),
        }
    }

    pub fn cohere() -> Self {
        Self {
            name: engine_names::COHERE.to_string(),
            product_name: "Cohere Inference Engine".to_string(),
            description: "This extension enables Cohere chat completion API calls".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            chat_url: "https://api.cohere.ai/v1/chat".to_string(),
            embeddings_url: None,
            auth: AuthScheme::Bearer,
            translator: Arc::new(CohereTranslator),
        }
    }

    /// All built-in hosted providers
    pub fn builtins() -> Vec<Self> {
        vec![
            Self::openai(),
            Self::anthropic(),
            Self::cohere(),
            Self::mistral(),
            Self::groq(),
            Self::nvidia(),
        ]
    }

    /// Apply configured endpoint overrides
    pub fn with_override(mut self, config: Option<&ProviderOverride>) -> Self {
        if let Some(config) = config {
            if let Some(url) = &config.base_url {
                self.chat_url = url.clone();
            }
            if let Some(url) = &config.embeddings_url {
                self.embeddings_url = Some(url.clone());
            }
        }
        self
    }

    /// Headers carrying `api_key` in this provider's scheme
    fn auth_headers(&self, api_key: &str) -> Result<HeaderMap, EngineError> {
        let mut headers = HeaderMap::new();
        match &self.auth {
            AuthScheme::Bearer => {
                headers.insert(AUTHORIZATION, header_value(&format!("Bearer {}", api_key))?);
            }
            AuthScheme::Header { name, extra } => {
                headers.insert(HeaderName::from_static(*name), header_value(api_key)?);
                for &(extra_name, value) in extra {
                    headers.insert(
                        HeaderName::from_static(extra_name),
                        HeaderValue::from_static(value),
                    );
                }
            }
        }
        Ok(headers)
    }
}

fn header_value(value: &str) -> Result<HeaderValue, EngineError> {
    HeaderValue::from_str(value)
        .map_err(|e| EngineError::Config(format!("Invalid API key header: {}", e)))
}

/// Engine backed by a hosted provider API
pub struct RemoteEngine {
    profile: ProviderProfile,
    adapter: RemoteAdapter,
    credentials: Arc<CredentialService>,
    api_key: RwLock<Option<String>>,
}

impl RemoteEngine {
    pub fn new(profile: ProviderProfile, ctx: &GatewayContext) -> Self {
        let config = ctx.config.provider(&profile.name).cloned();
        let profile = profile.with_override(config.as_ref());
        Self {
            profile,
            adapter: RemoteAdapter::new(ctx.http.clone()),
            credentials: ctx.credentials.clone(),
            api_key: RwLock::new(None),
        }
    }

    pub fn profile(&self) -> &ProviderProfile {
        &self.profile
    }

    pub fn status(&self) -> EngineStatus {
        match self.api_key.read().as_deref() {
            Some(key) if !key.is_empty() => EngineStatus::Ready,
            _ => EngineStatus::MissingConfiguration,
        }
    }

    fn set_api_key(&self, key: Option<String>) {
        *self.api_key.write() = key.filter(|k| !k.is_empty());
        log::debug!("Engine {} status: {:?}", self.profile.name, self.status());
    }

    /// Caller headers with this provider's auth applied on top
    fn request_headers(&self, caller: &HeaderMap) -> Result<HeaderMap, EngineError> {
        let api_key = self
            .api_key
            .read()
            .clone()
            .ok_or_else(|| EngineError::MissingConfiguration(self.profile.name.clone()))?;

        let mut headers = RemoteAdapter::forwarded_headers(caller);
        for (name, value) in self.profile.auth_headers(&api_key)? {
            if let Some(name) = name {
                headers.insert(name, value);
            }
        }
        Ok(headers)
    }
}

impl CredentialListener for RemoteEngine {
    fn on_credential_updated(&self, update: &CredentialUpdate) {
        // Any update to this engine's group carries its API key
        if update.group == self.profile.name {
            self.set_api_key(Some(update.value.clone()));
        }
    }
}

#[async_trait]
impl EngineCapability for RemoteEngine {
    fn name(&self) -> &str {
        &self.profile.name
    }

    fn descriptor(&self) -> EngineDescriptor {
        EngineDescriptor {
            name: self.profile.name.clone(),
            product_name: Some(self.profile.product_name.clone()),
            description: Some(self.profile.description.clone()),
            version: Some(self.profile.version.clone()),
            status: self.status(),
        }
    }

    async fn on_load(&self) {
        let key = self.credentials.get(&self.profile.name, defaults::API_KEY);
        self.set_api_key(key);
    }

    async fn on_unload(&self) {}

    async fn inference(
        &self,
        request: &ChatRequest,
        headers: &HeaderMap,
        mode: StreamMode,
    ) -> Result<InferenceOutput, EngineError> {
        let headers = self.request_headers(headers)?;
        self.adapter
            .send(
                &self.profile.chat_url,
                headers,
                request,
                self.profile.translator.clone(),
                mode,
            )
            .await
    }

    async fn embeddings(
        &self,
        request: &EmbeddingRequest,
        headers: &HeaderMap,
    ) -> Result<Value, EngineError> {
        let Some(url) = &self.profile.embeddings_url else {
            return Err(EngineError::Unsupported {
                engine: self.profile.name.clone(),
                operation: "embeddings",
            });
        };
        let headers = self.request_headers(headers)?;
        self.adapter.post_json(url, headers, request).await
    }
}
