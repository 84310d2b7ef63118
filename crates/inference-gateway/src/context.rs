//! Shared dependencies handed to engine constructors

use std::sync::Arc;

use crate::config::GatewayConfig;
use crate::credentials::CredentialService;
use crate::process::ProcessSpawner;

/// Everything an engine needs from its host
///
/// Cheap to clone. There are no process-wide singletons: whoever boots the
/// gateway builds one context and passes it down.
#[derive(Clone)]
pub struct GatewayContext {
    pub config: Arc<GatewayConfig>,
    pub credentials: Arc<CredentialService>,
    pub http: reqwest::Client,
    pub spawner: Arc<dyn ProcessSpawner>,
}

impl GatewayContext {
    /// Context that launches the local engine with `tokio::process`
    #[cfg(feature = "std-process")]
    pub fn new(config: GatewayConfig) -> Self {
        Self::with_spawner(config, Arc::new(crate::process::TokioProcessSpawner::new()))
    }

    pub fn with_spawner(config: GatewayConfig, spawner: Arc<dyn ProcessSpawner>) -> Self {
        Self {
            config: Arc::new(config),
            credentials: Arc::new(CredentialService::new()),
            http: reqwest::Client::new(),
            spawner,
        }
    }

    /// Share an existing credential store
    pub fn with_credentials(mut self, credentials: Arc<CredentialService>) -> Self {
        self.credentials = credentials;
        self
    }
}
