//! Credential store with explicit subscribe/notify
//!
//! Values are grouped by engine name (e.g. `("openai", "apiKey")`). Engines
//! that care about updates subscribe once at boot; every `set` notifies all
//! subscribers and each one filters on the group it owns.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

/// A single credential change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialUpdate {
    /// Owner of the value, usually an engine name
    pub group: String,
    pub key: String,
    pub value: String,
}

/// Receives credential changes
pub trait CredentialListener: Send + Sync {
    fn on_credential_updated(&self, update: &CredentialUpdate);
}

/// In-memory credential store
#[derive(Default)]
pub struct CredentialService {
    values: RwLock<HashMap<(String, String), String>>,
    listeners: RwLock<Vec<Arc<dyn CredentialListener>>>,
}

impl CredentialService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a stored value
    pub fn get(&self, group: &str, key: &str) -> Option<String> {
        self.values
            .read()
            .get(&(group.to_string(), key.to_string()))
            .cloned()
    }

    /// Store a value and notify every subscriber
    pub fn set(&self, group: &str, key: &str, value: &str) {
        self.values.write().insert(
            (group.to_string(), key.to_string()),
            value.to_string(),
        );

        let update = CredentialUpdate {
            group: group.to_string(),
            key: key.to_string(),
            value: value.to_string(),
        };
        log::debug!("Credential updated: {}.{}", group, key);

        // Snapshot so listeners can call back into the service
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            listener.on_credential_updated(&update);
        }
    }

    pub fn subscribe(&self, listener: Arc<dyn CredentialListener>) {
        self.listeners.write().push(listener);
    }

    pub fn subscriber_count(&self) -> usize {
        self.listeners.read().len()
    }
}
