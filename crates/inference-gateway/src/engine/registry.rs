//! Engine registry for runtime engine lookup
//!
//! The registry maps engine names to shared engine instances. It is
//! populated at boot from the built-in engines plus any
//! [`EngineExtension`]s registered at link time, and is read-mostly after
//! that.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::{EngineCapability, EngineDescriptor, EngineExtension, LocalEngine, ProviderProfile, RemoteEngine};
use crate::constants::engine_names;
use crate::context::GatewayContext;

/// Registry of available inference engines
#[derive(Default)]
pub struct EngineRegistry {
    engines: RwLock<HashMap<String, Arc<dyn EngineCapability>>>,
    local: RwLock<Option<Arc<LocalEngine>>>,
}

impl EngineRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the local engine, every hosted provider and
    /// all link-time extensions
    ///
    /// Remote engines are subscribed to credential updates here, once.
    pub fn with_builtins(ctx: &GatewayContext) -> Self {
        let registry = Self::new();

        registry.register_local(Arc::new(LocalEngine::new(ctx)));

        for profile in ProviderProfile::builtins() {
            let engine = Arc::new(RemoteEngine::new(profile, ctx));
            ctx.credentials.subscribe(engine.clone());
            registry.register(engine);
        }

        for extension in inventory::iter::<EngineExtension> {
            log::debug!("Registering engine extension: {}", extension.name);
            registry.register((extension.build)(ctx));
        }

        registry
    }

    /// Register an engine under its own name, replacing any previous one
    pub fn register(&self, engine: Arc<dyn EngineCapability>) {
        let name = engine.name().to_string();
        if name == engine_names::LOCAL {
            // A replacement "local" engine is not the typed one anymore
            self.local.write().take();
        }
        if self.engines.write().insert(name.clone(), engine).is_some() {
            log::warn!("Engine {} registered twice; keeping the latest", name);
        }
    }

    /// Register the local engine, keeping a typed handle for lifecycle control
    pub fn register_local(&self, engine: Arc<LocalEngine>) {
        self.register(engine.clone());
        *self.local.write() = Some(engine);
    }

    /// The local engine, if one was registered through `register_local`
    pub fn local(&self) -> Option<Arc<LocalEngine>> {
        self.local.read().clone()
    }

    /// Look up an engine by name
    pub fn find_one(&self, name: &str) -> Option<Arc<dyn EngineCapability>> {
        self.engines.read().get(name).cloned()
    }

    /// Every registered engine, sorted by name
    pub fn all(&self) -> Vec<Arc<dyn EngineCapability>> {
        let mut engines: Vec<_> = self.engines.read().values().cloned().collect();
        engines.sort_by(|a, b| a.name().cmp(b.name()));
        engines
    }

    /// Descriptors of every registered engine, sorted by name
    pub fn list(&self) -> Vec<EngineDescriptor> {
        self.all().iter().map(|engine| engine.descriptor()).collect()
    }

    /// Check if an engine is registered
    pub fn contains(&self, name: &str) -> bool {
        self.engines.read().contains_key(name)
    }
}
