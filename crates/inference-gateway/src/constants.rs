//! Gateway-wide constants
//!
//! Single source of truth for ports, endpoint paths, timeouts and provider
//! defaults. Config types pull their defaults from here.

/// Network port configuration
pub mod ports {
    /// Default port of the local engine subprocess
    pub const LOCAL_ENGINE: u16 = 3929;
}

/// Server host configuration
pub mod hosts {
    /// Host the local engine binds to
    pub const LOCAL: &str = "127.0.0.1";
}

/// Timeout configuration
pub mod timeouts {
    /// Interval between `/healthz` polls while the engine starts
    pub const HEALTH_POLL_INTERVAL_MS: u64 = 1000;
    /// Upper bound for the engine to answer `/healthz` after spawn
    pub const ENGINE_STARTUP_SECS: u64 = 120;
    /// Per-request timeout of a single health probe
    pub const HEALTH_PROBE_MS: u64 = 2000;
    /// How long `stop` waits for the killed process to report its exit
    pub const ENGINE_STOP_MS: u64 = 5000;
}

/// Local engine HTTP surface
pub mod endpoints {
    pub const HEALTHZ: &str = "/healthz";
    pub const DESTROY: &str = "/processmanager/destroy";
    pub const CHAT_COMPLETION: &str = "/inferences/server/chat_completion";
    pub const EMBEDDING: &str = "/inferences/server/embedding";
    pub const LOAD_MODEL: &str = "/inferences/server/loadmodel";
    pub const UNLOAD_MODEL: &str = "/inferences/server/unloadmodel";
    pub const MODELS: &str = "/inferences/server/models";
}

/// Default values for engine configuration
pub mod defaults {
    /// File name of the native engine binary
    #[cfg(windows)]
    pub const ENGINE_BINARY: &str = "engine-server.exe";
    #[cfg(not(windows))]
    pub const ENGINE_BINARY: &str = "engine-server";
    /// Devices exposed to the engine subprocess
    pub const VISIBLE_DEVICES: &str = "0";
    /// Directory holding the engine binary and its shared libraries
    pub const ENGINE_DIR: &str = "engines";
    /// Directory the engine uses for runtime data
    pub const DATA_DIR: &str = "data";
    /// Credential key holding a provider's API key
    pub const API_KEY: &str = "apiKey";
    /// `max_tokens` sent to providers that require it
    pub const MAX_TOKENS: u32 = 4096;
}

/// Engine names as registered in the engine registry
pub mod engine_names {
    pub const LOCAL: &str = "local";
    pub const OPENAI: &str = "openai";
    pub const ANTHROPIC: &str = "anthropic";
    pub const COHERE: &str = "cohere";
    pub const MISTRAL: &str = "mistral";
    pub const GROQ: &str = "groq";
    pub const NVIDIA: &str = "nvidia";
}

/// Environment variables set on the engine subprocess
pub mod env_vars {
    pub const VISIBLE_DEVICES: &str = "CUDA_VISIBLE_DEVICES";
    pub const ENGINE_PATH: &str = "ENGINE_PATH";
    pub const ENGINE_PORT: &str = "ENGINE_PORT";
    pub const PATH: &str = "PATH";
    pub const LIBRARY_PATH: &str = "LD_LIBRARY_PATH";
}

/// Server-sent event framing
pub mod sse {
    pub const DATA_PREFIX: &str = "data: ";
    pub const EVENT_PREFIX: &str = "event: ";
    /// Terminator line of an OpenAI-style event stream
    pub const DONE: &str = "data: [DONE]";
    /// Role echo some providers prepend to the first delta
    pub const ROLE_ECHO: &str = "assistant: ";
}
