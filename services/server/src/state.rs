//! Shared application state handed to every axum handler via `State<AppState>`
//! (§6), mirroring the teacher's `#[derive(Clone)] pub struct AppState { ... }`
//! plus `impl AppState::new(...)` pattern.

use std::sync::Arc;

use socketio_adapter::{Adapter, MemoryAdapter};
use socketio_core::NamespaceRegistry;

use crate::config::ServerConfig;
use crate::engine::EngineSessionManager;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub registry: Arc<NamespaceRegistry>,
    pub sessions: Arc<EngineSessionManager>,
}

impl AppState {
    /// Builds state around an in-process [`MemoryAdapter`]. Suitable for a
    /// single-node deployment or tests.
    pub fn new(config: Arc<ServerConfig>) -> Self {
        Self::with_adapter(config, Arc::new(MemoryAdapter::new()))
    }

    /// Builds state around a caller-supplied adapter (Redis, Mongo, or a
    /// custom realization of the §4.E contract).
    pub fn with_adapter(config: Arc<ServerConfig>, adapter: Arc<dyn Adapter>) -> Self {
        let registry = NamespaceRegistry::new(config.server_id.clone(), adapter);
        let sessions = EngineSessionManager::new(config.clone(), registry.clone());
        Self {
            config,
            registry,
            sessions,
        }
    }
}
