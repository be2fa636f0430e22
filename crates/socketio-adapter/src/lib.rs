//! The cluster adapter contract (§4.E): a pluggable cross-process room
//! index and broadcast bus. Every operation is asynchronous because every
//! realization except [`memory::MemoryAdapter`] does real I/O.

mod memory;
#[cfg(feature = "mongo-adapter")]
mod mongo;
#[cfg(feature = "redis-adapter")]
mod redis_adapter;

pub use memory::MemoryAdapter;
#[cfg(feature = "mongo-adapter")]
pub use mongo::{MongoAdapter, MongoAdapterConfig};
#[cfg(feature = "redis-adapter")]
pub use redis_adapter::{RedisAdapter, RedisAdapterConfig};

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("adapter I/O error: {0}")]
    Io(String),
    #[error("adapter serialization error: {0}")]
    Serialization(String),
    #[error("adapter not initialized")]
    NotInitialized,
}

/// A broadcast envelope, as described in §4.D/§4.E. Carries either a
/// pre-encoded Socket.IO `packet` (the fast path — avoids re-encoding on
/// every remote node) or a bare `event`/`data` pair for the node to encode
/// itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastEnvelope {
    pub nsp: String,
    pub room: Option<String>,
    pub event: Option<String>,
    pub data: Option<serde_json::Value>,
    pub packet: Option<String>,
    pub exclude_socket_id: Option<String>,
    /// Injected by the adapter; compared against the local server id so a
    /// self-originated envelope can be dropped (cluster no-loop, §8 I6).
    pub server_id: String,
}

/// Invoked by an adapter when a remote envelope arrives. The receiver must
/// translate it into *local-only* deliveries and must never re-publish —
/// that is the caller's responsibility to enforce by checking `server_id`.
pub type DeliveryHandler = Arc<dyn Fn(BroadcastEnvelope) + Send + Sync>;

/// The adapter contract from §4.E. All operations may be local (as in
/// [`MemoryAdapter`]) or remote (Redis pub/sub + sets, Mongo change
/// streams / TTL collections).
#[async_trait]
pub trait Adapter: Send + Sync {
    async fn init(&self, server_id: &str);
    async fn close(&self);

    async fn add_socket_to_room(&self, nsp: &str, sid: &str, room: &str) -> Result<(), AdapterError>;
    async fn remove_socket_from_room(
        &self,
        nsp: &str,
        sid: &str,
        room: &str,
    ) -> Result<(), AdapterError>;
    async fn remove_socket_from_all_rooms(&self, nsp: &str, sid: &str) -> Result<(), AdapterError>;

    async fn sockets_in_room(&self, nsp: &str, room: &str) -> Vec<String>;
    async fn rooms_for_socket(&self, nsp: &str, sid: &str) -> Vec<String>;

    async fn broadcast(&self, envelope: BroadcastEnvelope) -> Result<(), AdapterError>;
    async fn broadcast_to_room(
        &self,
        room: &str,
        envelope: BroadcastEnvelope,
    ) -> Result<(), AdapterError>;

    async fn subscribe(&self, handler: DeliveryHandler);
    async fn unsubscribe(&self);

    async fn server_ids(&self) -> Vec<String>;
    async fn register_server(&self);
    async fn unregister_server(&self);
}
