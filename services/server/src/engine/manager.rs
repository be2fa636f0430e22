//! Owns every live [`EngineSession`] for this process: handshake admission,
//! the `sid -> session` table, the adaptive long-poll timeout, and the
//! shared heartbeat manager (§4.B).

use std::collections::HashMap;
use std::sync::{Arc, RwLock, Weak};
use std::time::Duration;

use serde_json::json;
use socketio_core::{Handshake, NamespaceRegistry};
use tokio::sync::mpsc::unbounded_channel;
use tracing::info;

use super::dispatch::spawn_dispatcher;
use super::heartbeat::HeartbeatManager;
use super::session::EngineSession;
use crate::config::ServerConfig;
use crate::filters::EncryptionFilter;
use crate::transport::LongPollTransport;

pub struct EngineSessionManager {
    config: Arc<ServerConfig>,
    registry: Arc<NamespaceRegistry>,
    encryption: Option<Arc<EncryptionFilter>>,
    sessions: RwLock<HashMap<String, Arc<EngineSession>>>,
    heartbeat: HeartbeatManager,
}

impl EngineSessionManager {
    pub fn new(config: Arc<ServerConfig>, registry: Arc<NamespaceRegistry>) -> Arc<Self> {
        let encryption = config
            .encryption
            .as_ref()
            .map(|enc| Arc::new(EncryptionFilter::new(enc).expect("valid encryption config")));
        let interval = Duration::from_millis(config.ping_interval_ms);

        Arc::new_cyclic(|weak: &Weak<Self>| {
            let weak = weak.clone();
            let heartbeat = HeartbeatManager::start(interval, move || {
                weak.upgrade().map(|m| m.all_sessions()).unwrap_or_default()
            });
            Self {
                config,
                registry,
                encryption,
                sessions: RwLock::new(HashMap::new()),
                heartbeat,
            }
        })
    }

    pub fn at_capacity(&self) -> bool {
        self.sessions.read().unwrap().len() >= self.config.max_connections
    }

    pub fn get(&self, sid: &str) -> Option<Arc<EngineSession>> {
        self.sessions.read().unwrap().get(sid).cloned()
    }

    fn all_sessions(&self) -> Vec<Arc<EngineSession>> {
        self.sessions.read().unwrap().values().cloned().collect()
    }

    /// The `upgrades` array advertised in the OPEN handshake payload (§6):
    /// `"websocket"` only when the deployer's `transports` config actually
    /// enables it, so a `transports = ["polling"]` operator never has a
    /// transport advertised that the router doesn't also mount.
    pub fn upgrades(&self) -> Vec<&'static str> {
        if self
            .config
            .transports
            .iter()
            .any(|t| t == "websocket")
        {
            vec!["websocket"]
        } else {
            vec![]
        }
    }

    /// Adaptive long-poll timeout (§4.B): shortens as the live session
    /// count grows so the server does not hold unbounded parked file
    /// descriptors under load.
    pub fn adaptive_poll_timeout(&self) -> Duration {
        let count = self.sessions.read().unwrap().len();
        let secs = if count <= 1000 {
            60
        } else if count <= 5000 {
            54
        } else if count <= 10_000 {
            45
        } else {
            30
        };
        Duration::from_secs(secs)
    }

    /// Runs the handshake (§4.B): generates `sid`, builds the handshake
    /// record, creates the long-poll transport and the session, sends the
    /// OPEN packet, and registers the session in the session table.
    pub fn handshake(
        self: &Arc<Self>,
        query: HashMap<String, String>,
        headers: HashMap<String, String>,
        url: String,
    ) -> Arc<EngineSession> {
        let sid = uuid::Uuid::new_v4().to_string();
        let handshake = Handshake::new(sid.clone(), url).with_query(query).with_headers(headers);
        let longpoll = Arc::new(LongPollTransport::new());
        let (message_tx, message_rx) = unbounded_channel();

        let session = EngineSession::new(
            sid.clone(),
            handshake,
            longpoll,
            Duration::from_millis(self.config.ping_timeout_ms),
            self.encryption.clone(),
            self.config.compression,
            message_tx,
        );

        let weak_self = Arc::downgrade(self);
        let close_sid = sid.clone();
        session.set_close_callback(Box::new(move || {
            if let Some(manager) = weak_self.upgrade() {
                manager.sessions.write().unwrap().remove(&close_sid);
            }
        }));

        self.sessions.write().unwrap().insert(sid.clone(), session.clone());
        spawn_dispatcher(session.clone(), message_rx, self.registry.clone());

        let open_payload = json!({
            "sid": sid,
            "upgrades": self.upgrades(),
            "pingInterval": self.config.ping_interval_ms,
            "pingTimeout": self.config.ping_timeout_ms,
        });
        session.send_packet(engineio_proto::Packet::open(open_payload.to_string()));
        info!(sid = %sid, "engine session handshake complete");
        session
    }

    /// Drains and closes every session (§5 `server.close()` cancellation).
    pub async fn shutdown(&self) {
        self.heartbeat.stop();
        let sessions: Vec<Arc<EngineSession>> = self.all_sessions();
        for session in sessions {
            session.close("server shutting down").await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use socketio_adapter::MemoryAdapter;

    fn manager() -> Arc<EngineSessionManager> {
        let config = Arc::new(ServerConfig::default());
        let registry = NamespaceRegistry::new(config.server_id.clone(), Arc::new(MemoryAdapter::new()));
        EngineSessionManager::new(config, registry)
    }

    #[tokio::test]
    async fn handshake_registers_a_retrievable_session() {
        let manager = manager();
        let session = manager.handshake(HashMap::new(), HashMap::new(), "/socket.io/".to_owned());
        assert!(manager.get(&session.sid).is_some());
    }

    #[test]
    fn adaptive_timeout_matches_thresholds() {
        let manager = manager();
        assert_eq!(manager.adaptive_poll_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn upgrades_advertises_websocket_only_when_configured() {
        let manager = manager();
        assert_eq!(manager.upgrades(), vec!["websocket"]);

        let mut config = ServerConfig::default();
        config.transports = vec!["polling".to_owned()];
        let registry =
            NamespaceRegistry::new(config.server_id.clone(), Arc::new(MemoryAdapter::new()));
        let polling_only = EngineSessionManager::new(Arc::new(config), registry);
        assert!(polling_only.upgrades().is_empty());
    }

    #[tokio::test]
    async fn close_callback_removes_session_from_table() {
        let manager = manager();
        let session = manager.handshake(HashMap::new(), HashMap::new(), "/socket.io/".to_owned());
        session.close("test").await;
        assert!(manager.get(&session.sid).is_none());
    }

    #[tokio::test]
    async fn shutdown_closes_every_session() {
        let manager = manager();
        let a = manager.handshake(HashMap::new(), HashMap::new(), "/socket.io/".to_owned());
        let b = manager.handshake(HashMap::new(), HashMap::new(), "/socket.io/".to_owned());
        manager.shutdown().await;
        assert!(!a.is_connected());
        assert!(!b.is_connected());
    }
}
