use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use redis::AsyncCommands;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::{Adapter, AdapterError, BroadcastEnvelope, DeliveryHandler};

#[derive(Debug, Clone)]
pub struct RedisAdapterConfig {
    /// `redis://[:password@]host:port[/db]`, or built by the caller from
    /// the discrete `{host,port,password,db}` fields in the server config.
    pub url: String,
    pub key_prefix: String,
    pub heartbeat_interval: Duration,
}

impl Default for RedisAdapterConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_owned(),
            key_prefix: "socket.io".to_owned(),
            heartbeat_interval: Duration::from_secs(30),
        }
    }
}

struct Subscription {
    handle: JoinHandle<()>,
}

pub struct RedisAdapter {
    conn: redis::aio::ConnectionManager,
    client: redis::Client,
    config: RedisAdapterConfig,
    server_id: RwLock<String>,
    subscription: RwLock<Option<Subscription>>,
}

impl RedisAdapter {
    pub async fn connect(config: RedisAdapterConfig) -> Result<Self, AdapterError> {
        let client =
            redis::Client::open(config.url.clone()).map_err(|e| AdapterError::Io(e.to_string()))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| AdapterError::Io(e.to_string()))?;
        Ok(Self {
            conn,
            client,
            config,
            server_id: RwLock::new(String::new()),
            subscription: RwLock::new(None),
        })
    }

    fn ttl_secs(&self) -> i64 {
        (self.config.heartbeat_interval.as_secs() * 3) as i64
    }

    fn room_key(&self, nsp: &str, room: &str) -> String {
        format!("{}:room:{}:{}", self.config.key_prefix, nsp, room)
    }

    fn socket_key(&self, nsp: &str, sid: &str) -> String {
        format!("{}:socket:{}:{}", self.config.key_prefix, nsp, sid)
    }

    fn server_key(&self, server_id: &str) -> String {
        format!("{}:server:{}", self.config.key_prefix, server_id)
    }

    fn global_channel(&self) -> String {
        format!("{}:broadcast", self.config.key_prefix)
    }

    fn room_channel(&self, nsp: &str, room: &str) -> String {
        format!("{}:room:{}:{}", self.config.key_prefix, nsp, room)
    }

    fn room_channel_pattern(&self) -> String {
        format!("{}:room:*:*", self.config.key_prefix)
    }

    async fn publish(&self, channel: &str, envelope: &BroadcastEnvelope) -> Result<(), AdapterError> {
        let payload =
            serde_json::to_string(envelope).map_err(|e| AdapterError::Serialization(e.to_string()))?;
        let mut conn = self.conn.clone();
        conn.publish::<_, _, ()>(channel, payload)
            .await
            .map_err(|e| AdapterError::Io(e.to_string()))
    }
}

#[async_trait]
impl Adapter for RedisAdapter {
    async fn init(&self, server_id: &str) {
        *self.server_id.write().await = server_id.to_owned();
        self.register_server().await;
    }

    async fn close(&self) {
        self.unsubscribe().await;
        self.unregister_server().await;
    }

    async fn add_socket_to_room(&self, nsp: &str, sid: &str, room: &str) -> Result<(), AdapterError> {
        let ttl = self.ttl_secs();
        let room_key = self.room_key(nsp, room);
        let socket_key = self.socket_key(nsp, sid);
        let mut conn = self.conn.clone();
        let result: Result<(), redis::RedisError> = async {
            conn.sadd::<_, _, ()>(&room_key, sid).await?;
            conn.expire::<_, ()>(&room_key, ttl).await?;
            conn.sadd::<_, _, ()>(&socket_key, room).await?;
            conn.expire::<_, ()>(&socket_key, ttl).await?;
            Ok(())
        }
        .await;
        // A join/leave write failure is logged and does not abort the
        // operation locally — membership is best-effort (§4.E).
        if let Err(e) = result {
            warn!(error = %e, nsp, sid, room, "redis adapter: add_socket_to_room failed");
        }
        Ok(())
    }

    async fn remove_socket_from_room(
        &self,
        nsp: &str,
        sid: &str,
        room: &str,
    ) -> Result<(), AdapterError> {
        let room_key = self.room_key(nsp, room);
        let socket_key = self.socket_key(nsp, sid);
        let mut conn = self.conn.clone();
        let result: Result<(), redis::RedisError> = async {
            conn.srem::<_, _, ()>(&room_key, sid).await?;
            conn.srem::<_, _, ()>(&socket_key, room).await?;
            Ok(())
        }
        .await;
        if let Err(e) = result {
            warn!(error = %e, nsp, sid, room, "redis adapter: remove_socket_from_room failed");
        }
        Ok(())
    }

    async fn remove_socket_from_all_rooms(&self, nsp: &str, sid: &str) -> Result<(), AdapterError> {
        let rooms = self.rooms_for_socket(nsp, sid).await;
        for room in rooms {
            self.remove_socket_from_room(nsp, sid, &room).await?;
        }
        let socket_key = self.socket_key(nsp, sid);
        let mut conn = self.conn.clone();
        if let Err(e) = conn.del::<_, ()>(&socket_key).await {
            warn!(error = %e, nsp, sid, "redis adapter: remove_socket_from_all_rooms cleanup failed");
        }
        Ok(())
    }

    async fn sockets_in_room(&self, nsp: &str, room: &str) -> Vec<String> {
        let room_key = self.room_key(nsp, room);
        let mut conn = self.conn.clone();
        conn.smembers::<_, Vec<String>>(&room_key)
            .await
            .unwrap_or_default()
    }

    async fn rooms_for_socket(&self, nsp: &str, sid: &str) -> Vec<String> {
        let socket_key = self.socket_key(nsp, sid);
        let mut conn = self.conn.clone();
        conn.smembers::<_, Vec<String>>(&socket_key)
            .await
            .unwrap_or_default()
    }

    async fn broadcast(&self, mut envelope: BroadcastEnvelope) -> Result<(), AdapterError> {
        envelope.server_id = self.server_id.read().await.clone();
        if let Err(e) = self.publish(&self.global_channel(), &envelope).await {
            warn!(error = %e, "redis adapter: broadcast publish failed");
        }
        Ok(())
    }

    async fn broadcast_to_room(
        &self,
        room: &str,
        mut envelope: BroadcastEnvelope,
    ) -> Result<(), AdapterError> {
        envelope.server_id = self.server_id.read().await.clone();
        let channel = self.room_channel(&envelope.nsp, room);
        if let Err(e) = self.publish(&channel, &envelope).await {
            warn!(error = %e, room, "redis adapter: broadcast_to_room publish failed");
        }
        Ok(())
    }

    async fn subscribe(&self, handler: DeliveryHandler) {
        self.unsubscribe().await;
        let client = self.client.clone();
        let global_channel = self.global_channel();
        let room_pattern = self.room_channel_pattern();
        let self_server_id = self.server_id.read().await.clone();

        let handle = tokio::spawn(async move {
            let mut pubsub = match client.get_async_pubsub().await {
                Ok(p) => p,
                Err(e) => {
                    warn!(error = %e, "redis adapter: failed to open pubsub connection");
                    return;
                }
            };
            if let Err(e) = pubsub.subscribe(&global_channel).await {
                warn!(error = %e, "redis adapter: subscribe to global channel failed");
                return;
            }
            // Room-level publishes otherwise reach no one: the original
            // reference in-tree only subscribed the global channel. We
            // PSUBSCRIBE to the room-channel pattern too (§9 redesign
            // flag resolution).
            if let Err(e) = pubsub.psubscribe(&room_pattern).await {
                warn!(error = %e, "redis adapter: psubscribe to room channels failed");
            }

            let mut stream = pubsub.on_message();
            while let Some(msg) = stream.next().await {
                let payload: String = match msg.get_payload() {
                    Ok(p) => p,
                    Err(e) => {
                        debug!(error = %e, "redis adapter: non-string pubsub payload");
                        continue;
                    }
                };
                let envelope: BroadcastEnvelope = match serde_json::from_str(&payload) {
                    Ok(e) => e,
                    Err(e) => {
                        debug!(error = %e, "redis adapter: malformed envelope");
                        continue;
                    }
                };
                if envelope.server_id == self_server_id {
                    continue;
                }
                handler(envelope);
            }
        });

        *self.subscription.write().await = Some(Subscription { handle });
    }

    async fn unsubscribe(&self) {
        if let Some(sub) = self.subscription.write().await.take() {
            sub.handle.abort();
        }
    }

    async fn server_ids(&self) -> Vec<String> {
        let pattern = format!("{}:server:*", self.config.key_prefix);
        let mut conn = self.conn.clone();
        let keys: Vec<String> = conn.keys(&pattern).await.unwrap_or_default();
        let prefix_len = format!("{}:server:", self.config.key_prefix).len();
        keys.into_iter().map(|k| k[prefix_len..].to_owned()).collect()
    }

    async fn register_server(&self) {
        let server_id = self.server_id.read().await.clone();
        if server_id.is_empty() {
            return;
        }
        let key = self.server_key(&server_id);
        let ttl = self.ttl_secs();
        let mut conn = self.conn.clone();
        let result: Result<(), redis::RedisError> = async {
            conn.set::<_, _, ()>(&key, chrono_now()).await?;
            conn.expire::<_, ()>(&key, ttl).await?;
            Ok(())
        }
        .await;
        if let Err(e) = result {
            warn!(error = %e, server_id, "redis adapter: heartbeat registration failed");
        }
    }

    async fn unregister_server(&self) {
        let server_id = self.server_id.read().await.clone();
        if server_id.is_empty() {
            return;
        }
        let key = self.server_key(&server_id);
        let mut conn = self.conn.clone();
        let _ = conn.del::<_, ()>(&key).await;
    }
}

/// Unix timestamp, stored as the registry value. Not parsed back by
/// anything in this crate — the TTL, not the value, drives eviction.
fn chrono_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
