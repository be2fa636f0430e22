use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use mongodb::bson::{doc, Document};
use mongodb::options::{FindOptions, IndexOptions};
use mongodb::{Client, Collection, IndexModel};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::{Adapter, AdapterError, BroadcastEnvelope, DeliveryHandler};

#[derive(Debug, Clone)]
pub struct MongoAdapterConfig {
    pub uri: String,
    pub database: String,
    pub key_prefix: String,
    pub heartbeat_interval: Duration,
}

impl Default for MongoAdapterConfig {
    fn default() -> Self {
        Self {
            uri: "mongodb://127.0.0.1:27017".to_owned(),
            database: "socketio".to_owned(),
            key_prefix: "socket.io".to_owned(),
            heartbeat_interval: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct RoomDoc {
    #[serde(rename = "_id")]
    id: String,
    members: Vec<String>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct SocketDoc {
    #[serde(rename = "_id")]
    id: String,
    rooms: Vec<String>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct MessageDoc {
    server_id: String,
    envelope: BroadcastEnvelope,
    // Stored as a BSON Date, not chrono's default RFC3339 string, so the
    // TTL index on this field (see `connect`) actually expires documents.
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct ServerDoc {
    #[serde(rename = "_id")]
    id: String,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    last_heartbeat: DateTime<Utc>,
}

pub struct MongoAdapter {
    rooms: Collection<RoomDoc>,
    sockets: Collection<SocketDoc>,
    messages: Collection<MessageDoc>,
    servers: Collection<ServerDoc>,
    config: MongoAdapterConfig,
    server_id: RwLock<String>,
    subscription: RwLock<Option<JoinHandle<()>>>,
}

impl MongoAdapter {
    pub async fn connect(config: MongoAdapterConfig) -> Result<Self, AdapterError> {
        let client = Client::with_uri_str(&config.uri)
            .await
            .map_err(|e| AdapterError::Io(e.to_string()))?;
        let db = client.database(&config.database);
        let rooms = db.collection::<RoomDoc>(&format!("{}_rooms", config.key_prefix));
        let sockets = db.collection::<SocketDoc>(&format!("{}_rooms_sockets", config.key_prefix));
        let messages = db.collection::<MessageDoc>(&format!("{}_messages", config.key_prefix));
        let servers = db.collection::<ServerDoc>(&format!("{}_servers", config.key_prefix));

        let messages_ttl = IndexModel::builder()
            .keys(doc! { "created_at": 1 })
            .options(IndexOptions::builder().expire_after(Duration::from_secs(60)).build())
            .build();
        let _ = messages.create_index(messages_ttl).await;

        let servers_ttl = IndexModel::builder()
            .keys(doc! { "last_heartbeat": 1 })
            .options(
                IndexOptions::builder()
                    .expire_after(Duration::from_secs(config.heartbeat_interval.as_secs() * 3))
                    .build(),
            )
            .build();
        let _ = servers.create_index(servers_ttl).await;

        Ok(Self {
            rooms,
            sockets,
            messages,
            servers,
            config,
            server_id: RwLock::new(String::new()),
            subscription: RwLock::new(None),
        })
    }

    fn room_key(nsp: &str, room: &str) -> String {
        format!("{}:{}", nsp, room)
    }

    fn socket_key(nsp: &str, sid: &str) -> String {
        format!("{}:{}", nsp, sid)
    }

    async fn poll_loop(
        messages: Collection<MessageDoc>,
        self_server_id: String,
        handler: DeliveryHandler,
    ) {
        let mut last_seen = Utc::now();
        let mut interval = tokio::time::interval(Duration::from_millis(500));
        loop {
            interval.tick().await;
            let since = last_seen - chrono::Duration::seconds(1);
            let filter = doc! {
                "created_at": { "$gte": since },
                "server_id": { "$ne": &self_server_id },
            };
            let options = FindOptions::builder().sort(doc! { "created_at": 1 }).build();
            let mut cursor = match messages.find(filter).with_options(options).await {
                Ok(c) => c,
                Err(e) => {
                    warn!(error = %e, "mongo adapter: poll query failed");
                    continue;
                }
            };
            while let Some(doc) = cursor.next().await {
                match doc {
                    Ok(message) => {
                        last_seen = last_seen.max(message.created_at);
                        handler(message.envelope);
                    }
                    Err(e) => warn!(error = %e, "mongo adapter: poll cursor error"),
                }
            }
        }
    }
}

#[async_trait]
impl Adapter for MongoAdapter {
    async fn init(&self, server_id: &str) {
        *self.server_id.write().await = server_id.to_owned();
        self.register_server().await;
    }

    async fn close(&self) {
        self.unsubscribe().await;
        self.unregister_server().await;
    }

    async fn add_socket_to_room(&self, nsp: &str, sid: &str, room: &str) -> Result<(), AdapterError> {
        let room_key = Self::room_key(nsp, room);
        let socket_key = Self::socket_key(nsp, sid);
        let room_result = self
            .rooms
            .update_one(
                doc! { "_id": &room_key },
                doc! { "$addToSet": { "members": sid } },
            )
            .upsert(true)
            .await;
        let socket_result = self
            .sockets
            .update_one(
                doc! { "_id": &socket_key },
                doc! { "$addToSet": { "rooms": room } },
            )
            .upsert(true)
            .await;
        if let Err(e) = room_result.and(socket_result.map_err(Into::into)) {
            warn!(error = %e, nsp, sid, room, "mongo adapter: add_socket_to_room failed");
        }
        Ok(())
    }

    async fn remove_socket_from_room(
        &self,
        nsp: &str,
        sid: &str,
        room: &str,
    ) -> Result<(), AdapterError> {
        let room_key = Self::room_key(nsp, room);
        let socket_key = Self::socket_key(nsp, sid);
        let room_result = self
            .rooms
            .update_one(doc! { "_id": &room_key }, doc! { "$pull": { "members": sid } })
            .await;
        let socket_result = self
            .sockets
            .update_one(
                doc! { "_id": &socket_key },
                doc! { "$pull": { "rooms": room } },
            )
            .await;
        if let Err(e) = room_result.and(socket_result.map_err(Into::into)) {
            warn!(error = %e, nsp, sid, room, "mongo adapter: remove_socket_from_room failed");
        }
        Ok(())
    }

    async fn remove_socket_from_all_rooms(&self, nsp: &str, sid: &str) -> Result<(), AdapterError> {
        let rooms = self.rooms_for_socket(nsp, sid).await;
        for room in rooms {
            self.remove_socket_from_room(nsp, sid, &room).await?;
        }
        let socket_key = Self::socket_key(nsp, sid);
        if let Err(e) = self.sockets.delete_one(doc! { "_id": &socket_key }).await {
            warn!(error = %e, nsp, sid, "mongo adapter: cleanup failed");
        }
        Ok(())
    }

    async fn sockets_in_room(&self, nsp: &str, room: &str) -> Vec<String> {
        let room_key = Self::room_key(nsp, room);
        match self.rooms.find_one(doc! { "_id": &room_key }).await {
            Ok(Some(doc)) => doc.members,
            _ => Vec::new(),
        }
    }

    async fn rooms_for_socket(&self, nsp: &str, sid: &str) -> Vec<String> {
        let socket_key = Self::socket_key(nsp, sid);
        match self.sockets.find_one(doc! { "_id": &socket_key }).await {
            Ok(Some(doc)) => doc.rooms,
            _ => Vec::new(),
        }
    }

    async fn broadcast(&self, mut envelope: BroadcastEnvelope) -> Result<(), AdapterError> {
        envelope.server_id = self.server_id.read().await.clone();
        let message = MessageDoc {
            server_id: envelope.server_id.clone(),
            envelope,
            created_at: Utc::now(),
        };
        if let Err(e) = self.messages.insert_one(message).await {
            warn!(error = %e, "mongo adapter: broadcast insert failed");
        }
        Ok(())
    }

    async fn broadcast_to_room(
        &self,
        _room: &str,
        envelope: BroadcastEnvelope,
    ) -> Result<(), AdapterError> {
        // Room scoping lives in `envelope.room`; the message log is shared
        // and every subscriber filters by server_id on receipt.
        self.broadcast(envelope).await
    }

    async fn subscribe(&self, handler: DeliveryHandler) {
        self.unsubscribe().await;
        let self_server_id = self.server_id.read().await.clone();
        let messages = self.messages.clone();

        let handle = tokio::spawn(async move {
            match messages
                .watch()
                .full_document(mongodb::options::FullDocumentType::UpdateLookup)
                .await
            {
                Ok(mut stream) => {
                    while let Some(event) = stream.next().await {
                        match event {
                            Ok(change) => {
                                if let Some(message) = change.full_document {
                                    if message.server_id == self_server_id {
                                        continue;
                                    }
                                    handler(message.envelope);
                                }
                            }
                            Err(e) => debug!(error = %e, "mongo adapter: change stream error"),
                        }
                    }
                }
                Err(e) => {
                    // Not a replica set (or change streams unavailable):
                    // fall back to polling (§4.E).
                    debug!(error = %e, "mongo adapter: change streams unavailable, polling instead");
                    MongoAdapter::poll_loop(messages, self_server_id, handler).await;
                }
            }
        });

        *self.subscription.write().await = Some(handle);
    }

    async fn unsubscribe(&self) {
        if let Some(handle) = self.subscription.write().await.take() {
            handle.abort();
        }
    }

    async fn server_ids(&self) -> Vec<String> {
        let mut cursor = match self.servers.find(doc! {}).await {
            Ok(c) => c,
            Err(_) => return Vec::new(),
        };
        let mut ids = Vec::new();
        while let Some(doc) = cursor.next().await {
            if let Ok(server) = doc {
                ids.push(server.id);
            }
        }
        ids
    }

    async fn register_server(&self) {
        let server_id = self.server_id.read().await.clone();
        if server_id.is_empty() {
            return;
        }
        let result = self
            .servers
            .update_one(
                doc! { "_id": &server_id },
                doc! { "$set": { "last_heartbeat": Utc::now() } },
            )
            .upsert(true)
            .await;
        if let Err(e) = result {
            warn!(error = %e, server_id, "mongo adapter: heartbeat registration failed");
        }
    }

    async fn unregister_server(&self) {
        let server_id = self.server_id.read().await.clone();
        if server_id.is_empty() {
            return;
        }
        let _ = self.servers.delete_one(doc! { "_id": &server_id }).await;
    }
}
