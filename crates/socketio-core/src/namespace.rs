use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::num::NonZeroUsize;
use std::pin::Pin;
use std::sync::{Arc, Mutex as StdMutex, RwLock, Weak};

use lru::LruCache;
use serde_json::Value;
use socketio_adapter::{Adapter, BroadcastEnvelope, DeliveryHandler};
use socketio_proto::SocketPacket;
use tracing::warn;

use crate::broadcast::BroadcastBuilder;
use crate::handshake::Handshake;
use crate::socket::Socket;

const DEFAULT_MESSAGE_CACHE_CAPACITY: usize = 1000;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
pub type MiddlewareFn = Arc<dyn Fn(Handshake) -> BoxFuture<'static, Result<(), String>> + Send + Sync>;
pub type ConnectionHandler = Arc<dyn Fn(Arc<Socket>) + Send + Sync>;

#[derive(Default)]
struct NamespaceInner {
    sockets: HashMap<String, Arc<Socket>>,
    local_rooms: HashMap<String, HashSet<String>>,
    socket_to_rooms: HashMap<String, HashSet<String>>,
    connection_listeners: Vec<ConnectionHandler>,
    middlewares: Vec<MiddlewareFn>,
}

/// `(name, sockets, localRooms, socketToRooms, listeners, middlewares,
/// adapter)` from §3. Each namespace owns one `RwLock` (not a single
/// global lock across namespaces, §5) and its own message cache.
pub struct Namespace {
    name: String,
    server_id: String,
    adapter: Arc<dyn Adapter>,
    inner: RwLock<NamespaceInner>,
    message_cache: StdMutex<LruCache<String, String>>,
}

impl Namespace {
    fn new(name: impl Into<String>, server_id: String, adapter: Arc<dyn Adapter>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            server_id,
            adapter,
            inner: RwLock::new(NamespaceInner::default()),
            message_cache: StdMutex::new(LruCache::new(
                NonZeroUsize::new(DEFAULT_MESSAGE_CACHE_CAPACITY).unwrap(),
            )),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn use_middleware(&self, middleware: MiddlewareFn) {
        self.inner.write().unwrap().middlewares.push(middleware);
    }

    pub fn on_connection(&self, handler: ConnectionHandler) {
        self.inner
            .write()
            .unwrap()
            .connection_listeners
            .push(handler);
    }

    /// Runs the middleware chain in registration order. The first
    /// non-empty error aborts admission (§4.D).
    pub async fn run_middlewares(&self, handshake: &Handshake) -> Result<(), String> {
        let middlewares = self.inner.read().unwrap().middlewares.clone();
        for mw in middlewares {
            mw(handshake.clone()).await?;
        }
        Ok(())
    }

    /// Places `socket` in `N.sockets` and fires `"connection"` listeners
    /// (admission step 4 in §4.D; step 5, sending CONNECT back, is the
    /// caller's job since it owns the transport).
    pub fn add_socket(self: &Arc<Self>, socket: Arc<Socket>) {
        socket.bind_namespace(Arc::downgrade(self));
        let listeners = {
            let mut inner = self.inner.write().unwrap();
            inner.sockets.insert(socket.id.clone(), socket.clone());
            inner.connection_listeners.clone()
        };
        for listener in listeners {
            listener(socket.clone());
        }
    }

    pub fn socket(&self, sid: &str) -> Option<Arc<Socket>> {
        self.inner.read().unwrap().sockets.get(sid).cloned()
    }

    pub fn sockets(&self) -> Vec<Arc<Socket>> {
        self.inner.read().unwrap().sockets.values().cloned().collect()
    }

    pub fn socket_count(&self) -> usize {
        self.inner.read().unwrap().sockets.len()
    }

    /// Destroys the socket: removes it from `N.sockets` and releases every
    /// room it held, locally and in the adapter (§3 socket lifecycle).
    pub async fn remove_socket(&self, sid: &str) {
        {
            let mut inner = self.inner.write().unwrap();
            inner.sockets.remove(sid);
            let rooms = inner.socket_to_rooms.remove(sid).unwrap_or_default();
            for room in &rooms {
                if let Some(members) = inner.local_rooms.get_mut(room) {
                    members.remove(sid);
                    if members.is_empty() {
                        inner.local_rooms.remove(room);
                    }
                }
            }
        }
        if let Err(e) = self.adapter.remove_socket_from_all_rooms(&self.name, sid).await {
            warn!(error = %e, nsp = %self.name, sid, "adapter remove_socket_from_all_rooms failed");
        }
    }

    /// `socket.join(r)`: updates the namespace-local indices and notifies
    /// the adapter. The local-index update never suspends (§5); the
    /// adapter notification does.
    pub async fn join(&self, sid: &str, room: &str) {
        {
            let mut inner = self.inner.write().unwrap();
            inner
                .local_rooms
                .entry(room.to_owned())
                .or_default()
                .insert(sid.to_owned());
            inner
                .socket_to_rooms
                .entry(sid.to_owned())
                .or_default()
                .insert(room.to_owned());
        }
        if let Err(e) = self.adapter.add_socket_to_room(&self.name, sid, room).await {
            warn!(error = %e, nsp = %self.name, sid, room, "adapter add_socket_to_room failed");
        }
    }

    /// `socket.leave(r)`: the inverse of [`Namespace::join`].
    pub async fn leave(&self, sid: &str, room: &str) {
        {
            let mut inner = self.inner.write().unwrap();
            if let Some(members) = inner.local_rooms.get_mut(room) {
                members.remove(sid);
                if members.is_empty() {
                    inner.local_rooms.remove(room);
                }
            }
            if let Some(rooms) = inner.socket_to_rooms.get_mut(sid) {
                rooms.remove(room);
            }
        }
        if let Err(e) = self
            .adapter
            .remove_socket_from_room(&self.name, sid, room)
            .await
        {
            warn!(error = %e, nsp = %self.name, sid, room, "adapter remove_socket_from_room failed");
        }
    }

    pub fn local_rooms_for_socket(&self, sid: &str) -> Vec<String> {
        self.inner
            .read()
            .unwrap()
            .socket_to_rooms
            .get(sid)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn local_sockets_in_room(&self, room: &str) -> Vec<String> {
        self.inner
            .read()
            .unwrap()
            .local_rooms
            .get(room)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// `namespace.to(r).emit(...)`: unlike `socket.to`, does not exclude
    /// any socket.
    pub fn to(self: &Arc<Self>, room: impl Into<String>) -> BroadcastBuilder {
        BroadcastBuilder::new(self.clone(), None).to(room)
    }

    /// `namespace.emit(e, a)`: every socket in the namespace.
    pub async fn emit(self: &Arc<Self>, event: &str, data: Option<Value>) {
        BroadcastBuilder::new(self.clone(), None).emit(event, data).await;
    }

    /// `socket.broadcast.emit` / `socket.to(room).emit`: builds the
    /// message once, fans out to every currently-local target, then asks
    /// the adapter to propagate (§4.D).
    pub(crate) async fn dispatch_broadcast(
        self: &Arc<Self>,
        rooms: Vec<String>,
        except: HashSet<String>,
        exclude_self: Option<String>,
        event: &str,
        data: Option<Value>,
    ) {
        let targets = {
            let inner = self.inner.read().unwrap();
            let ids: HashSet<String> = if rooms.is_empty() {
                inner.sockets.keys().cloned().collect()
            } else {
                rooms
                    .iter()
                    .filter_map(|room| inner.local_rooms.get(room))
                    .flat_map(|set| set.iter().cloned())
                    .collect()
            };
            ids.into_iter()
                .filter(|id| !except.contains(id))
                .filter(|id| Some(id) != exclude_self.as_ref())
                .filter_map(|id| inner.sockets.get(&id).cloned())
                .collect::<Vec<_>>()
        };

        let packet = SocketPacket::event(self.name.clone(), None, event, data.clone());
        let data_str = data.as_ref().map(ToString::to_string).unwrap_or_default();
        let cache_key = format!("2:{}:{}:{}", self.name, event, data_str);
        let encoded = {
            let mut cache = self.message_cache.lock().unwrap();
            if let Some(hit) = cache.get(&cache_key) {
                hit.clone()
            } else {
                let encoded = socketio_proto::encode(&packet);
                cache.put(cache_key, encoded.clone());
                encoded
            }
        };

        for socket in &targets {
            socket.deliver_encoded(encoded.clone());
        }

        let base_envelope = BroadcastEnvelope {
            nsp: self.name.clone(),
            room: None,
            event: Some(event.to_owned()),
            data,
            packet: Some(encoded),
            exclude_socket_id: exclude_self,
            server_id: self.server_id.clone(),
        };
        if rooms.is_empty() {
            if let Err(e) = self.adapter.broadcast(base_envelope).await {
                warn!(error = %e, nsp = %self.name, "adapter broadcast failed");
            }
        } else {
            for room in rooms {
                let mut envelope = base_envelope.clone();
                envelope.room = Some(room.clone());
                if let Err(e) = self.adapter.broadcast_to_room(&room, envelope).await {
                    warn!(error = %e, nsp = %self.name, room, "adapter broadcast_to_room failed");
                }
            }
        }
    }

    /// A remote envelope arrived from the adapter's subscription. Must
    /// translate it into *local-only* deliveries and never re-publish
    /// (§4.E, §8 cluster no-loop).
    pub fn deliver_remote(&self, envelope: &BroadcastEnvelope) {
        let inner = self.inner.read().unwrap();
        let targets: Vec<Arc<Socket>> = match &envelope.room {
            Some(room) => inner
                .local_rooms
                .get(room)
                .map(|ids| ids.iter().filter_map(|id| inner.sockets.get(id).cloned()).collect())
                .unwrap_or_default(),
            None => inner.sockets.values().cloned().collect(),
        };
        drop(inner);

        for socket in targets {
            if envelope.exclude_socket_id.as_deref() == Some(socket.id.as_str()) {
                continue;
            }
            let encoded = match &envelope.packet {
                Some(packet) => packet.clone(),
                None => {
                    let packet = SocketPacket::event(
                        self.name.clone(),
                        None,
                        envelope.event.as_deref().unwrap_or(""),
                        envelope.data.clone(),
                    );
                    socketio_proto::encode(&packet)
                }
            };
            socket.deliver_encoded(encoded);
        }
    }
}

/// Owns every namespace for one server process, creating them on demand
/// (§4.D "Namespace registration") and wiring the adapter's remote
/// envelopes back to the right namespace.
pub struct NamespaceRegistry {
    server_id: String,
    adapter: Arc<dyn Adapter>,
    namespaces: RwLock<HashMap<String, Arc<Namespace>>>,
}

impl NamespaceRegistry {
    pub fn new(server_id: impl Into<String>, adapter: Arc<dyn Adapter>) -> Arc<Self> {
        Arc::new(Self {
            server_id: server_id.into(),
            adapter,
            namespaces: RwLock::new(HashMap::new()),
        })
    }

    /// Resolve or create the namespace named `name`. Created on demand the
    /// first time either the server requests it or a client's CONNECT
    /// packet names it (§4.D).
    pub fn of(self: &Arc<Self>, name: &str) -> Arc<Namespace> {
        if let Some(ns) = self.namespaces.read().unwrap().get(name) {
            return ns.clone();
        }
        let mut namespaces = self.namespaces.write().unwrap();
        if let Some(ns) = namespaces.get(name) {
            return ns.clone();
        }
        let ns = Namespace::new(name, self.server_id.clone(), self.adapter.clone());
        namespaces.insert(name.to_owned(), ns.clone());
        ns
    }

    pub fn get(&self, name: &str) -> Option<Arc<Namespace>> {
        self.namespaces.read().unwrap().get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.namespaces.read().unwrap().keys().cloned().collect()
    }

    /// Subscribes to the adapter once at startup so remote envelopes are
    /// routed to the right local namespace and never re-broadcast.
    pub async fn start(self: &Arc<Self>) {
        self.adapter.init(&self.server_id).await;
        let registry = Arc::downgrade(self);
        let handler: DeliveryHandler = Arc::new(move |envelope| {
            if let Some(registry) = registry.upgrade() {
                if let Some(ns) = registry.get(&envelope.nsp) {
                    ns.deliver_remote(&envelope);
                }
            }
        });
        self.adapter.subscribe(handler).await;
    }

    pub async fn shutdown(&self) {
        self.adapter.unsubscribe().await;
        self.adapter.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use socketio_adapter::MemoryAdapter;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc::unbounded_channel;

    fn registry() -> Arc<NamespaceRegistry> {
        NamespaceRegistry::new("server-1", Arc::new(MemoryAdapter::new()))
    }

    #[tokio::test]
    async fn room_symmetry_holds_across_join_and_leave() {
        let registry = registry();
        let ns = registry.of("/");
        let (tx, _rx) = unbounded_channel();
        let socket = Socket::new("s1", "/", tx);
        ns.add_socket(socket.clone());

        ns.join("s1", "room-a").await;
        assert_eq!(ns.local_sockets_in_room("room-a"), vec!["s1"]);
        assert_eq!(ns.local_rooms_for_socket("s1"), vec!["room-a"]);

        ns.leave("s1", "room-a").await;
        assert!(ns.local_sockets_in_room("room-a").is_empty());
        assert!(ns.local_rooms_for_socket("s1").is_empty());
    }

    #[tokio::test]
    async fn self_exclusion_in_socket_to_emit() {
        let registry = registry();
        let ns = registry.of("/");
        let (tx_a, mut rx_a) = unbounded_channel();
        let (tx_b, mut rx_b) = unbounded_channel();
        let a = Socket::new("a", "/", tx_a);
        let b = Socket::new("b", "/", tx_b);
        ns.add_socket(a.clone());
        ns.add_socket(b.clone());
        a.join("r").await;
        b.join("r").await;

        a.to("r").emit("m", Some(serde_json::json!(1))).await;

        let received_by_b = rx_b.recv().await.expect("b should receive");
        assert!(received_by_b.contains("\"m\""));
        assert!(rx_a.try_recv().is_err(), "a must not receive its own broadcast");
    }

    #[tokio::test]
    async fn ack_correlation_invokes_callback_exactly_once() {
        let (tx, mut rx) = unbounded_channel();
        let socket = Socket::new("s1", "/", tx);
        let call_count = Arc::new(AtomicUsize::new(0));
        let call_count2 = call_count.clone();
        socket.emit(
            "e",
            Some(serde_json::json!("v")),
            Some(Box::new(move |data| {
                call_count2.fetch_add(1, Ordering::SeqCst);
                assert_eq!(data, Some(serde_json::json!(42)));
            })),
        );
        let _sent = rx.recv().await.unwrap();
        socket.handle_ack(0, Some(serde_json::json!(42)));
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
        // Second ack with the same id is now unknown and silently ignored.
        socket.handle_ack(0, Some(serde_json::json!(99)));
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn middleware_rejection_short_circuits_chain() {
        let registry = registry();
        let ns = registry.of("/");
        let second_ran = Arc::new(AtomicUsize::new(0));
        let second_ran2 = second_ran.clone();
        ns.use_middleware(Arc::new(|_hs| Box::pin(async { Err("nope".to_owned()) })));
        ns.use_middleware(Arc::new(move |_hs| {
            second_ran2.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(()) })
        }));

        let result = ns.run_middlewares(&Handshake::new("s1", "/")).await;
        assert_eq!(result, Err("nope".to_owned()));
        assert_eq!(second_ran.load(Ordering::SeqCst), 0);
    }
}
