use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use serde_json::Value;
use socketio_proto::SocketPacket;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{error, warn};

use crate::broadcast::BroadcastBuilder;
use crate::namespace::Namespace;

/// Channel the Socket.IO layer writes encoded packet text into; the Engine
/// session consuming the other end wraps each item in a single MESSAGE
/// Engine packet (§4.D "send one MESSAGE Engine packet carrying the
/// encoding").
pub type OutgoingSender = UnboundedSender<String>;

/// Invoked once with the ack payload. `None` id is never dropped silently
/// after being registered: unknown ids on incoming ACKs are ignored, but a
/// registered callback is always either invoked or (on session teardown)
/// dropped without being called.
pub type AckCallback = Box<dyn FnOnce(Option<Value>) + Send>;

/// Handed to an event listener when the incoming packet carried an ack id.
/// Calling it exactly once sends an ACK packet back to the client carrying
/// the same id.
pub struct Reply {
    socket: Weak<Socket>,
    id: u64,
}

impl Reply {
    pub fn send(self, data: Option<Value>) {
        if let Some(socket) = self.socket.upgrade() {
            socket.send_ack(self.id, data);
        }
    }
}

pub type EventHandler = Arc<dyn Fn(Option<Value>, Option<Reply>) + Send + Sync>;
pub type DisconnectHandler = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Default)]
struct SocketState {
    listeners: HashMap<String, Vec<EventHandler>>,
    disconnect_listeners: Vec<DisconnectHandler>,
    pending_acks: HashMap<u64, AckCallback>,
    data: Value,
}

/// Per client per namespace (§3). `id` equals the underlying Engine.IO
/// `sid`. Room membership is tracked by the owning [`Namespace`], not
/// here — this type only knows how to *ask* the namespace to update it.
pub struct Socket {
    pub id: String,
    pub nsp: String,
    connected: AtomicBool,
    next_ack_id: AtomicU64,
    sender: OutgoingSender,
    state: Mutex<SocketState>,
    namespace: RwLock<Weak<Namespace>>,
}

impl Socket {
    pub fn new(id: impl Into<String>, nsp: impl Into<String>, sender: OutgoingSender) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            nsp: nsp.into(),
            connected: AtomicBool::new(true),
            next_ack_id: AtomicU64::new(0),
            sender,
            state: Mutex::new(SocketState::default()),
            namespace: RwLock::new(Weak::new()),
        })
    }

    pub(crate) fn bind_namespace(&self, namespace: Weak<Namespace>) {
        *self.namespace.write().unwrap() = namespace;
    }

    fn namespace(&self) -> Option<Arc<Namespace>> {
        self.namespace.read().unwrap().upgrade()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn data(&self) -> Value {
        self.state.lock().unwrap().data.clone()
    }

    pub fn set_data(&self, data: Value) {
        self.state.lock().unwrap().data = data;
    }

    /// Register a listener for `event`. Order of registration is the order
    /// listeners run in.
    pub fn on(&self, event: impl Into<String>, handler: EventHandler) {
        self.state
            .lock()
            .unwrap()
            .listeners
            .entry(event.into())
            .or_default()
            .push(handler);
    }

    pub fn on_disconnect(&self, handler: DisconnectHandler) {
        self.state.lock().unwrap().disconnect_listeners.push(handler);
    }

    /// `socket.emit(name, arg, cb?)` (§4.D). If `cb` is present, allocates
    /// an ack id and registers the callback before sending.
    pub fn emit(&self, name: &str, arg: Option<Value>, cb: Option<AckCallback>) {
        let id = cb.map(|cb| {
            let id = self.next_ack_id.fetch_add(1, Ordering::SeqCst);
            self.state.lock().unwrap().pending_acks.insert(id, cb);
            id
        });
        let packet = SocketPacket::event(self.nsp.clone(), id, name, arg);
        let encoded = socketio_proto::encode(&packet);
        let _ = self.sender.send(encoded);
    }

    fn send_ack(&self, id: u64, data: Option<Value>) {
        let packet = SocketPacket::ack(self.nsp.clone(), id, data);
        let encoded = socketio_proto::encode(&packet);
        let _ = self.sender.send(encoded);
    }

    /// Look up `pendingAcks[id]`; if present, remove and invoke with the
    /// ACK payload. Unknown ids are silently ignored (§4.D ack correlation).
    pub fn handle_ack(&self, id: u64, data: Option<Value>) {
        let cb = self.state.lock().unwrap().pending_acks.remove(&id);
        if let Some(cb) = cb {
            cb(data);
        }
    }

    /// Dispatch an incoming EVENT/BINARY_EVENT packet: if `id` is present,
    /// a [`Reply`] is handed to every listener. Listener panics are caught
    /// and logged; other listeners still run (§4.D).
    pub fn handle_event(self: &Arc<Self>, packet: &SocketPacket) {
        let Some((name, arg)) = packet.event_name_and_arg() else {
            warn!(sid = %self.id, "event packet missing name/arg, dropping");
            return;
        };
        let name = name.to_owned();
        let arg = arg.cloned();
        let handlers = {
            let state = self.state.lock().unwrap();
            state.listeners.get(&name).cloned().unwrap_or_default()
        };
        for handler in handlers {
            let reply = packet.id.map(|id| Reply {
                socket: Arc::downgrade(self),
                id,
            });
            let arg = arg.clone();
            let result = std::panic::catch_unwind(AssertUnwindSafe(|| handler(arg, reply)));
            if let Err(panic) = result {
                error!(sid = %self.id, event = %name, ?panic, "event listener panicked");
            }
        }
    }

    pub async fn join(&self, room: impl Into<String>) {
        if let Some(ns) = self.namespace() {
            ns.join(&self.id, &room.into()).await;
        }
    }

    pub async fn leave(&self, room: impl Into<String>) {
        if let Some(ns) = self.namespace() {
            ns.leave(&self.id, &room.into()).await;
        }
    }

    pub fn rooms(&self) -> Vec<String> {
        self.namespace()
            .map(|ns| ns.local_rooms_for_socket(&self.id))
            .unwrap_or_default()
    }

    /// `socket.to(room)`: excludes the caller by convention (§4.D).
    pub fn to(self: &Arc<Self>, room: impl Into<String>) -> BroadcastBuilder {
        let ns = self.namespace().expect("socket detached from namespace");
        BroadcastBuilder::new(ns, Some(self.id.clone())).to(room)
    }

    /// `socket.broadcast`: `except(self).emit` over the whole namespace.
    pub fn broadcast(self: &Arc<Self>) -> BroadcastBuilder {
        let ns = self.namespace().expect("socket detached from namespace");
        BroadcastBuilder::new(ns, Some(self.id.clone()))
    }

    /// Sends `(DISCONNECT, nsp, reason?)`, releases rooms, and fires
    /// `"disconnect"` listeners exactly once. Does not decide whether to
    /// close the underlying Engine session — that is the caller's call,
    /// following §4.D's rule that implementations must not raise either
    /// way.
    pub async fn disconnect(self: &Arc<Self>, reason: Option<&str>) {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return;
        }
        let packet = SocketPacket::disconnect(self.nsp.clone());
        let encoded = socketio_proto::encode(&packet);
        let _ = self.sender.send(encoded);
        if let Some(ns) = self.namespace() {
            ns.remove_socket(&self.id).await;
        }
        let reason = reason.unwrap_or("server disconnect");
        let listeners = std::mem::take(&mut self.state.lock().unwrap().disconnect_listeners);
        for listener in listeners {
            listener(reason);
        }
    }

    pub(crate) fn deliver_encoded(&self, encoded: String) {
        let _ = self.sender.send(encoded);
    }
}

impl std::fmt::Debug for Socket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Socket")
            .field("id", &self.id)
            .field("nsp", &self.nsp)
            .field("connected", &self.is_connected())
            .finish()
    }
}
