//! The Socket.IO client façade (§4.F): connect/reconnect state machine,
//! namespace CONNECT handshake, ack correlation, and the offline queue,
//! wired together the way the teacher's `receiver/src/session.rs` wires a
//! `tokio::select!` read loop around a `watch::Receiver<bool>` shutdown
//! signal — generalized here to also drive the reconnect loop itself.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::warn;

use crate::config::ClientConfig;
use crate::engine::{self, EngineHandle};
use crate::error::ClientError;
use crate::offline_queue::OfflineQueue;
use crate::reconnect::{ConnectionState, ReconnectPolicy, TransportKind};
use crate::transport::PacketReceiver;

/// Handed to an event listener when the incoming packet carried an ack id
/// (mirrors `socketio_core::socket::Reply`, generalized to the client
/// side: a server-emitted event can request an ack too).
pub struct Reply {
    id: u64,
    nsp: String,
    engine: Arc<Mutex<Option<EngineHandle>>>,
}

impl Reply {
    pub async fn send(&self, data: Option<Value>) {
        let handle = { self.engine.lock().await.clone() };
        if let Some(handle) = handle {
            let packet = socketio_proto::SocketPacket::ack(self.nsp.clone(), self.id, data);
            let text = socketio_proto::encode(&packet);
            let _ = handle.send(engineio_proto::Packet::message(text)).await;
        }
    }
}

pub type EventHandler = Arc<dyn Fn(Option<Value>, Option<Arc<Reply>>) + Send + Sync>;
pub type AckHandler = Box<dyn FnOnce(Option<Value>) + Send>;
pub type LifecycleHandler = Arc<dyn Fn() + Send + Sync>;
pub type DisconnectHandler = Arc<dyn Fn(&str) + Send + Sync>;
pub type ErrorHandler = Arc<dyn Fn(&str) + Send + Sync>;
pub type ReconnectingHandler = Arc<dyn Fn(u32) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    event: HashMap<String, Vec<EventHandler>>,
    connect: Vec<LifecycleHandler>,
    disconnect: Vec<DisconnectHandler>,
    connect_error: Vec<ErrorHandler>,
    reconnecting: Vec<ReconnectingHandler>,
    reconnect_failed: Vec<LifecycleHandler>,
}

struct ClientState {
    connection: ConnectionState,
    intentional_disconnect: bool,
    pending_acks: HashMap<u64, AckHandler>,
    next_ack_id: u64,
}

/// A Socket.IO client connected to one namespace. Construct with
/// [`Client::new`], register listeners with [`Client::on`] and friends,
/// then call [`Client::connect`].
pub struct Client {
    config: ClientConfig,
    nsp: String,
    listeners: Mutex<Listeners>,
    state: Mutex<ClientState>,
    offline_queue: Mutex<OfflineQueue>,
    engine: Arc<Mutex<Option<EngineHandle>>>,
    reconnect: Mutex<ReconnectPolicy>,
    shutdown_tx: watch::Sender<bool>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl Client {
    pub fn new(config: ClientConfig) -> Arc<Self> {
        let transports = TransportKind::parse_list(&config.transports);
        let reconnect = ReconnectPolicy::new(
            transports,
            Duration::from_millis(config.reconnection_delay_ms),
            Duration::from_millis(config.reconnection_delay_max_ms),
        );
        let offline_queue = OfflineQueue::new(
            config.offline_queue_capacity,
            Duration::from_secs(config.offline_queue_max_age_secs),
        );
        let nsp = config.namespace.clone();
        let (shutdown_tx, _) = watch::channel(false);
        Arc::new(Self {
            config,
            nsp,
            listeners: Mutex::new(Listeners::default()),
            state: Mutex::new(ClientState {
                connection: ConnectionState::Idle,
                intentional_disconnect: false,
                pending_acks: HashMap::new(),
                next_ack_id: 0,
            }),
            offline_queue: Mutex::new(offline_queue),
            engine: Arc::new(Mutex::new(None)),
            reconnect: Mutex::new(reconnect),
            shutdown_tx,
            driver: Mutex::new(None),
        })
    }

    // -- listener registration -------------------------------------------

    pub async fn on(&self, event: impl Into<String>, handler: EventHandler) {
        self.listeners
            .lock()
            .await
            .event
            .entry(event.into())
            .or_default()
            .push(handler);
    }

    pub async fn on_connect(&self, handler: LifecycleHandler) {
        self.listeners.lock().await.connect.push(handler);
    }

    pub async fn on_disconnect(&self, handler: DisconnectHandler) {
        self.listeners.lock().await.disconnect.push(handler);
    }

    pub async fn on_connect_error(&self, handler: ErrorHandler) {
        self.listeners.lock().await.connect_error.push(handler);
    }

    pub async fn on_reconnecting(&self, handler: ReconnectingHandler) {
        self.listeners.lock().await.reconnecting.push(handler);
    }

    pub async fn on_reconnect_failed(&self, handler: LifecycleHandler) {
        self.listeners.lock().await.reconnect_failed.push(handler);
    }

    pub async fn connection_state(&self) -> ConnectionState {
        self.state.lock().await.connection
    }

    // -- connect / disconnect ---------------------------------------------

    /// Starts the reconnect-driving background task if it isn't already
    /// running. Idempotent: calling `connect()` on an already-connecting
    /// or already-connected client is a no-op.
    pub async fn connect(self: &Arc<Self>) {
        let mut driver = self.driver.lock().await;
        if driver.is_some() {
            return;
        }
        {
            let mut state = self.state.lock().await;
            state.intentional_disconnect = false;
        }
        let _ = self.shutdown_tx.send(false);
        let rx = self.shutdown_tx.subscribe();
        let this = Arc::clone(self);
        *driver = Some(tokio::spawn(async move {
            this.run_driver(rx).await;
        }));
    }

    /// User-initiated disconnect (§4.F "Cancellation"): aborts any
    /// in-flight transport, clears reconnect timers, and marks the
    /// subsequent `"disconnect"` as intentional so the driver does not
    /// reconnect. The offline queue is left to age out naturally rather
    /// than being cleared synchronously, matching "entries left behind
    /// are permitted to age out".
    pub async fn disconnect(&self) {
        {
            let mut state = self.state.lock().await;
            state.intentional_disconnect = true;
        }
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.engine.lock().await.take() {
            let disconnect_packet = socketio_proto::SocketPacket::disconnect(self.nsp.clone());
            let text = socketio_proto::encode(&disconnect_packet);
            let _ = handle.send(engineio_proto::Packet::message(text)).await;
            handle.close().await;
        }
        if let Some(handle) = self.driver.lock().await.take() {
            let _ = handle.await;
        }
    }

    // -- emit --------------------------------------------------------------

    /// `socket.emit(name, arg)` with no ack. Queues onto the offline
    /// buffer when not connected (§3, §8 property 8).
    pub async fn emit(&self, event: &str, data: Option<Value>) {
        if matches!(self.connection_state().await, ConnectionState::Connected) {
            let handle = { self.engine.lock().await.clone() };
            if let Some(handle) = handle {
                let packet = socketio_proto::SocketPacket::event(self.nsp.clone(), None, event, data.clone());
                let text = socketio_proto::encode(&packet);
                if handle.send(engineio_proto::Packet::message(text)).await.is_ok() {
                    return;
                }
            }
        }
        self.offline_queue.lock().await.push(event, data);
    }

    /// `socket.emit(name, arg, cb)`. Unlike the plain `emit`, this requires
    /// an active connection — an ack can only be queued if there is
    /// somewhere for the reply to land.
    pub async fn emit_with_ack(
        &self,
        event: &str,
        data: Option<Value>,
        cb: AckHandler,
    ) -> Result<(), ClientError> {
        if !matches!(self.connection_state().await, ConnectionState::Connected) {
            return Err(ClientError::NotConnected);
        }
        let handle = { self.engine.lock().await.clone() };
        let Some(handle) = handle else {
            return Err(ClientError::NotConnected);
        };
        let id = {
            let mut state = self.state.lock().await;
            let id = state.next_ack_id;
            state.next_ack_id += 1;
            state.pending_acks.insert(id, cb);
            id
        };
        let packet = socketio_proto::SocketPacket::event(self.nsp.clone(), Some(id), event, data);
        let text = socketio_proto::encode(&packet);
        handle.send(engineio_proto::Packet::message(text)).await
    }

    async fn flush_offline_queue(&self) {
        let queued = self.offline_queue.lock().await.drain();
        for entry in queued {
            self.emit(&entry.event, entry.data).await;
        }
    }

    // -- lifecycle firing ----------------------------------------------

    async fn fire_connect(&self) {
        let handlers = self.listeners.lock().await.connect.clone();
        for h in handlers {
            h();
        }
    }

    async fn fire_disconnect(&self, reason: &str) {
        let handlers = self.listeners.lock().await.disconnect.clone();
        for h in handlers {
            h(reason);
        }
    }

    async fn fire_connect_error(&self, message: &str) {
        let handlers = self.listeners.lock().await.connect_error.clone();
        for h in handlers {
            h(message);
        }
    }

    async fn fire_reconnecting(&self, attempt: u32) {
        let handlers = self.listeners.lock().await.reconnecting.clone();
        for h in handlers {
            h(attempt);
        }
    }

    async fn fire_reconnect_failed(&self) {
        let handlers = self.listeners.lock().await.reconnect_failed.clone();
        for h in handlers {
            h();
        }
    }

    // -- the driver loop -----------------------------------------------

    async fn run_driver(self: Arc<Self>, mut shutdown_rx: watch::Receiver<bool>) {
        loop {
            if *shutdown_rx.borrow() {
                return;
            }
            self.state.lock().await.connection = ConnectionState::Connecting;
            let kind = { self.reconnect.lock().await.current_transport() };

            match self.try_connect(kind).await {
                Ok((handle, mut rx)) => {
                    *self.engine.lock().await = Some(handle.clone());
                    self.state.lock().await.connection = ConnectionState::Connected;
                    self.reconnect.lock().await.on_success();
                    self.fire_connect().await;
                    self.flush_offline_queue().await;

                    let reason = self.read_loop(&handle, &mut rx, &mut shutdown_rx).await;
                    self.engine.lock().await.take();
                    self.state.lock().await.connection = ConnectionState::Offline;
                    self.fire_disconnect(&reason).await;

                    let intentional = self.state.lock().await.intentional_disconnect;
                    if intentional || !self.config.reconnection {
                        return;
                    }
                }
                Err(e) => {
                    self.fire_connect_error(&e.to_string()).await;
                }
            }

            if *shutdown_rx.borrow() || !self.config.reconnection {
                return;
            }

            let delay = { self.reconnect.lock().await.on_failure() };
            let attempt = { self.reconnect.lock().await.consecutive_errors() };
            if let Some(max) = self.config.reconnection_attempts {
                if attempt > max {
                    self.fire_reconnect_failed().await;
                    return;
                }
            }
            self.fire_reconnecting(attempt).await;

            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => { return; }
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Engine.IO connect + the Socket.IO CONNECT/CONNECT_ERROR handshake
    /// round-trip for this client's namespace (§4.D "Connection
    /// admission", from the client's side).
    async fn try_connect(
        &self,
        kind: TransportKind,
    ) -> Result<(EngineHandle, PacketReceiver), ClientError> {
        let base_url = self.config.engine_base_url();
        let (handle, mut rx, _info) = engine::connect(&base_url, kind).await?;

        let connect_packet = socketio_proto::SocketPacket::connect(self.nsp.clone());
        let text = socketio_proto::encode(&connect_packet);
        handle.send(engineio_proto::Packet::message(text)).await?;

        let timeout = Duration::from_millis(self.config.timeout_ms);
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Err(ClientError::Timeout);
            }
            let next = tokio::time::timeout(remaining, engine::recv_app_packet(&handle, &mut rx))
                .await
                .map_err(|_| ClientError::Timeout)?;
            let packet = match next {
                Some(Ok(p)) => p,
                Some(Err(e)) => return Err(e),
                None => return Err(ClientError::Disconnected),
            };
            if matches!(packet.packet_type, engineio_proto::PacketType::Close) {
                return Err(ClientError::Disconnected);
            }
            let Some(text) = engine::message_text(&packet) else {
                continue;
            };
            let sp = socketio_proto::decode(text)?;
            if sp.nsp != self.nsp {
                continue;
            }
            match sp.packet_type {
                socketio_proto::PacketType::Connect => return Ok((handle, rx)),
                socketio_proto::PacketType::ConnectError => {
                    let message = sp
                        .data
                        .as_ref()
                        .and_then(|v| v.as_str())
                        .unwrap_or("connect error")
                        .to_owned();
                    return Err(ClientError::ConnectRejected(message));
                }
                _ => continue,
            }
        }
    }

    /// Drains packets for the life of one connection, dispatching
    /// EVENT/ACK/DISCONNECT. Returns the disconnect reason once the
    /// connection ends (server close, transport error, or shutdown).
    async fn read_loop(
        &self,
        handle: &EngineHandle,
        rx: &mut PacketReceiver,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> String {
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        return "io client disconnect".to_owned();
                    }
                }
                next = engine::recv_app_packet(handle, rx) => {
                    match next {
                        None => return "transport close".to_owned(),
                        Some(Err(e)) => {
                            warn!(error = %e, "engine.io transport error");
                            return format!("transport error: {e}");
                        }
                        Some(Ok(packet)) => {
                            if matches!(packet.packet_type, engineio_proto::PacketType::Close) {
                                return "transport close".to_owned();
                            }
                            let Some(text) = engine::message_text(&packet) else { continue };
                            match socketio_proto::decode(text) {
                                Ok(sp) if sp.nsp == self.nsp => {
                                    if let Some(reason) = self.dispatch(sp).await {
                                        return reason;
                                    }
                                }
                                Ok(_) => {}
                                Err(e) => warn!(error = %e, "malformed socket.io packet, dropping"),
                            }
                        }
                    }
                }
            }
        }
    }

    /// Dispatches one decoded packet for this namespace. Returns
    /// `Some(reason)` if the packet ends the connection (a server
    /// DISCONNECT).
    async fn dispatch(&self, packet: socketio_proto::SocketPacket) -> Option<String> {
        match packet.packet_type {
            socketio_proto::PacketType::Event | socketio_proto::PacketType::BinaryEvent => {
                if let Some((name, arg)) = packet.event_name_and_arg() {
                    let handlers = {
                        self.listeners
                            .lock()
                            .await
                            .event
                            .get(name)
                            .cloned()
                            .unwrap_or_default()
                    };
                    let reply = packet.id.map(|id| {
                        Arc::new(Reply {
                            id,
                            nsp: packet.nsp.clone(),
                            engine: Arc::clone(&self.engine),
                        })
                    });
                    let arg = arg.cloned();
                    for handler in handlers {
                        handler(arg.clone(), reply.clone());
                    }
                }
                None
            }
            socketio_proto::PacketType::Ack | socketio_proto::PacketType::BinaryAck => {
                if let Some(id) = packet.id {
                    let cb = self.state.lock().await.pending_acks.remove(&id);
                    if let Some(cb) = cb {
                        cb(packet.data);
                    }
                }
                None
            }
            socketio_proto::PacketType::Disconnect => Some("io server disconnect".to_owned()),
            socketio_proto::PacketType::ConnectError => {
                let message = packet
                    .data
                    .as_ref()
                    .and_then(|v| v.as_str())
                    .unwrap_or("connect error")
                    .to_owned();
                self.fire_connect_error(&message).await;
                None
            }
            socketio_proto::PacketType::Connect => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_starts_idle() {
        let client = Client::new(ClientConfig::default());
        assert!(client.driver.try_lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn connection_state_defaults_to_idle() {
        let client = Client::new(ClientConfig::default());
        assert_eq!(client.connection_state().await, ConnectionState::Idle);
    }

    #[tokio::test]
    async fn emit_while_disconnected_enqueues_offline() {
        let client = Client::new(ClientConfig::default());
        client.emit("greet", Some(Value::String("hi".into()))).await;
        assert_eq!(client.offline_queue.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn emit_with_ack_requires_a_connection() {
        let client = Client::new(ClientConfig::default());
        let result = client
            .emit_with_ack("greet", None, Box::new(|_| {}))
            .await;
        assert!(matches!(result, Err(ClientError::NotConnected)));
    }
}
