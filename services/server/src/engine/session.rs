//! One Engine.IO session per connection (§3, §4.B): handshake record,
//! current transport, heartbeat bookkeeping, and upgrade/close semantics.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use engineio_proto::{Packet, PacketType, Payload};
use socketio_core::Handshake;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

use crate::filters::EncryptionFilter;
use crate::transport::{LongPollTransport, WebSocketTransport};

#[derive(Clone)]
pub enum ActiveTransport {
    LongPoll(Arc<LongPollTransport>),
    WebSocket(Arc<WebSocketTransport>),
}

/// Invoked exactly once when the session closes, used by the owning
/// manager to drop it from its session table.
type CloseCallback = Box<dyn FnOnce() + Send>;

pub struct EngineSession {
    pub sid: String,
    pub handshake: Handshake,
    transport: RwLock<ActiveTransport>,
    connected: AtomicBool,
    upgraded: AtomicBool,
    ping_generation: AtomicU64,
    ponged_generation: AtomicU64,
    ping_timeout: Duration,
    encryption: Option<Arc<EncryptionFilter>>,
    compression: bool,
    /// Decoded inner Socket.IO packet text, forwarded upward to whatever
    /// is driving namespace admission/dispatch for this session.
    message_tx: UnboundedSender<String>,
    close_callback: Mutex<Option<CloseCallback>>,
}

impl EngineSession {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sid: String,
        handshake: Handshake,
        longpoll: Arc<LongPollTransport>,
        ping_timeout: Duration,
        encryption: Option<Arc<EncryptionFilter>>,
        compression: bool,
        message_tx: UnboundedSender<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            sid,
            handshake,
            transport: RwLock::new(ActiveTransport::LongPoll(longpoll)),
            connected: AtomicBool::new(true),
            upgraded: AtomicBool::new(false),
            ping_generation: AtomicU64::new(0),
            ponged_generation: AtomicU64::new(0),
            ping_timeout,
            encryption,
            compression,
            message_tx,
            close_callback: Mutex::new(None),
        })
    }

    pub fn set_close_callback(&self, cb: CloseCallback) {
        *self.close_callback.lock().unwrap() = Some(cb);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn is_upgraded(&self) -> bool {
        self.upgraded.load(Ordering::SeqCst)
    }

    pub fn longpoll_transport(&self) -> Option<Arc<LongPollTransport>> {
        match &*self.transport.read().unwrap() {
            ActiveTransport::LongPoll(lp) => Some(lp.clone()),
            ActiveTransport::WebSocket(_) => None,
        }
    }

    /// Swaps in a new WebSocket transport, closing and discarding the
    /// long-poll one (§4.B upgrade).
    pub fn upgrade(&self, ws: Arc<WebSocketTransport>) {
        let previous = {
            let mut transport = self.transport.write().unwrap();
            std::mem::replace(&mut *transport, ActiveTransport::WebSocket(ws))
        };
        self.upgraded.store(true, Ordering::SeqCst);
        if let ActiveTransport::LongPoll(lp) = previous {
            lp.close();
        }
    }

    /// Returns `None` only if encryption is configured and genuinely fails
    /// (past the AEAD plaintext length limit); the packet is dropped rather
    /// than sent in the clear.
    fn apply_outbound_filters(&self, packet: Packet) -> Option<Packet> {
        if packet.packet_type != PacketType::Message {
            return Some(packet);
        }
        let Some(filter) = &self.encryption else {
            return Some(packet);
        };
        let plaintext: Vec<u8> = match &packet.payload {
            Payload::Text(s) => s.clone().into_bytes(),
            Payload::Binary(b) => b.to_vec(),
            Payload::None => return Some(packet),
        };
        match filter.encrypt(&plaintext) {
            Ok(ciphertext) => Some(Packet::message_binary(ciphertext)),
            Err(e) => {
                warn!(sid = %self.sid, error = %e, "outbound encryption failed, dropping packet");
                None
            }
        }
    }

    /// Sends one Engine packet over whichever transport is currently
    /// active, applying the transparent encryption/compression filters to
    /// MESSAGE packets only (§6).
    pub fn send_packet(&self, packet: Packet) {
        if !self.is_connected() {
            return;
        }
        let Some(packet) = self.apply_outbound_filters(packet) else {
            return;
        };
        let transport = self.transport.read().unwrap().clone();
        match transport {
            ActiveTransport::LongPoll(lp) => lp.enqueue(packet),
            ActiveTransport::WebSocket(ws) => {
                let encoded = engineio_proto::encode(&packet);
                let is_message = packet.packet_type == PacketType::Message;
                if self.compression && is_message {
                    let compressed = crate::filters::maybe_compress(encoded.as_bytes(), true);
                    let _ = ws.send_binary(compressed);
                } else {
                    let _ = ws.send_text(encoded);
                }
            }
        }
    }

    /// Decodes a frame arriving over the WebSocket transport, undoing
    /// compression and encryption before the result reaches
    /// `handle_incoming_packet`.
    pub fn decode_ws_frame(&self, bytes: Vec<u8>, was_binary: bool) -> Option<Packet> {
        let bytes = if was_binary {
            crate::filters::maybe_decompress(&bytes)
        } else {
            bytes
        };
        let text = String::from_utf8(bytes).ok()?;
        let packet = match engineio_proto::decode(&text) {
            Ok(p) => p,
            Err(e) => {
                warn!(sid = %self.sid, error = %e, "invalid engine.io frame, dropping");
                return None;
            }
        };
        self.apply_inbound_filters(packet)
    }

    fn apply_inbound_filters(&self, packet: Packet) -> Option<Packet> {
        if packet.packet_type != PacketType::Message {
            return Some(packet);
        }
        let Payload::Binary(ciphertext) = &packet.payload else {
            return Some(packet);
        };
        let Some(filter) = &self.encryption else {
            warn!(sid = %self.sid, "unexpected binary message payload with no encryption configured, dropping");
            return None;
        };
        match filter.decrypt(ciphertext) {
            Ok(plaintext) => match String::from_utf8(plaintext) {
                Ok(text) => Some(Packet::message(text)),
                Err(_) => {
                    warn!(sid = %self.sid, "decrypted payload was not valid utf-8, dropping");
                    None
                }
            },
            Err(_) => {
                warn!(sid = %self.sid, "decryption failed, closing session");
                None
            }
        }
    }

    /// Dispatches one decoded inbound packet (§4.B/§7).
    pub async fn handle_incoming_packet(self: &Arc<Self>, packet: Packet) {
        match packet.packet_type {
            PacketType::Ping => self.send_packet(Packet::pong()),
            PacketType::Pong => {
                let generation = self.ping_generation.load(Ordering::SeqCst);
                self.ponged_generation.store(generation, Ordering::SeqCst);
            }
            PacketType::Message => {
                if let Payload::Text(text) = packet.payload {
                    let _ = self.message_tx.send(text);
                }
            }
            PacketType::Close => self.close("client close").await,
            PacketType::Open | PacketType::Upgrade | PacketType::Noop => {
                warn!(sid = %self.sid, packet_type = ?packet.packet_type, "unexpected inbound control packet, ignoring");
            }
        }
    }

    /// Sends a PING and arms a per-ping timeout task. If no PONG bearing
    /// this generation arrives within `ping_timeout`, the session is
    /// closed with reason `"ping timeout"` (§4.B heartbeat).
    pub fn send_ping(self: &Arc<Self>) {
        let generation = self.ping_generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.send_packet(Packet::ping());
        let weak = Arc::downgrade(self);
        let timeout = self.ping_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(session) = weak.upgrade() {
                if session.ponged_generation.load(Ordering::SeqCst) < generation {
                    session.close("ping timeout").await;
                }
            }
        });
    }

    /// Idempotent session teardown (§5 cancellation, §4.B session close).
    pub async fn close(self: &Arc<Self>, reason: &str) {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return;
        }
        info!(sid = %self.sid, reason, "closing engine session");
        let transport = self.transport.read().unwrap().clone();
        match transport {
            ActiveTransport::LongPoll(lp) => lp.close(),
            ActiveTransport::WebSocket(ws) => {
                let encoded = engineio_proto::encode(&Packet::close(Some(reason)));
                let _ = ws.send_text(encoded);
            }
        }
        if let Some(cb) = self.close_callback.lock().unwrap().take() {
            cb();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::unbounded_channel;

    fn session() -> (Arc<EngineSession>, tokio::sync::mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = unbounded_channel();
        let session = EngineSession::new(
            "sid-1".to_owned(),
            Handshake::new("sid-1", "/socket.io/"),
            Arc::new(LongPollTransport::new()),
            Duration::from_millis(50),
            None,
            false,
            tx,
        );
        (session, rx)
    }

    #[tokio::test]
    async fn pong_within_timeout_prevents_close() {
        let (session, _rx) = session();
        session.send_ping();
        session
            .handle_incoming_packet(Packet::pong())
            .await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(session.is_connected());
    }

    #[tokio::test]
    async fn missing_pong_closes_after_timeout() {
        let (session, _rx) = session();
        session.send_ping();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!session.is_connected());
    }

    #[tokio::test]
    async fn message_packet_forwards_decoded_text_upward() {
        let (session, mut rx) = session();
        session
            .handle_incoming_packet(Packet::message("2[\"hi\",1]"))
            .await;
        assert_eq!(rx.recv().await.unwrap(), "2[\"hi\",1]");
    }

    #[tokio::test]
    async fn close_is_idempotent_and_invokes_callback_once() {
        let (session, _rx) = session();
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let calls2 = calls.clone();
        session.set_close_callback(Box::new(move || {
            calls2.fetch_add(1, Ordering::SeqCst);
        }));
        session.close("test").await;
        session.close("test again").await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
