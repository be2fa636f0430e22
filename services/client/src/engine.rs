//! Client-side Engine.IO session glue (§4.B from the client's point of
//! view): picks a transport, performs the handshake, and answers incoming
//! PINGs with PONGs transparently before anything above this layer sees a
//! packet — "A PING received from the peer is answered with PONG
//! immediately" applies to either end of the wire, not just the server.

use engineio_proto::{Packet, PacketType, Payload};

use crate::error::ClientError;
use crate::reconnect::TransportKind;
use crate::transport::longpoll::LongPollTransport;
use crate::transport::websocket::WebSocketTransport;
use crate::transport::{HandshakeInfo, PacketReceiver};

enum EngineInner {
    LongPoll(LongPollTransport),
    WebSocket(WebSocketTransport),
}

/// A cheap handle to the active transport. Sending never requires
/// exclusive access (each transport's `send` takes `&self`), so this can
/// be cloned into the emit path without contending with the read loop
/// that owns the paired [`crate::transport::PacketReceiver`].
#[derive(Clone)]
pub struct EngineHandle {
    inner: std::sync::Arc<EngineInner>,
}

impl EngineHandle {
    pub async fn send(&self, packet: Packet) -> Result<(), ClientError> {
        match &*self.inner {
            EngineInner::LongPoll(t) => t.send(packet).await,
            EngineInner::WebSocket(t) => t.send(packet).await,
        }
    }

    pub async fn close(&self) {
        match &*self.inner {
            EngineInner::LongPoll(t) => t.close(),
            EngineInner::WebSocket(t) => t.close().await,
        }
    }
}

/// Connects at the Engine.IO level: always performs the long-poll
/// handshake first (only that endpoint hands out an `sid`, §4.A), then
/// either starts the long-poll receive loop in place or immediately
/// upgrades to a WebSocket for that `sid` — matching "After the long-poll
/// handshake assigns sid, the client opens a WebSocket" (§4.A), applied
/// even when `websocket` is the first transport the rotation tries.
pub async fn connect(
    base_url: &str,
    kind: TransportKind,
) -> Result<(EngineHandle, PacketReceiver, HandshakeInfo), ClientError> {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let (transport, info) = LongPollTransport::handshake(base_url).await?;
    match kind {
        TransportKind::Polling => {
            transport.start(tx);
            Ok((
                EngineHandle {
                    inner: std::sync::Arc::new(EngineInner::LongPoll(transport)),
                },
                rx,
                info,
            ))
        }
        TransportKind::WebSocket => {
            let ws = WebSocketTransport::connect(base_url, &info.sid, tx).await?;
            Ok((
                EngineHandle {
                    inner: std::sync::Arc::new(EngineInner::WebSocket(ws)),
                },
                rx,
                info,
            ))
        }
    }
}

/// Pull the next packet meant for the layer above: swallows NOOP/OPEN/
/// UPGRADE/PONG control packets and answers PING with PONG before
/// returning, so callers only ever see MESSAGE or CLOSE.
pub async fn recv_app_packet(
    handle: &EngineHandle,
    rx: &mut PacketReceiver,
) -> Option<Result<Packet, ClientError>> {
    loop {
        let packet = rx.recv().await?;
        match packet.packet_type {
            PacketType::Ping => {
                if let Err(e) = handle.send(Packet::pong()).await {
                    return Some(Err(e));
                }
            }
            PacketType::Noop | PacketType::Open | PacketType::Upgrade | PacketType::Pong => {}
            PacketType::Close | PacketType::Message => return Some(Ok(packet)),
        }
    }
}

/// Extract the text payload of a MESSAGE packet, if any (binary MESSAGE
/// packets carry Socket.IO attachments, out of scope here — §1 Non-goals).
pub fn message_text(packet: &Packet) -> Option<&str> {
    match &packet.payload {
        Payload::Text(text) => Some(text.as_str()),
        Payload::None | Payload::Binary(_) => None,
    }
}
