//! Bridges one Engine session's decoded MESSAGE text to the Socket.IO
//! namespace/socket layer (§4.D admission, event dispatch, ack handling).
//! One dispatcher task per Engine session; it owns that session's small
//! `nsp -> Socket` map (a client may be connected to more than one
//! namespace over the same Engine session).

use std::collections::HashMap;
use std::sync::Arc;

use engineio_proto::Packet;
use socketio_core::{NamespaceRegistry, Socket};
use socketio_proto::{PacketType, SocketPacket};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tracing::warn;

use super::session::EngineSession;

pub fn spawn_dispatcher(
    session: Arc<EngineSession>,
    mut message_rx: UnboundedReceiver<String>,
    registry: Arc<NamespaceRegistry>,
) {
    tokio::spawn(async move {
        let mut sockets: HashMap<String, Arc<Socket>> = HashMap::new();
        while let Some(text) = message_rx.recv().await {
            let packet = match socketio_proto::decode(&text) {
                Ok(p) => p,
                Err(e) => {
                    warn!(sid = %session.sid, error = %e, "invalid socket.io packet, dropping");
                    continue;
                }
            };
            handle_packet(&session, &registry, &mut sockets, packet).await;
        }
    });
}

async fn handle_packet(
    session: &Arc<EngineSession>,
    registry: &Arc<NamespaceRegistry>,
    sockets: &mut HashMap<String, Arc<Socket>>,
    packet: SocketPacket,
) {
    match packet.packet_type {
        PacketType::Connect => admit(session, registry, sockets, &packet.nsp).await,
        PacketType::Disconnect => {
            if let Some(socket) = sockets.remove(&packet.nsp) {
                socket.disconnect(None).await;
            }
            if packet.nsp == socketio_proto::DEFAULT_NAMESPACE {
                session.close("client disconnect").await;
            }
        }
        PacketType::Event | PacketType::BinaryEvent => {
            if let Some(socket) = sockets.get(&packet.nsp) {
                socket.handle_event(&packet);
            } else {
                warn!(sid = %session.sid, nsp = %packet.nsp, "event for namespace with no admitted socket, dropping");
            }
        }
        PacketType::Ack | PacketType::BinaryAck => {
            if let (Some(socket), Some(id)) = (sockets.get(&packet.nsp), packet.id) {
                socket.handle_ack(id, packet.data);
            }
        }
        PacketType::ConnectError => {
            warn!(sid = %session.sid, nsp = %packet.nsp, "unexpected CONNECT_ERROR from client, ignoring");
        }
    }
}

/// Connection admission (§4.D): resolve/create the namespace, run its
/// middleware chain, and on success bind a `Socket` whose outgoing channel
/// feeds back into this Engine session as MESSAGE packets.
async fn admit(
    session: &Arc<EngineSession>,
    registry: &Arc<NamespaceRegistry>,
    sockets: &mut HashMap<String, Arc<Socket>>,
    nsp: &str,
) {
    let namespace = registry.of(nsp);
    let handshake = session.handshake.clone();
    if let Err(reason) = namespace.run_middlewares(&handshake).await {
        let packet = SocketPacket::connect_error(nsp, reason);
        session.send_packet(Packet::message(socketio_proto::encode(&packet)));
        return;
    }

    let (tx, mut rx) = unbounded_channel::<String>();
    let outbound_session = session.clone();
    tokio::spawn(async move {
        while let Some(encoded) = rx.recv().await {
            outbound_session.send_packet(Packet::message(encoded));
        }
    });

    let socket = Socket::new(session.sid.clone(), nsp, tx);
    namespace.add_socket(socket.clone());
    sockets.insert(nsp.to_owned(), socket);

    let ack = SocketPacket::connect(nsp);
    session.send_packet(Packet::message(socketio_proto::encode(&ack)));
}
