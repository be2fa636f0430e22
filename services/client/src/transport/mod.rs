//! Client-side Engine.IO transports (§4.A). Two concrete implementations —
//! long-poll (`reqwest`) and WebSocket (`tokio-tungstenite`) — share the
//! packet/payload codec in `engineio-proto` so the wire format is
//! byte-identical to what `services/server`'s transports speak.

pub mod longpoll;
pub mod websocket;

use engineio_proto::Packet;

/// Observer channel a transport decodes incoming packets onto. Using an
/// unbounded `mpsc` gives the backpressure buffering spec §4.A requires
/// for free: a packet that arrives before the Socket.IO layer starts
/// draining the channel just sits there until it does, rather than being
/// dropped.
pub type PacketSender = tokio::sync::mpsc::UnboundedSender<Packet>;
pub type PacketReceiver = tokio::sync::mpsc::UnboundedReceiver<Packet>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Disconnected,
    Connecting,
    Connected,
    Closed,
}

/// The handshake JSON the server's polling GET returns (§6, §8 property 2):
/// `{sid, upgrades, pingInterval, pingTimeout}`.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeInfo {
    pub sid: String,
    pub upgrades: Vec<String>,
    pub ping_interval: u64,
    pub ping_timeout: u64,
}
