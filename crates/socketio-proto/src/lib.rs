//! Socket.IO packet grammar, codec, and the bounded decode cache described
//! in §4.C. This crate knows nothing about transports, namespaces, or
//! rooms — just the wire shape of one packet.

use std::num::NonZeroUsize;

use lru::LruCache;
use serde_json::Value;

pub const DEFAULT_NAMESPACE: &str = "/";
const DEFAULT_DECODE_CACHE_CAPACITY: usize = 1000;

/// The seven Socket.IO packet kinds, encoded on the wire as a single ASCII
/// digit 0..6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    Connect,
    Disconnect,
    Event,
    Ack,
    ConnectError,
    BinaryEvent,
    BinaryAck,
}

impl PacketType {
    fn code(self) -> u8 {
        match self {
            PacketType::Connect => b'0',
            PacketType::Disconnect => b'1',
            PacketType::Event => b'2',
            PacketType::Ack => b'3',
            PacketType::ConnectError => b'4',
            PacketType::BinaryEvent => b'5',
            PacketType::BinaryAck => b'6',
        }
    }

    fn from_code(c: u8) -> Option<Self> {
        match c {
            b'0' => Some(PacketType::Connect),
            b'1' => Some(PacketType::Disconnect),
            b'2' => Some(PacketType::Event),
            b'3' => Some(PacketType::Ack),
            b'4' => Some(PacketType::ConnectError),
            b'5' => Some(PacketType::BinaryEvent),
            b'6' => Some(PacketType::BinaryAck),
            _ => None,
        }
    }

    fn is_binary(self) -> bool {
        matches!(self, PacketType::BinaryEvent | PacketType::BinaryAck)
    }
}

/// A decoded Socket.IO packet.
#[derive(Debug, Clone, PartialEq)]
pub struct SocketPacket {
    pub packet_type: PacketType,
    pub nsp: String,
    pub id: Option<u64>,
    pub attachments: Option<u32>,
    pub data: Option<Value>,
}

impl SocketPacket {
    pub fn connect(nsp: impl Into<String>) -> Self {
        Self {
            packet_type: PacketType::Connect,
            nsp: nsp.into(),
            id: None,
            attachments: None,
            data: None,
        }
    }

    pub fn connect_error(nsp: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            packet_type: PacketType::ConnectError,
            nsp: nsp.into(),
            id: None,
            attachments: None,
            data: Some(Value::String(message.into())),
        }
    }

    pub fn disconnect(nsp: impl Into<String>) -> Self {
        Self {
            packet_type: PacketType::Disconnect,
            nsp: nsp.into(),
            id: None,
            attachments: None,
            data: None,
        }
    }

    pub fn event(nsp: impl Into<String>, id: Option<u64>, name: &str, arg: Option<Value>) -> Self {
        let mut array = vec![Value::String(name.to_owned())];
        if let Some(arg) = arg {
            array.push(arg);
        }
        Self {
            packet_type: PacketType::Event,
            nsp: nsp.into(),
            id,
            attachments: None,
            data: Some(Value::Array(array)),
        }
    }

    pub fn ack(nsp: impl Into<String>, id: u64, data: Option<Value>) -> Self {
        Self {
            packet_type: PacketType::Ack,
            nsp: nsp.into(),
            id: Some(id),
            attachments: None,
            data,
        }
    }

    /// For an EVENT/BINARY_EVENT packet, the `(event name, argument)` pair
    /// carried in `data`. Returns `None` if `data` isn't a non-empty array
    /// whose first element is a string.
    pub fn event_name_and_arg(&self) -> Option<(&str, Option<&Value>)> {
        let array = self.data.as_ref()?.as_array()?;
        let name = array.first()?.as_str()?;
        Some((name, array.get(1)))
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum Error {
    #[error("empty packet")]
    EmptyPacket,
    #[error("unknown socket.io packet type digit: {0:?}")]
    UnknownPacketType(char),
    #[error("unterminated namespace section")]
    UnterminatedNamespace,
}

/// Decode one packet per the grammar in §4.C. Decoding is greedy and
/// tolerant: a missing trailing JSON value yields `data = None`, and
/// malformed JSON also yields `data = None` rather than failing the whole
/// packet. A missing namespace section decodes to `"/"`.
pub fn decode(input: &str) -> Result<SocketPacket, Error> {
    let mut chars = input.chars();
    let type_char = chars.next().ok_or(Error::EmptyPacket)?;
    let packet_type =
        PacketType::from_code(type_char as u8).ok_or(Error::UnknownPacketType(type_char))?;
    let mut rest = chars.as_str();

    let nsp = if let Some(after_slash) = rest.strip_prefix('/') {
        let comma = after_slash
            .find(',')
            .ok_or(Error::UnterminatedNamespace)?;
        let nsp = format!("/{}", &after_slash[..comma]);
        rest = &after_slash[comma + 1..];
        nsp
    } else {
        DEFAULT_NAMESPACE.to_owned()
    };

    // The grammar places `id` before `attachments`, but both are bare digit
    // runs distinguished only by a trailing `-` on attachments. We resolve
    // the ambiguity the way a tolerant parser must: scan the leading digit
    // run once, then decide what it was based on whether a `-` immediately
    // follows and whether this packet type can carry attachments at all.
    let digit_len = rest
        .char_indices()
        .take_while(|(_, c)| c.is_ascii_digit())
        .count();
    let (digits, after_digits) = rest.split_at(digit_len);

    let mut id = None;
    let mut attachments = None;
    if !digits.is_empty() {
        if packet_type.is_binary() && after_digits.starts_with('-') {
            attachments = digits.parse::<u32>().ok();
            rest = &after_digits[1..];
        } else {
            id = digits.parse::<u64>().ok();
            rest = after_digits;
        }
    }

    let data = if rest.is_empty() {
        None
    } else {
        serde_json::from_str::<Value>(rest).ok()
    };

    Ok(SocketPacket {
        packet_type,
        nsp,
        id,
        attachments,
        data,
    })
}

/// Encode one packet; the inverse of [`decode`]. The namespace section is
/// omitted when `nsp == "/"`.
pub fn encode(packet: &SocketPacket) -> String {
    let mut out = String::new();
    out.push(packet.packet_type.code() as char);
    if packet.nsp != DEFAULT_NAMESPACE {
        out.push('/');
        out.push_str(packet.nsp.trim_start_matches('/'));
        out.push(',');
    }
    if packet.packet_type.is_binary() {
        if let Some(attachments) = packet.attachments {
            out.push_str(&attachments.to_string());
            out.push('-');
        }
    }
    if let Some(id) = packet.id {
        out.push_str(&id.to_string());
    }
    if let Some(data) = &packet.data {
        out.push_str(&data.to_string());
    }
    out
}

/// Owns the bounded LRU decode cache described in §4.C: every encoded
/// input string maps to its decoded packet, evicted in insertion-order
/// with move-on-hit (standard LRU). Instance-owned, not a process global,
/// so tests start from a clean cache.
pub struct Codec {
    decode_cache: LruCache<String, SocketPacket>,
}

impl Default for Codec {
    fn default() -> Self {
        Self::new(DEFAULT_DECODE_CACHE_CAPACITY)
    }
}

impl Codec {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        Self {
            decode_cache: LruCache::new(capacity),
        }
    }

    /// Decode `input`, memoizing the result. A cache hit moves the entry to
    /// the front (most-recently-used).
    pub fn decode(&mut self, input: &str) -> Result<SocketPacket, Error> {
        if let Some(cached) = self.decode_cache.get(input) {
            return Ok(cached.clone());
        }
        let packet = decode(input)?;
        self.decode_cache.put(input.to_owned(), packet.clone());
        Ok(packet)
    }

    pub fn encode(&self, packet: &SocketPacket) -> String {
        encode(packet)
    }

    pub fn decode_cache_len(&self) -> usize {
        self.decode_cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_namespace_round_trips_without_slash() {
        let packet = SocketPacket::connect("/");
        let encoded = encode(&packet);
        assert_eq!(encoded, "0");
        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded.nsp, "/");
        assert_eq!(decoded.packet_type, PacketType::Connect);
    }

    #[test]
    fn missing_namespace_decodes_to_default() {
        let decoded = decode("2[\"hi\",1]").unwrap();
        assert_eq!(decoded.nsp, "/");
    }

    #[test]
    fn non_default_namespace_round_trips() {
        let packet = SocketPacket {
            packet_type: PacketType::Event,
            nsp: "/chat".to_owned(),
            id: Some(5),
            attachments: None,
            data: Some(json!(["hi", 1])),
        };
        let encoded = encode(&packet);
        assert_eq!(encoded, "2/chat,5[\"hi\",1]");
        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded.nsp, packet.nsp);
        assert_eq!(decoded.id, packet.id);
        assert_eq!(decoded.data, packet.data);
    }

    #[test]
    fn scenario_s3_named_event() {
        let decoded = decode("2[\"hi\",1]").unwrap();
        assert_eq!(decoded.event_name_and_arg(), Some(("hi", Some(&json!(1)))));
        let reply = SocketPacket::event("/", None, "bye", Some(json!(2)));
        assert_eq!(encode(&reply), "2[\"bye\",2]");
    }

    #[test]
    fn scenario_s4_ack() {
        let decoded = decode("21[\"q\",0]").unwrap();
        assert_eq!(decoded.id, Some(1));
        let ack = SocketPacket::ack("/", 1, Some(json!([42])));
        assert_eq!(encode(&ack), "31[42]");
    }

    #[test]
    fn malformed_json_yields_none_data_not_error() {
        let decoded = decode("2not-json").unwrap();
        assert_eq!(decoded.data, None);
    }

    #[test]
    fn missing_trailing_json_yields_none_data() {
        let decoded = decode("0").unwrap();
        assert_eq!(decoded.data, None);
    }

    #[test]
    fn unknown_type_digit_errors() {
        assert_eq!(decode("9[]"), Err(Error::UnknownPacketType('9')));
    }

    #[test]
    fn codec_decode_cache_memoizes_and_moves_on_hit() {
        let mut codec = Codec::new(2);
        codec.decode("0").unwrap();
        codec.decode("1").unwrap();
        assert_eq!(codec.decode_cache_len(), 2);
        // Touch "0" so it becomes most-recently-used.
        codec.decode("0").unwrap();
        codec.decode("2[\"x\"]").unwrap();
        // Capacity 2: "1" (least-recently-used) should have been evicted,
        // "0" should have survived because of the touch above.
        assert_eq!(codec.decode_cache_len(), 2);
        assert!(codec.decode_cache.peek("0").is_some());
        assert!(codec.decode_cache.peek("1").is_none());
    }

    #[test]
    fn binary_event_attachments_round_trip() {
        let packet = SocketPacket {
            packet_type: PacketType::BinaryEvent,
            nsp: "/".to_owned(),
            id: None,
            attachments: Some(1),
            data: Some(json!(["img"])),
        };
        let encoded = encode(&packet);
        assert_eq!(encoded, "51-[\"img\"]");
        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded.attachments, Some(1));
        assert_eq!(decoded.packet_type, PacketType::BinaryEvent);
    }
}
