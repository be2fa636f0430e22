//! Engine.IO packet and payload codec.
//!
//! A single Engine.IO packet is a tagged value `(type, payload)`. This crate
//! only implements the wire-level encode/decode rules (§4.A / §4.C of the
//! protocol this workspace implements); it performs no I/O itself so both
//! the server and client transports can share one implementation.

use base64::Engine as _;
use bytes::Bytes;

/// The six (plus NOOP) Engine.IO packet kinds, encoded on the wire as a
/// single ASCII digit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    Open,
    Close,
    Ping,
    Pong,
    Message,
    Upgrade,
    Noop,
}

impl PacketType {
    fn code(self) -> u8 {
        match self {
            PacketType::Open => b'0',
            PacketType::Close => b'1',
            PacketType::Ping => b'2',
            PacketType::Pong => b'3',
            PacketType::Message => b'4',
            PacketType::Upgrade => b'5',
            PacketType::Noop => b'6',
        }
    }

    fn from_code(c: u8) -> Option<Self> {
        match c {
            b'0' => Some(PacketType::Open),
            b'1' => Some(PacketType::Close),
            b'2' => Some(PacketType::Ping),
            b'3' => Some(PacketType::Pong),
            b'4' => Some(PacketType::Message),
            b'5' => Some(PacketType::Upgrade),
            b'6' => Some(PacketType::Noop),
            _ => None,
        }
    }
}

/// The payload carried alongside a packet type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    None,
    Text(String),
    Binary(Bytes),
}

/// A single Engine.IO packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub packet_type: PacketType,
    pub payload: Payload,
}

impl Packet {
    pub fn new(packet_type: PacketType, payload: Payload) -> Self {
        Self {
            packet_type,
            payload,
        }
    }

    pub fn open(payload: impl Into<String>) -> Self {
        Self::new(PacketType::Open, Payload::Text(payload.into()))
    }

    pub fn close(reason: Option<impl Into<String>>) -> Self {
        match reason {
            Some(r) => Self::new(PacketType::Close, Payload::Text(r.into())),
            None => Self::new(PacketType::Close, Payload::None),
        }
    }

    pub fn ping() -> Self {
        Self::new(PacketType::Ping, Payload::None)
    }

    pub fn pong() -> Self {
        Self::new(PacketType::Pong, Payload::None)
    }

    pub fn message(text: impl Into<String>) -> Self {
        Self::new(PacketType::Message, Payload::Text(text.into()))
    }

    pub fn message_binary(bytes: impl Into<Bytes>) -> Self {
        Self::new(PacketType::Message, Payload::Binary(bytes.into()))
    }

    pub fn noop() -> Self {
        Self::new(PacketType::Noop, Payload::None)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum Error {
    #[error("unknown engine.io packet type digit: {0:?}")]
    UnknownPacketType(char),
    #[error("empty packet")]
    EmptyPacket,
    #[error("invalid base64 payload")]
    InvalidBase64,
    #[error("invalid payload framing")]
    InvalidFraming,
}

/// Encode one packet as the text framing described in §4.A: a single ASCII
/// digit for the type, followed by the payload (verbatim text, or `b` +
/// base64 for binary).
pub fn encode(packet: &Packet) -> String {
    let mut out = String::new();
    out.push(packet.packet_type.code() as char);
    match &packet.payload {
        Payload::None => {}
        Payload::Text(s) => out.push_str(s),
        Payload::Binary(b) => {
            out.push('b');
            out.push_str(&base64::engine::general_purpose::STANDARD.encode(b));
        }
    }
    out
}

/// Decode one packet from its text framing.
pub fn decode(input: &str) -> Result<Packet, Error> {
    let mut chars = input.chars();
    let type_char = chars.next().ok_or(Error::EmptyPacket)?;
    let packet_type =
        PacketType::from_code(type_char as u8).ok_or(Error::UnknownPacketType(type_char))?;
    let rest = chars.as_str();
    let payload = if rest.is_empty() {
        Payload::None
    } else if let Some(b64) = rest.strip_prefix('b') {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(b64)
            .map_err(|_| Error::InvalidBase64)?;
        Payload::Binary(Bytes::from(bytes))
    } else {
        Payload::Text(rest.to_owned())
    };
    Ok(Packet {
        packet_type,
        payload,
    })
}

/// Encode a sequence of packets using the long-poll payload framing:
/// `len ":" encoded` concatenated back to back. An empty sequence encodes
/// as `"0:"`.
pub fn encode_payload(packets: &[Packet]) -> String {
    if packets.is_empty() {
        return "0:".to_owned();
    }
    let mut out = String::new();
    for packet in packets {
        let encoded = encode(packet);
        out.push_str(&encoded.len().to_string());
        out.push(':');
        out.push_str(&encoded);
    }
    out
}

/// Decode a payload framed as `len ":" encoded` repeated. Fails with
/// [`Error::InvalidFraming`] if a length is non-numeric or exceeds the
/// remaining buffer.
pub fn decode_payload(input: &str) -> Result<Vec<Packet>, Error> {
    let bytes = input.as_bytes();
    let mut packets = Vec::new();
    let mut pos = 0usize;
    if input == "0:" {
        return Ok(packets);
    }
    while pos < bytes.len() {
        let colon = bytes[pos..]
            .iter()
            .position(|&b| b == b':')
            .ok_or(Error::InvalidFraming)?
            + pos;
        let len_str = &input[pos..colon];
        let len: usize = len_str.parse().map_err(|_| Error::InvalidFraming)?;
        let start = colon + 1;
        let end = start
            .checked_add(len)
            .ok_or(Error::InvalidFraming)?;
        if end > bytes.len() {
            return Err(Error::InvalidFraming);
        }
        let encoded = &input[start..end];
        packets.push(decode(encoded)?);
        pos = end;
    }
    Ok(packets)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_control_packet() {
        let packets = [
            Packet::open("{\"sid\":\"abc\"}"),
            Packet::close(None::<String>),
            Packet::close(Some("transport close")),
            Packet::ping(),
            Packet::pong(),
            Packet::message("hello"),
            Packet::message_binary(Bytes::from_static(b"\x01\x02\x03")),
            Packet::new(PacketType::Upgrade, Payload::None),
            Packet::noop(),
        ];
        for packet in packets {
            let encoded = encode(&packet);
            let decoded = decode(&encoded).expect("decode");
            assert_eq!(decoded, packet);
        }
    }

    #[test]
    fn empty_payload_is_zero_colon() {
        assert_eq!(encode_payload(&[]), "0:");
        assert_eq!(decode_payload("0:").unwrap(), vec![]);
    }

    #[test]
    fn payload_round_trips_multiple_packets() {
        let packets = vec![
            Packet::message("hi"),
            Packet::ping(),
            Packet::message_binary(Bytes::from_static(b"\xff\x00")),
        ];
        let encoded = encode_payload(&packets);
        let decoded = decode_payload(&encoded).expect("decode");
        assert_eq!(decoded, packets);
    }

    #[test]
    fn non_numeric_length_is_invalid_framing() {
        assert_eq!(decode_payload("x:4hi"), Err(Error::InvalidFraming));
    }

    #[test]
    fn declared_length_exceeding_buffer_is_invalid_framing() {
        assert_eq!(decode_payload("99:4hi"), Err(Error::InvalidFraming));
    }

    #[test]
    fn unknown_type_digit_is_rejected() {
        assert_eq!(decode("9hello"), Err(Error::UnknownPacketType('9')));
    }

    #[test]
    fn binary_payload_base64_round_trips() {
        let packet = Packet::message_binary(Bytes::from_static(b"the quick brown fox"));
        let encoded = encode(&packet);
        assert!(encoded.starts_with("4b"));
        assert_eq!(decode(&encoded).unwrap(), packet);
    }
}
