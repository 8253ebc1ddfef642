//! Binary packet protocol spoken over the broadcast WebSocket.
//!
//! Every packet is a 16-byte big-endian header followed by a body:
//!
//! ```text
//!  0       4       6       8              12             16
//!  ┌───────┬───────┬───────┬──────────────┬──────────────┬──────────┐
//!  │length │hdr len│reserv.│  operation   │   sequence   │  body …  │
//!  │  u32  │  u16  │  u16  │     i32      │     u32      │          │
//!  └───────┴───────┴───────┴──────────────┴──────────────┴──────────┘
//! ```
//!
//! `length` covers header + body. The client only ever sends `Heartbeat`
//! and `Auth`; the server only ever sends the three reply operations.
//! [`decode`] accepts all five, so a client frame decodes back to itself;
//! narrowing to [`ServerOperation`] is the receiver's job.

use ol_domain::ProtocolError;
use serde::Serialize;

/// Size of the fixed packet header.
pub const HEADER_LEN: usize = 16;

// ── Operations ───────────────────────────────────────────────────────

/// Every operation code that may appear in a header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(i32)]
pub enum Operation {
    Heartbeat = 2,
    HeartbeatReply = 3,
    MessageReply = 5,
    Auth = 7,
    AuthReply = 8,
}

impl Operation {
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl TryFrom<i32> for Operation {
    type Error = ProtocolError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            2 => Ok(Self::Heartbeat),
            3 => Ok(Self::HeartbeatReply),
            5 => Ok(Self::MessageReply),
            7 => Ok(Self::Auth),
            8 => Ok(Self::AuthReply),
            other => Err(ProtocolError::UnknownOperation(other)),
        }
    }
}

impl From<ClientOperation> for Operation {
    fn from(op: ClientOperation) -> Self {
        match op {
            ClientOperation::Heartbeat => Self::Heartbeat,
            ClientOperation::Auth => Self::Auth,
        }
    }
}

impl From<ServerOperation> for Operation {
    fn from(op: ServerOperation) -> Self {
        match op {
            ServerOperation::HeartbeatReply => Self::HeartbeatReply,
            ServerOperation::MessageReply => Self::MessageReply,
            ServerOperation::AuthReply => Self::AuthReply,
        }
    }
}

/// Operations the client sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(i32)]
pub enum ClientOperation {
    Heartbeat = 2,
    Auth = 7,
}

impl ClientOperation {
    pub fn code(self) -> i32 {
        self as i32
    }
}

/// Operations the server sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(i32)]
pub enum ServerOperation {
    HeartbeatReply = 3,
    MessageReply = 5,
    AuthReply = 8,
}

impl ServerOperation {
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl TryFrom<i32> for ServerOperation {
    type Error = ProtocolError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            3 => Ok(Self::HeartbeatReply),
            5 => Ok(Self::MessageReply),
            8 => Ok(Self::AuthReply),
            other => Err(ProtocolError::UnknownOperation(other)),
        }
    }
}

/// A client-only operation arriving from the server is unknown inbound.
impl TryFrom<Operation> for ServerOperation {
    type Error = ProtocolError;

    fn try_from(op: Operation) -> Result<Self, Self::Error> {
        Self::try_from(op.code())
    }
}

// ── Header ───────────────────────────────────────────────────────────

/// The fixed 16-byte packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub length: u32,
    pub header_length: u16,
    pub reserved: u16,
    pub operation: i32,
    pub sequence: u32,
}

impl PacketHeader {
    /// Header for an outbound packet carrying `body_len` bytes.
    pub fn outbound(op: ClientOperation, body_len: usize) -> Self {
        Self {
            length: (HEADER_LEN + body_len) as u32,
            header_length: HEADER_LEN as u16,
            reserved: 0,
            operation: op.code(),
            sequence: 0,
        }
    }

    /// Read a header from the first 16 bytes of `buf`.
    pub fn read(buf: &[u8]) -> Result<Self, ProtocolError> {
        let Some(h) = buf.get(..HEADER_LEN) else {
            return Err(ProtocolError::InvalidLength {
                expected: HEADER_LEN,
                actual: buf.len(),
            });
        };
        Ok(Self {
            length: u32::from_be_bytes([h[0], h[1], h[2], h[3]]),
            header_length: u16::from_be_bytes([h[4], h[5]]),
            reserved: u16::from_be_bytes([h[6], h[7]]),
            operation: i32::from_be_bytes([h[8], h[9], h[10], h[11]]),
            sequence: u32::from_be_bytes([h[12], h[13], h[14], h[15]]),
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.length.to_be_bytes());
        out.extend_from_slice(&self.header_length.to_be_bytes());
        out.extend_from_slice(&self.reserved.to_be_bytes());
        out.extend_from_slice(&self.operation.to_be_bytes());
        out.extend_from_slice(&self.sequence.to_be_bytes());
    }
}

// ── Codec ────────────────────────────────────────────────────────────

/// Encode one outbound packet. `sequence` and `reserved` are always 0.
pub fn encode(op: ClientOperation, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + body.len());
    PacketHeader::outbound(op, body.len()).write(&mut out);
    out.extend_from_slice(body);
    out
}

/// Decode exactly one packet.
///
/// The header's `length` must equal `frame.len()` and its header length
/// must be 16; anything else is [`ProtocolError::InvalidLength`]. Codes
/// outside the five known operations are [`ProtocolError::UnknownOperation`].
pub fn decode(frame: &[u8]) -> Result<(Operation, &[u8]), ProtocolError> {
    let header = PacketHeader::read(frame)?;
    if header.header_length as usize != HEADER_LEN {
        return Err(ProtocolError::InvalidLength {
            expected: HEADER_LEN,
            actual: header.header_length as usize,
        });
    }
    if header.length as usize != frame.len() {
        return Err(ProtocolError::InvalidLength {
            expected: header.length as usize,
            actual: frame.len(),
        });
    }
    let op = Operation::try_from(header.operation)?;
    Ok((op, &frame[HEADER_LEN..]))
}

/// Split a WebSocket message that may hold several packets back to back.
///
/// Each returned slice is one whole packet suitable for [`decode`]. A
/// `length` field that is shorter than a header or runs past the end of
/// the buffer is an error.
pub fn split_packets(buf: &[u8]) -> Result<Vec<&[u8]>, ProtocolError> {
    let mut packets = Vec::new();
    let mut rest = buf;
    while !rest.is_empty() {
        let header = PacketHeader::read(rest)?;
        let len = header.length as usize;
        if len < HEADER_LEN || len > rest.len() {
            return Err(ProtocolError::InvalidLength {
                expected: len,
                actual: rest.len(),
            });
        }
        let (packet, tail) = rest.split_at(len);
        packets.push(packet);
        rest = tail;
    }
    Ok(packets)
}

// ── Body interpretation ──────────────────────────────────────────────

/// A decoded inbound packet with its body interpreted per operation.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    AuthReply(serde_json::Value),
    /// Room popularity counter.
    HeartbeatReply(i32),
    MessageReply {
        /// Routing key; empty when the body carries no string `cmd`.
        cmd: String,
        json: serde_json::Value,
    },
}

impl ServerMessage {
    pub fn parse(op: ServerOperation, body: &[u8]) -> Result<Self, ProtocolError> {
        match op {
            ServerOperation::AuthReply => Ok(Self::AuthReply(parse_json(body)?)),
            ServerOperation::HeartbeatReply => Ok(Self::HeartbeatReply(parse_popularity(body)?)),
            ServerOperation::MessageReply => {
                let json = parse_json(body)?;
                let cmd = json
                    .get("cmd")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_owned();
                Ok(Self::MessageReply { cmd, json })
            }
        }
    }
}

/// Parse a UTF-8 JSON body.
pub fn parse_json(body: &[u8]) -> Result<serde_json::Value, ProtocolError> {
    serde_json::from_slice(body).map_err(|e| ProtocolError::MalformedBody(e.to_string()))
}

/// Parse a heartbeat-reply body: a 2- or 4-byte big-endian signed integer.
pub fn parse_popularity(body: &[u8]) -> Result<i32, ProtocolError> {
    match body {
        &[a, b] => Ok(i16::from_be_bytes([a, b]) as i32),
        &[a, b, c, d] => Ok(i32::from_be_bytes([a, b, c, d])),
        _ => Err(ProtocolError::InvalidLength {
            expected: 4,
            actual: body.len(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build an inbound packet by hand (the client never encodes these).
    fn server_packet(op: i32, body: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        PacketHeader {
            length: (HEADER_LEN + body.len()) as u32,
            header_length: HEADER_LEN as u16,
            reserved: 0,
            operation: op,
            sequence: 0,
        }
        .write(&mut out);
        out.extend_from_slice(body);
        out
    }

    #[test]
    fn encode_writes_big_endian_header() {
        let frame = encode(ClientOperation::Auth, b"abc");
        assert_eq!(
            frame,
            vec![0, 0, 0, 19, 0, 16, 0, 0, 0, 0, 0, 7, 0, 0, 0, 0, b'a', b'b', b'c']
        );
    }

    #[test]
    fn encoded_length_prefix_matches_total() {
        for n in [0usize, 1, 15, 16, 1024] {
            let body = vec![0xAB; n];
            let frame = encode(ClientOperation::Heartbeat, &body);
            assert_eq!(frame.len(), HEADER_LEN + n);
            let prefix = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]);
            assert_eq!(prefix as usize, frame.len());
        }
    }

    #[test]
    fn heartbeat_frame_has_empty_body() {
        let frame = encode(ClientOperation::Heartbeat, &[]);
        let header = PacketHeader::read(&frame).unwrap();
        assert_eq!(header.length, 16);
        assert_eq!(header.operation, 2);
        assert_eq!(header.sequence, 0);
        assert_eq!(header.reserved, 0);
    }

    #[test]
    fn decode_returns_operation_and_body() {
        let frame = server_packet(5, br#"{"cmd":"X"}"#);
        let (op, body) = decode(&frame).unwrap();
        assert_eq!(op, Operation::MessageReply);
        assert_eq!(body, br#"{"cmd":"X"}"#);
    }

    #[test]
    fn client_frames_decode_back_to_themselves() {
        for op in [ClientOperation::Heartbeat, ClientOperation::Auth] {
            for body in [&b""[..], b"x", b"{\"roomid\":1}"] {
                let frame = encode(op, body);
                assert_eq!(decode(&frame).unwrap(), (Operation::from(op), body));
            }
        }
    }

    #[test]
    fn client_operations_are_not_server_operations() {
        assert_eq!(
            ServerOperation::try_from(Operation::Auth),
            Err(ProtocolError::UnknownOperation(7))
        );
        assert_eq!(
            ServerOperation::try_from(Operation::Heartbeat),
            Err(ProtocolError::UnknownOperation(2))
        );
        assert_eq!(
            ServerOperation::try_from(Operation::AuthReply),
            Ok(ServerOperation::AuthReply)
        );
    }

    #[test]
    fn decode_short_buffer_is_invalid_length() {
        let err = decode(&[0u8; 15]).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::InvalidLength {
                expected: 16,
                actual: 15
            }
        );
    }

    #[test]
    fn decode_unknown_operation() {
        for op in [0, 1, 4, 6, 9, -1] {
            let frame = server_packet(op, b"");
            assert_eq!(
                decode(&frame).unwrap_err(),
                ProtocolError::UnknownOperation(op)
            );
        }
    }

    #[test]
    fn decode_rejects_length_mismatch() {
        let mut frame = server_packet(8, b"{}");
        frame.push(b' ');
        assert!(matches!(
            decode(&frame),
            Err(ProtocolError::InvalidLength { expected: 18, actual: 19 })
        ));
    }

    #[test]
    fn decode_rejects_odd_header_length() {
        let mut frame = server_packet(8, b"{}");
        frame[5] = 20;
        assert!(matches!(decode(&frame), Err(ProtocolError::InvalidLength { .. })));
    }

    #[test]
    fn split_walks_concatenated_packets() {
        let mut buf = server_packet(3, &[0, 0, 0, 9]);
        buf.extend(server_packet(5, br#"{"cmd":"A"}"#));
        buf.extend(server_packet(5, br#"{"cmd":"B"}"#));

        let packets = split_packets(&buf).unwrap();
        assert_eq!(packets.len(), 3);
        let ops: Vec<Operation> = packets.iter().map(|p| decode(p).unwrap().0).collect();
        assert_eq!(
            ops,
            vec![
                Operation::HeartbeatReply,
                Operation::MessageReply,
                Operation::MessageReply
            ]
        );
    }

    #[test]
    fn split_rejects_truncated_tail() {
        let mut buf = server_packet(8, b"{}");
        buf.extend_from_slice(&server_packet(8, b"{}")[..10]);
        assert!(split_packets(&buf).is_err());
    }

    #[test]
    fn split_rejects_zero_length_field() {
        let mut buf = server_packet(8, b"{}");
        buf[..4].copy_from_slice(&0u32.to_be_bytes());
        assert!(split_packets(&buf).is_err());
    }

    #[test]
    fn popularity_accepts_two_and_four_bytes() {
        assert_eq!(parse_popularity(&[0x01, 0x02]).unwrap(), 0x0102);
        assert_eq!(parse_popularity(&[0xFF, 0xFE]).unwrap(), -2);
        assert_eq!(parse_popularity(&[0, 0, 0x30, 0x39]).unwrap(), 12345);
        assert_eq!(parse_popularity(&[0xFF, 0xFF, 0xFF, 0xFF]).unwrap(), -1);
    }

    #[test]
    fn popularity_rejects_other_lengths() {
        for n in [0usize, 1, 3, 5, 8] {
            assert!(matches!(
                parse_popularity(&vec![0; n]),
                Err(ProtocolError::InvalidLength { .. })
            ));
        }
    }

    #[test]
    fn message_reply_extracts_cmd() {
        let body = br#"{"cmd":"LIVE_OPEN_PLATFORM_DM","data":{}}"#;
        let msg = ServerMessage::parse(ServerOperation::MessageReply, body).unwrap();
        match msg {
            ServerMessage::MessageReply { cmd, json } => {
                assert_eq!(cmd, "LIVE_OPEN_PLATFORM_DM");
                assert!(json["data"].is_object());
            }
            other => panic!("expected MessageReply, got {other:?}"),
        }
    }

    #[test]
    fn message_reply_without_cmd_routes_empty() {
        let msg = ServerMessage::parse(ServerOperation::MessageReply, br#"{"data":1}"#).unwrap();
        assert!(matches!(msg, ServerMessage::MessageReply { ref cmd, .. } if cmd.is_empty()));
    }

    #[test]
    fn auth_reply_must_be_json() {
        assert!(matches!(
            ServerMessage::parse(ServerOperation::AuthReply, b"not json"),
            Err(ProtocolError::MalformedBody(_))
        ));
    }
}
