//! Session packet framing

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;

use crate::{
    HEADER_SIZE, MAX_PACKET_SIZE,
    error::{Error, Result},
    packet_type::PacketType,
};

/// Session protocol packet
///
/// # Packet Structure
///
/// ```text
/// ┌─────────────┬─────────────┬─────────────────────┐
/// │   Length    │    Type     │        Body         │
/// │   4 bytes   │   4 bytes   │   Length - 8 bytes  │
/// │  (LE i32)   │  (LE i32)   │   (type-specific)   │
/// └─────────────┴─────────────┴─────────────────────┘
/// ```
///
/// `Length` counts the whole packet, header included. The header is part
/// of the encrypted region once a session cipher is active.
///
/// # Examples
///
/// ```
/// use pswake_core::{Packet, PacketType};
///
/// let packet = Packet::new(PacketType::Bye);
/// let encoded = packet.encode();
/// assert_eq!(encoded.len(), 8);
///
/// let decoded = Packet::decode(&encoded).unwrap();
/// assert_eq!(decoded.kind, PacketType::Bye);
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct Packet {
    /// Type tag
    pub kind: PacketType,

    /// Body following the header
    pub payload: Bytes,
}

impl Packet {
    /// Maximum body size
    pub const MAX_PAYLOAD_SIZE: usize = MAX_PACKET_SIZE - HEADER_SIZE;

    /// Create a packet with an empty body
    pub fn new(kind: PacketType) -> Self {
        Self {
            kind,
            payload: Bytes::new(),
        }
    }

    /// Create a packet with a body
    pub fn with_payload(kind: PacketType, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }

    /// Total encoded size, header included
    pub fn len(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// Check if the body is empty
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Encode packet to bytes
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(self.len());
        buf.put_i32_le(self.len() as i32);
        buf.put_i32_le(self.kind.raw());
        buf.put_slice(&self.payload);
        buf
    }

    /// Decode one packet from exactly `buf`
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Buffer is too short (< 8 bytes)
    /// - Declared length differs from the buffer length
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(Error::PacketTooShort {
                expected: HEADER_SIZE,
                actual: buf.len(),
            });
        }

        let mut header = &buf[..HEADER_SIZE];
        let declared = header.get_i32_le();
        let kind = PacketType::from(header.get_i32_le());

        if declared < 0 || declared as usize != buf.len() {
            return Err(Error::LengthMismatch {
                declared: declared.max(0) as usize,
                actual: buf.len(),
            });
        }

        Ok(Self {
            kind,
            payload: Bytes::copy_from_slice(&buf[HEADER_SIZE..]),
        })
    }

    /// Read the declared length from a buffer holding at least a header
    pub fn peek_length(buf: &[u8]) -> Result<usize> {
        if buf.len() < 4 {
            return Err(Error::PacketTooShort {
                expected: 4,
                actual: buf.len(),
            });
        }

        let declared = (&buf[..4]).get_i32_le();
        if declared < HEADER_SIZE as i32 {
            return Err(Error::MalformedPacket(format!(
                "declared length {} is shorter than the header",
                declared
            )));
        }

        Ok(declared as usize)
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("kind", &self.kind)
            .field("length", &self.len())
            .field("payload", &hex::encode(&self.payload[..self.payload.len().min(32)]))
            .finish()
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Packet[{}](len={})", self.kind, self.len())
    }
}
