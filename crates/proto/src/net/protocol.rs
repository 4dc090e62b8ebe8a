use bytes::{Buf, BufMut, Bytes, BytesMut};

pub const PROTOCOL_VERSION: u32 = 1;
pub const HEADER_SIZE: usize = 16;
pub const MAX_DATAGRAM_SIZE: usize = 256;
pub const MAX_PAYLOAD_SIZE: usize = MAX_DATAGRAM_SIZE - HEADER_SIZE;
pub const DEFAULT_PORT: u16 = 30000;

const SEQUENCE_WRAP_THRESHOLD: u32 = u32::MAX / 2;

/// Fixed-size header carried in front of every datagram.
///
/// All four fields travel as big-endian `u32`. `ack_base` is the highest
/// sequence number the sender has seen from the recipient and bit *k* of
/// `ack_bits` stands for `ack_base - (k + 1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub protocol_version: u32,
    pub sequence: u32,
    pub ack_base: u32,
    pub ack_bits: u32,
}

impl MessageHeader {
    pub fn new(sequence: u32, ack_base: u32, ack_bits: u32) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            sequence,
            ack_base,
            ack_bits,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.protocol_version == PROTOCOL_VERSION
    }

    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u32(self.protocol_version);
        buf.put_u32(self.sequence);
        buf.put_u32(self.ack_base);
        buf.put_u32(self.ack_bits);
    }

    /// Reads a header without checking the version; see [`Message::deserialize`].
    pub fn decode(buf: &mut impl Buf) -> Result<Self, PacketError> {
        if buf.remaining() < HEADER_SIZE {
            return Err(PacketError::Truncated {
                len: buf.remaining(),
            });
        }

        Ok(Self {
            protocol_version: buf.get_u32(),
            sequence: buf.get_u32(),
            ack_base: buf.get_u32(),
            ack_bits: buf.get_u32(),
        })
    }
}

/// Returns `true` if `s1` is newer than `s2`, allowing for `u32` wraparound.
#[inline]
pub fn sequence_greater_than(s1: u32, s2: u32) -> bool {
    ((s1 > s2) && (s1 - s2 <= SEQUENCE_WRAP_THRESHOLD))
        || ((s1 < s2) && (s2 - s1 > SEQUENCE_WRAP_THRESHOLD))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub header: MessageHeader,
    pub payload: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PacketError {
    #[error("datagram of {len} bytes is shorter than the {HEADER_SIZE} byte header")]
    Truncated { len: usize },
    #[error("datagram of {len} bytes exceeds the {MAX_DATAGRAM_SIZE} byte limit")]
    Oversized { len: usize },
    #[error("protocol version {found} does not match {PROTOCOL_VERSION}")]
    VersionMismatch { found: u32 },
    #[error("payload of {len} bytes exceeds the {MAX_PAYLOAD_SIZE} byte limit")]
    PayloadTooLarge { len: usize },
}

impl Message {
    pub fn new(header: MessageHeader, payload: impl Into<Bytes>) -> Self {
        Self {
            header,
            payload: payload.into(),
        }
    }

    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    pub fn serialize(&self) -> Result<Bytes, PacketError> {
        if self.payload.len() > MAX_PAYLOAD_SIZE {
            return Err(PacketError::PayloadTooLarge {
                len: self.payload.len(),
            });
        }

        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.header.encode(&mut buf);
        buf.put_slice(&self.payload);
        Ok(buf.freeze())
    }

    pub fn deserialize(data: &[u8]) -> Result<Self, PacketError> {
        if data.len() > MAX_DATAGRAM_SIZE {
            return Err(PacketError::Oversized { len: data.len() });
        }

        let mut buf = data;
        let header = MessageHeader::decode(&mut buf)?;
        if !header.is_valid() {
            return Err(PacketError::VersionMismatch {
                found: header.protocol_version,
            });
        }

        Ok(Self {
            header,
            payload: Bytes::copy_from_slice(buf),
        })
    }
}
