//! Packet encoding and decoding primitives.

use anyhow::{anyhow, Result};
use bytes::{Buf, Bytes, BytesMut};

/// Max length for short strings (player names, realm names, channel names).
pub const MAX_CSTRING_SHORT: usize = 256;

/// Max length for long strings (guild info, MOTD, chat messages).
pub const MAX_CSTRING_LONG: usize = 4096;

/// Read a null-terminated C string from any `Buf`, with a max length guard.
///
/// Returns `Err` if:
/// - The buffer is exhausted before a null terminator (unterminated string)
/// - The string exceeds `max_len` bytes (malformed/malicious packet)
pub fn read_cstring(buf: &mut impl Buf, max_len: usize) -> Result<String> {
    let mut bytes = Vec::new();
    loop {
        if !buf.has_remaining() {
            return Err(anyhow!("Unterminated C string"));
        }
        let b = buf.get_u8();
        if b == 0 {
            break;
        }
        if bytes.len() >= max_len {
            return Err(anyhow!("C string exceeds max length of {} bytes", max_len));
        }
        bytes.push(b);
    }
    Ok(String::from_utf8_lossy(&bytes).to_string())
}

/// Write a null-terminated string.
pub fn put_cstring(buf: &mut BytesMut, s: &str) {
    use bytes::BufMut;
    buf.put_slice(s.as_bytes());
    buf.put_u8(0);
}

/// A world protocol packet: opcode plus undecoded payload. The frame
/// header (and its encryption) lives in the connection codec.
#[derive(Debug, Clone)]
pub struct Packet {
    pub opcode: u16,
    pub payload: Bytes,
}

impl Packet {
    /// Create a new packet with the given opcode and payload.
    pub fn new(opcode: u16, payload: impl Into<Bytes>) -> Self {
        Self {
            opcode,
            payload: payload.into(),
        }
    }

    /// Create an empty packet with just an opcode.
    pub fn empty(opcode: u16) -> Self {
        Self {
            opcode,
            payload: Bytes::new(),
        }
    }
}

/// Trait for types that can be encoded into packet payload.
pub trait PacketEncode {
    fn encode(&self, buf: &mut BytesMut);
}

/// Trait for types that can be decoded from packet payload.
pub trait PacketDecode: Sized {
    type Error;
    fn decode(buf: &mut Bytes) -> Result<Self, Self::Error>;
}
