//! Packet buffer implementation
//!
//! Byte-level reads and writes used by the extended info codecs, including the
//! RS-specific value transforms (byte A/C/S, short A, little-endian shorts,
//! smarts and null-terminated strings).
//!
//! Reads are checked: running past the end yields
//! [`ProtocolError::UnexpectedEof`] instead of a silent zero, since a decoder
//! that reads garbage would hide a desynchronized layout.

use bytes::{BufMut, BytesMut};

use crate::error::ProtocolError;

/// Maximum payload of a variable-short packet
pub const MAX_PACKET_SIZE: usize = 65535;

type WireResult<T> = std::result::Result<T, ProtocolError>;

/// Packet buffer for reading and writing game protocol data
#[derive(Debug, Clone, Default)]
pub struct PacketBuffer {
    data: BytesMut,
    read_pos: usize,
}

impl PacketBuffer {
    /// Create a new empty packet buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a packet buffer with a specific capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: BytesMut::with_capacity(capacity),
            read_pos: 0,
        }
    }

    /// Create a packet buffer from existing bytes
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            data: BytesMut::from(bytes),
            read_pos: 0,
        }
    }

    /// Wrap a (possibly pooled) BytesMut, keeping its contents
    pub fn wrap(data: BytesMut) -> Self {
        Self { data, read_pos: 0 }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes left to read
    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.read_pos)
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Give back the underlying BytesMut
    #[inline]
    pub fn into_inner(self) -> BytesMut {
        self.data
    }

    fn take(&mut self, count: usize) -> WireResult<&[u8]> {
        if self.remaining() < count {
            return Err(ProtocolError::UnexpectedEof {
                needed: count,
                remaining: self.remaining(),
            });
        }
        let start = self.read_pos;
        self.read_pos += count;
        Ok(&self.data[start..start + count])
    }

    // ============ Writing ============

    pub fn write_u8(&mut self, value: u8) {
        self.data.put_u8(value);
    }

    pub fn write_i8(&mut self, value: i8) {
        self.data.put_i8(value);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.data.put_u16(value);
    }

    pub fn write_u16_le(&mut self, value: u16) {
        self.data.put_u16_le(value);
    }

    pub fn write_u32(&mut self, value: u32) {
        self.data.put_u32(value);
    }

    /// Byte A: value + 128
    pub fn write_u8_add(&mut self, value: u8) {
        self.data.put_u8(value.wrapping_add(128));
    }

    /// Byte C: negated
    pub fn write_u8_neg(&mut self, value: u8) {
        self.data.put_u8(value.wrapping_neg());
    }

    /// Byte S: 128 - value
    pub fn write_u8_sub(&mut self, value: u8) {
        self.data.put_u8(128u8.wrapping_sub(value));
    }

    /// Short A: big-endian with the low byte offset by 128
    pub fn write_u16_add(&mut self, value: u16) {
        self.data.put_u8((value >> 8) as u8);
        self.data.put_u8((value as u8).wrapping_add(128));
    }

    /// Little-endian short A
    pub fn write_u16_le_add(&mut self, value: u16) {
        self.data.put_u8((value as u8).wrapping_add(128));
        self.data.put_u8((value >> 8) as u8);
    }

    /// Unsigned smart: one byte below 128, otherwise two bytes with the top bit set
    pub fn write_smart(&mut self, value: u16) -> WireResult<()> {
        match value {
            0..=0x7f => self.data.put_u8(value as u8),
            0x80..=0x7fff => self.data.put_u16(value | 0x8000),
            _ => {
                return Err(ProtocolError::ValueOutOfRange {
                    field: "smart",
                    value: value as i64,
                })
            }
        }
        Ok(())
    }

    /// Null-terminated Latin-1 string
    pub fn write_string(&mut self, value: &str) -> WireResult<()> {
        for c in value.chars() {
            let code = c as u32;
            if code == 0 || code > 0xff {
                return Err(ProtocolError::InvalidStringEncoding);
            }
            self.data.put_u8(code as u8);
        }
        self.data.put_u8(0);
        Ok(())
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Write bytes last-to-first
    pub fn write_bytes_reversed(&mut self, bytes: &[u8]) {
        self.data.reserve(bytes.len());
        for &b in bytes.iter().rev() {
            self.data.put_u8(b);
        }
    }

    /// Write bytes with every byte offset by 128
    pub fn write_bytes_add(&mut self, bytes: &[u8]) {
        self.data.reserve(bytes.len());
        for &b in bytes {
            self.data.put_u8(b.wrapping_add(128));
        }
    }

    // ============ Reading ============

    pub fn read_u8(&mut self) -> WireResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_i8(&mut self) -> WireResult<i8> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_u16(&mut self) -> WireResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn read_u16_le(&mut self) -> WireResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_u32(&mut self) -> WireResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_u8_add(&mut self) -> WireResult<u8> {
        Ok(self.read_u8()?.wrapping_sub(128))
    }

    pub fn read_u8_neg(&mut self) -> WireResult<u8> {
        Ok(self.read_u8()?.wrapping_neg())
    }

    pub fn read_u8_sub(&mut self) -> WireResult<u8> {
        Ok(128u8.wrapping_sub(self.read_u8()?))
    }

    pub fn read_u16_add(&mut self) -> WireResult<u16> {
        let hi = self.read_u8()? as u16;
        let lo = self.read_u8()?.wrapping_sub(128) as u16;
        Ok((hi << 8) | lo)
    }

    pub fn read_u16_le_add(&mut self) -> WireResult<u16> {
        let lo = self.read_u8()?.wrapping_sub(128) as u16;
        let hi = self.read_u8()? as u16;
        Ok((hi << 8) | lo)
    }

    pub fn read_smart(&mut self) -> WireResult<u16> {
        let peek = self.take(1)?[0];
        self.read_pos -= 1;
        if peek < 0x80 {
            Ok(self.read_u8()? as u16)
        } else {
            Ok(self.read_u16()? & 0x7fff)
        }
    }

    pub fn read_string(&mut self) -> WireResult<String> {
        let mut out = String::new();
        loop {
            match self.read_u8()? {
                0 => return Ok(out),
                b => out.push(b as char),
            }
        }
    }

    pub fn read_bytes(&mut self, count: usize) -> WireResult<Vec<u8>> {
        Ok(self.take(count)?.to_vec())
    }

    pub fn read_bytes_reversed(&mut self, count: usize) -> WireResult<Vec<u8>> {
        let mut bytes = self.take(count)?.to_vec();
        bytes.reverse();
        Ok(bytes)
    }

    pub fn read_bytes_add(&mut self, count: usize) -> WireResult<Vec<u8>> {
        Ok(self
            .take(count)?
            .iter()
            .map(|b| b.wrapping_sub(128))
            .collect())
    }
}

impl From<Vec<u8>> for PacketBuffer {
    fn from(vec: Vec<u8>) -> Self {
        Self::wrap(BytesMut::from(&vec[..]))
    }
}

impl AsRef<[u8]> for PacketBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}
