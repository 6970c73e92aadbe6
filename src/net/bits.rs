//! Bit-packed access
//!
//! The resolution-change segment of the avatar info packet is written without
//! byte alignment. [`BitWriter`] keeps a running bit cursor and only pads to a
//! byte boundary when the segment is finished; [`BitReader`] mirrors it for
//! decoding.

use crate::error::ProtocolError;

/// MSB-first bit writer
#[derive(Debug, Clone, Default)]
pub struct BitWriter {
    data: Vec<u8>,
    bit_position: usize,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            data: Vec::with_capacity(bytes),
            bit_position: 0,
        }
    }

    /// Number of bits written so far
    #[inline]
    pub fn bit_position(&self) -> usize {
        self.bit_position
    }

    /// Write the low `count` bits of `value`
    pub fn write(&mut self, count: usize, value: u32) {
        debug_assert!(count > 0 && count <= 32, "bit count out of range: {count}");
        let needed = (self.bit_position + count + 7) >> 3;
        if self.data.len() < needed {
            self.data.resize(needed, 0);
        }

        let mut remaining = count;
        while remaining > 0 {
            let byte = self.bit_position >> 3;
            let free = 8 - (self.bit_position & 7);
            let chunk = remaining.min(free);
            let shift = remaining - chunk;
            let bits = ((value >> shift) & ((1u32 << chunk) - 1)) as u8;
            self.data[byte] |= bits << (free - chunk);
            self.bit_position += chunk;
            remaining -= chunk;
        }
    }

    /// Write a single flag bit
    #[inline]
    pub fn write_flag(&mut self, flag: bool) {
        self.write(1, flag as u32);
    }

    /// Write a two's-complement signed value in `count` bits
    pub fn write_signed(&mut self, count: usize, value: i32) {
        self.write(count, (value as u32) & ((1u32 << count) - 1));
    }

    /// Pad to the byte boundary and return the bytes
    pub fn finish(self) -> Vec<u8> {
        let mut data = self.data;
        data.truncate((self.bit_position + 7) >> 3);
        data
    }
}

/// MSB-first bit reader over a byte slice
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    bit_position: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            bit_position: 0,
        }
    }

    #[inline]
    pub fn bit_position(&self) -> usize {
        self.bit_position
    }

    /// Byte offset just past the last bit read, rounded up
    pub fn byte_position(&self) -> usize {
        (self.bit_position + 7) >> 3
    }

    pub fn read(&mut self, count: usize) -> Result<u32, ProtocolError> {
        if count == 0 || count > 32 {
            return Err(ProtocolError::BitOverflow { bits: count });
        }
        if self.bit_position + count > self.data.len() * 8 {
            return Err(ProtocolError::UnexpectedEof {
                needed: (count + 7) >> 3,
                remaining: self.data.len().saturating_sub(self.bit_position >> 3),
            });
        }

        let mut value = 0u32;
        let mut remaining = count;
        while remaining > 0 {
            let byte = self.data[self.bit_position >> 3];
            let available = 8 - (self.bit_position & 7);
            let chunk = remaining.min(available);
            let bits = (byte >> (available - chunk)) & ((1u16 << chunk) - 1) as u8;
            value = (value << chunk) | bits as u32;
            self.bit_position += chunk;
            remaining -= chunk;
        }
        Ok(value)
    }

    pub fn read_flag(&mut self) -> Result<bool, ProtocolError> {
        Ok(self.read(1)? == 1)
    }

    /// Read a two's-complement value of `count` bits
    pub fn read_signed(&mut self, count: usize) -> Result<i32, ProtocolError> {
        let raw = self.read(count)?;
        let sign = 1u32 << (count - 1);
        Ok(if raw & sign != 0 {
            raw as i32 - (1i32 << count)
        } else {
            raw as i32
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_round_trip() {
        let mut writer = BitWriter::new();
        writer.write(1, 1);
        writer.write(5, 15);
        writer.write(11, 1234);
        writer.write(32, 0xdead_beef);
        assert_eq!(writer.bit_position(), 49);

        let bytes = writer.finish();
        assert_eq!(bytes.len(), 7);

        let mut reader = BitReader::new(&bytes);
        assert_eq!(reader.read(1).unwrap(), 1);
        assert_eq!(reader.read(5).unwrap(), 15);
        assert_eq!(reader.read(11).unwrap(), 1234);
        assert_eq!(reader.read(32).unwrap(), 0xdead_beef);
    }

    #[test]
    fn test_msb_first_layout() {
        let mut writer = BitWriter::new();
        writer.write(1, 1);
        writer.write(2, 3);
        writer.write(5, 31);
        assert_eq!(writer.finish(), vec![0xff]);

        let mut writer = BitWriter::new();
        writer.write(3, 0b101);
        assert_eq!(writer.finish(), vec![0b1010_0000]);
    }

    #[test]
    fn test_signed_values() {
        let mut writer = BitWriter::new();
        writer.write_signed(5, -15);
        writer.write_signed(5, 15);
        writer.write_signed(5, -1);
        let bytes = writer.finish();

        let mut reader = BitReader::new(&bytes);
        assert_eq!(reader.read_signed(5).unwrap(), -15);
        assert_eq!(reader.read_signed(5).unwrap(), 15);
        assert_eq!(reader.read_signed(5).unwrap(), -1);
    }

    #[test]
    fn test_read_past_end() {
        let mut reader = BitReader::new(&[0xff]);
        assert!(reader.read(8).is_ok());
        assert!(reader.read(1).is_err());
    }
}
