//! Client-side reading of avatar info packets
//!
//! Mirrors [`super::encoder`]: splits a frame and parses the bit segment and
//! the extended info that follows it. Used by tests and by tooling that
//! replays captured traffic.

use crate::crypto::StreamCipher;
use crate::error::ProtocolError;
use crate::game::coord::{CoordGrid, RegionRef};
use crate::game::info::{EncoderSet, HuffmanCodec, InfoBlock};
use crate::net::bits::BitReader;
use crate::net::buffer::PacketBuffer;

use super::encoder::{Step, INDEX_BITS, TERMINATOR};

/// Where an added avatar was placed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Absolute(CoordGrid),
    /// Tile inside the region the client knows from low resolution
    RegionLocal { x: u8, z: u8 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedAddition {
    pub index: u16,
    pub placement: Placement,
    pub has_info: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedMovement {
    pub index: u16,
    pub step: Step,
    pub has_info: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedLowRes {
    pub index: u16,
    pub region: Option<RegionRef>,
}

/// Parsed payload of one avatar info packet
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedPacket {
    pub removals: Vec<u16>,
    pub additions: Vec<DecodedAddition>,
    pub movements: Vec<DecodedMovement>,
    pub low_res: Vec<DecodedLowRes>,
    /// Extended info per avatar, in packet order
    pub info: Vec<(u16, Vec<InfoBlock>)>,
}

impl DecodedPacket {
    /// Blocks sent for one avatar, if any
    pub fn info_for(&self, index: u16) -> Option<&[InfoBlock]> {
        self.info
            .iter()
            .find(|(i, _)| *i == index)
            .map(|(_, blocks)| blocks.as_slice())
    }
}

/// Split a frame into its clear opcode and payload
///
/// `cipher` must be the client-side twin of the server's cipher.
pub fn split_frame<'a>(
    frame: &'a [u8],
    cipher: &mut dyn StreamCipher,
) -> Result<(u8, &'a [u8]), ProtocolError> {
    if frame.len() < 3 {
        return Err(ProtocolError::UnexpectedEof {
            needed: 3,
            remaining: frame.len(),
        });
    }
    let opcode = frame[0].wrapping_sub(cipher.next_int() as u8);
    let length = u16::from_be_bytes([frame[1], frame[2]]) as usize;
    let payload = &frame[3..];
    if payload.len() != length {
        return Err(ProtocolError::UnexpectedEof {
            needed: length,
            remaining: payload.len(),
        });
    }
    Ok((opcode, payload))
}

fn read_index(bits: &mut BitReader<'_>) -> Result<Option<u16>, ProtocolError> {
    let index = bits.read(INDEX_BITS)?;
    Ok((index != TERMINATOR).then_some(index as u16))
}

fn read_coord(bits: &mut BitReader<'_>) -> Result<CoordGrid, ProtocolError> {
    let level = bits.read(2)?;
    let x = bits.read(14)?;
    let z = bits.read(14)?;
    Ok(CoordGrid::from_packed((level << 28) | (x << 14) | z))
}

/// Parse a payload written for `encoders`' revision
pub fn decode_payload(
    payload: &[u8],
    encoders: &EncoderSet,
    huffman: &dyn HuffmanCodec,
) -> Result<DecodedPacket, ProtocolError> {
    let mut bits = BitReader::new(payload);
    let mut packet = DecodedPacket::default();
    let mut with_info = Vec::new();

    let removals = bits.read(8)?;
    for _ in 0..removals {
        packet.removals.push(bits.read(INDEX_BITS)? as u16);
    }

    while let Some(index) = read_index(&mut bits)? {
        let placement = if bits.read_flag()? {
            Placement::RegionLocal {
                x: bits.read(6)? as u8,
                z: bits.read(6)? as u8,
            }
        } else {
            Placement::Absolute(read_coord(&mut bits)?)
        };
        let has_info = bits.read_flag()?;
        if has_info {
            with_info.push(index);
        }
        packet.additions.push(DecodedAddition {
            index,
            placement,
            has_info,
        });
    }

    while let Some(index) = read_index(&mut bits)? {
        let step = match bits.read(2)? {
            0 => Step::Stationary,
            1 => Step::Walk(bits.read(3)? as u8),
            2 => Step::Run(bits.read(4)? as u8),
            _ => {
                if bits.read_flag()? {
                    Step::Teleport(read_coord(&mut bits)?)
                } else {
                    Step::Jump {
                        dx: bits.read_signed(5)? as i8,
                        dz: bits.read_signed(5)? as i8,
                        dlevel: bits.read(2)? as u8,
                    }
                }
            }
        };
        let has_info = step == Step::Stationary || bits.read_flag()?;
        if has_info {
            with_info.push(index);
        }
        packet.movements.push(DecodedMovement {
            index,
            step,
            has_info,
        });
    }

    while let Some(index) = read_index(&mut bits)? {
        let region = if bits.read_flag()? {
            Some(RegionRef {
                level: bits.read(2)? as u8,
                x: bits.read(8)? as u8,
                z: bits.read(8)? as u8,
            })
        } else {
            None
        };
        packet.low_res.push(DecodedLowRes { index, region });
    }

    let mut buf = PacketBuffer::from_bytes(&payload[bits.byte_position()..]);
    for index in with_info {
        let blocks = encoders.decode_blocks(&mut buf, huffman)?;
        packet.info.push((index, blocks));
    }
    if buf.remaining() > 0 {
        return Err(ProtocolError::ValueOutOfRange {
            field: "trailing bytes",
            value: buf.remaining() as i64,
        });
    }

    Ok(packet)
}
