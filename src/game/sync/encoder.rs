//! Avatar info packet encoder
//!
//! Writes one observer's payload from its [`TickPlan`]: the bit-packed
//! resolution-change segment followed by the extended info segment. Shared
//! blocks are copied from their leased precomputed buffers, observer
//! dependent blocks are encoded on the spot.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;

use crate::crypto::StreamCipher;
use crate::error::{BufferError, ProtocolError, SyncError};
use crate::game::avatar::{Avatar, AvatarRepository};
use crate::game::coord::CoordGrid;
use crate::game::info::{EncodeContext, EncoderSet, HuffmanCodec, InfoFlags, InfoKind};
use crate::net::bits::BitWriter;
use crate::net::buffer::{PacketBuffer, MAX_PACKET_SIZE};
use crate::net::pool::{BufferLease, BufferPool, PrecomputedBuffer};

use super::visibility::TickPlan;

/// Bits used for an avatar index
pub const INDEX_BITS: usize = 11;

/// Index value closing a list in the bit segment
pub const TERMINATOR: u32 = (1 << INDEX_BITS) - 1;

/// Walk offsets by direction code: SW, S, SE, W, E, NW, N, NE
pub const WALK_DIRECTIONS: [(i32, i32); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// Run offsets by direction code, the outer ring of a 5×5 square row by row
pub const RUN_DIRECTIONS: [(i32, i32); 16] = [
    (-2, -2),
    (-1, -2),
    (0, -2),
    (1, -2),
    (2, -2),
    (-2, -1),
    (2, -1),
    (-2, 0),
    (2, 0),
    (-2, 1),
    (2, 1),
    (-2, 2),
    (-1, 2),
    (0, 2),
    (1, 2),
    (2, 2),
];

/// Movement kind codes
const MOVE_INFO_ONLY: u32 = 0;
const MOVE_WALK: u32 = 1;
const MOVE_RUN: u32 = 2;
const MOVE_JUMP: u32 = 3;

/// How a retained avatar's position change goes on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Stationary,
    Walk(u8),
    Run(u8),
    /// Small relative jump; `dlevel` is the level delta modulo 4
    Jump { dx: i8, dz: i8, dlevel: u8 },
    /// Absolute placement
    Teleport(CoordGrid),
}

impl Step {
    /// Smallest encoding that carries `from` to `to`
    pub fn between(from: CoordGrid, to: CoordGrid) -> Step {
        let (dx, dz, dlevel) = from.delta_to(to);
        if (dx, dz, dlevel) == (0, 0, 0) {
            return Step::Stationary;
        }

        if dlevel == 0 {
            if let Some(code) = WALK_DIRECTIONS.iter().position(|&d| d == (dx, dz)) {
                return Step::Walk(code as u8);
            }
            if let Some(code) = RUN_DIRECTIONS.iter().position(|&d| d == (dx, dz)) {
                return Step::Run(code as u8);
            }
        }

        if (-16..=15).contains(&dx) && (-16..=15).contains(&dz) {
            return Step::Jump {
                dx: dx as i8,
                dz: dz as i8,
                dlevel: (dlevel & 0x3) as u8,
            };
        }

        Step::Teleport(to)
    }

    /// Where the step lands when taken from `from`
    pub fn apply(self, from: CoordGrid) -> Result<CoordGrid, ProtocolError> {
        let out_of_range = |value: i32| ProtocolError::ValueOutOfRange {
            field: "step target",
            value: value as i64,
        };
        let target = match self {
            Step::Stationary => return Ok(from),
            Step::Teleport(to) => return Ok(to),
            Step::Walk(code) => {
                let (dx, dz) = *WALK_DIRECTIONS
                    .get(code as usize)
                    .ok_or(out_of_range(code as i32))?;
                from.translate(dx, dz, 0)
            }
            Step::Run(code) => {
                let (dx, dz) = *RUN_DIRECTIONS
                    .get(code as usize)
                    .ok_or(out_of_range(code as i32))?;
                from.translate(dx, dz, 0)
            }
            Step::Jump { dx, dz, dlevel } => {
                let level = (from.level() as i32 + dlevel as i32) & 0x3;
                from.translate(dx as i32, dz as i32, level - from.level() as i32)
            }
        };
        target.map_err(|_| out_of_range(from.packed() as i32))
    }
}

/// Writes observer payloads and frames for one revision
pub struct PacketEncoder<'a> {
    encoders: &'a EncoderSet,
    huffman: &'a dyn HuffmanCodec,
    opcode: u8,
}

impl<'a> PacketEncoder<'a> {
    pub fn new(encoders: &'a EncoderSet, huffman: &'a dyn HuffmanCodec, opcode: u8) -> Self {
        Self {
            encoders,
            huffman,
            opcode,
        }
    }

    /// Write the payload for the observer whose own avatar is `observer`
    pub fn encode_payload(
        &self,
        plan: &TickPlan,
        observer: u16,
        repo: &AvatarRepository,
        leases: &HashMap<(u16, InfoKind), BufferLease>,
    ) -> Result<PacketBuffer, SyncError> {
        let bits = write_bit_segment(plan)?;
        let mut payload = PacketBuffer::with_capacity(bits.len() + 64);
        payload.write_bytes(&bits);

        for (index, flags) in plan.info_entries() {
            let avatar = repo
                .get(index)
                .ok_or(SyncError::AvatarVanished { index })?;
            self.write_info(avatar, flags, observer, leases, &mut payload)?;
        }

        Ok(payload)
    }

    fn write_info(
        &self,
        avatar: &Avatar,
        flags: InfoFlags,
        observer: u16,
        leases: &HashMap<(u16, InfoKind), BufferLease>,
        buf: &mut PacketBuffer,
    ) -> Result<(), SyncError> {
        let layout = self.encoders.layout();
        layout.write(flags, buf);

        for kind in layout.ordered(flags) {
            if kind.is_precomputed() {
                let lease = leases.get(&(avatar.index(), kind)).ok_or(
                    SyncError::BufferUnavailable {
                        avatar: avatar.index(),
                        kind: kind.name(),
                        cause: BufferError::AlreadyReleased,
                    },
                )?;
                buf.write_bytes(&lease.bytes()?);
                continue;
            }

            let block = avatar.info.get(kind).ok_or(ProtocolError::BlockMismatch {
                expected: kind.name(),
                actual: "nothing",
            })?;
            let ctx = EncodeContext {
                subject: avatar.index(),
                observer: Some(observer),
                huffman: self.huffman,
            };
            self.encoders.encode_block(block, buf, &ctx)?;
        }
        Ok(())
    }

    /// Frame a payload as `[opcode][u16 length][payload]`, obfuscating the opcode
    pub fn frame(
        &self,
        payload: &[u8],
        cipher: &mut dyn StreamCipher,
    ) -> Result<Bytes, ProtocolError> {
        if payload.len() > MAX_PACKET_SIZE {
            return Err(ProtocolError::ValueOutOfRange {
                field: "packet length",
                value: payload.len() as i64,
            });
        }

        let mut frame = PacketBuffer::with_capacity(payload.len() + 3);
        frame.write_u8(cipher.encode_opcode(self.opcode));
        frame.write_u16(payload.len() as u16);
        frame.write_bytes(payload);
        Ok(frame.into_inner().freeze())
    }
}

fn check_index(index: u16) -> Result<u32, ProtocolError> {
    let index = u32::from(index);
    if index >= TERMINATOR {
        return Err(ProtocolError::ValueOutOfRange {
            field: "avatar index",
            value: index as i64,
        });
    }
    Ok(index)
}

fn write_bit_segment(plan: &TickPlan) -> Result<Vec<u8>, ProtocolError> {
    let mut bits = BitWriter::with_capacity(32);

    if plan.removals.len() > u8::MAX as usize {
        return Err(ProtocolError::ValueOutOfRange {
            field: "removal count",
            value: plan.removals.len() as i64,
        });
    }
    bits.write(8, plan.removals.len() as u32);
    for &index in &plan.removals {
        bits.write(INDEX_BITS, check_index(index)?);
    }

    for addition in &plan.additions {
        bits.write(INDEX_BITS, check_index(addition.index)?);
        bits.write_flag(addition.region_relative);
        if addition.region_relative {
            let (x, z) = addition.coord.region_local();
            bits.write(6, x as u32);
            bits.write(6, z as u32);
        } else {
            bits.write(2, addition.coord.level() as u32);
            bits.write(14, addition.coord.x() as u32);
            bits.write(14, addition.coord.z() as u32);
        }
        bits.write_flag(addition.info.has_update());
    }
    bits.write(INDEX_BITS, TERMINATOR);

    for movement in &plan.movements {
        bits.write(INDEX_BITS, check_index(movement.index)?);
        match Step::between(movement.from, movement.to) {
            // Info-only entries always carry info
            Step::Stationary => {
                bits.write(2, MOVE_INFO_ONLY);
                continue;
            }
            Step::Walk(code) => {
                bits.write(2, MOVE_WALK);
                bits.write(3, code as u32);
            }
            Step::Run(code) => {
                bits.write(2, MOVE_RUN);
                bits.write(4, code as u32);
            }
            Step::Jump { dx, dz, dlevel } => {
                bits.write(2, MOVE_JUMP);
                bits.write_flag(false);
                bits.write_signed(5, dx as i32);
                bits.write_signed(5, dz as i32);
                bits.write(2, dlevel as u32);
            }
            Step::Teleport(to) => {
                bits.write(2, MOVE_JUMP);
                bits.write_flag(true);
                bits.write(2, to.level() as u32);
                bits.write(14, to.x() as u32);
                bits.write(14, to.z() as u32);
            }
        }
        bits.write_flag(movement.info.has_update());
    }
    bits.write(INDEX_BITS, TERMINATOR);

    for update in &plan.low_res {
        bits.write(INDEX_BITS, check_index(update.index)?);
        bits.write_flag(update.region.is_some());
        if let Some(region) = update.region {
            bits.write(2, region.level as u32);
            bits.write(8, region.x as u32);
            bits.write(8, region.z as u32);
        }
    }
    bits.write(INDEX_BITS, TERMINATOR);

    Ok(bits.finish())
}

/// Encode one shared block of `avatar` into a pooled buffer for `readers` observers
pub fn precompute(
    encoders: &EncoderSet,
    huffman: &dyn HuffmanCodec,
    pool: &Arc<BufferPool>,
    avatar: &Avatar,
    kind: InfoKind,
    readers: usize,
) -> Result<PrecomputedBuffer, SyncError> {
    let index = avatar.index();
    let block = avatar.info.get(kind).ok_or(ProtocolError::BlockMismatch {
        expected: kind.name(),
        actual: "nothing",
    })?;

    let mut pooled = pool
        .acquire()
        .map_err(|cause| SyncError::BufferUnavailable {
            avatar: index,
            kind: kind.name(),
            cause,
        })?;

    let mut buf = PacketBuffer::wrap(pooled.take_inner());
    let ctx = EncodeContext {
        subject: index,
        observer: None,
        huffman,
    };
    let encoded = encoders.encode_block(block, &mut buf, &ctx);
    // Hand the memory back before bailing so the pool sees it on drop
    pooled.restore(buf.into_inner());
    encoded?;

    Ok(PrecomputedBuffer::new(pooled, readers))
}
