//! Extended info block codecs
//!
//! One [`BlockEncoder`] per block kind and revision. Revisions mostly differ
//! in the value transforms applied to each field, so the encoders here are
//! parameterised by [`ByteTransform`], [`ShortOrder`] and [`BytesOrder`]
//! and the registry picks the combination for each revision. Every encoder
//! also decodes what it wrote.

use std::fmt;

use crate::error::ProtocolError;
use crate::net::buffer::PacketBuffer;

use super::blocks::{
    Appearance, ChatMessage, ExactMove, Headbar, HitMark, HitUpdate, InfoBlock, InfoKind,
    Sequence, SpotAnim, Tinting, BODY_SLOTS, COLOUR_SLOTS,
};

type CodecResult<T> = std::result::Result<T, ProtocolError>;

/// Text compression used for chat
pub trait HuffmanCodec: Send + Sync {
    fn compress(&self, text: &str) -> CodecResult<Vec<u8>>;

    /// Decompress `data` back into `chars` characters
    fn decompress(&self, data: &[u8], chars: usize) -> CodecResult<String>;
}

/// Uncompressed Latin-1 passthrough
#[derive(Debug, Default, Clone, Copy)]
pub struct Latin1Codec;

impl HuffmanCodec for Latin1Codec {
    fn compress(&self, text: &str) -> CodecResult<Vec<u8>> {
        text.chars()
            .map(|c| u8::try_from(c as u32).map_err(|_| ProtocolError::InvalidStringEncoding))
            .collect()
    }

    fn decompress(&self, data: &[u8], chars: usize) -> CodecResult<String> {
        if data.len() < chars {
            return Err(ProtocolError::UnexpectedEof {
                needed: chars,
                remaining: data.len(),
            });
        }
        Ok(data[..chars].iter().map(|&b| b as char).collect())
    }
}

/// Who a block is being encoded for
#[derive(Clone, Copy)]
pub struct EncodeContext<'a> {
    /// Avatar the block belongs to
    pub subject: u16,
    /// Observer's own avatar; `None` while precomputing shared buffers
    pub observer: Option<u16>,
    pub huffman: &'a dyn HuffmanCodec,
}

impl fmt::Debug for EncodeContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodeContext")
            .field("subject", &self.subject)
            .field("observer", &self.observer)
            .finish()
    }
}

/// Encoder/decoder for one block kind in one revision
pub trait BlockEncoder: Send + Sync {
    fn kind(&self) -> InfoKind;

    fn encode(
        &self,
        block: &InfoBlock,
        buf: &mut PacketBuffer,
        ctx: &EncodeContext<'_>,
    ) -> CodecResult<()>;

    fn decode(&self, buf: &mut PacketBuffer, huffman: &dyn HuffmanCodec) -> CodecResult<InfoBlock>;
}

fn mismatch(expected: InfoKind, block: &InfoBlock) -> ProtocolError {
    ProtocolError::BlockMismatch {
        expected: expected.name(),
        actual: block.kind().name(),
    }
}

fn length_u8(field: &'static str, len: usize) -> CodecResult<u8> {
    u8::try_from(len).map_err(|_| ProtocolError::ValueOutOfRange {
        field,
        value: len as i64,
    })
}

/// Single-byte value transforms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteTransform {
    Plain,
    /// Byte A
    Add,
    /// Byte C
    Neg,
    /// Byte S
    Sub,
}

impl ByteTransform {
    pub fn write(self, buf: &mut PacketBuffer, value: u8) {
        match self {
            ByteTransform::Plain => buf.write_u8(value),
            ByteTransform::Add => buf.write_u8_add(value),
            ByteTransform::Neg => buf.write_u8_neg(value),
            ByteTransform::Sub => buf.write_u8_sub(value),
        }
    }

    pub fn read(self, buf: &mut PacketBuffer) -> CodecResult<u8> {
        match self {
            ByteTransform::Plain => buf.read_u8(),
            ByteTransform::Add => buf.read_u8_add(),
            ByteTransform::Neg => buf.read_u8_neg(),
            ByteTransform::Sub => buf.read_u8_sub(),
        }
    }
}

/// Two-byte value layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortOrder {
    Be,
    Le,
    /// Big-endian, low byte A
    BeAdd,
    /// Little-endian, low byte A
    LeAdd,
}

impl ShortOrder {
    pub fn write(self, buf: &mut PacketBuffer, value: u16) {
        match self {
            ShortOrder::Be => buf.write_u16(value),
            ShortOrder::Le => buf.write_u16_le(value),
            ShortOrder::BeAdd => buf.write_u16_add(value),
            ShortOrder::LeAdd => buf.write_u16_le_add(value),
        }
    }

    pub fn read(self, buf: &mut PacketBuffer) -> CodecResult<u16> {
        match self {
            ShortOrder::Be => buf.read_u16(),
            ShortOrder::Le => buf.read_u16_le(),
            ShortOrder::BeAdd => buf.read_u16_add(),
            ShortOrder::LeAdd => buf.read_u16_le_add(),
        }
    }
}

/// Byte-run layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BytesOrder {
    Forward,
    Reversed,
    Add,
}

impl BytesOrder {
    pub fn write(self, buf: &mut PacketBuffer, bytes: &[u8]) {
        match self {
            BytesOrder::Forward => buf.write_bytes(bytes),
            BytesOrder::Reversed => buf.write_bytes_reversed(bytes),
            BytesOrder::Add => buf.write_bytes_add(bytes),
        }
    }

    pub fn read(self, buf: &mut PacketBuffer, count: usize) -> CodecResult<Vec<u8>> {
        match self {
            BytesOrder::Forward => buf.read_bytes(count),
            BytesOrder::Reversed => buf.read_bytes_reversed(count),
            BytesOrder::Add => buf.read_bytes_add(count),
        }
    }
}

/// Appearance: a length-prefixed sub-buffer
#[derive(Debug, Clone, Copy)]
pub struct AppearanceEncoder {
    pub length: ByteTransform,
    pub body: BytesOrder,
}

impl AppearanceEncoder {
    fn write_inner(appearance: &Appearance) -> CodecResult<PacketBuffer> {
        let mut inner = PacketBuffer::with_capacity(64);
        inner.write_u8(appearance.gender);
        inner.write_i8(appearance.skull_icon);
        inner.write_i8(appearance.prayer_icon);
        for &code in &appearance.body {
            match code {
                0 => inner.write_u8(0),
                0x100..=u16::MAX => inner.write_u16(code),
                _ => {
                    return Err(ProtocolError::ValueOutOfRange {
                        field: "appearance slot",
                        value: code as i64,
                    })
                }
            }
        }
        for &colour in &appearance.colours {
            inner.write_u8(colour);
        }
        inner.write_u16(appearance.bas);
        inner.write_string(&appearance.name)?;
        inner.write_u8(appearance.combat_level);
        Ok(inner)
    }

    fn read_inner(inner: &mut PacketBuffer) -> CodecResult<Appearance> {
        let gender = inner.read_u8()?;
        let skull_icon = inner.read_i8()?;
        let prayer_icon = inner.read_i8()?;
        let mut body = [0u16; BODY_SLOTS];
        for slot in body.iter_mut() {
            let high = inner.read_u8()?;
            if high != 0 {
                *slot = ((high as u16) << 8) | inner.read_u8()? as u16;
            }
        }
        let mut colours = [0u8; COLOUR_SLOTS];
        for colour in colours.iter_mut() {
            *colour = inner.read_u8()?;
        }
        Ok(Appearance {
            gender,
            skull_icon,
            prayer_icon,
            body,
            colours,
            bas: inner.read_u16()?,
            name: inner.read_string()?,
            combat_level: inner.read_u8()?,
        })
    }
}

impl BlockEncoder for AppearanceEncoder {
    fn kind(&self) -> InfoKind {
        InfoKind::Appearance
    }

    fn encode(
        &self,
        block: &InfoBlock,
        buf: &mut PacketBuffer,
        _ctx: &EncodeContext<'_>,
    ) -> CodecResult<()> {
        let InfoBlock::Appearance(appearance) = block else {
            return Err(mismatch(self.kind(), block));
        };
        let inner = Self::write_inner(appearance)?;
        self.length.write(buf, length_u8("appearance length", inner.len())?);
        self.body.write(buf, inner.as_bytes());
        Ok(())
    }

    fn decode(
        &self,
        buf: &mut PacketBuffer,
        _huffman: &dyn HuffmanCodec,
    ) -> CodecResult<InfoBlock> {
        let len = self.length.read(buf)? as usize;
        let bytes = self.body.read(buf, len)?;
        let mut inner = PacketBuffer::from(bytes);
        Ok(InfoBlock::Appearance(Self::read_inner(&mut inner)?))
    }
}

/// Movement speed, persistent or for one tick
#[derive(Debug, Clone, Copy)]
pub struct SpeedEncoder {
    pub temporary: bool,
    pub transform: ByteTransform,
}

impl BlockEncoder for SpeedEncoder {
    fn kind(&self) -> InfoKind {
        if self.temporary {
            InfoKind::TemporaryMoveSpeed
        } else {
            InfoKind::MoveSpeed
        }
    }

    fn encode(
        &self,
        block: &InfoBlock,
        buf: &mut PacketBuffer,
        _ctx: &EncodeContext<'_>,
    ) -> CodecResult<()> {
        match (self.temporary, block) {
            (false, InfoBlock::MoveSpeed(speed)) | (true, InfoBlock::TemporaryMoveSpeed(speed)) => {
                self.transform.write(buf, *speed);
                Ok(())
            }
            _ => Err(mismatch(self.kind(), block)),
        }
    }

    fn decode(
        &self,
        buf: &mut PacketBuffer,
        _huffman: &dyn HuffmanCodec,
    ) -> CodecResult<InfoBlock> {
        let speed = self.transform.read(buf)?;
        Ok(if self.temporary {
            InfoBlock::TemporaryMoveSpeed(speed)
        } else {
            InfoBlock::MoveSpeed(speed)
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SequenceEncoder {
    pub id: ShortOrder,
    pub delay: ByteTransform,
}

impl BlockEncoder for SequenceEncoder {
    fn kind(&self) -> InfoKind {
        InfoKind::Sequence
    }

    fn encode(
        &self,
        block: &InfoBlock,
        buf: &mut PacketBuffer,
        _ctx: &EncodeContext<'_>,
    ) -> CodecResult<()> {
        let InfoBlock::Sequence(sequence) = block else {
            return Err(mismatch(self.kind(), block));
        };
        self.id.write(buf, sequence.id);
        self.delay.write(buf, sequence.delay);
        Ok(())
    }

    fn decode(
        &self,
        buf: &mut PacketBuffer,
        _huffman: &dyn HuffmanCodec,
    ) -> CodecResult<InfoBlock> {
        Ok(InfoBlock::Sequence(Sequence {
            id: self.id.read(buf)?,
            delay: self.delay.read(buf)?,
        }))
    }
}

/// Face angle or face entity, both a single short
#[derive(Debug, Clone, Copy)]
pub struct FaceEncoder {
    pub entity: bool,
    pub order: ShortOrder,
}

impl BlockEncoder for FaceEncoder {
    fn kind(&self) -> InfoKind {
        if self.entity {
            InfoKind::FacePathingEntity
        } else {
            InfoKind::FaceAngle
        }
    }

    fn encode(
        &self,
        block: &InfoBlock,
        buf: &mut PacketBuffer,
        _ctx: &EncodeContext<'_>,
    ) -> CodecResult<()> {
        match (self.entity, block) {
            (false, InfoBlock::FaceAngle(value)) | (true, InfoBlock::FacePathingEntity(value)) => {
                self.order.write(buf, *value);
                Ok(())
            }
            _ => Err(mismatch(self.kind(), block)),
        }
    }

    fn decode(
        &self,
        buf: &mut PacketBuffer,
        _huffman: &dyn HuffmanCodec,
    ) -> CodecResult<InfoBlock> {
        let value = self.order.read(buf)?;
        Ok(if self.entity {
            InfoBlock::FacePathingEntity(value)
        } else {
            InfoBlock::FaceAngle(value)
        })
    }
}

/// Overhead text, identical in every supported revision
#[derive(Debug, Clone, Copy)]
pub struct SayEncoder;

impl BlockEncoder for SayEncoder {
    fn kind(&self) -> InfoKind {
        InfoKind::Say
    }

    fn encode(
        &self,
        block: &InfoBlock,
        buf: &mut PacketBuffer,
        _ctx: &EncodeContext<'_>,
    ) -> CodecResult<()> {
        let InfoBlock::Say(text) = block else {
            return Err(mismatch(self.kind(), block));
        };
        buf.write_string(text)
    }

    fn decode(
        &self,
        buf: &mut PacketBuffer,
        _huffman: &dyn HuffmanCodec,
    ) -> CodecResult<InfoBlock> {
        Ok(InfoBlock::Say(buf.read_string()?))
    }
}

/// Public chat: effects, rights, then the compressed text
#[derive(Debug, Clone, Copy)]
pub struct ChatEncoder {
    pub effects: ShortOrder,
    pub rights: ByteTransform,
    pub payload: BytesOrder,
}

impl BlockEncoder for ChatEncoder {
    fn kind(&self) -> InfoKind {
        InfoKind::Chat
    }

    fn encode(
        &self,
        block: &InfoBlock,
        buf: &mut PacketBuffer,
        ctx: &EncodeContext<'_>,
    ) -> CodecResult<()> {
        let InfoBlock::Chat(chat) = block else {
            return Err(mismatch(self.kind(), block));
        };
        let compressed = ctx.huffman.compress(&chat.text)?;
        let chars = chat.text.chars().count();

        self.effects
            .write(buf, ((chat.colour as u16) << 8) | chat.effects as u16);
        self.rights.write(buf, chat.rights);
        buf.write_smart(u16::try_from(chars).unwrap_or(u16::MAX))?;
        buf.write_u8(length_u8("chat length", compressed.len())?);
        self.payload.write(buf, &compressed);
        Ok(())
    }

    fn decode(&self, buf: &mut PacketBuffer, huffman: &dyn HuffmanCodec) -> CodecResult<InfoBlock> {
        let effects = self.effects.read(buf)?;
        let rights = self.rights.read(buf)?;
        let chars = buf.read_smart()? as usize;
        let len = buf.read_u8()? as usize;
        let compressed = self.payload.read(buf, len)?;
        Ok(InfoBlock::Chat(ChatMessage {
            colour: (effects >> 8) as u8,
            effects: effects as u8,
            rights,
            text: huffman.decompress(&compressed, chars)?,
        }))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ExactMoveEncoder {
    pub offsets: ByteTransform,
    pub start_delay: ShortOrder,
    pub end_delay: ShortOrder,
    pub direction: ByteTransform,
}

impl BlockEncoder for ExactMoveEncoder {
    fn kind(&self) -> InfoKind {
        InfoKind::ExactMove
    }

    fn encode(
        &self,
        block: &InfoBlock,
        buf: &mut PacketBuffer,
        _ctx: &EncodeContext<'_>,
    ) -> CodecResult<()> {
        let InfoBlock::ExactMove(movement) = block else {
            return Err(mismatch(self.kind(), block));
        };
        for offset in [
            movement.start_x,
            movement.start_z,
            movement.end_x,
            movement.end_z,
        ] {
            self.offsets.write(buf, offset);
        }
        self.start_delay.write(buf, movement.start_delay);
        self.end_delay.write(buf, movement.end_delay);
        self.direction.write(buf, movement.direction);
        Ok(())
    }

    fn decode(
        &self,
        buf: &mut PacketBuffer,
        _huffman: &dyn HuffmanCodec,
    ) -> CodecResult<InfoBlock> {
        Ok(InfoBlock::ExactMove(ExactMove {
            start_x: self.offsets.read(buf)?,
            start_z: self.offsets.read(buf)?,
            end_x: self.offsets.read(buf)?,
            end_z: self.offsets.read(buf)?,
            start_delay: self.start_delay.read(buf)?,
            end_delay: self.end_delay.read(buf)?,
            direction: self.direction.read(buf)?,
        }))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SpotAnimEncoder {
    pub id: ShortOrder,
    /// Height and delay packed into one int
    pub packed: bool,
}

impl BlockEncoder for SpotAnimEncoder {
    fn kind(&self) -> InfoKind {
        InfoKind::SpotAnim
    }

    fn encode(
        &self,
        block: &InfoBlock,
        buf: &mut PacketBuffer,
        _ctx: &EncodeContext<'_>,
    ) -> CodecResult<()> {
        let InfoBlock::SpotAnim(spot) = block else {
            return Err(mismatch(self.kind(), block));
        };
        self.id.write(buf, spot.id);
        if self.packed {
            buf.write_u32(((spot.height as u32) << 16) | spot.delay as u32);
        } else {
            buf.write_u16(spot.height);
            buf.write_u16(spot.delay);
        }
        Ok(())
    }

    fn decode(
        &self,
        buf: &mut PacketBuffer,
        _huffman: &dyn HuffmanCodec,
    ) -> CodecResult<InfoBlock> {
        let id = self.id.read(buf)?;
        let (height, delay) = if self.packed {
            let packed = buf.read_u32()?;
            ((packed >> 16) as u16, packed as u16)
        } else {
            (buf.read_u16()?, buf.read_u16()?)
        };
        Ok(InfoBlock::SpotAnim(SpotAnim { id, height, delay }))
    }
}

/// Hit splat wire layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitFormat {
    /// Type and damage only; delays are not sent
    Compact,
    /// Smart-encoded type, damage and delay
    Smart,
    /// As [`HitFormat::Smart`] with transformed counts
    SmartAdd,
}

/// Hits are observer-specific: the source and the target see `self_kind`
#[derive(Debug, Clone, Copy)]
pub struct HitEncoder {
    pub format: HitFormat,
}

impl HitEncoder {
    fn splat_kind(hit: &HitMark, ctx: &EncodeContext<'_>) -> u8 {
        match ctx.observer {
            Some(observer) if observer == ctx.subject || Some(observer) == hit.source => {
                hit.self_kind
            }
            _ => hit.kind,
        }
    }

    fn write_count(
        &self,
        buf: &mut PacketBuffer,
        field: &'static str,
        count: usize,
        headbars: bool,
    ) -> CodecResult<()> {
        let count = length_u8(field, count)?;
        match (self.format, headbars) {
            (HitFormat::Compact, _) | (HitFormat::Smart, true) => buf.write_u8(count),
            (HitFormat::Smart, false) => buf.write_u8_neg(count),
            (HitFormat::SmartAdd, false) => buf.write_u8_add(count),
            (HitFormat::SmartAdd, true) => buf.write_u8_sub(count),
        }
        Ok(())
    }

    fn read_count(&self, buf: &mut PacketBuffer, headbars: bool) -> CodecResult<usize> {
        let count = match (self.format, headbars) {
            (HitFormat::Compact, _) | (HitFormat::Smart, true) => buf.read_u8()?,
            (HitFormat::Smart, false) => buf.read_u8_neg()?,
            (HitFormat::SmartAdd, false) => buf.read_u8_add()?,
            (HitFormat::SmartAdd, true) => buf.read_u8_sub()?,
        };
        Ok(count as usize)
    }
}

impl BlockEncoder for HitEncoder {
    fn kind(&self) -> InfoKind {
        InfoKind::Hit
    }

    fn encode(
        &self,
        block: &InfoBlock,
        buf: &mut PacketBuffer,
        ctx: &EncodeContext<'_>,
    ) -> CodecResult<()> {
        let InfoBlock::Hit(update) = block else {
            return Err(mismatch(self.kind(), block));
        };

        self.write_count(buf, "hit count", update.hits.len(), false)?;
        for hit in &update.hits {
            let kind = Self::splat_kind(hit, ctx);
            match self.format {
                HitFormat::Compact => {
                    buf.write_u8_add(kind);
                    buf.write_smart(hit.damage)?;
                }
                HitFormat::Smart | HitFormat::SmartAdd => {
                    buf.write_smart(kind as u16)?;
                    buf.write_smart(hit.damage)?;
                    buf.write_smart(hit.delay)?;
                }
            }
        }

        self.write_count(buf, "headbar count", update.headbars.len(), true)?;
        for bar in &update.headbars {
            match self.format {
                HitFormat::Compact => {
                    buf.write_u8(bar.id);
                    buf.write_u8_neg(bar.fill);
                }
                HitFormat::Smart => {
                    buf.write_smart(bar.id as u16)?;
                    buf.write_smart(bar.delay)?;
                    buf.write_u8(bar.fill);
                }
                HitFormat::SmartAdd => {
                    buf.write_smart(bar.id as u16)?;
                    buf.write_smart(bar.delay)?;
                    buf.write_u8_add(bar.fill);
                }
            }
        }
        Ok(())
    }

    fn decode(
        &self,
        buf: &mut PacketBuffer,
        _huffman: &dyn HuffmanCodec,
    ) -> CodecResult<InfoBlock> {
        let mut update = HitUpdate::default();

        let hits = self.read_count(buf, false)?;
        for _ in 0..hits {
            let (kind, damage, delay) = match self.format {
                HitFormat::Compact => (buf.read_u8_add()?, buf.read_smart()?, 0),
                HitFormat::Smart | HitFormat::SmartAdd => (
                    buf.read_smart()? as u8,
                    buf.read_smart()?,
                    buf.read_smart()?,
                ),
            };
            update.hits.push(HitMark {
                kind,
                self_kind: kind,
                source: None,
                damage,
                delay,
            });
        }

        let headbars = self.read_count(buf, true)?;
        for _ in 0..headbars {
            let bar = match self.format {
                HitFormat::Compact => Headbar {
                    id: buf.read_u8()?,
                    fill: buf.read_u8_neg()?,
                    delay: 0,
                },
                HitFormat::Smart => Headbar {
                    id: buf.read_smart()? as u8,
                    delay: buf.read_smart()?,
                    fill: buf.read_u8()?,
                },
                HitFormat::SmartAdd => Headbar {
                    id: buf.read_smart()? as u8,
                    delay: buf.read_smart()?,
                    fill: buf.read_u8_add()?,
                },
            };
            update.headbars.push(bar);
        }
        Ok(InfoBlock::Hit(update))
    }
}

/// Tinting; only observers allowed by the block reach this encoder
#[derive(Debug, Clone, Copy)]
pub struct TintingEncoder {
    pub start: ShortOrder,
    pub end: ShortOrder,
    pub colour: ByteTransform,
}

impl BlockEncoder for TintingEncoder {
    fn kind(&self) -> InfoKind {
        InfoKind::Tinting
    }

    fn encode(
        &self,
        block: &InfoBlock,
        buf: &mut PacketBuffer,
        _ctx: &EncodeContext<'_>,
    ) -> CodecResult<()> {
        let InfoBlock::Tinting(tint) = block else {
            return Err(mismatch(self.kind(), block));
        };
        self.start.write(buf, tint.start);
        self.end.write(buf, tint.end);
        for value in [tint.hue, tint.saturation, tint.luminance, tint.opacity] {
            self.colour.write(buf, value);
        }
        Ok(())
    }

    fn decode(
        &self,
        buf: &mut PacketBuffer,
        _huffman: &dyn HuffmanCodec,
    ) -> CodecResult<InfoBlock> {
        Ok(InfoBlock::Tinting(Tinting {
            start: self.start.read(buf)?,
            end: self.end.read(buf)?,
            hue: self.colour.read(buf)?,
            saturation: self.colour.read(buf)?,
            luminance: self.colour.read(buf)?,
            opacity: self.colour.read(buf)?,
            observer: None,
        }))
    }
}
