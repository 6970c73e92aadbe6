//! Revision registry
//!
//! Maps each supported protocol revision to its [`EncoderSet`]: the mask bit
//! of every block kind, the order blocks appear in, and exactly one
//! [`BlockEncoder`] per kind. The table is built once on first use.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::error::{ConfigError, ProtocolError};
use crate::net::buffer::PacketBuffer;

use super::blocks::{InfoBlock, InfoKind};
use super::codec::{
    AppearanceEncoder, BlockEncoder, ByteTransform, BytesOrder, ChatEncoder, EncodeContext,
    ExactMoveEncoder, FaceEncoder, HitEncoder, HitFormat, HuffmanCodec, SayEncoder,
    SequenceEncoder, ShortOrder, SpeedEncoder, SpotAnimEncoder, TintingEncoder,
};
use super::flags::InfoFlags;

/// Supported protocol revisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Revision {
    R530,
    R562,
    R578,
}

impl Revision {
    pub const ALL: [Revision; 3] = [Revision::R530, Revision::R562, Revision::R578];

    pub const fn number(self) -> u32 {
        match self {
            Revision::R530 => 530,
            Revision::R562 => 562,
            Revision::R578 => 578,
        }
    }

    /// Opcode of the avatar info packet in this revision
    pub const fn info_opcode(self) -> u8 {
        match self {
            Revision::R530 => 225,
            Revision::R562 => 90,
            Revision::R578 => 69,
        }
    }
}

impl TryFrom<u32> for Revision {
    type Error = ConfigError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            530 => Ok(Revision::R530),
            562 => Ok(Revision::R562),
            578 => Ok(Revision::R578),
            other => Err(ConfigError::UnsupportedRevision(other)),
        }
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

/// Mask bits and block order of one revision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskLayout {
    /// Mask bit per kind, indexed by [`InfoKind::index`]
    pub bits: [u16; InfoKind::COUNT],
    /// Order blocks are written in
    pub order: [InfoKind; InfoKind::COUNT],
    /// Bit in the first mask byte announcing a second byte
    pub extension: u16,
}

impl MaskLayout {
    /// Mask value for a set of kinds, extension bit included when needed
    pub fn mask(&self, flags: InfoFlags) -> u16 {
        let mut mask = flags
            .kinds()
            .fold(0u16, |acc, kind| acc | self.bits[kind.index()]);
        if mask > 0xff {
            mask |= self.extension;
        }
        mask
    }

    pub fn write(&self, flags: InfoFlags, buf: &mut PacketBuffer) {
        let mask = self.mask(flags);
        buf.write_u8(mask as u8);
        if mask > 0xff {
            buf.write_u8((mask >> 8) as u8);
        }
    }

    pub fn read(&self, buf: &mut PacketBuffer) -> Result<InfoFlags, ProtocolError> {
        let mut mask = buf.read_u8()? as u16;
        if mask & self.extension != 0 {
            mask |= (buf.read_u8()? as u16) << 8;
        }
        Ok(InfoKind::ALL
            .into_iter()
            .filter(|kind| mask & self.bits[kind.index()] != 0)
            .fold(InfoFlags::empty(), |acc, kind| acc | InfoFlags::of(kind)))
    }

    /// Kinds of `flags` in wire order
    pub fn ordered(&self, flags: InfoFlags) -> impl Iterator<Item = InfoKind> + '_ {
        self.order.iter().copied().filter(move |kind| flags.has(*kind))
    }
}

/// Everything needed to write the extended info of one revision
#[derive(Clone)]
pub struct EncoderSet {
    revision: Revision,
    layout: MaskLayout,
    encoders: [Arc<dyn BlockEncoder>; InfoKind::COUNT],
}

impl EncoderSet {
    /// Shared encoder set for a revision
    pub fn for_revision(revision: Revision) -> Result<Arc<EncoderSet>, ConfigError> {
        REGISTRY
            .get(&revision)
            .cloned()
            .ok_or(ConfigError::UnsupportedRevision(revision.number()))
    }

    pub fn revision(&self) -> Revision {
        self.revision
    }

    pub fn layout(&self) -> &MaskLayout {
        &self.layout
    }

    pub fn encoder(&self, kind: InfoKind) -> &dyn BlockEncoder {
        self.encoders[kind.index()].as_ref()
    }

    /// Copy of this set with one encoder swapped out
    pub fn with_encoder(mut self, encoder: Arc<dyn BlockEncoder>) -> Self {
        let index = encoder.kind().index();
        self.encoders[index] = encoder;
        self
    }

    pub fn encode_block(
        &self,
        block: &InfoBlock,
        buf: &mut PacketBuffer,
        ctx: &EncodeContext<'_>,
    ) -> Result<(), ProtocolError> {
        self.encoder(block.kind()).encode(block, buf, ctx)
    }

    /// Decode one mask and the blocks following it
    pub fn decode_blocks(
        &self,
        buf: &mut PacketBuffer,
        huffman: &dyn HuffmanCodec,
    ) -> Result<Vec<InfoBlock>, ProtocolError> {
        let flags = self.layout.read(buf)?;
        self.layout
            .ordered(flags)
            .map(|kind| self.encoder(kind).decode(buf, huffman))
            .collect()
    }
}

impl fmt::Debug for EncoderSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncoderSet")
            .field("revision", &self.revision)
            .field("layout", &self.layout)
            .finish()
    }
}

static REGISTRY: Lazy<HashMap<Revision, Arc<EncoderSet>>> = Lazy::new(|| {
    Revision::ALL
        .into_iter()
        .map(|revision| (revision, Arc::new(build(revision))))
        .collect()
});

fn build(revision: Revision) -> EncoderSet {
    use InfoKind::*;

    match revision {
        Revision::R530 => EncoderSet {
            revision,
            layout: MaskLayout {
                bits: [
                    0x10, 0x200, 0x800, 0x8, 0x2, 0x1, 0x4, 0x80, 0x400, 0x100, 0x20, 0x1000,
                ],
                order: [
                    SpotAnim,
                    Sequence,
                    ExactMove,
                    Say,
                    Chat,
                    FacePathingEntity,
                    Appearance,
                    FaceAngle,
                    Hit,
                    MoveSpeed,
                    TemporaryMoveSpeed,
                    Tinting,
                ],
                extension: 0x40,
            },
            encoders: [
                Arc::new(AppearanceEncoder {
                    length: ByteTransform::Plain,
                    body: BytesOrder::Forward,
                }),
                Arc::new(SpeedEncoder {
                    temporary: false,
                    transform: ByteTransform::Neg,
                }),
                Arc::new(SpeedEncoder {
                    temporary: true,
                    transform: ByteTransform::Plain,
                }),
                Arc::new(SequenceEncoder {
                    id: ShortOrder::Le,
                    delay: ByteTransform::Plain,
                }),
                Arc::new(FaceEncoder {
                    entity: false,
                    order: ShortOrder::LeAdd,
                }),
                Arc::new(FaceEncoder {
                    entity: true,
                    order: ShortOrder::Le,
                }),
                Arc::new(SayEncoder),
                Arc::new(ChatEncoder {
                    effects: ShortOrder::Le,
                    rights: ByteTransform::Plain,
                    payload: BytesOrder::Reversed,
                }),
                Arc::new(ExactMoveEncoder {
                    offsets: ByteTransform::Sub,
                    start_delay: ShortOrder::BeAdd,
                    end_delay: ShortOrder::Le,
                    direction: ByteTransform::Neg,
                }),
                Arc::new(SpotAnimEncoder {
                    id: ShortOrder::Be,
                    packed: true,
                }),
                Arc::new(HitEncoder {
                    format: HitFormat::Compact,
                }),
                Arc::new(TintingEncoder {
                    start: ShortOrder::Be,
                    end: ShortOrder::Be,
                    colour: ByteTransform::Add,
                }),
            ],
        },
        Revision::R562 => EncoderSet {
            revision,
            layout: MaskLayout {
                bits: [
                    0x4, 0x800, 0x1000, 0x2, 0x20, 0x8, 0x10, 0x40, 0x400, 0x200, 0x1, 0x2000,
                ],
                order: [
                    Chat,
                    Sequence,
                    Hit,
                    Appearance,
                    FacePathingEntity,
                    FaceAngle,
                    Say,
                    SpotAnim,
                    ExactMove,
                    TemporaryMoveSpeed,
                    MoveSpeed,
                    Tinting,
                ],
                extension: 0x80,
            },
            encoders: [
                Arc::new(AppearanceEncoder {
                    length: ByteTransform::Neg,
                    body: BytesOrder::Reversed,
                }),
                Arc::new(SpeedEncoder {
                    temporary: false,
                    transform: ByteTransform::Add,
                }),
                Arc::new(SpeedEncoder {
                    temporary: true,
                    transform: ByteTransform::Neg,
                }),
                Arc::new(SequenceEncoder {
                    id: ShortOrder::Be,
                    delay: ByteTransform::Neg,
                }),
                Arc::new(FaceEncoder {
                    entity: false,
                    order: ShortOrder::Be,
                }),
                Arc::new(FaceEncoder {
                    entity: true,
                    order: ShortOrder::BeAdd,
                }),
                Arc::new(SayEncoder),
                Arc::new(ChatEncoder {
                    effects: ShortOrder::Be,
                    rights: ByteTransform::Neg,
                    payload: BytesOrder::Forward,
                }),
                Arc::new(ExactMoveEncoder {
                    offsets: ByteTransform::Add,
                    start_delay: ShortOrder::Le,
                    end_delay: ShortOrder::BeAdd,
                    direction: ByteTransform::Plain,
                }),
                Arc::new(SpotAnimEncoder {
                    id: ShortOrder::LeAdd,
                    packed: true,
                }),
                Arc::new(HitEncoder {
                    format: HitFormat::Smart,
                }),
                Arc::new(TintingEncoder {
                    start: ShortOrder::Le,
                    end: ShortOrder::LeAdd,
                    colour: ByteTransform::Plain,
                }),
            ],
        },
        Revision::R578 => EncoderSet {
            revision,
            layout: MaskLayout {
                bits: [
                    0x1, 0x100, 0x800, 0x10, 0x20, 0x40, 0x4, 0x80, 0x1000, 0x200, 0x8, 0x400,
                ],
                order: [
                    Appearance,
                    Sequence,
                    Chat,
                    Say,
                    FacePathingEntity,
                    FaceAngle,
                    Hit,
                    ExactMove,
                    SpotAnim,
                    Tinting,
                    MoveSpeed,
                    TemporaryMoveSpeed,
                ],
                extension: 0x2,
            },
            encoders: [
                Arc::new(AppearanceEncoder {
                    length: ByteTransform::Add,
                    body: BytesOrder::Add,
                }),
                Arc::new(SpeedEncoder {
                    temporary: false,
                    transform: ByteTransform::Sub,
                }),
                Arc::new(SpeedEncoder {
                    temporary: true,
                    transform: ByteTransform::Add,
                }),
                Arc::new(SequenceEncoder {
                    id: ShortOrder::LeAdd,
                    delay: ByteTransform::Add,
                }),
                Arc::new(FaceEncoder {
                    entity: false,
                    order: ShortOrder::BeAdd,
                }),
                Arc::new(FaceEncoder {
                    entity: true,
                    order: ShortOrder::LeAdd,
                }),
                Arc::new(SayEncoder),
                Arc::new(ChatEncoder {
                    effects: ShortOrder::BeAdd,
                    rights: ByteTransform::Add,
                    payload: BytesOrder::Add,
                }),
                Arc::new(ExactMoveEncoder {
                    offsets: ByteTransform::Plain,
                    start_delay: ShortOrder::Be,
                    end_delay: ShortOrder::Be,
                    direction: ByteTransform::Sub,
                }),
                Arc::new(SpotAnimEncoder {
                    id: ShortOrder::BeAdd,
                    packed: false,
                }),
                Arc::new(HitEncoder {
                    format: HitFormat::SmartAdd,
                }),
                Arc::new(TintingEncoder {
                    start: ShortOrder::BeAdd,
                    end: ShortOrder::Be,
                    colour: ByteTransform::Sub,
                }),
            ],
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::info::blocks::{
        Appearance, ChatMessage, ExactMove, Headbar, HitMark, HitUpdate, Sequence, SpotAnim,
        Tinting,
    };
    use crate::game::info::codec::Latin1Codec;
    use pretty_assertions::assert_eq;

    fn snapshot() -> Vec<InfoBlock> {
        let mut appearance = Appearance::default();
        appearance.name = "Zezima".to_string();
        appearance.colours = [3, 7, 1, 0, 2];
        appearance.skull_icon = 0;

        vec![
            InfoBlock::Appearance(appearance),
            InfoBlock::MoveSpeed(2),
            InfoBlock::TemporaryMoveSpeed(127),
            InfoBlock::Sequence(Sequence { id: 866, delay: 3 }),
            InfoBlock::FaceAngle(1536),
            InfoBlock::FacePathingEntity(32768 + 12),
            InfoBlock::Say("Buying gf".into()),
            InfoBlock::Chat(ChatMessage {
                colour: 9,
                effects: 2,
                rights: 1,
                text: "selling lobbies".into(),
            }),
            InfoBlock::ExactMove(ExactMove {
                start_x: 1,
                start_z: 2,
                end_x: 3,
                end_z: 4,
                start_delay: 30,
                end_delay: 60,
                direction: 2,
            }),
            InfoBlock::SpotAnim(SpotAnim {
                id: 86,
                height: 100,
                delay: 5,
            }),
            InfoBlock::Hit(HitUpdate {
                hits: vec![HitMark {
                    kind: 1,
                    self_kind: 1,
                    source: None,
                    damage: 300,
                    delay: 0,
                }],
                headbars: vec![Headbar {
                    id: 0,
                    fill: 200,
                    delay: 0,
                }],
            }),
            InfoBlock::Tinting(Tinting {
                start: 0,
                end: 45,
                hue: 20,
                saturation: 40,
                luminance: 60,
                opacity: 80,
                observer: None,
            }),
        ]
    }

    #[test]
    fn test_revision_tags() {
        assert_eq!(Revision::try_from(578).unwrap(), Revision::R578);
        assert_eq!(
            Revision::try_from(317).unwrap_err(),
            ConfigError::UnsupportedRevision(317)
        );
        for revision in Revision::ALL {
            assert_eq!(Revision::try_from(revision.number()).unwrap(), revision);
        }
    }

    #[test]
    fn test_one_encoder_per_kind() {
        for revision in Revision::ALL {
            let set = EncoderSet::for_revision(revision).unwrap();
            assert_eq!(set.revision(), revision);
            for kind in InfoKind::ALL {
                assert_eq!(set.encoder(kind).kind(), kind);
            }

            // Every kind appears exactly once in the order and has a distinct bit
            let mut order = set.layout().order.to_vec();
            order.sort();
            assert_eq!(order, InfoKind::ALL.to_vec());

            let mut seen = 0u16;
            for bit in set.layout().bits {
                assert_eq!(bit.count_ones(), 1);
                assert_eq!(seen & bit, 0);
                assert_eq!(bit & set.layout().extension, 0);
                seen |= bit;
            }
        }
    }

    #[test]
    fn test_mask_extension() {
        let set = EncoderSet::for_revision(Revision::R530).unwrap();
        let layout = set.layout();

        let mut buf = PacketBuffer::new();
        layout.write(InfoFlags::SAY | InfoFlags::APPEARANCE, &mut buf);
        assert_eq!(buf.as_bytes(), &[0x14]);

        let mut buf = PacketBuffer::new();
        layout.write(InfoFlags::SAY | InfoFlags::SPOT_ANIM, &mut buf);
        assert_eq!(buf.as_bytes(), &[0x44, 0x01]);
        assert_eq!(layout.read(&mut buf).unwrap(), InfoFlags::SAY | InfoFlags::SPOT_ANIM);
    }

    #[test]
    fn test_size_hint_bounds_encoded_size() {
        let blocks = snapshot();
        let ctx = EncodeContext {
            subject: 1,
            observer: Some(1),
            huffman: &Latin1Codec,
        };
        for revision in Revision::ALL {
            let set = EncoderSet::for_revision(revision).unwrap();
            for block in &blocks {
                let mut buf = PacketBuffer::new();
                set.encode_block(block, &mut buf, &ctx).unwrap();
                assert!(
                    buf.len() <= block.size_hint(),
                    "{} in {revision}: {} > {}",
                    block.kind(),
                    buf.len(),
                    block.size_hint()
                );
            }
        }
    }

    #[test]
    fn test_full_snapshot_round_trip() {
        let blocks = snapshot();
        for revision in Revision::ALL {
            let set = EncoderSet::for_revision(revision).unwrap();
            let ctx = EncodeContext {
                subject: 1,
                observer: None,
                huffman: &Latin1Codec,
            };

            let flags = InfoFlags::all();
            let mut buf = PacketBuffer::new();
            set.layout().write(flags, &mut buf);
            for kind in set.layout().ordered(flags) {
                set.encode_block(&blocks[kind.index()], &mut buf, &ctx).unwrap();
            }

            let mut decoded = set.decode_blocks(&mut buf, &Latin1Codec).unwrap();
            assert_eq!(buf.remaining(), 0, "revision {revision}");
            decoded.sort_by_key(|block| block.kind());
            assert_eq!(decoded, blocks, "revision {revision}");
        }
    }

    #[test]
    fn test_revisions_differ_on_the_wire() {
        let block = InfoBlock::Sequence(Sequence { id: 0x0102, delay: 1 });
        let ctx = EncodeContext {
            subject: 1,
            observer: None,
            huffman: &Latin1Codec,
        };

        let wire: Vec<Vec<u8>> = Revision::ALL
            .into_iter()
            .map(|revision| {
                let mut buf = PacketBuffer::new();
                EncoderSet::for_revision(revision)
                    .unwrap()
                    .encode_block(&block, &mut buf, &ctx)
                    .unwrap();
                buf.as_bytes().to_vec()
            })
            .collect();

        assert_eq!(wire[0], vec![0x02, 0x01, 0x01]);
        assert_eq!(wire[1], vec![0x01, 0x02, 0xff]);
        assert_eq!(wire[2], vec![0x82, 0x01, 0x81]);
    }
}
