//! Extended info
//!
//! Optional per-avatar data blocks (appearance, chat, hits, ...), their dirty
//! tracking and the per-revision codecs that put them on the wire.

pub mod blocks;
pub mod codec;
pub mod flags;
pub mod registry;

pub use blocks::{
    Appearance, ChatMessage, ExactMove, ExtendedInfo, Headbar, HitMark, HitUpdate, InfoBlock,
    InfoKind, Persistence, Sequence, SpotAnim, Strategy, Tinting,
};
pub use codec::{BlockEncoder, EncodeContext, HuffmanCodec, Latin1Codec};
pub use flags::InfoFlags;
pub use registry::{EncoderSet, MaskLayout, Revision};
