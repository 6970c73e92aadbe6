//! Game module
//!
//! The game-side state the synchronization engine reads:
//! - Avatars and their repository (dense indices, generations)
//! - Packed coordinates, regions and zones
//! - Extended info blocks and their per-revision codecs
//! - Per-tick synchronization of all of the above to observers

pub mod avatar;
pub mod coord;
pub mod info;
pub mod sync;

pub use avatar::{Avatar, AvatarRepository};
pub use coord::{CoordGrid, RegionRef};
