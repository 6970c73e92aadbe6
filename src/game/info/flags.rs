//! Dirty flags for extended info
//!
//! Tracks which extended info blocks of an avatar changed this tick and need
//! to be sent to observers that already track it.

use bitflags::bitflags;

use super::blocks::InfoKind;

bitflags! {
    /// Extended info blocks flagged for synchronization
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct InfoFlags: u16 {
        /// Appearance has changed (body, colours, name)
        const APPEARANCE = 1 << 0;
        /// Persistent movement speed
        const MOVE_SPEED = 1 << 1;
        /// Movement speed for this tick only
        const TEMP_MOVE_SPEED = 1 << 2;
        /// Animation sequence
        const SEQUENCE = 1 << 3;
        /// Face angle
        const FACE_ANGLE = 1 << 4;
        /// Face another avatar
        const FACE_PATHING_ENTITY = 1 << 5;
        /// Overhead text
        const SAY = 1 << 6;
        /// Public chat
        const CHAT = 1 << 7;
        /// Forced movement (cutscenes, agility)
        const EXACT_MOVE = 1 << 8;
        /// Graphic effect
        const SPOT_ANIM = 1 << 9;
        /// Hit splats and headbars
        const HIT = 1 << 10;
        /// Colour tint
        const TINTING = 1 << 11;
    }
}

impl InfoFlags {
    /// Check if any block is flagged
    pub fn has_update(&self) -> bool {
        !self.is_empty()
    }

    /// Flag for a single kind
    pub fn of(kind: InfoKind) -> Self {
        Self::from_bits_retain(1 << kind.index())
    }

    /// Check a single kind
    pub fn has(&self, kind: InfoKind) -> bool {
        self.contains(Self::of(kind))
    }

    /// Flagged kinds in declaration order
    pub fn kinds(self) -> impl Iterator<Item = InfoKind> {
        InfoKind::ALL.into_iter().filter(move |kind| self.has(*kind))
    }

    /// Clear all flags
    pub fn clear(&mut self) {
        *self = Self::empty();
    }
}
