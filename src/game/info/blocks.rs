//! Extended info blocks
//!
//! Each avatar carries one optional slot per [`InfoKind`]. Game logic fills
//! slots through the typed setters on [`ExtendedInfo`], which also flag the
//! block dirty. At the end of a tick dirty flags are cleared; transient blocks
//! are emptied, cached blocks keep their value so that observers who start
//! tracking the avatar later still receive them.

use std::fmt;

use super::flags::InfoFlags;

/// Whether a block survives the tick it was sent in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persistence {
    /// Reset after every tick in which it was set
    Transient,
    /// Kept until overwritten; resent in full to new observers
    Cached,
}

/// How a block reaches an observer's packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Encoded once per tick into a buffer shared by all observers
    Precomputed,
    /// Encoded per observer because the bytes depend on who is looking
    OnDemand,
}

/// Extended info block kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum InfoKind {
    Appearance = 0,
    MoveSpeed = 1,
    TemporaryMoveSpeed = 2,
    Sequence = 3,
    FaceAngle = 4,
    FacePathingEntity = 5,
    Say = 6,
    Chat = 7,
    ExactMove = 8,
    SpotAnim = 9,
    Hit = 10,
    Tinting = 11,
}

impl InfoKind {
    pub const COUNT: usize = 12;

    pub const ALL: [InfoKind; Self::COUNT] = [
        InfoKind::Appearance,
        InfoKind::MoveSpeed,
        InfoKind::TemporaryMoveSpeed,
        InfoKind::Sequence,
        InfoKind::FaceAngle,
        InfoKind::FacePathingEntity,
        InfoKind::Say,
        InfoKind::Chat,
        InfoKind::ExactMove,
        InfoKind::SpotAnim,
        InfoKind::Hit,
        InfoKind::Tinting,
    ];

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn name(self) -> &'static str {
        match self {
            InfoKind::Appearance => "appearance",
            InfoKind::MoveSpeed => "move_speed",
            InfoKind::TemporaryMoveSpeed => "temporary_move_speed",
            InfoKind::Sequence => "sequence",
            InfoKind::FaceAngle => "face_angle",
            InfoKind::FacePathingEntity => "face_pathing_entity",
            InfoKind::Say => "say",
            InfoKind::Chat => "chat",
            InfoKind::ExactMove => "exact_move",
            InfoKind::SpotAnim => "spot_anim",
            InfoKind::Hit => "hit",
            InfoKind::Tinting => "tinting",
        }
    }

    pub const fn persistence(self) -> Persistence {
        match self {
            InfoKind::Appearance
            | InfoKind::MoveSpeed
            | InfoKind::FaceAngle
            | InfoKind::FacePathingEntity => Persistence::Cached,
            _ => Persistence::Transient,
        }
    }

    pub const fn strategy(self) -> Strategy {
        match self {
            InfoKind::Hit | InfoKind::Tinting => Strategy::OnDemand,
            _ => Strategy::Precomputed,
        }
    }

    pub fn is_precomputed(self) -> bool {
        self.strategy() == Strategy::Precomputed
    }
}

impl fmt::Display for InfoKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Number of body slots in an appearance
pub const BODY_SLOTS: usize = 12;

/// Number of recolourable body parts
pub const COLOUR_SLOTS: usize = 5;

/// Avatar appearance (for model rendering)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Appearance {
    /// Gender (0 = male, 1 = female)
    pub gender: u8,
    /// Skull icon, -1 for none
    pub skull_icon: i8,
    /// Prayer icon, -1 for none
    pub prayer_icon: i8,
    /// Body slot codes; 0 is empty, otherwise `0x100 + kit` or `0x200 + item`
    pub body: [u16; BODY_SLOTS],
    /// Body part colours
    pub colours: [u8; COLOUR_SLOTS],
    /// Base animation set
    pub bas: u16,
    /// Display name
    pub name: String,
    /// Combat level
    pub combat_level: u8,
}

impl Default for Appearance {
    fn default() -> Self {
        Self {
            gender: 0,
            skull_icon: -1,
            prayer_icon: -1,
            body: [
                0, 0, 0, 0, 0x112, 0, 0x11a, 0x124, 0x100, 0x121, 0x12a, 0x10a,
            ],
            colours: [0; COLOUR_SLOTS],
            bas: 1426,
            name: String::new(),
            combat_level: 3,
        }
    }
}

/// Animation sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sequence {
    /// Sequence id, 0xffff resets the animation
    pub id: u16,
    pub delay: u8,
}

/// Public chat message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub colour: u8,
    pub effects: u8,
    /// Sender's rights icon
    pub rights: u8,
    pub text: String,
}

/// Forced movement between two offsets from the avatar's position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExactMove {
    pub start_x: u8,
    pub start_z: u8,
    pub end_x: u8,
    pub end_z: u8,
    /// Ticks (in client cycles) until the start position is reached
    pub start_delay: u16,
    /// Client cycles until the end position is reached
    pub end_delay: u16,
    pub direction: u8,
}

/// Graphic effect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpotAnim {
    pub id: u16,
    pub height: u16,
    pub delay: u16,
}

/// One hit splat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HitMark {
    /// Splat type shown to everyone else
    pub kind: u8,
    /// Splat type shown to the avatar that dealt the hit and the avatar hit
    pub self_kind: u8,
    /// Avatar that dealt the hit, not sent on the wire
    pub source: Option<u16>,
    pub damage: u16,
    pub delay: u16,
}

/// Health bar update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Headbar {
    pub id: u8,
    /// Fill ratio, 0 = empty, 255 = full
    pub fill: u8,
    pub delay: u16,
}

/// All hits and headbars of one tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HitUpdate {
    pub hits: Vec<HitMark>,
    pub headbars: Vec<Headbar>,
}

/// Colour tint, optionally visible to a single observer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tinting {
    pub start: u16,
    pub end: u16,
    pub hue: u8,
    pub saturation: u8,
    pub luminance: u8,
    pub opacity: u8,
    /// Only this observer's avatar sees the tint; not sent on the wire
    pub observer: Option<u16>,
}

/// An extended info block with its data
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InfoBlock {
    Appearance(Appearance),
    MoveSpeed(u8),
    TemporaryMoveSpeed(u8),
    Sequence(Sequence),
    FaceAngle(u16),
    FacePathingEntity(u16),
    Say(String),
    Chat(ChatMessage),
    ExactMove(ExactMove),
    SpotAnim(SpotAnim),
    Hit(HitUpdate),
    Tinting(Tinting),
}

impl InfoBlock {
    pub fn kind(&self) -> InfoKind {
        match self {
            InfoBlock::Appearance(_) => InfoKind::Appearance,
            InfoBlock::MoveSpeed(_) => InfoKind::MoveSpeed,
            InfoBlock::TemporaryMoveSpeed(_) => InfoKind::TemporaryMoveSpeed,
            InfoBlock::Sequence(_) => InfoKind::Sequence,
            InfoBlock::FaceAngle(_) => InfoKind::FaceAngle,
            InfoBlock::FacePathingEntity(_) => InfoKind::FacePathingEntity,
            InfoBlock::Say(_) => InfoKind::Say,
            InfoBlock::Chat(_) => InfoKind::Chat,
            InfoBlock::ExactMove(_) => InfoKind::ExactMove,
            InfoBlock::SpotAnim(_) => InfoKind::SpotAnim,
            InfoBlock::Hit(_) => InfoKind::Hit,
            InfoBlock::Tinting(_) => InfoKind::Tinting,
        }
    }

    /// Upper bound of the block's encoded size in any supported revision
    pub fn size_hint(&self) -> usize {
        match self {
            // length, gender, icons, body, colours, bas, name, combat level
            InfoBlock::Appearance(appearance) => {
                1 + 3 + BODY_SLOTS * 2 + COLOUR_SLOTS + 2 + appearance.name.len() + 1 + 1
            }
            InfoBlock::MoveSpeed(_) | InfoBlock::TemporaryMoveSpeed(_) => 1,
            InfoBlock::Sequence(_) => 3,
            InfoBlock::FaceAngle(_) | InfoBlock::FacePathingEntity(_) => 2,
            InfoBlock::Say(text) => text.len() + 1,
            // Compressed text may outgrow the plain text slightly
            InfoBlock::Chat(chat) => 2 + 1 + 2 + 1 + chat.text.len() + chat.text.len() / 8 + 1,
            InfoBlock::ExactMove(_) => 9,
            InfoBlock::SpotAnim(_) => 6,
            InfoBlock::Hit(update) => 2 + update.hits.len() * 6 + update.headbars.len() * 5,
            InfoBlock::Tinting(_) => 8,
        }
    }

    /// Whether the observer whose avatar is `observer` may see this block
    pub fn visible_to(&self, observer: u16) -> bool {
        match self {
            InfoBlock::Tinting(tint) => tint.observer.map_or(true, |only| only == observer),
            _ => true,
        }
    }
}

/// Extended info slots of one avatar
#[derive(Debug, Clone, Default)]
pub struct ExtendedInfo {
    blocks: [Option<InfoBlock>; InfoKind::COUNT],
    dirty: InfoFlags,
}

impl ExtendedInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a block and flag it dirty
    pub fn set(&mut self, block: InfoBlock) {
        let kind = block.kind();
        self.blocks[kind.index()] = Some(block);
        self.dirty.insert(InfoFlags::of(kind));
    }

    pub fn get(&self, kind: InfoKind) -> Option<&InfoBlock> {
        self.blocks[kind.index()].as_ref()
    }

    /// Blocks changed this tick
    pub fn dirty(&self) -> InfoFlags {
        self.dirty
    }

    /// Blocks currently holding a value
    pub fn present(&self) -> InfoFlags {
        InfoKind::ALL
            .into_iter()
            .filter(|kind| self.blocks[kind.index()].is_some())
            .fold(InfoFlags::empty(), |acc, kind| acc | InfoFlags::of(kind))
    }

    /// Restrict `flags` to the blocks the given observer may see
    pub fn visible(&self, flags: InfoFlags, observer: u16) -> InfoFlags {
        flags
            .kinds()
            .filter(|kind| self.get(*kind).is_some_and(|b| b.visible_to(observer)))
            .fold(InfoFlags::empty(), |acc, kind| acc | InfoFlags::of(kind))
    }

    /// Upper bound of the encoded size of `flags`' blocks, mask included
    pub fn size_hint(&self, flags: InfoFlags) -> usize {
        if !flags.has_update() {
            return 0;
        }
        flags
            .kinds()
            .filter_map(|kind| self.get(kind))
            .map(InfoBlock::size_hint)
            .sum::<usize>()
            + 2
    }

    pub fn set_appearance(&mut self, appearance: Appearance) {
        self.set(InfoBlock::Appearance(appearance));
    }

    pub fn set_move_speed(&mut self, speed: u8) {
        self.set(InfoBlock::MoveSpeed(speed));
    }

    pub fn set_temporary_move_speed(&mut self, speed: u8) {
        self.set(InfoBlock::TemporaryMoveSpeed(speed));
    }

    pub fn set_sequence(&mut self, id: u16, delay: u8) {
        self.set(InfoBlock::Sequence(Sequence { id, delay }));
    }

    pub fn set_face_angle(&mut self, angle: u16) {
        self.set(InfoBlock::FaceAngle(angle));
    }

    pub fn set_face_pathing_entity(&mut self, target: u16) {
        self.set(InfoBlock::FacePathingEntity(target));
    }

    pub fn say(&mut self, text: impl Into<String>) {
        self.set(InfoBlock::Say(text.into()));
    }

    pub fn set_chat(&mut self, message: ChatMessage) {
        self.set(InfoBlock::Chat(message));
    }

    pub fn set_exact_move(&mut self, exact_move: ExactMove) {
        self.set(InfoBlock::ExactMove(exact_move));
    }

    pub fn set_spot_anim(&mut self, id: u16, height: u16, delay: u16) {
        self.set(InfoBlock::SpotAnim(SpotAnim { id, height, delay }));
    }

    /// Queue a hit splat; several hits in one tick share a block
    pub fn add_hit(&mut self, hit: HitMark) {
        let mut update = self.take_hits();
        update.hits.push(hit);
        self.set(InfoBlock::Hit(update));
    }

    pub fn add_headbar(&mut self, headbar: Headbar) {
        let mut update = self.take_hits();
        update.headbars.push(headbar);
        self.set(InfoBlock::Hit(update));
    }

    fn take_hits(&mut self) -> HitUpdate {
        match self.blocks[InfoKind::Hit.index()].take() {
            Some(InfoBlock::Hit(update)) => update,
            _ => HitUpdate::default(),
        }
    }

    pub fn set_tinting(&mut self, tinting: Tinting) {
        self.set(InfoBlock::Tinting(tinting));
    }

    /// Clear dirty flags, dropping transient blocks
    pub fn end_tick(&mut self) {
        for kind in InfoKind::ALL {
            if kind.persistence() == Persistence::Transient {
                self.blocks[kind.index()] = None;
            }
        }
        self.dirty.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classes() {
        assert_eq!(InfoKind::Appearance.persistence(), Persistence::Cached);
        assert_eq!(InfoKind::FaceAngle.persistence(), Persistence::Cached);
        assert_eq!(InfoKind::Say.persistence(), Persistence::Transient);
        assert_eq!(InfoKind::Hit.strategy(), Strategy::OnDemand);
        assert_eq!(InfoKind::Tinting.strategy(), Strategy::OnDemand);
        assert!(InfoKind::Chat.is_precomputed());

        for (i, kind) in InfoKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), i);
        }
    }

    #[test]
    fn test_set_flags_dirty() {
        let mut info = ExtendedInfo::new();
        info.say("Hello");
        info.set_sequence(808, 0);

        assert_eq!(info.dirty(), InfoFlags::SAY | InfoFlags::SEQUENCE);
        assert_eq!(info.get(InfoKind::Say), Some(&InfoBlock::Say("Hello".into())));
    }

    #[test]
    fn test_end_tick_keeps_cached() {
        let mut info = ExtendedInfo::new();
        info.set_appearance(Appearance::default());
        info.set_face_angle(1024);
        info.say("bye");
        info.add_hit(HitMark {
            kind: 1,
            self_kind: 1,
            source: None,
            damage: 5,
            delay: 0,
        });

        info.end_tick();

        assert!(!info.dirty().has_update());
        assert_eq!(info.present(), InfoFlags::APPEARANCE | InfoFlags::FACE_ANGLE);
        assert!(info.get(InfoKind::Say).is_none());
        assert!(info.get(InfoKind::Hit).is_none());
    }

    #[test]
    fn test_hits_accumulate() {
        let mut info = ExtendedInfo::new();
        let hit = HitMark {
            kind: 1,
            self_kind: 2,
            source: Some(4),
            damage: 10,
            delay: 0,
        };
        info.add_hit(hit);
        info.add_hit(HitMark { damage: 3, ..hit });
        info.add_headbar(Headbar {
            id: 0,
            fill: 128,
            delay: 0,
        });

        match info.get(InfoKind::Hit) {
            Some(InfoBlock::Hit(update)) => {
                assert_eq!(update.hits.len(), 2);
                assert_eq!(update.headbars.len(), 1);
            }
            other => panic!("unexpected hit slot: {other:?}"),
        }
    }

    #[test]
    fn test_restricted_tinting() {
        let mut info = ExtendedInfo::new();
        info.set_tinting(Tinting {
            start: 0,
            end: 30,
            hue: 10,
            saturation: 5,
            luminance: 60,
            opacity: 100,
            observer: Some(7),
        });
        info.say("visible to all");

        let dirty = info.dirty();
        assert_eq!(info.visible(dirty, 7), InfoFlags::TINTING | InfoFlags::SAY);
        assert_eq!(info.visible(dirty, 8), InfoFlags::SAY);
    }
}
