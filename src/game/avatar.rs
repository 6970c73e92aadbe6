//! Avatar repository
//!
//! A fixed-capacity arena of avatars. Indices are dense slots handed out
//! lowest-first from a free list and recycled after removal. Every time a slot
//! is assigned its generation is bumped, so an observer that still remembers
//! the old occupant can tell a recycled index from the same avatar moving.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::config::MAX_AVATAR_INDEX;
use crate::error::GameError;

use super::coord::CoordGrid;
use super::info::ExtendedInfo;

/// A player or NPC tracked by the protocol
#[derive(Debug, Clone)]
pub struct Avatar {
    index: u16,
    generation: u32,
    coord: CoordGrid,
    /// Extended info blocks, written by game logic between ticks
    pub info: ExtendedInfo,
}

impl Avatar {
    #[inline]
    pub fn index(&self) -> u16 {
        self.index
    }

    /// Assignment count of this avatar's slot
    #[inline]
    pub fn generation(&self) -> u32 {
        self.generation
    }

    #[inline]
    pub fn coord(&self) -> CoordGrid {
        self.coord
    }

    pub fn set_coord(&mut self, coord: CoordGrid) {
        self.coord = coord;
    }
}

/// Indexed storage of all live avatars
#[derive(Debug)]
pub struct AvatarRepository {
    slots: Vec<Option<Avatar>>,
    generations: Vec<u32>,
    free: BTreeSet<u16>,
    count: usize,
}

impl AvatarRepository {
    /// Create a repository with `capacity` slots (indices `0..capacity`)
    ///
    /// Capacity is clamped so that no index reaches the list terminator.
    pub fn new(capacity: u16) -> Self {
        let limit = MAX_AVATAR_INDEX + 1;
        let capacity = if capacity > limit {
            warn!(
                requested = capacity,
                capacity = limit,
                "Avatar repository capacity clamped"
            );
            limit
        } else {
            capacity
        };

        Self {
            slots: (0..capacity).map(|_| None).collect(),
            generations: vec![0; capacity as usize],
            free: (0..capacity).collect(),
            count: 0,
        }
    }

    /// Place a new avatar in the lowest free slot
    pub fn insert(&mut self, coord: CoordGrid) -> Result<u16, GameError> {
        let index = self.free.pop_first().ok_or(GameError::RepositoryFull {
            capacity: self.slots.len(),
        })?;

        let generation = &mut self.generations[index as usize];
        *generation = generation.wrapping_add(1);

        self.slots[index as usize] = Some(Avatar {
            index,
            generation: *generation,
            coord,
            info: ExtendedInfo::new(),
        });
        self.count += 1;

        debug!(index = index, generation = *generation, coord = %coord, "Avatar added");
        Ok(index)
    }

    /// Remove an avatar, freeing its index
    pub fn remove(&mut self, index: u16) -> Result<Avatar, GameError> {
        let avatar = self
            .slots
            .get_mut(index as usize)
            .and_then(Option::take)
            .ok_or(GameError::AvatarNotFound(index))?;
        self.free.insert(index);
        self.count -= 1;

        debug!(index = index, generation = avatar.generation, "Avatar removed");
        Ok(avatar)
    }

    pub fn get(&self, index: u16) -> Option<&Avatar> {
        self.slots.get(index as usize).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, index: u16) -> Option<&mut Avatar> {
        self.slots.get_mut(index as usize).and_then(Option::as_mut)
    }

    pub fn contains(&self, index: u16) -> bool {
        self.get(index).is_some()
    }

    /// Move an avatar
    pub fn set_coord(&mut self, index: u16, coord: CoordGrid) -> Result<(), GameError> {
        self.get_mut(index)
            .ok_or(GameError::AvatarNotFound(index))?
            .set_coord(coord);
        Ok(())
    }

    /// Live avatars in ascending index order
    pub fn iter(&self) -> impl Iterator<Item = &Avatar> + '_ {
        self.slots.iter().flatten()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Avatar> + '_ {
        self.slots.iter_mut().flatten()
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Reset per-tick extended info on every avatar
    pub fn end_tick(&mut self) {
        for avatar in self.iter_mut() {
            avatar.info.end_tick();
        }
    }
}
