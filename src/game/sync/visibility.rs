//! Per-observer visibility tracking
//!
//! Each connection owns an [`ObserverState`]: the avatars it currently sees in
//! high resolution (full per-tick detail) and the regions it was last told
//! for everything else (low resolution). Once per tick the state is compared
//! with the repository to produce a [`TickPlan`]; the plan is only applied
//! to the state after the observer's packet was encoded successfully.

use std::collections::BTreeMap;
use std::fmt;

use tracing::trace;

use crate::crypto::StreamCipher;
use crate::error::SyncError;
use crate::game::avatar::{Avatar, AvatarRepository};
use crate::game::coord::{CoordGrid, RegionRef};
use crate::game::info::{InfoFlags, InfoKind};
use crate::net::buffer::MAX_PACKET_SIZE;

/// Bit segment bytes reserved per entry, rounded up
const ADDITION_BYTES: usize = 6;
const MOVEMENT_BYTES: usize = 6;
const LOW_RES_BYTES: usize = 4;

/// Limits applied while planning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisibilitySettings {
    /// Chebyshev radius for high resolution
    pub view_distance: u16,
    /// High-resolution capacity, own avatar included
    pub max_high_resolution: usize,
    /// Payload bytes one packet may use; additions that would not fit wait
    /// for a later tick
    pub packet_budget: usize,
}

impl Default for VisibilitySettings {
    fn default() -> Self {
        Self {
            view_distance: 15,
            max_high_resolution: 255,
            packet_budget: MAX_PACKET_SIZE,
        }
    }
}

/// A high-resolution avatar as last sent to the observer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tracked {
    pub generation: u32,
    pub coord: CoordGrid,
}

/// A low-resolution avatar as last sent to the observer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Distant {
    pub generation: u32,
    pub region: RegionRef,
}

/// Avatar entering high resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Addition {
    pub index: u16,
    pub generation: u32,
    pub coord: CoordGrid,
    /// The observer already knows the avatar's region from low resolution
    pub region_relative: bool,
    /// Full snapshot of every block set on the avatar
    pub info: InfoFlags,
}

/// High-resolution avatar that moved or has changed blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Movement {
    pub index: u16,
    pub from: CoordGrid,
    pub to: CoordGrid,
    pub info: InfoFlags,
}

/// Region change of a low-resolution avatar; `None` once it is gone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LowResUpdate {
    pub index: u16,
    pub generation: u32,
    pub region: Option<RegionRef>,
}

/// What one observer's packet contains this tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickPlan {
    /// Ascending indices leaving high resolution
    pub removals: Vec<u16>,
    pub additions: Vec<Addition>,
    pub movements: Vec<Movement>,
    pub low_res: Vec<LowResUpdate>,
    high_res: BTreeMap<u16, Tracked>,
}

impl TickPlan {
    /// Avatars with extended info, in packet order
    pub fn info_entries(&self) -> impl Iterator<Item = (u16, InfoFlags)> + '_ {
        self.additions
            .iter()
            .map(|a| (a.index, a.info))
            .chain(self.movements.iter().map(|m| (m.index, m.info)))
            .filter(|(_, info)| info.has_update())
    }

    /// Shared buffers this plan reads
    pub fn precomputed_needs(&self) -> impl Iterator<Item = (u16, InfoKind)> + '_ {
        self.info_entries().flat_map(|(index, info)| {
            info.kinds()
                .filter(|kind| kind.is_precomputed())
                .map(move |kind| (index, kind))
        })
    }

    /// High-resolution set once the plan is applied
    pub fn high_resolution(&self) -> impl Iterator<Item = u16> + '_ {
        self.high_res.keys().copied()
    }
}

/// Synchronization state of one connection
pub struct ObserverState {
    connection: u64,
    avatar: u16,
    high_res: BTreeMap<u16, Tracked>,
    low_res: BTreeMap<u16, Distant>,
    cipher: Box<dyn StreamCipher>,
    plan: Option<TickPlan>,
}

impl ObserverState {
    pub fn new(connection: u64, avatar: u16, cipher: Box<dyn StreamCipher>) -> Self {
        Self {
            connection,
            avatar,
            high_res: BTreeMap::new(),
            low_res: BTreeMap::new(),
            cipher,
            plan: None,
        }
    }

    pub fn connection(&self) -> u64 {
        self.connection
    }

    /// The observer's own avatar
    pub fn avatar(&self) -> u16 {
        self.avatar
    }

    pub fn high_resolution(&self) -> impl Iterator<Item = u16> + '_ {
        self.high_res.keys().copied()
    }

    pub fn is_high_resolution(&self, index: u16) -> bool {
        self.high_res.contains_key(&index)
    }

    pub fn tracked(&self, index: u16) -> Option<&Tracked> {
        self.high_res.get(&index)
    }

    pub fn low_resolution(&self, index: u16) -> Option<&Distant> {
        self.low_res.get(&index)
    }

    pub fn cipher_mut(&mut self) -> &mut dyn StreamCipher {
        self.cipher.as_mut()
    }

    /// Plan prepared for the current tick
    pub fn plan(&self) -> Option<&TickPlan> {
        self.plan.as_ref()
    }

    /// Compute and hold this tick's plan
    pub fn prepare(
        &mut self,
        repo: &AvatarRepository,
        settings: &VisibilitySettings,
    ) -> Result<(), SyncError> {
        self.plan = None;
        self.plan = Some(self.compute_plan(repo, settings)?);
        Ok(())
    }

    /// Compare the tracked sets with the repository
    pub fn compute_plan(
        &self,
        repo: &AvatarRepository,
        settings: &VisibilitySettings,
    ) -> Result<TickPlan, SyncError> {
        let own = repo
            .get(self.avatar)
            .ok_or(SyncError::ObserverAvatarMissing { index: self.avatar })?;
        let origin = own.coord();
        let in_view = |avatar: &Avatar| {
            avatar.index() == self.avatar || origin.within(avatar.coord(), settings.view_distance)
        };

        let mut plan = TickPlan::default();

        // Removal count, terminators, a region update for everyone and the
        // low-resolution removals
        let departed = self.low_res.keys().filter(|&&i| !repo.contains(i)).count();
        let mut budget = 1 + 6 + repo.len() * LOW_RES_BYTES + departed * 2;

        // Removals first, so a freed index can be re-added below
        for (&index, tracked) in &self.high_res {
            match repo.get(index) {
                Some(avatar) if avatar.generation() == tracked.generation && in_view(avatar) => {
                    let info = avatar.info.visible(avatar.info.dirty(), self.avatar);
                    if avatar.coord() != tracked.coord || info.has_update() {
                        budget += MOVEMENT_BYTES + avatar.info.size_hint(info);
                        plan.movements.push(Movement {
                            index,
                            from: tracked.coord,
                            to: avatar.coord(),
                            info,
                        });
                    }
                    plan.high_res.insert(
                        index,
                        Tracked {
                            generation: tracked.generation,
                            coord: avatar.coord(),
                        },
                    );
                }
                _ => {
                    budget += 2;
                    plan.removals.push(index);
                }
            }
        }

        // The own avatar always gets a slot
        let mut reserved = usize::from(!plan.high_res.contains_key(&self.avatar));
        let mut deferred = 0usize;
        for avatar in repo.iter() {
            let index = avatar.index();
            if plan.high_res.contains_key(&index) || !in_view(avatar) {
                continue;
            }
            let info = avatar.info.visible(avatar.info.present(), self.avatar);
            let cost = ADDITION_BYTES + avatar.info.size_hint(info);
            if index == self.avatar {
                reserved = 0;
            } else if plan.high_res.len() + reserved >= settings.max_high_resolution {
                continue;
            } else if budget + cost > settings.packet_budget {
                deferred += 1;
                continue;
            }
            budget += cost;

            let region_relative = self.low_res.get(&index).is_some_and(|distant| {
                distant.generation == avatar.generation()
                    && distant.region == avatar.coord().region()
            });
            plan.additions.push(Addition {
                index,
                generation: avatar.generation(),
                coord: avatar.coord(),
                region_relative,
                info,
            });
            plan.high_res.insert(
                index,
                Tracked {
                    generation: avatar.generation(),
                    coord: avatar.coord(),
                },
            );
        }

        for avatar in repo.iter() {
            let index = avatar.index();
            if plan.high_res.contains_key(&index) {
                continue;
            }
            let region = avatar.coord().region();
            let known = self.low_res.get(&index).is_some_and(|distant| {
                distant.generation == avatar.generation() && distant.region == region
            });
            if !known {
                plan.low_res.push(LowResUpdate {
                    index,
                    generation: avatar.generation(),
                    region: Some(region),
                });
            }
        }
        for (&index, distant) in &self.low_res {
            if !repo.contains(index) {
                plan.low_res.push(LowResUpdate {
                    index,
                    generation: distant.generation,
                    region: None,
                });
            }
        }
        plan.low_res.sort_by_key(|update| update.index);

        trace!(
            connection = self.connection,
            removals = plan.removals.len(),
            additions = plan.additions.len(),
            movements = plan.movements.len(),
            low_res = plan.low_res.len(),
            deferred = deferred,
            estimated_bytes = budget,
            "Visibility plan computed"
        );

        Ok(plan)
    }

    /// Apply the prepared plan after its packet was produced
    pub fn commit(&mut self) {
        let Some(plan) = self.plan.take() else {
            return;
        };

        for update in &plan.low_res {
            match update.region {
                Some(region) => {
                    self.low_res.insert(
                        update.index,
                        Distant {
                            generation: update.generation,
                            region,
                        },
                    );
                }
                None => {
                    self.low_res.remove(&update.index);
                }
            }
        }
        for index in plan.high_res.keys() {
            self.low_res.remove(index);
        }
        self.high_res = plan.high_res;
    }

    /// Drop the prepared plan without applying it
    pub fn discard_plan(&mut self) {
        self.plan = None;
    }
}

impl fmt::Debug for ObserverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverState")
            .field("connection", &self.connection)
            .field("avatar", &self.avatar)
            .field("high_res", &self.high_res.len())
            .field("low_res", &self.low_res.len())
            .finish()
    }
}
