//! Packed world coordinates
//!
//! A [`CoordGrid`] packs `(level, x, z)` into one `u32`: 2 bits of level,
//! 14 bits of x, 14 bits of z. Regions are 64×64 tiles.

use std::fmt;

use crate::error::GameError;

/// Largest x or z value representable in 14 bits
pub const MAX_COORD: u16 = (1 << 14) - 1;

/// Number of height levels
pub const LEVELS: u8 = 4;

/// Packed 3-D grid cell
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CoordGrid(u32);

impl CoordGrid {
    /// Build a coordinate, rejecting values that do not fit the packing
    pub fn new(x: u16, z: u16, level: u8) -> Result<Self, GameError> {
        if x > MAX_COORD || z > MAX_COORD || level >= LEVELS {
            return Err(GameError::InvalidCoordinate {
                x: x as u32,
                z: z as u32,
                level: level as u32,
            });
        }
        Ok(Self::pack(x, z, level))
    }

    #[inline]
    const fn pack(x: u16, z: u16, level: u8) -> Self {
        Self(((level as u32 & 0x3) << 28) | ((x as u32 & 0x3fff) << 14) | (z as u32 & 0x3fff))
    }

    /// Rebuild from the packed form
    pub const fn from_packed(packed: u32) -> Self {
        Self(packed & 0x3fff_ffff)
    }

    pub const fn packed(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn x(self) -> u16 {
        ((self.0 >> 14) & 0x3fff) as u16
    }

    #[inline]
    pub const fn z(self) -> u16 {
        (self.0 & 0x3fff) as u16
    }

    #[inline]
    pub const fn level(self) -> u8 {
        ((self.0 >> 28) & 0x3) as u8
    }

    /// Region the coordinate lies in (64×64 tiles)
    pub const fn region(self) -> RegionRef {
        RegionRef {
            level: self.level(),
            x: (self.x() >> 6) as u8,
            z: (self.z() >> 6) as u8,
        }
    }

    /// Position inside the region
    pub const fn region_local(self) -> (u8, u8) {
        ((self.x() & 0x3f) as u8, (self.z() & 0x3f) as u8)
    }


    /// Chebyshev distance on the same level, `None` across levels
    pub fn distance(self, other: CoordGrid) -> Option<u16> {
        if self.level() != other.level() {
            return None;
        }
        let dx = self.x().abs_diff(other.x());
        let dz = self.z().abs_diff(other.z());
        Some(dx.max(dz))
    }

    /// Check if `other` is on this level and within `radius` tiles
    pub fn within(self, other: CoordGrid, radius: u16) -> bool {
        self.distance(other).is_some_and(|d| d <= radius)
    }

    /// Signed delta to `to` as (dx, dz, level delta)
    pub fn delta_to(self, to: CoordGrid) -> (i32, i32, i32) {
        (
            to.x() as i32 - self.x() as i32,
            to.z() as i32 - self.z() as i32,
            to.level() as i32 - self.level() as i32,
        )
    }

    /// Translate, failing when the result leaves the grid
    pub fn translate(self, dx: i32, dz: i32, dlevel: i32) -> Result<Self, GameError> {
        let x = self.x() as i32 + dx;
        let z = self.z() as i32 + dz;
        let level = self.level() as i32 + dlevel;
        if x < 0 || z < 0 || level < 0 {
            return Err(GameError::InvalidCoordinate {
                x: x.max(0) as u32,
                z: z.max(0) as u32,
                level: level.max(0) as u32,
            });
        }
        Self::new(
            x.min(u16::MAX as i32) as u16,
            z.min(u16::MAX as i32) as u16,
            level.min(u8::MAX as i32) as u8,
        )
    }
}

impl fmt::Display for CoordGrid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x(), self.z(), self.level())
    }
}

/// A level plus region coordinates, the low-resolution position of an avatar
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct RegionRef {
    pub level: u8,
    pub x: u8,
    pub z: u8,
}

impl RegionRef {
    /// Absolute coordinate of a tile inside this region
    pub fn coord(self, local_x: u8, local_z: u8) -> CoordGrid {
        CoordGrid::pack(
            ((self.x as u16) << 6) | (local_x as u16 & 0x3f),
            ((self.z as u16) << 6) | (local_z as u16 & 0x3f),
            self.level,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packing() {
        let coord = CoordGrid::new(3222, 3218, 2).unwrap();
        assert_eq!(coord.x(), 3222);
        assert_eq!(coord.z(), 3218);
        assert_eq!(coord.level(), 2);
        assert_eq!(CoordGrid::from_packed(coord.packed()), coord);
    }

    #[test]
    fn test_out_of_range() {
        assert!(CoordGrid::new(MAX_COORD + 1, 0, 0).is_err());
        assert!(CoordGrid::new(0, 0, LEVELS).is_err());
        assert!(CoordGrid::new(MAX_COORD, MAX_COORD, 3).is_ok());
    }

    #[test]
    fn test_distance() {
        let a = CoordGrid::new(100, 100, 0).unwrap();
        let b = CoordGrid::new(103, 96, 0).unwrap();
        let c = CoordGrid::new(100, 100, 1).unwrap();

        assert_eq!(a.distance(b), Some(4));
        assert_eq!(a.distance(c), None);
        assert!(a.within(b, 4));
        assert!(!a.within(b, 3));
        assert!(!a.within(c, 100));
    }

    #[test]
    fn test_region() {
        let coord = CoordGrid::new(3222, 3218, 1).unwrap();
        let region = coord.region();
        assert_eq!(region, RegionRef { level: 1, x: 50, z: 50 });

        let (lx, lz) = coord.region_local();
        assert_eq!((lx, lz), (22, 18));
        assert_eq!(region.coord(lx, lz), coord);
    }

    #[test]
    fn test_translate() {
        let coord = CoordGrid::new(10, 10, 0).unwrap();
        assert_eq!(
            coord.translate(1, -2, 1).unwrap(),
            CoordGrid::new(11, 8, 1).unwrap()
        );
        assert!(coord.translate(-11, 0, 0).is_err());
        assert_eq!(coord.delta_to(CoordGrid::new(12, 7, 0).unwrap()), (2, -3, 0));
    }
}
