use std::fmt;

use hilbert_2d::Variant;
use serde::{Deserialize, Serialize};

/// Address of one tile in the pyramid: zoom level plus grid position.
/// `x` and `y` index tiles within the zoom level, both in `[0, 2^z)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileCoord {
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

impl TileCoord {
    /// Highest zoom level the pipeline will address.
    pub const MAX_ZOOM: u8 = 24;

    pub fn new(z: u8, x: u32, y: u32) -> Self {
        debug_assert!(z <= Self::MAX_ZOOM, "zoom out of range");
        debug_assert!(u64::from(x) < 1u64 << z, "tile x out of range for zoom");
        debug_assert!(u64::from(y) < 1u64 << z, "tile y out of range for zoom");
        Self { z, x, y }
    }

    /// Number of tiles along one axis at this zoom.
    pub fn tiles_across(z: u8) -> u32 {
        1u32 << z
    }

    /// Position of this tile on the Hilbert curve of the whole pyramid.
    ///
    /// Tile ids order the archive directory: id 0 is (0,0,0), followed by
    /// all zoom-1 tiles in Hilbert order, then zoom 2, and so on. Within a
    /// zoom the Hilbert ordering keeps spatially close tiles close in the
    /// data section.
    pub fn tile_id(self) -> u64 {
        if self.z == 0 {
            return 0;
        }
        let base_id: u64 = 1 + (1..self.z).map(|i| 4u64.pow(u32::from(i))).sum::<u64>();
        let curve = hilbert_2d::xy2h_discrete(
            self.x as usize,
            self.y as usize,
            self.z as usize,
            Variant::Hilbert,
        ) as u64;
        base_id + curve
    }

    /// Inverse of [`tile_id`](Self::tile_id).
    pub fn from_tile_id(tile_id: u64) -> Option<Self> {
        if tile_id == 0 {
            return Some(Self::new(0, 0, 0));
        }
        let mut z = 0u8;
        let mut acc = 1u64;
        for i in 1..=Self::MAX_ZOOM {
            acc += 4u64.pow(u32::from(i));
            if acc > tile_id {
                z = i;
                break;
            }
        }
        if z == 0 {
            return None;
        }
        let base_id: u64 = 1 + (1..z).map(|i| 4u64.pow(u32::from(i))).sum::<u64>();
        let (x, y) =
            hilbert_2d::h2xy_discrete((tile_id - base_id) as usize, z as usize, Variant::Hilbert);
        Some(Self::new(z, x as u32, y as u32))
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}
