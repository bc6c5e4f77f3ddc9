use std::collections::BTreeMap;
use std::sync::Arc;

use geo_types::Geometry;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::types::feature::AttrValue;
use crate::types::tile_coord::TileCoord;

/// Inclusive zoom interval. Invariant: `min <= max <= 24`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoomRange {
    min: u8,
    max: u8,
}

impl ZoomRange {
    pub fn new(min: u8, max: u8) -> Result<Self> {
        if min > max || max > TileCoord::MAX_ZOOM {
            return Err(PipelineError::InvalidZoomRange { min, max });
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> u8 {
        self.min
    }

    pub fn max(&self) -> u8 {
        self.max
    }

    pub fn contains(&self, zoom: u8) -> bool {
        zoom >= self.min && zoom <= self.max
    }

    pub fn iter(&self) -> impl Iterator<Item = u8> {
        self.min..=self.max
    }

    /// Smallest range covering both `self` and `other`.
    pub fn union(&self, other: &ZoomRange) -> ZoomRange {
        ZoomRange {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }
}

/// Output of classification: one renderable feature bound to a target
/// layer, with the zoom range it appears in and the buffer it may bleed
/// into neighboring tiles. Created per input feature, consumed by the
/// coverer, and discarded after clipping.
#[derive(Debug, Clone)]
pub struct ClassifiedFeature {
    /// Stable input-order index of the originating feature.
    pub seq: u64,
    pub layer: Arc<str>,
    pub geometry: Geometry<f64>,
    pub zoom: ZoomRange,
    pub attrs: BTreeMap<String, AttrValue>,
    /// Buffer pixels for tile clipping; `None` falls back to the
    /// pipeline's configured default.
    pub buffer_px: Option<u16>,
    /// Features marked droppable go first when a tile busts its size budget.
    pub low_priority: bool,
}

/// A layer a classifier promises to emit, recorded in archive metadata.
#[derive(Debug, Clone)]
pub struct LayerDecl {
    pub name: Arc<str>,
    pub zoom: ZoomRange,
}

impl LayerDecl {
    pub fn new(name: impl Into<Arc<str>>, zoom: ZoomRange) -> Self {
        Self { name: name.into(), zoom }
    }
}
