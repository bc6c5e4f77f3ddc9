//! Core data model: features, classified features, tile coordinates.

mod classified;
mod feature;
mod tile_coord;

pub use classified::{ClassifiedFeature, LayerDecl, ZoomRange};
pub use feature::{AttrValue, Feature, GeometryKind};
pub use tile_coord::TileCoord;
