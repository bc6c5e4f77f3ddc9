//! Geometry support: Web Mercator grid projection, tile-boundary
//! clipping, and zoom-driven simplification.

pub mod clip;
pub mod proj;
pub mod simplify;

pub use simplify::{simplify_geometry, tolerance_for_zoom};
