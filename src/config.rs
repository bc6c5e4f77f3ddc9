//! Pipeline configuration.

use serde::{Deserialize, Serialize};

/// Tunables for a pipeline run. `Default` matches the values the
/// reference land-cover dataset is built with.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Tile coordinate extent for MVT encoding.
    pub tile_extent: u32,

    /// Buffer pixels used when a classifier does not set its own.
    pub default_buffer_px: u16,

    /// Budget for one encoded (compressed) tile, in bytes.
    pub max_tile_bytes: usize,

    /// Scales the per-zoom simplification tolerance. 1.0 means one
    /// display pixel at the target zoom.
    pub tolerance_factor: f64,

    /// Features per work unit handed to the worker pool. Cancellation is
    /// checked between batches.
    pub batch_size: usize,

    /// Fail the run on an over-budget tile instead of writing it
    /// best-effort.
    pub strict: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tile_extent: 4096,
            default_buffer_px: 4,
            max_tile_bytes: 500 * 1024,
            tolerance_factor: 1.0,
            batch_size: 128,
            strict: false,
        }
    }
}
