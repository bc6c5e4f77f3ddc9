//! Error taxonomy for the tile pipeline.
//!
//! Recoverable categories (`InvalidGeometry`, `DegenerateClip`,
//! `EmptyGeometry`, `ClassifierFailure`) are handled where they occur and
//! tallied in the run summary. Archive contract violations
//! (`DuplicateTile`, `ArchiveSealed`, `EmptyArchive`) indicate a broken
//! pipeline invariant and are always fatal.

use thiserror::Error;

use crate::types::{GeometryKind, TileCoord};

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Input geometry cannot be classified as the requested kind.
    /// Recovered by skipping the feature.
    #[error("feature {seq} cannot be treated as {wanted:?}")]
    InvalidGeometry { seq: u64, wanted: GeometryKind },

    /// A clipped fragment collapsed to zero extent. Recovered by dropping
    /// the feature/tile pair.
    #[error("clipped fragment has zero extent")]
    DegenerateClip,

    /// Simplification collapsed the geometry entirely.
    #[error("geometry collapsed at tolerance {tolerance}")]
    EmptyGeometry { tolerance: f64 },

    /// Encoded tile still exceeds the size budget after the drop policy
    /// ran out of droppable features. Best-effort write unless strict.
    #[error("tile {coord} is {size} bytes, over the {budget} byte budget")]
    TileTooLarge { coord: TileCoord, size: usize, budget: usize },

    /// The classifier raised an error for one feature. Recovered by
    /// skipping the feature.
    #[error("classifier failed on feature {seq}: {message}")]
    ClassifierFailure { seq: u64, message: String },

    #[error("zoom range [{min}, {max}] is invalid")]
    InvalidZoomRange { min: u8, max: u8 },

    #[error("tile {0} was already written")]
    DuplicateTile(TileCoord),

    #[error("archive is sealed, no further writes accepted")]
    ArchiveSealed,

    #[error("cannot finalize an archive with zero tiles")]
    EmptyArchive,

    #[error("run cancelled")]
    Cancelled,

    #[error("tile encoding failed: {0}")]
    Encode(String),

    #[error("source is malformed: {0}")]
    Source(String),

    #[error("archive is malformed: {0}")]
    Malformed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<mvt::Error> for PipelineError {
    fn from(err: mvt::Error) -> Self {
        PipelineError::Encode(err.to_string())
    }
}

impl PipelineError {
    /// True for categories the pipeline absorbs into counters instead of
    /// aborting the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PipelineError::InvalidGeometry { .. }
                | PipelineError::DegenerateClip
                | PipelineError::EmptyGeometry { .. }
                | PipelineError::ClassifierFailure { .. }
        )
    }

    /// Process exit code for the CLI, one per fatal error class.
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::InvalidGeometry { .. }
            | PipelineError::DegenerateClip
            | PipelineError::EmptyGeometry { .. }
            | PipelineError::ClassifierFailure { .. } => 1,
            PipelineError::TileTooLarge { .. } => 2,
            PipelineError::DuplicateTile(_)
            | PipelineError::ArchiveSealed
            | PipelineError::EmptyArchive => 3,
            PipelineError::InvalidZoomRange { .. } => 4,
            PipelineError::Cancelled => 5,
            PipelineError::Encode(_) => 6,
            PipelineError::Source(_) | PipelineError::Malformed(_) => 7,
            PipelineError::Io(_) => 8,
        }
    }
}
