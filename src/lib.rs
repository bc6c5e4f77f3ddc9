#![doc = "Tilepress public API"]
mod accumulate;
mod archive;
mod classify;
mod config;
mod cover;
mod encode;
mod error;
mod geom;
mod pipeline;
mod source;
mod types;

#[doc(inline)]
pub use types::{AttrValue, ClassifiedFeature, Feature, GeometryKind, LayerDecl, TileCoord, ZoomRange};

#[doc(inline)]
pub use classify::{AttributeCopyProfile, FeatureClassifier};

#[doc(inline)]
pub use source::{FeatureSource, GeoJsonSource, MemorySource};

#[doc(inline)]
pub use config::PipelineConfig;

#[doc(inline)]
pub use error::{PipelineError, Result};

#[doc(inline)]
pub use pipeline::{CancelToken, Pipeline, RunSummary};

#[doc(inline)]
pub use archive::{ArchiveMetadata, ArchiveReader, TileArchiveWriter};

#[doc(inline)]
pub use accumulate::{AccumulatedTile, Fragment, TileAccumulator};

#[doc(inline)]
pub use cover::{cover_feature, CoverOutcome, CoveredTile, FragmentGeometry};

#[doc(inline)]
pub use geom::{simplify_geometry, tolerance_for_zoom};
