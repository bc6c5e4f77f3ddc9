//! Feature classification: the dataset-specific mapping from input
//! features to renderable layer features.
//!
//! Classification is inherently polymorphic (different datasets need
//! different logic), so the pipeline depends only on the
//! [`FeatureClassifier`] trait. Implementations must be pure: no side
//! effects, safe to call concurrently from many workers.

mod profile;

use crate::error::Result;
use crate::types::{ClassifiedFeature, Feature, LayerDecl};

pub use profile::AttributeCopyProfile;

pub trait FeatureClassifier: Send + Sync {
    /// Map one input feature to zero or more layer features.
    ///
    /// Returning `InvalidGeometry` or any other error skips the feature;
    /// the pipeline counts the skip and continues.
    fn classify(&self, feature: &Feature) -> Result<Vec<ClassifiedFeature>>;

    /// The layers this classifier can emit, used for archive metadata.
    fn declared_layers(&self) -> Vec<LayerDecl>;
}
