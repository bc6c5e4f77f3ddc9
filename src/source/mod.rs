//! Feature sources: lazy, finite, non-restartable sequences of input
//! features. The pipeline stamps each feature with its stable input-order
//! index as it is pulled.

mod geojson;

use std::collections::VecDeque;

use crate::error::Result;
use crate::types::Feature;

pub use geojson::GeoJsonSource;

/// A producer of input features. Reading is the only I/O the pipeline
/// performs besides the final archive write, and both are isolated to
/// single-threaded stages.
pub trait FeatureSource: Send {
    /// Pull the next feature. `Ok(None)` ends the sequence; the sequence
    /// cannot be restarted.
    fn next_feature(&mut self) -> Result<Option<Feature>>;
}

/// In-memory source, mainly for tests and embedding.
pub struct MemorySource {
    features: VecDeque<Feature>,
}

impl MemorySource {
    pub fn new(features: impl IntoIterator<Item = Feature>) -> Self {
        Self { features: features.into_iter().collect() }
    }
}

impl FeatureSource for MemorySource {
    fn next_feature(&mut self) -> Result<Option<Feature>> {
        Ok(self.features.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use geo_types::{Geometry, Point};

    use super::*;

    #[test]
    fn memory_source_drains_in_order() {
        let features = (0..3).map(|i| {
            Feature::new(Geometry::Point(Point::new(f64::from(i), 0.0)), BTreeMap::new())
        });
        let mut source = MemorySource::new(features);
        let first = source.next_feature().unwrap().unwrap();
        match first.geometry {
            Geometry::Point(p) => assert_eq!(p.x(), 0.0),
            other => panic!("expected point, got {other:?}"),
        }
        assert!(source.next_feature().unwrap().is_some());
        assert!(source.next_feature().unwrap().is_some());
        assert!(source.next_feature().unwrap().is_none());
    }
}
