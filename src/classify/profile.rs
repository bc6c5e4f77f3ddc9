//! Attribute-copying polygon profile.
//!
//! The bread-and-butter classifier for cadastre/land-cover style
//! datasets: take every polygon feature, copy a fixed list of attributes
//! when they are present, and emit it into a single layer across a fixed
//! zoom range with a small buffer.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::classify::FeatureClassifier;
use crate::error::{PipelineError, Result};
use crate::types::{AttrValue, ClassifiedFeature, Feature, GeometryKind, LayerDecl, ZoomRange};

pub struct AttributeCopyProfile {
    layer: Arc<str>,
    attributes: Vec<String>,
    zoom: ZoomRange,
    buffer_px: u16,
}

impl AttributeCopyProfile {
    pub fn new(
        layer: impl Into<Arc<str>>,
        attributes: Vec<String>,
        zoom: ZoomRange,
        buffer_px: u16,
    ) -> Self {
        Self { layer: layer.into(), attributes, zoom, buffer_px }
    }
}

impl FeatureClassifier for AttributeCopyProfile {
    fn classify(&self, feature: &Feature) -> Result<Vec<ClassifiedFeature>> {
        if !feature.can_be_polygon() {
            return Err(PipelineError::InvalidGeometry {
                seq: feature.seq,
                wanted: GeometryKind::Polygon,
            });
        }

        // Copy listed attributes only when present; a missing key is
        // omitted from the output, never emitted as null or empty.
        let mut attrs = BTreeMap::new();
        for key in &self.attributes {
            if let Some(value) = feature.attribute(key) {
                attrs.insert(key.clone(), value.clone());
            }
        }

        Ok(vec![ClassifiedFeature {
            seq: feature.seq,
            layer: self.layer.clone(),
            geometry: feature.geometry.clone(),
            zoom: self.zoom,
            attrs,
            buffer_px: Some(self.buffer_px),
            low_priority: false,
        }])
    }

    fn declared_layers(&self) -> Vec<LayerDecl> {
        vec![LayerDecl::new(self.layer.clone(), self.zoom)]
    }
}
