use std::collections::BTreeMap;
use std::fmt;

use geo_types::Geometry;

/// A typed scalar attribute value carried by a feature.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Text(String),
    Number(f64),
    Bool(bool),
}

impl AttrValue {
    /// Type name hint recorded in archive metadata.
    pub fn type_name(&self) -> &'static str {
        match self {
            AttrValue::Text(_) => "String",
            AttrValue::Number(_) => "Number",
            AttrValue::Bool(_) => "Boolean",
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Text(s) => write!(f, "{s}"),
            AttrValue::Number(n) => write!(f, "{n}"),
            AttrValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Text(value.to_string())
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        AttrValue::Number(value)
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        AttrValue::Bool(value)
    }
}

/// Broad geometry classification used for classifier pre-checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryKind {
    Point,
    Line,
    Polygon,
}

/// One input record: a geometry in lon/lat degrees (WGS84) plus its
/// attribute mapping. Immutable once read; `seq` is the stable input-order
/// index stamped by the pipeline when the feature is pulled from its source.
#[derive(Debug, Clone)]
pub struct Feature {
    pub seq: u64,
    pub geometry: Geometry<f64>,
    pub attrs: BTreeMap<String, AttrValue>,
}

impl Feature {
    pub fn new(geometry: Geometry<f64>, attrs: BTreeMap<String, AttrValue>) -> Self {
        Self { seq: 0, geometry, attrs }
    }

    pub fn has_attribute(&self, key: &str) -> bool {
        self.attrs.contains_key(key)
    }

    pub fn attribute(&self, key: &str) -> Option<&AttrValue> {
        self.attrs.get(key)
    }

    /// The broad kind of this feature's geometry, or `None` for kinds the
    /// pipeline does not process (collections, rects, triangles).
    pub fn geometry_kind(&self) -> Option<GeometryKind> {
        match &self.geometry {
            Geometry::Point(_) | Geometry::MultiPoint(_) => Some(GeometryKind::Point),
            Geometry::LineString(_) | Geometry::MultiLineString(_) => Some(GeometryKind::Line),
            Geometry::Polygon(_) | Geometry::MultiPolygon(_) => Some(GeometryKind::Polygon),
            _ => None,
        }
    }

    pub fn can_be_polygon(&self) -> bool {
        self.geometry_kind() == Some(GeometryKind::Polygon)
    }

    pub fn can_be_line(&self) -> bool {
        self.geometry_kind() == Some(GeometryKind::Line)
    }

    pub fn can_be_point(&self) -> bool {
        self.geometry_kind() == Some(GeometryKind::Point)
    }
}

#[cfg(test)]
mod tests {
    use geo_types::{polygon, Geometry, Point};

    use super::*;

    #[test]
    fn geometry_kind_matches_variant() {
        let poly = Feature::new(
            Geometry::Polygon(polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0)]),
            BTreeMap::new(),
        );
        assert!(poly.can_be_polygon());
        assert!(!poly.can_be_line());

        let point = Feature::new(Geometry::Point(Point::new(1.0, 2.0)), BTreeMap::new());
        assert_eq!(point.geometry_kind(), Some(GeometryKind::Point));
    }

    #[test]
    fn attribute_lookup() {
        let mut attrs = BTreeMap::new();
        attrs.insert("NAVN".to_string(), AttrValue::from("Oslo"));
        let feature = Feature::new(Geometry::Point(Point::new(10.7, 59.9)), attrs);
        assert!(feature.has_attribute("NAVN"));
        assert_eq!(feature.attribute("NAVN"), Some(&AttrValue::Text("Oslo".into())));
        assert!(feature.attribute("AREALTYPE").is_none());
    }
}
