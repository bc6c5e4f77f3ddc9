//! Minimal GeoJSON FeatureCollection source.
//!
//! Just enough of RFC 7946 to feed the pipeline from a file: Point,
//! MultiPoint, LineString, MultiLineString, Polygon and MultiPolygon
//! geometries, and scalar properties. This is pipeline glue, not a
//! product-grade format reader.

use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::path::Path;

use geo_types::{
    Coord, Geometry, LineString, MultiLineString, MultiPoint, MultiPolygon, Point, Polygon,
};
use serde_json::Value;

use crate::error::{PipelineError, Result};
use crate::source::FeatureSource;
use crate::types::{AttrValue, Feature};

pub struct GeoJsonSource {
    features: VecDeque<Feature>,
}

impl GeoJsonSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let root: Value = serde_json::from_str(&text)
            .map_err(|e| PipelineError::Source(format!("not valid JSON: {e}")))?;
        Self::from_value(&root)
    }

    pub fn from_value(root: &Value) -> Result<Self> {
        if root["type"] != "FeatureCollection" {
            return Err(PipelineError::Source(
                "expected a GeoJSON FeatureCollection".into(),
            ));
        }
        let raw_features = root["features"]
            .as_array()
            .ok_or_else(|| PipelineError::Source("FeatureCollection has no features array".into()))?;

        let mut features = VecDeque::with_capacity(raw_features.len());
        for raw in raw_features {
            let geometry = parse_geometry(&raw["geometry"])?;
            let attrs = parse_properties(&raw["properties"]);
            features.push_back(Feature::new(geometry, attrs));
        }
        Ok(Self { features })
    }
}

impl FeatureSource for GeoJsonSource {
    fn next_feature(&mut self) -> Result<Option<Feature>> {
        Ok(self.features.pop_front())
    }
}

fn parse_properties(value: &Value) -> BTreeMap<String, AttrValue> {
    let mut attrs = BTreeMap::new();
    if let Some(map) = value.as_object() {
        for (key, val) in map {
            // Null and nested values are omitted, never mapped to empties.
            let attr = match val {
                Value::String(s) => AttrValue::Text(s.clone()),
                Value::Number(n) => match n.as_f64() {
                    Some(f) => AttrValue::Number(f),
                    None => continue,
                },
                Value::Bool(b) => AttrValue::Bool(*b),
                _ => continue,
            };
            attrs.insert(key.clone(), attr);
        }
    }
    attrs
}

fn parse_geometry(value: &Value) -> Result<Geometry<f64>> {
    let kind = value["type"]
        .as_str()
        .ok_or_else(|| PipelineError::Source("geometry has no type".into()))?;
    let coords = &value["coordinates"];
    match kind {
        "Point" => Ok(Geometry::Point(Point::from(parse_position(coords)?))),
        "MultiPoint" => {
            let points = parse_array(coords)?
                .iter()
                .map(|p| parse_position(p).map(Point::from))
                .collect::<Result<Vec<_>>>()?;
            Ok(Geometry::MultiPoint(MultiPoint(points)))
        }
        "LineString" => Ok(Geometry::LineString(parse_line(coords)?)),
        "MultiLineString" => {
            let lines = parse_array(coords)?
                .iter()
                .map(parse_line)
                .collect::<Result<Vec<_>>>()?;
            Ok(Geometry::MultiLineString(MultiLineString(lines)))
        }
        "Polygon" => Ok(Geometry::Polygon(parse_polygon(coords)?)),
        "MultiPolygon" => {
            let polys = parse_array(coords)?
                .iter()
                .map(parse_polygon)
                .collect::<Result<Vec<_>>>()?;
            Ok(Geometry::MultiPolygon(MultiPolygon(polys)))
        }
        other => Err(PipelineError::Source(format!(
            "unsupported geometry type {other:?}"
        ))),
    }
}

fn parse_array(value: &Value) -> Result<&Vec<Value>> {
    value
        .as_array()
        .ok_or_else(|| PipelineError::Source("expected a coordinate array".into()))
}

fn parse_position(value: &Value) -> Result<Coord<f64>> {
    let pair = parse_array(value)?;
    if pair.len() < 2 {
        return Err(PipelineError::Source("position needs lon and lat".into()));
    }
    let x = pair[0]
        .as_f64()
        .ok_or_else(|| PipelineError::Source("longitude is not a number".into()))?;
    let y = pair[1]
        .as_f64()
        .ok_or_else(|| PipelineError::Source("latitude is not a number".into()))?;
    Ok(Coord { x, y })
}

fn parse_line(value: &Value) -> Result<LineString<f64>> {
    let coords = parse_array(value)?
        .iter()
        .map(parse_position)
        .collect::<Result<Vec<_>>>()?;
    Ok(LineString(coords))
}

fn parse_polygon(value: &Value) -> Result<Polygon<f64>> {
    let rings = parse_array(value)?
        .iter()
        .map(parse_line)
        .collect::<Result<Vec<_>>>()?;
    let mut iter = rings.into_iter();
    let exterior = iter
        .next()
        .ok_or_else(|| PipelineError::Source("polygon has no rings".into()))?;
    Ok(Polygon::new(exterior, iter.collect()))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_a_small_collection() {
        let doc = json!({
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "geometry": {
                        "type": "Polygon",
                        "coordinates": [[[10.0, 60.0], [11.0, 60.0], [11.0, 61.0], [10.0, 61.0], [10.0, 60.0]]]
                    },
                    "properties": {"AREALTYPE": "30", "NAVN": null, "score": 1.5, "active": true}
                },
                {
                    "type": "Feature",
                    "geometry": {"type": "Point", "coordinates": [10.75, 59.91]},
                    "properties": {}
                }
            ]
        });
        let mut source = GeoJsonSource::from_value(&doc).unwrap();

        let first = source.next_feature().unwrap().unwrap();
        assert!(first.can_be_polygon());
        assert_eq!(first.attribute("AREALTYPE"), Some(&AttrValue::Text("30".into())));
        assert_eq!(first.attribute("score"), Some(&AttrValue::Number(1.5)));
        assert_eq!(first.attribute("active"), Some(&AttrValue::Bool(true)));
        // Null properties are omitted entirely.
        assert!(!first.has_attribute("NAVN"));

        let second = source.next_feature().unwrap().unwrap();
        assert!(second.can_be_point());
        assert!(source.next_feature().unwrap().is_none());
    }

    #[test]
    fn rejects_non_collections() {
        let doc = json!({"type": "Feature"});
        assert!(GeoJsonSource::from_value(&doc).is_err());
    }

    #[test]
    fn rejects_unknown_geometry() {
        let doc = json!({
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "geometry": {"type": "GeometryCollection", "geometries": []},
                "properties": {}
            }]
        });
        assert!(GeoJsonSource::from_value(&doc).is_err());
    }
}
