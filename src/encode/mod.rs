//! MVT tile payload encoding.
//!
//! One tile is encoded from its ordered per-layer fragment lists into a
//! Mapbox Vector Tile, then gzip-compressed for storage. Ring winding is
//! normalized here: in tile space (Y down) exteriors are clockwise and
//! holes counter-clockwise.

use std::io::Write;

use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;
use mvt::{GeomEncoder, GeomType, Tile};

use crate::accumulate::Fragment;
use crate::cover::FragmentGeometry;
use crate::error::Result;
use crate::types::AttrValue;

/// Ordered fragments of one layer within one tile.
pub(crate) struct TileLayerPlan<'a> {
    pub name: &'a str,
    pub fragments: Vec<&'a Fragment>,
}

/// Encode one tile's layers and compress the payload.
pub(crate) fn encode_tile(layers: &[TileLayerPlan<'_>], extent: u32) -> Result<Bytes> {
    let mut tile = Tile::new(extent);

    for plan in layers {
        let mut layer = tile.create_layer(plan.name);
        for fragment in &plan.fragments {
            let geom_data = encode_geometry(&fragment.geometry)?;
            let mut feature = layer.into_feature(geom_data);
            feature.set_id(fragment.seq);
            for (key, value) in &fragment.attrs {
                match value {
                    AttrValue::Text(s) => feature.add_tag_string(key, s),
                    AttrValue::Number(n) => feature.add_tag_double(key, *n),
                    AttrValue::Bool(b) => feature.add_tag_bool(key, *b),
                }
            }
            layer = feature.into_layer();
        }
        if layer.num_features() > 0 {
            tile.add_layer(layer)?;
        }
    }

    let raw = tile.to_bytes()?;
    Ok(Bytes::from(gzip(&raw)?))
}

fn encode_geometry(geometry: &FragmentGeometry) -> Result<mvt::GeomData> {
    match geometry {
        FragmentGeometry::Polygons(polys) => {
            let mut encoder = GeomEncoder::new(GeomType::Polygon);
            for rings in polys {
                for (i, ring) in rings.iter().enumerate() {
                    for &(x, y) in oriented(ring, i == 0).iter() {
                        encoder = encoder.point(f64::from(x), f64::from(y))?;
                    }
                    encoder = encoder.complete()?;
                }
            }
            Ok(encoder.encode()?)
        }
        FragmentGeometry::Lines(parts) => {
            let mut encoder = GeomEncoder::new(GeomType::Linestring);
            for part in parts {
                for &(x, y) in part {
                    encoder = encoder.point(f64::from(x), f64::from(y))?;
                }
                encoder = encoder.complete()?;
            }
            Ok(encoder.encode()?)
        }
        FragmentGeometry::Points(points) => {
            let mut encoder = GeomEncoder::new(GeomType::Point);
            for &(x, y) in points {
                encoder = encoder.point(f64::from(x), f64::from(y))?;
            }
            encoder = encoder.complete()?;
            Ok(encoder.encode()?)
        }
    }
}

/// Exterior rings clockwise, holes counter-clockwise (tile space, Y down).
fn oriented(ring: &[(i32, i32)], is_exterior: bool) -> Vec<(i32, i32)> {
    let mut area = 0i64;
    for i in 0..ring.len() {
        let j = (i + 1) % ring.len();
        area += i64::from(ring[i].0) * i64::from(ring[j].1)
            - i64::from(ring[j].0) * i64::from(ring[i].1);
    }
    let clockwise = area > 0;
    if clockwise == is_exterior {
        ring.to_vec()
    } else {
        ring.iter().rev().copied().collect()
    }
}

pub(crate) fn gzip(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

pub(crate) fn gunzip(data: &[u8]) -> std::io::Result<Vec<u8>> {
    use std::io::Read;
    let mut decoder = flate2::read::GzDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}
