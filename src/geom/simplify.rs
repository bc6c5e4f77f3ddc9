//! Zoom-driven geometry simplification.
//!
//! Tolerance is one display pixel at the target zoom times a
//! configurable factor, so detail tracks what is actually visible and
//! shape stability is smooth between adjacent zooms. Simplification must
//! never emit invalid geometry: if Douglas-Peucker introduces a
//! self-intersection the tolerance is halved once, then the input is
//! returned unsimplified. Fully collapsed output is signaled as
//! `EmptyGeometry`.

use geo::{Area, Simplify, Validation};
use geo_types::{Geometry, LineString, MultiLineString, MultiPolygon, Polygon};

use crate::error::{PipelineError, Result};
use crate::geom::proj;

/// Simplification tolerance in degrees for `zoom`.
pub fn tolerance_for_zoom(zoom: u8, factor: f64) -> f64 {
    proj::pixel_degrees(zoom) * factor
}

/// Simplify a geometry for one zoom level.
///
/// Returns `EmptyGeometry` when the result has no drawable extent left;
/// callers drop the (feature, zoom) pair and count it.
pub fn simplify_geometry(geometry: &Geometry<f64>, tolerance: f64) -> Result<Geometry<f64>> {
    if tolerance <= 0.0 {
        return Ok(geometry.clone());
    }
    match geometry {
        Geometry::Polygon(poly) => simplify_polygon(poly, tolerance)
            .map(Geometry::Polygon)
            .ok_or(PipelineError::EmptyGeometry { tolerance }),
        Geometry::MultiPolygon(mp) => {
            let polys: Vec<Polygon<f64>> = mp
                .iter()
                .filter_map(|poly| simplify_polygon(poly, tolerance))
                .collect();
            if polys.is_empty() {
                Err(PipelineError::EmptyGeometry { tolerance })
            } else {
                Ok(Geometry::MultiPolygon(MultiPolygon(polys)))
            }
        }
        Geometry::LineString(line) => simplify_line(line, tolerance)
            .map(Geometry::LineString)
            .ok_or(PipelineError::EmptyGeometry { tolerance }),
        Geometry::MultiLineString(ml) => {
            let lines: Vec<LineString<f64>> = ml
                .iter()
                .filter_map(|line| simplify_line(line, tolerance))
                .collect();
            if lines.is_empty() {
                Err(PipelineError::EmptyGeometry { tolerance })
            } else {
                Ok(Geometry::MultiLineString(MultiLineString(lines)))
            }
        }
        // Points carry no vertices to remove.
        other => Ok(other.clone()),
    }
}

fn simplify_polygon(poly: &Polygon<f64>, tolerance: f64) -> Option<Polygon<f64>> {
    if let Some(out) = simplify_polygon_once(poly, tolerance) {
        return Some(out);
    }
    // A collapsed exterior stays collapsed at any smaller tolerance; only
    // a validity failure is worth a retry.
    if exterior_collapses(poly, tolerance) {
        return None;
    }
    if let Some(out) = simplify_polygon_once(poly, tolerance / 2.0) {
        return Some(out);
    }
    if exterior_collapses(poly, tolerance / 2.0) {
        return None;
    }
    Some(poly.clone())
}

fn exterior_collapses(poly: &Polygon<f64>, tolerance: f64) -> bool {
    let exterior = poly.exterior().simplify(&tolerance);
    ring_is_degenerate(&exterior)
}

/// One simplification attempt. `None` when the result is degenerate or
/// no longer valid.
fn simplify_polygon_once(poly: &Polygon<f64>, tolerance: f64) -> Option<Polygon<f64>> {
    let exterior = poly.exterior().simplify(&tolerance);
    if ring_is_degenerate(&exterior) {
        return None;
    }

    // Holes that collapse are dropped, not errors.
    let interiors: Vec<LineString<f64>> = poly
        .interiors()
        .iter()
        .map(|ring| ring.simplify(&tolerance))
        .filter(|ring| !ring_is_degenerate(ring))
        .collect();

    let candidate = Polygon::new(exterior, interiors);
    if candidate.is_valid() {
        Some(candidate)
    } else {
        None
    }
}

fn ring_is_degenerate(ring: &LineString<f64>) -> bool {
    ring.0.len() < 4 || Polygon::new(ring.clone(), vec![]).unsigned_area() == 0.0
}

fn simplify_line(line: &LineString<f64>, tolerance: f64) -> Option<LineString<f64>> {
    let simplified = line.simplify(&tolerance);
    let coords = &simplified.0;
    if coords.len() < 2 {
        return None;
    }
    // Zero-length output means the line collapsed to a point.
    if coords.windows(2).all(|w| w[0] == w[1]) {
        return None;
    }
    Some(simplified)
}
