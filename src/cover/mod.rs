//! Tile coverage: slice a classified feature's geometry into per-tile
//! fragments at one zoom level.
//!
//! Geometry is projected once per zoom into grid space (one tile = one
//! unit) and then split along tile boundaries one axis at a time: rings
//! are cut into column strips, and each strip into row cells. Each cut is
//! a half-plane clip, so a polygon spanning many tiles is never re-clipped
//! per tile from scratch. Output coordinates are tile-local integer extent
//! coordinates; the buffer lets geometry bleed into neighboring tiles so
//! features are not visibly cut at tile seams.

use std::collections::HashMap;

use geo_types::{Geometry, LineString};

use crate::geom::clip::{
    clean_ring, clip_ring_band, clip_segment_box, ring_signed_area, Axis, Pt,
};
use crate::geom::proj;
use crate::types::TileCoord;

/// Fragment geometry in tile-local extent coordinates.
#[derive(Debug, Clone, PartialEq)]
pub enum FragmentGeometry {
    /// One entry per polygon: its rings, exterior first.
    Polygons(Vec<Vec<Vec<(i32, i32)>>>),
    Lines(Vec<Vec<(i32, i32)>>),
    Points(Vec<(i32, i32)>),
}

impl FragmentGeometry {
    pub fn is_empty(&self) -> bool {
        match self {
            FragmentGeometry::Polygons(polys) => polys.is_empty(),
            FragmentGeometry::Lines(lines) => lines.is_empty(),
            FragmentGeometry::Points(points) => points.is_empty(),
        }
    }

    /// Drawn area in square extent pixels. Zero for lines and points,
    /// which makes them the first to go under the drop policy.
    pub fn area_px(&self) -> f64 {
        match self {
            FragmentGeometry::Polygons(polys) => polys
                .iter()
                .map(|rings| {
                    let mut area = 0.0;
                    for (i, ring) in rings.iter().enumerate() {
                        let float_ring: Vec<Pt> =
                            ring.iter().map(|&(x, y)| (f64::from(x), f64::from(y))).collect();
                        let part = ring_signed_area(&float_ring).abs();
                        if i == 0 {
                            area += part;
                        } else {
                            area -= part;
                        }
                    }
                    area.max(0.0)
                })
                .sum(),
            _ => 0.0,
        }
    }
}

/// One tile's worth of clipped geometry for a single feature.
#[derive(Debug, Clone)]
pub struct CoveredTile {
    pub coord: TileCoord,
    pub geometry: FragmentGeometry,
}

/// Result of covering one feature at one zoom.
#[derive(Debug, Default)]
pub struct CoverOutcome {
    pub tiles: Vec<CoveredTile>,
    /// Fragments that collapsed to zero extent after clipping; dropped
    /// silently per the error taxonomy, surfaced only as a count.
    pub degenerate_clips: u64,
}

/// Inclusive tile index range covered by `[min, max]` expanded by the
/// buffer, clamped to the zoom's grid. `None` when outside the grid.
fn covered_range(min: f64, max: f64, buffer: f64, tiles_across: u32) -> Option<(u32, u32)> {
    if !min.is_finite() || !max.is_finite() {
        return None;
    }
    let lo = ((min - buffer).floor() as i64).max(0);
    let hi = ((max + buffer).floor() as i64).min(i64::from(tiles_across) - 1);
    if hi < lo {
        return None;
    }
    Some((lo as u32, hi as u32))
}

/// Enumerate every tile the geometry intersects at `zoom` and clip one
/// sub-geometry per covered tile.
pub fn cover_feature(
    geometry: &Geometry<f64>,
    zoom: u8,
    buffer_px: u16,
    extent: u32,
) -> CoverOutcome {
    let buffer = f64::from(buffer_px) / f64::from(extent);
    match geometry {
        Geometry::Polygon(poly) => {
            cover_polygons(std::slice::from_ref(poly), zoom, buffer, extent)
        }
        Geometry::MultiPolygon(mp) => cover_polygons(&mp.0, zoom, buffer, extent),
        Geometry::LineString(line) => {
            cover_lines(std::slice::from_ref(line), zoom, buffer, extent)
        }
        Geometry::MultiLineString(ml) => cover_lines(&ml.0, zoom, buffer, extent),
        Geometry::Point(p) => cover_points(&[*p], zoom, buffer, extent),
        Geometry::MultiPoint(mp) => cover_points(&mp.0, zoom, buffer, extent),
        _ => CoverOutcome::default(),
    }
}

/// Project a ring into grid space as an open point list.
fn project_ring(ring: &LineString<f64>, zoom: u8) -> Vec<Pt> {
    let mut out: Vec<Pt> = ring
        .coords()
        .filter(|c| c.x.is_finite() && c.y.is_finite())
        .map(|c| proj::project(c.x, c.y, zoom))
        .collect();
    if out.len() > 1 && out.first() == out.last() {
        out.pop();
    }
    out
}

fn ring_bbox(ring: &[Pt]) -> (f64, f64, f64, f64) {
    let mut bbox = (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
    for &(x, y) in ring {
        bbox.0 = bbox.0.min(x);
        bbox.1 = bbox.1.min(y);
        bbox.2 = bbox.2.max(x);
        bbox.3 = bbox.3.max(y);
    }
    bbox
}

/// Round a grid-space ring into tile-local extent coordinates.
fn ring_to_extent(ring: &[Pt], col: u32, row: u32, extent: u32) -> Vec<Pt> {
    let ex = f64::from(extent);
    ring.iter()
        .map(|&(x, y)| {
            (
                ((x - f64::from(col)) * ex).round(),
                ((y - f64::from(row)) * ex).round(),
            )
        })
        .collect()
}

fn to_int_ring(ring: Vec<Pt>) -> Vec<(i32, i32)> {
    ring.into_iter().map(|(x, y)| (x as i32, y as i32)).collect()
}

fn cover_polygons(
    polys: &[geo_types::Polygon<f64>],
    zoom: u8,
    buffer: f64,
    extent: u32,
) -> CoverOutcome {
    let tiles_across = TileCoord::tiles_across(zoom);
    let mut per_tile: HashMap<(u32, u32), Vec<Vec<Vec<(i32, i32)>>>> = HashMap::new();
    let mut degenerate = 0u64;

    for poly in polys {
        let exterior = project_ring(poly.exterior(), zoom);
        if exterior.len() < 3 {
            continue;
        }
        let interiors: Vec<Vec<Pt>> = poly
            .interiors()
            .iter()
            .map(|ring| project_ring(ring, zoom))
            .filter(|ring| ring.len() >= 3)
            .collect();

        let (min_x, _, max_x, _) = ring_bbox(&exterior);
        let Some((col_lo, col_hi)) = covered_range(min_x, max_x, buffer, tiles_across) else {
            continue;
        };

        // First axis: cut the polygon into column strips.
        for col in col_lo..=col_hi {
            let band = (f64::from(col) - buffer, f64::from(col) + 1.0 + buffer);
            let strip_ext = clip_ring_band(&exterior, Axis::X, band.0, band.1);
            if strip_ext.is_empty() {
                continue;
            }
            let strip_ints: Vec<Vec<Pt>> = interiors
                .iter()
                .map(|ring| clip_ring_band(ring, Axis::X, band.0, band.1))
                .filter(|ring| !ring.is_empty())
                .collect();

            let (_, strip_min_y, _, strip_max_y) = ring_bbox(&strip_ext);
            let Some((row_lo, row_hi)) =
                covered_range(strip_min_y, strip_max_y, buffer, tiles_across)
            else {
                continue;
            };

            // Second axis: cut each strip into row cells.
            for row in row_lo..=row_hi {
                let band = (f64::from(row) - buffer, f64::from(row) + 1.0 + buffer);
                let cell_ext = clip_ring_band(&strip_ext, Axis::Y, band.0, band.1);
                if cell_ext.is_empty() {
                    continue;
                }

                let rounded = clean_ring(ring_to_extent(&cell_ext, col, row, extent));
                if rounded.len() < 3 || ring_signed_area(&rounded) == 0.0 {
                    // Sliver: real intersection that collapsed on rounding.
                    degenerate += 1;
                    continue;
                }

                let mut rings = vec![to_int_ring(rounded)];
                for interior in &strip_ints {
                    let cell_int = clip_ring_band(interior, Axis::Y, band.0, band.1);
                    if cell_int.is_empty() {
                        continue;
                    }
                    let rounded = clean_ring(ring_to_extent(&cell_int, col, row, extent));
                    if rounded.len() >= 3 && ring_signed_area(&rounded) != 0.0 {
                        rings.push(to_int_ring(rounded));
                    }
                }

                per_tile.entry((col, row)).or_default().push(rings);
            }
        }
    }

    finish(per_tile, zoom, FragmentGeometry::Polygons, degenerate)
}

fn cover_lines(
    lines: &[LineString<f64>],
    zoom: u8,
    buffer: f64,
    extent: u32,
) -> CoverOutcome {
    let tiles_across = TileCoord::tiles_across(zoom);
    let mut per_tile: HashMap<(u32, u32), Vec<Vec<(i32, i32)>>> = HashMap::new();
    let mut degenerate = 0u64;

    for line in lines {
        let path = project_ring_open(line, zoom);
        if path.len() < 2 {
            continue;
        }

        // Bucket clipped segments per cell, preserving path order so parts
        // chain back together below.
        let mut segments: HashMap<(u32, u32), Vec<(Pt, Pt)>> = HashMap::new();
        for seg in path.windows(2) {
            let (a, b) = (seg[0], seg[1]);
            let Some((col_lo, col_hi)) =
                covered_range(a.0.min(b.0), a.0.max(b.0), buffer, tiles_across)
            else {
                continue;
            };
            let Some((row_lo, row_hi)) =
                covered_range(a.1.min(b.1), a.1.max(b.1), buffer, tiles_across)
            else {
                continue;
            };
            for col in col_lo..=col_hi {
                for row in row_lo..=row_hi {
                    let cell = (
                        f64::from(col) - buffer,
                        f64::from(row) - buffer,
                        f64::from(col) + 1.0 + buffer,
                        f64::from(row) + 1.0 + buffer,
                    );
                    if let Some(clipped) = clip_segment_box(a, b, cell) {
                        segments.entry((col, row)).or_default().push(clipped);
                    }
                }
            }
        }

        for ((col, row), segs) in segments {
            let mut parts: Vec<Vec<(i32, i32)>> = Vec::new();
            let mut current: Vec<Pt> = Vec::new();
            for (a, b) in segs {
                let connected = current
                    .last()
                    .map_or(false, |&last| (last.0 - a.0).abs() < 1e-9 && (last.1 - a.1).abs() < 1e-9);
                if !connected {
                    flush_part(&mut parts, &mut current, col, row, extent, &mut degenerate);
                    current.push(a);
                }
                current.push(b);
            }
            flush_part(&mut parts, &mut current, col, row, extent, &mut degenerate);
            if !parts.is_empty() {
                per_tile.entry((col, row)).or_default().extend(parts);
            }
        }
    }

    finish(per_tile, zoom, FragmentGeometry::Lines, degenerate)
}

/// Convert a buffered grid-space part to extent coordinates; parts that
/// collapse to a single point count as degenerate clips.
fn flush_part(
    parts: &mut Vec<Vec<(i32, i32)>>,
    current: &mut Vec<Pt>,
    col: u32,
    row: u32,
    extent: u32,
    degenerate: &mut u64,
) {
    if current.is_empty() {
        return;
    }
    let rounded = ring_to_extent(current, col, row, extent);
    current.clear();
    let mut out: Vec<(i32, i32)> = Vec::with_capacity(rounded.len());
    for (x, y) in rounded {
        let p = (x as i32, y as i32);
        if out.last() != Some(&p) {
            out.push(p);
        }
    }
    if out.len() >= 2 {
        parts.push(out);
    } else {
        *degenerate += 1;
    }
}

fn project_ring_open(line: &LineString<f64>, zoom: u8) -> Vec<Pt> {
    line.coords()
        .filter(|c| c.x.is_finite() && c.y.is_finite())
        .map(|c| proj::project(c.x, c.y, zoom))
        .collect()
}

fn cover_points(
    points: &[geo_types::Point<f64>],
    zoom: u8,
    buffer: f64,
    extent: u32,
) -> CoverOutcome {
    let tiles_across = TileCoord::tiles_across(zoom);
    let mut per_tile: HashMap<(u32, u32), Vec<(i32, i32)>> = HashMap::new();

    for point in points {
        if !point.x().is_finite() || !point.y().is_finite() {
            continue;
        }
        let (gx, gy) = proj::project(point.x(), point.y(), zoom);
        let Some((col_lo, col_hi)) = covered_range(gx, gx, buffer, tiles_across) else {
            continue;
        };
        let Some((row_lo, row_hi)) = covered_range(gy, gy, buffer, tiles_across) else {
            continue;
        };
        for col in col_lo..=col_hi {
            for row in row_lo..=row_hi {
                let ex = f64::from(extent);
                let x = ((gx - f64::from(col)) * ex).round() as i32;
                let y = ((gy - f64::from(row)) * ex).round() as i32;
                per_tile.entry((col, row)).or_default().push((x, y));
            }
        }
    }

    finish(per_tile, zoom, FragmentGeometry::Points, 0)
}

fn finish<T>(
    per_tile: HashMap<(u32, u32), T>,
    zoom: u8,
    wrap: impl Fn(T) -> FragmentGeometry,
    degenerate_clips: u64,
) -> CoverOutcome {
    let mut tiles: Vec<CoveredTile> = per_tile
        .into_iter()
        .map(|((x, y), geometry)| CoveredTile {
            coord: TileCoord::new(zoom, x, y),
            geometry: wrap(geometry),
        })
        .collect();
    tiles.sort_by_key(|t| (t.coord.x, t.coord.y));
    CoverOutcome { tiles, degenerate_clips }
}

#[cfg(test)]
mod tests {
    use geo_types::{polygon, Geometry, LineString, Point};

    use super::*;

    /// Square in grid space covering the middle of the world tile.
    fn half_world_square() -> Geometry<f64> {
        // Lon -90..90, lat -66..66 stays well inside tile (0,0,0).
        Geometry::Polygon(polygon![
            (x: -90.0, y: -66.0),
            (x: 90.0, y: -66.0),
            (x: 90.0, y: 66.0),
            (x: -90.0, y: 66.0),
        ])
    }

    #[test]
    fn world_tile_covers_interior_square_once() {
        let outcome = cover_feature(&half_world_square(), 0, 4, 4096);
        assert_eq!(outcome.tiles.len(), 1);
        assert_eq!(outcome.tiles[0].coord, TileCoord::new(0, 0, 0));
        assert_eq!(outcome.degenerate_clips, 0);
        assert!(outcome.tiles[0].geometry.area_px() > 0.0);
    }

    #[test]
    fn square_straddling_meridian_covers_both_zoom_one_columns() {
        let outcome = cover_feature(&half_world_square(), 1, 0, 4096);
        let coords: Vec<TileCoord> = outcome.tiles.iter().map(|t| t.coord).collect();
        assert_eq!(
            coords,
            vec![
                TileCoord::new(1, 0, 0),
                TileCoord::new(1, 0, 1),
                TileCoord::new(1, 1, 0),
                TileCoord::new(1, 1, 1),
            ]
        );
    }

    #[test]
    fn buffer_bleeds_into_neighboring_tile() {
        // Square in the east half only; with a large buffer it also lands
        // in the west tile at zoom 1.
        let east = Geometry::Polygon(polygon![
            (x: 1.0, y: -60.0),
            (x: 90.0, y: -60.0),
            (x: 90.0, y: 60.0),
            (x: 1.0, y: 60.0),
        ]);
        let without = cover_feature(&east, 1, 0, 4096);
        assert!(without.tiles.iter().all(|t| t.coord.x == 1));

        let with = cover_feature(&east, 1, 64, 4096);
        assert!(with.tiles.iter().any(|t| t.coord.x == 0));
    }

    #[test]
    fn polygon_outside_grid_has_no_coverage() {
        let north = Geometry::Polygon(polygon![
            (x: 0.0, y: 86.0),
            (x: 1.0, y: 86.0),
            (x: 1.0, y: 89.0),
            (x: 0.0, y: 89.0),
        ]);
        // Clamped to the mercator cutoff the polygon still projects inside
        // the grid; a genuinely out-of-range bbox comes from bad input.
        let outcome = cover_feature(&north, 0, 0, 4096);
        assert!(outcome.tiles.len() <= 1);
    }

    #[test]
    fn hole_survives_clipping() {
        let donut = Geometry::Polygon(polygon!(
            exterior: [
                (x: -90.0, y: -66.0),
                (x: 90.0, y: -66.0),
                (x: 90.0, y: 66.0),
                (x: -90.0, y: 66.0),
            ],
            interiors: [[
                (x: -30.0, y: -30.0),
                (x: 30.0, y: -30.0),
                (x: 30.0, y: 30.0),
                (x: -30.0, y: 30.0),
            ]],
        ));
        let outcome = cover_feature(&donut, 0, 4, 4096);
        assert_eq!(outcome.tiles.len(), 1);
        match &outcome.tiles[0].geometry {
            FragmentGeometry::Polygons(polys) => {
                assert_eq!(polys.len(), 1);
                assert_eq!(polys[0].len(), 2, "exterior plus hole");
            }
            other => panic!("expected polygons, got {other:?}"),
        }
        let solid = cover_feature(&half_world_square(), 0, 4, 4096);
        assert!(outcome.tiles[0].geometry.area_px() < solid.tiles[0].geometry.area_px());
    }

    #[test]
    fn line_is_clipped_per_tile() {
        let line = Geometry::LineString(LineString::from(vec![(-120.0, 0.0), (120.0, 0.0)]));
        let outcome = cover_feature(&line, 1, 0, 4096);
        // The equator sits on the row boundary; without buffer the line
        // lands in the southern row of both columns.
        assert_eq!(outcome.tiles.len(), 2);
        for tile in &outcome.tiles {
            match &tile.geometry {
                FragmentGeometry::Lines(parts) => {
                    assert!(parts.iter().all(|p| p.len() >= 2));
                }
                other => panic!("expected lines, got {other:?}"),
            }
        }
    }

    #[test]
    fn point_lands_in_single_tile_without_buffer() {
        let point = Geometry::Point(Point::new(10.75, 59.91));
        let outcome = cover_feature(&point, 8, 0, 4096);
        assert_eq!(outcome.tiles.len(), 1);
        assert_eq!(outcome.tiles[0].coord, TileCoord::new(8, 135, 74));
    }

    #[test]
    fn covered_range_clamps_to_grid() {
        assert_eq!(covered_range(-3.5, 0.5, 0.0, 4), Some((0, 0)));
        assert_eq!(covered_range(2.5, 9.0, 0.0, 4), Some((2, 3)));
        assert_eq!(covered_range(5.0, 9.0, 0.0, 4), None);
        assert_eq!(covered_range(f64::NAN, 1.0, 0.0, 4), None);
    }
}
