//! Web Mercator "grid space" projection.
//!
//! Grid space at zoom `z` scales the Mercator unit square so one tile is
//! one unit: a point with grid coordinates (gx, gy) falls in tile
//! (gx.floor(), gy.floor()). Tile-local extent coordinates are the
//! fractional part scaled by the tile extent.

use std::f64::consts::PI;

/// Web Mercator latitude cutoff; beyond it the projection diverges.
const LAT_LIMIT: f64 = 85.051_128_779_806_6;

/// Project lon/lat degrees into grid coordinates at `zoom`.
pub fn project(lon: f64, lat: f64, zoom: u8) -> (f64, f64) {
    let n = f64::from(1u32 << zoom);
    let lat = lat.clamp(-LAT_LIMIT, LAT_LIMIT);
    let x = (lon + 180.0) / 360.0 * n;
    let y = (1.0 - lat.to_radians().tan().asinh() / PI) / 2.0 * n;
    (x, y)
}

/// Inverse of [`project`].
pub fn unproject(gx: f64, gy: f64, zoom: u8) -> (f64, f64) {
    let n = f64::from(1u32 << zoom);
    let lon = gx / n * 360.0 - 180.0;
    let lat = (PI * (1.0 - 2.0 * gy / n)).sinh().atan().to_degrees();
    (lon, lat)
}

/// Tile X index containing `lon` at `zoom`.
pub fn lon_to_tile_x(lon: f64, zoom: u8) -> u32 {
    let n = 1u32 << zoom;
    (project(lon, 0.0, zoom).0.floor() as i64).clamp(0, i64::from(n) - 1) as u32
}

/// Tile Y index containing `lat` at `zoom`. North is lower Y.
pub fn lat_to_tile_y(lat: f64, zoom: u8) -> u32 {
    let n = 1u32 << zoom;
    (project(0.0, lat, zoom).1.floor() as i64).clamp(0, i64::from(n) - 1) as u32
}

/// Degrees of longitude spanned by one display pixel at `zoom`,
/// assuming 256px tiles. The simplification tolerance is this times a
/// configurable factor, so shape stability is smooth between adjacent
/// zooms.
pub fn pixel_degrees(zoom: u8) -> f64 {
    360.0 / (256.0 * f64::from(1u32 << zoom))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_projects_to_grid_center() {
        let (x, y) = project(0.0, 0.0, 0);
        assert!((x - 0.5).abs() < 1e-12);
        assert!((y - 0.5).abs() < 1e-12);
    }

    #[test]
    fn project_round_trips() {
        for &(lon, lat) in &[(10.5, 59.9), (-122.3, 47.6), (0.0, 0.0), (179.0, -45.0)] {
            for zoom in [0u8, 4, 10] {
                let (gx, gy) = project(lon, lat, zoom);
                let (lon2, lat2) = unproject(gx, gy, zoom);
                assert!((lon - lon2).abs() < 1e-9, "lon {lon} at z{zoom}");
                assert!((lat - lat2).abs() < 1e-9, "lat {lat} at z{zoom}");
            }
        }
    }

    #[test]
    fn oslo_lands_in_known_tile() {
        // Oslo (10.75E, 59.91N) is in tile 8/135/74.
        assert_eq!(lon_to_tile_x(10.75, 8), 135);
        assert_eq!(lat_to_tile_y(59.91, 8), 74);
    }

    #[test]
    fn pixel_degrees_halves_per_zoom() {
        assert!((pixel_degrees(3) / pixel_degrees(4) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn poles_clamp_instead_of_diverging() {
        let (_, y) = project(0.0, 90.0, 0);
        assert!(y.is_finite() && y >= 0.0);
        let (_, y) = project(0.0, -90.0, 0);
        assert!(y.is_finite() && y <= 1.0);
    }
}
