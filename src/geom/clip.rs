//! Low-level clipping primitives used by the tile coverer.
//!
//! Rings are clipped with Sutherland-Hodgman half-plane passes so
//! intersection points are interpolated where edges cross tile
//! boundaries. Line segments use Liang-Barsky box clipping.

pub(crate) type Pt = (f64, f64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Axis {
    X,
    Y,
}

fn coord(p: &Pt, axis: Axis) -> f64 {
    match axis {
        Axis::X => p.0,
        Axis::Y => p.1,
    }
}

/// Clip a closed ring against a single half-plane, keeping the side where
/// `keep` holds. Intersections are interpolated on the boundary.
fn clip_half_plane<F, I>(ring: &[Pt], keep: F, intersect: I) -> Vec<Pt>
where
    F: Fn(&Pt) -> bool,
    I: Fn(&Pt, &Pt) -> Pt,
{
    if ring.is_empty() {
        return Vec::new();
    }

    let mut output = Vec::with_capacity(ring.len() + 4);
    let n = ring.len();
    for i in 0..n {
        let current = &ring[i];
        let next = &ring[(i + 1) % n];
        match (keep(current), keep(next)) {
            (true, true) => output.push(*next),
            (true, false) => output.push(intersect(current, next)),
            (false, true) => {
                output.push(intersect(current, next));
                output.push(*next);
            }
            (false, false) => {}
        }
    }
    output
}

/// Clip a ring to the band `min <= axis <= max`. Two half-plane passes.
pub(crate) fn clip_ring_band(ring: &[Pt], axis: Axis, min: f64, max: f64) -> Vec<Pt> {
    let lower = clip_half_plane(
        ring,
        |p| coord(p, axis) >= min,
        |p1, p2| interpolate(p1, p2, axis, min),
    );
    clip_half_plane(
        &lower,
        |p| coord(p, axis) <= max,
        |p1, p2| interpolate(p1, p2, axis, max),
    )
}

fn interpolate(p1: &Pt, p2: &Pt, axis: Axis, bound: f64) -> Pt {
    let t = (bound - coord(p1, axis)) / (coord(p2, axis) - coord(p1, axis));
    match axis {
        Axis::X => (bound, p1.1 + t * (p2.1 - p1.1)),
        Axis::Y => (p1.0 + t * (p2.0 - p1.0), bound),
    }
}

/// Clip a segment to an axis-aligned box (Liang-Barsky). Returns the
/// clipped endpoints, or `None` when the segment misses the box.
pub(crate) fn clip_segment_box(
    a: Pt,
    b: Pt,
    (min_x, min_y, max_x, max_y): (f64, f64, f64, f64),
) -> Option<(Pt, Pt)> {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let mut t0 = 0.0f64;
    let mut t1 = 1.0f64;

    for (p, q) in [
        (-dx, a.0 - min_x),
        (dx, max_x - a.0),
        (-dy, a.1 - min_y),
        (dy, max_y - a.1),
    ] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
        } else {
            let r = q / p;
            if p < 0.0 {
                if r > t1 {
                    return None;
                }
                if r > t0 {
                    t0 = r;
                }
            } else {
                if r < t0 {
                    return None;
                }
                if r < t1 {
                    t1 = r;
                }
            }
        }
    }

    Some((
        (a.0 + t0 * dx, a.1 + t0 * dy),
        (a.0 + t1 * dx, a.1 + t1 * dy),
    ))
}

/// Signed area of a ring. With Y growing downward (tile space), positive
/// means clockwise.
pub(crate) fn ring_signed_area(ring: &[Pt]) -> f64 {
    if ring.len() < 3 {
        return 0.0;
    }
    let mut area = 0.0;
    for i in 0..ring.len() {
        let j = (i + 1) % ring.len();
        area += ring[i].0 * ring[j].1 - ring[j].0 * ring[i].1;
    }
    area / 2.0
}

/// Clean a ring after clipping/rounding: drop consecutive duplicates, the
/// closing duplicate, and immediate A-B-A backtracks. Returns an empty
/// vector when fewer than 3 distinct points remain.
pub(crate) fn clean_ring(ring: Vec<Pt>) -> Vec<Pt> {
    if ring.is_empty() {
        return ring;
    }

    let same = |a: &Pt, b: &Pt| (a.0 - b.0).abs() < f64::EPSILON && (a.1 - b.1).abs() < f64::EPSILON;

    let mut cleaned: Vec<Pt> = Vec::with_capacity(ring.len());
    for p in ring {
        if cleaned.last().map_or(true, |last| !same(last, &p)) {
            cleaned.push(p);
        }
    }

    if cleaned.len() > 1 && same(&cleaned[0], cleaned.last().unwrap()) {
        cleaned.pop();
    }

    // A-B-A backtracks collapse to nothing visible; remove them.
    let mut deduped: Vec<Pt> = Vec::with_capacity(cleaned.len());
    for p in cleaned {
        if deduped.len() >= 2 && same(&deduped[deduped.len() - 2], &p) {
            deduped.pop();
        } else {
            deduped.push(p);
        }
    }

    if deduped.len() < 3 {
        return Vec::new();
    }
    deduped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(min: f64, max: f64) -> Vec<Pt> {
        vec![(min, min), (max, min), (max, max), (min, max)]
    }

    #[test]
    fn ring_inside_band_is_unchanged_in_shape() {
        let ring = square(0.25, 0.75);
        let clipped = clip_ring_band(&ring, Axis::X, 0.0, 1.0);
        assert!((ring_signed_area(&clipped).abs() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn ring_straddling_band_is_cut() {
        let ring = square(-0.5, 0.5);
        let clipped = clip_ring_band(&ring, Axis::X, 0.0, 1.0);
        // Left half removed: area goes from 1.0 to 0.5.
        assert!((ring_signed_area(&clipped).abs() - 0.5).abs() < 1e-12);
        assert!(clipped.iter().all(|p| p.0 >= 0.0));
    }

    #[test]
    fn ring_outside_band_vanishes() {
        let ring = square(2.0, 3.0);
        assert!(clip_ring_band(&ring, Axis::X, 0.0, 1.0).is_empty());
    }

    #[test]
    fn band_covering_ring_keeps_every_vertex() {
        let ring = square(0.0, 1.0);
        let clipped = clip_ring_band(&ring, Axis::Y, -10.0, 10.0);
        assert_eq!(clipped.len(), 4);
    }

    #[test]
    fn segment_clipping() {
        let bx = (0.0, 0.0, 1.0, 1.0);
        // Crossing segment gets trimmed at both ends.
        let (a, b) = clip_segment_box((-1.0, 0.5), (2.0, 0.5), bx).unwrap();
        assert_eq!(a, (0.0, 0.5));
        assert_eq!(b, (1.0, 0.5));
        // Disjoint segment is rejected.
        assert!(clip_segment_box((2.0, 2.0), (3.0, 3.0), bx).is_none());
        // Fully inside segment is untouched.
        let (a, b) = clip_segment_box((0.2, 0.2), (0.8, 0.9), bx).unwrap();
        assert_eq!(a, (0.2, 0.2));
        assert_eq!(b, (0.8, 0.9));
    }

    #[test]
    fn clean_ring_removes_duplicates_and_backtracks() {
        let ring = vec![
            (0.0, 0.0),
            (0.0, 0.0),
            (1.0, 0.0),
            (2.0, 0.0),
            (1.0, 0.0), // backtrack over (2,0)
            (1.0, 1.0),
            (0.0, 0.0), // closing duplicate
        ];
        let cleaned = clean_ring(ring);
        assert_eq!(cleaned, vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0)]);
    }

    #[test]
    fn clean_ring_drops_degenerate_output() {
        assert!(clean_ring(vec![(0.0, 0.0), (1.0, 1.0), (0.0, 0.0)]).is_empty());
        assert!(clean_ring(vec![(5.0, 5.0); 4]).is_empty());
    }
}
