//! Polygon validity in the OGC simple-features sense, restricted to what
//! breaks the shape metrics: self-intersecting rings and rings of one
//! polygon crossing each other.
//!
//! A ring is valid when it has at least three distinct vertices, only finite
//! coordinates, and no two of its edges meet except consecutive edges at
//! their shared vertex. Rings of the same polygon may touch at a point but
//! must not cross or share an edge, and every hole must start inside the
//! shell.

use geo::algorithm::line_intersection::{line_intersection, LineIntersection};
use geo::{Coord, Intersects, Line, LineString, MultiPolygon, Polygon};

/// Edges of a ring with repeated consecutive vertices collapsed.
fn ring_edges(ring: &LineString<f64>) -> Vec<Line<f64>> {
    let mut coords: Vec<Coord<f64>> = Vec::with_capacity(ring.0.len());
    for &c in &ring.0 {
        if coords.last() != Some(&c) {
            coords.push(c);
        }
    }
    if coords.len() > 1 && coords.first() != coords.last() {
        if let Some(&first) = coords.first() {
            coords.push(first);
        }
    }
    coords.windows(2).map(|w| Line::new(w[0], w[1])).collect()
}

/// True when the two edges share more than a single point.
fn overlaps(hit: &LineIntersection<f64>) -> bool {
    matches!(hit, LineIntersection::Collinear { intersection } if intersection.start != intersection.end)
}

fn ring_is_simple(edges: &[Line<f64>]) -> bool {
    let n = edges.len();
    if n < 3 {
        return false;
    }
    for i in 0..n {
        for j in (i + 1)..n {
            let Some(hit) = line_intersection(edges[i], edges[j]) else { continue };
            let adjacent = j == i + 1 || (i == 0 && j == n - 1);
            if !adjacent || overlaps(&hit) {
                return false;
            }
        }
    }
    true
}

/// Rings may touch at isolated points only.
fn rings_cross(a: &[Line<f64>], b: &[Line<f64>]) -> bool {
    a.iter().any(|ea| {
        b.iter().any(|eb| match line_intersection(*ea, *eb) {
            Some(LineIntersection::SinglePoint { is_proper, .. }) => is_proper,
            Some(hit) => overlaps(&hit),
            None => false,
        })
    })
}

pub fn polygon_is_valid(poly: &Polygon<f64>) -> bool {
    let finite = std::iter::once(poly.exterior())
        .chain(poly.interiors())
        .flat_map(|r| r.coords())
        .all(|c| c.x.is_finite() && c.y.is_finite());
    if !finite {
        return false;
    }

    let shell = ring_edges(poly.exterior());
    if !ring_is_simple(&shell) {
        return false;
    }
    let shell_poly = Polygon::new(poly.exterior().clone(), vec![]);

    let holes: Vec<Vec<Line<f64>>> = poly.interiors().iter().map(ring_edges).collect();
    for (i, hole) in holes.iter().enumerate() {
        if !ring_is_simple(hole) || rings_cross(&shell, hole) {
            return false;
        }
        let inside = poly.interiors()[i].0.first().is_some_and(|c| shell_poly.intersects(c));
        if !inside {
            return false;
        }
        if holes[i + 1..].iter().any(|other| rings_cross(hole, other)) {
            return false;
        }
    }
    true
}

/// Every part of the parcel is a valid polygon.
pub fn is_valid_parcel(mp: &MultiPolygon<f64>) -> bool {
    !mp.0.is_empty() && mp.iter().all(polygon_is_valid)
}
