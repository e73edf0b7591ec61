use std::f64::consts::TAU;

use geo::{Coord, LineString, Point, Polygon};

/// A regular polygon approximating the circle of `radius` around `center`.
/// The first ring vertex sits at angle zero, i.e. `(x + radius, y)`.
pub fn circle(center: Point<f64>, radius: f64, segments: usize) -> Polygon<f64> {
    debug_assert!(segments >= 3, "a circle needs at least three segments");

    let mut coords = (0..segments)
        .map(|i| {
            let angle = TAU * i as f64 / segments as f64;
            Coord { x: center.x() + radius * angle.cos(), y: center.y() + radius * angle.sin() }
        })
        .collect::<Vec<_>>();
    coords.push(coords[0]);

    Polygon::new(LineString::new(coords), vec![])
}
