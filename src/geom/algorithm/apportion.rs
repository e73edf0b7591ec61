use geo::{Area, BooleanOps, Intersects, MultiPolygon};

/// The part of a source polygon lying inside a clipping region.
#[derive(Debug, Clone)]
pub struct Piece {
    pub geometry: MultiPolygon<f64>,
    /// `area(piece) / area(source)`, in [0, 1].
    pub ratio: f64,
}

/// Clip `source` against `region`. Returns `None` when they are disjoint, the
/// overlap has no area, or the source itself is degenerate.
pub fn clip(source: &MultiPolygon<f64>, source_area: f64, region: &MultiPolygon<f64>) -> Option<Piece> {
    if source_area <= 0.0 || !source.intersects(region) { return None }

    let geometry = source.intersection(region);
    let area = geometry.unsigned_area();
    if area <= 0.0 { return None }

    Some(Piece { geometry, ratio: (area / source_area).min(1.0) })
}

/// Share of `value` that falls inside `region`, assuming `value` is spread
/// uniformly over the area of `source`.
pub fn apportion(value: f64, source: &MultiPolygon<f64>, region: &MultiPolygon<f64>) -> f64 {
    clip(source, source.unsigned_area(), region)
        .map_or(0.0, |piece| value * piece.ratio)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, Rect, Coord};

    fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![Rect::new(Coord { x: x0, y: y0 }, Coord { x: x1, y: y1 }).to_polygon()])
    }

    #[test]
    fn contained_source_keeps_full_value() {
        let source = rect(1.0, 1.0, 2.0, 2.0);
        let region = rect(0.0, 0.0, 3.0, 3.0);
        assert!((apportion(400.0, &source, &region) - 400.0).abs() < 1e-9);
    }

    #[test]
    fn disjoint_source_contributes_nothing() {
        let source = rect(0.0, 0.0, 1.0, 1.0);
        let region = rect(5.0, 5.0, 6.0, 6.0);
        assert_eq!(apportion(400.0, &source, &region), 0.0);
        assert!(clip(&source, 1.0, &region).is_none());
    }

    #[test]
    fn touching_source_contributes_nothing() {
        let source = rect(0.0, 0.0, 1.0, 1.0);
        let region = rect(1.0, 0.0, 2.0, 1.0);
        assert_eq!(apportion(400.0, &source, &region), 0.0);
    }

    #[test]
    fn half_overlap_gives_half_value() {
        let source = rect(0.0, 0.0, 2.0, 1.0);
        let region = rect(1.0, -1.0, 5.0, 5.0);
        assert!((apportion(100.0, &source, &region) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn value_is_monotone_in_overlap_area() {
        let source = rect(0.0, 0.0, 1.0, 1.0);
        let mut last = 0.0;
        for i in 1..=10 {
            let x = i as f64 / 10.0;
            let value = apportion(250.0, &source, &rect(-1.0, -1.0, x, 2.0));
            assert!(value >= last - 1e-9, "value decreased at x = {x}: {value} < {last}");
            last = value;
        }
        assert!((last - 250.0).abs() < 1e-9);
    }

    #[test]
    fn triangle_piece_ratio() {
        let source = MultiPolygon::new(vec![polygon![(x: 0.0, y: 0.0), (x: 2.0, y: 0.0), (x: 0.0, y: 2.0)]]);
        let piece = clip(&source, source.unsigned_area(), &rect(0.0, 0.0, 1.0, 1.0)).unwrap();
        assert!((piece.ratio - 0.5).abs() < 1e-9);
        assert!((piece.geometry.unsigned_area() - 1.0).abs() < 1e-9);
    }
}
