use geo::{Area, BoundingRect, Intersects, MultiPolygon};
use rstar::{RTree, AABB};

use crate::geom::{clip, BoundingBox, Piece};

/// A collection of valued MultiPolygons indexed by an R-tree of their bounding boxes.
#[derive(Debug, Clone)]
pub struct Geometries {
    ids: Vec<String>,
    shapes: Vec<MultiPolygon<f64>>,
    values: Vec<f64>,
    areas: Vec<f64>,
    rtree: RTree<BoundingBox>,
}

impl Geometries {
    /// Construct from parallel vectors of ids, shapes and values.
    /// Shapes without a bounding rectangle (empty) are kept but never indexed.
    pub fn new(ids: Vec<String>, shapes: Vec<MultiPolygon<f64>>, values: Vec<f64>) -> Self {
        assert!(ids.len() == shapes.len(), "ids.len() must equal shapes.len()");
        assert!(values.len() == shapes.len(), "values.len() must equal shapes.len()");

        Self {
            rtree: RTree::bulk_load(
                shapes.iter().enumerate()
                    .filter_map(|(i, shape)| shape.bounding_rect().map(|rect| BoundingBox::new(i, rect)))
                    .collect()
            ),
            areas: shapes.iter().map(|shape| shape.unsigned_area()).collect(),
            ids,
            shapes,
            values,
        }
    }

    /// Get the number of shapes.
    #[inline] pub fn len(&self) -> usize { self.shapes.len() }

    /// Check if there are no shapes.
    #[inline] pub fn is_empty(&self) -> bool { self.shapes.is_empty() }

    #[inline] pub fn ids(&self) -> &[String] { &self.ids }

    #[inline] pub fn shapes(&self) -> &[MultiPolygon<f64>] { &self.shapes }

    #[inline] pub fn values(&self) -> &[f64] { &self.values }

    /// Sum of all values.
    #[inline] pub fn total(&self) -> f64 { self.values.iter().sum() }

    /// Indices of shapes whose bounding box intersects the envelope.
    #[inline]
    pub(crate) fn query<'a>(&'a self, envelope: &AABB<[f64; 2]>) -> impl Iterator<Item = usize> + 'a {
        self.rtree.locate_in_envelope_intersecting(envelope).map(|bbox| bbox.idx())
    }

    /// Indices of shapes that truly intersect `region`, prefiltered by bounding box.
    pub fn intersecting(&self, region: &MultiPolygon<f64>) -> Vec<usize> {
        let Some(rect) = region.bounding_rect() else { return Vec::new() };
        let mut hits = self.query(&crate::geom::envelope_of(&rect))
            .filter(|&i| self.shapes[i].intersects(region))
            .collect::<Vec<_>>();
        hits.sort_unstable();
        hits
    }

    /// Pieces of every shape inside `region` with a positive area, by shape index.
    pub fn pieces_within(&self, region: &MultiPolygon<f64>) -> Vec<(usize, Piece)> {
        self.intersecting(region).into_iter()
            .filter_map(|i| clip(&self.shapes[i], self.areas[i], region).map(|piece| (i, piece)))
            .collect()
    }

    /// Total value inside `region`, apportioning each intersecting shape by area.
    pub fn value_within(&self, region: &MultiPolygon<f64>) -> f64 {
        self.pieces_within(region).into_iter()
            .map(|(i, piece)| self.values[i] * piece.ratio)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Coord, Rect};

    fn square(x: f64, y: f64, size: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![Rect::new(Coord { x, y }, Coord { x: x + size, y: y + size }).to_polygon()])
    }

    fn two_by_one() -> Geometries {
        Geometries::new(
            vec!["a".into(), "b".into()],
            vec![square(0.0, 0.0, 1.0), square(1.0, 0.0, 1.0)],
            vec![100.0, 300.0],
        )
    }

    #[test]
    fn intersecting_includes_shared_boundary() {
        let geoms = two_by_one();
        assert_eq!(geoms.intersecting(&square(0.2, 0.2, 0.5)), vec![0]);
        assert_eq!(geoms.intersecting(&square(0.5, 0.2, 0.5)), vec![0, 1]);
        assert!(geoms.intersecting(&square(5.0, 5.0, 1.0)).is_empty());
    }

    #[test]
    fn value_within_apportions_by_area() {
        let geoms = two_by_one();
        // lower-left quarter of "a"
        let left = square(-1.0, -1.0, 1.5);
        assert!((geoms.value_within(&left) - 25.0).abs() < 1e-9);
        let everything = square(-1.0, -1.0, 4.0);
        assert!((geoms.value_within(&everything) - 400.0).abs() < 1e-9);
        assert_eq!(geoms.total(), 400.0);
    }

    #[test]
    #[should_panic(expected = "values.len() must equal shapes.len()")]
    fn new_panics_on_length_mismatch() {
        Geometries::new(vec!["a".into()], vec![square(0.0, 0.0, 1.0)], vec![]);
    }
}
