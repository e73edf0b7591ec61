use geo::{Coord, Point, Rect};

use crate::config::GridSpec;

/// A regular `rows × cols` partition of a bounding rectangle.
///
/// Slots are half-open on their upper edges except for the last row and
/// column, so every point of the rectangle falls in exactly one slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Grid {
    bounds: Rect<f64>,
    spec: GridSpec,
    dx: f64,
    dy: f64,
}

impl Grid {
    pub fn new(bounds: Rect<f64>, spec: GridSpec) -> Self {
        Self {
            dx: bounds.width() / spec.cols as f64,
            dy: bounds.height() / spec.rows as f64,
            bounds,
            spec,
        }
    }

    #[inline] pub fn bounds(&self) -> Rect<f64> { self.bounds }

    #[inline] pub fn spec(&self) -> GridSpec { self.spec }

    /// The `(row, col)` slot holding `point`, or `None` outside the bounds.
    pub fn slot_of(&self, point: Point<f64>) -> Option<(u32, u32)> {
        let (min, max) = (self.bounds.min(), self.bounds.max());
        let (x, y) = (point.x(), point.y());
        if !(min.x <= x && x <= max.x && min.y <= y && y <= max.y) { return None }

        let col = (((x - min.x) / self.dx).floor() as u32).min(self.spec.cols - 1);
        let row = (((y - min.y) / self.dy).floor() as u32).min(self.spec.rows - 1);
        Some((row, col))
    }

    /// The rectangle of a slot. Outer edges snap exactly to the bounds.
    pub fn rect(&self, row: u32, col: u32) -> Rect<f64> {
        let (min, max) = (self.bounds.min(), self.bounds.max());
        let edge = |origin: f64, step: f64, i: u32, n: u32, end: f64| {
            if i >= n { end } else { origin + step * i as f64 }
        };
        Rect::new(
            Coord {
                x: edge(min.x, self.dx, col, self.spec.cols, max.x),
                y: edge(min.y, self.dy, row, self.spec.rows, max.y),
            },
            Coord {
                x: edge(min.x, self.dx, col + 1, self.spec.cols, max.x),
                y: edge(min.y, self.dy, row + 1, self.spec.rows, max.y),
            },
        )
    }

    /// All slots in row-major order.
    pub fn slots(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        (0..self.spec.rows).flat_map(move |row| (0..self.spec.cols).map(move |col| (row, col)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> Grid {
        Grid::new(Rect::new(Coord { x: -10.0, y: 0.0 }, Coord { x: 10.0, y: 5.0 }), GridSpec::new(5, 4))
    }

    #[test]
    fn slots_are_row_major_and_complete() {
        let grid = grid();
        let slots = grid.slots().collect::<Vec<_>>();
        assert_eq!(slots.len(), 20);
        assert_eq!(slots[0], (0, 0));
        assert_eq!(slots[5], (1, 1));
        assert_eq!(slots[19], (4, 3));
    }

    #[test]
    fn slot_of_uses_half_open_cells() {
        let grid = grid();
        assert_eq!(grid.slot_of(Point::new(-10.0, 0.0)), Some((0, 0)));
        assert_eq!(grid.slot_of(Point::new(-5.0, 1.0)), Some((1, 1)));
        assert_eq!(grid.slot_of(Point::new(-5.0 - 1e-9, 1.0 - 1e-9)), Some((0, 0)));
        // outer edges belong to the last row / column
        assert_eq!(grid.slot_of(Point::new(10.0, 5.0)), Some((4, 3)));
        assert_eq!(grid.slot_of(Point::new(10.1, 2.0)), None);
        assert_eq!(grid.slot_of(Point::new(0.0, -0.1)), None);
    }

    #[test]
    fn slot_rect_contains_its_points() {
        let grid = grid();
        for (x, y) in [(-9.5, 0.5), (0.0, 2.5), (9.99, 4.99), (3.3, 1.7)] {
            let (row, col) = grid.slot_of(Point::new(x, y)).unwrap();
            let rect = grid.rect(row, col);
            assert!(rect.min().x <= x && x <= rect.max().x);
            assert!(rect.min().y <= y && y <= rect.max().y);
        }
    }

    #[test]
    fn last_rect_snaps_to_bounds() {
        let grid = grid();
        let rect = grid.rect(4, 3);
        assert_eq!(rect.max(), Coord { x: 10.0, y: 5.0 });
        assert_eq!(grid.rect(0, 0).min(), Coord { x: -10.0, y: 0.0 });
    }
}
