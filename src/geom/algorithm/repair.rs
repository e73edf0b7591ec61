use geo::{BooleanOps, MultiPolygon};

/// Resolve self-intersections and ring orientation by running the shape
/// through the boolean overlay against an empty operand (a zero-width buffer).
pub fn repair(shape: &MultiPolygon<f64>) -> MultiPolygon<f64> {
    shape.union(&MultiPolygon::new(Vec::new()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, Area};

    #[test]
    fn bowtie_becomes_two_lobes() {
        let bowtie = MultiPolygon::new(vec![polygon![
            (x: 0.0, y: 0.0), (x: 2.0, y: 2.0), (x: 2.0, y: 0.0), (x: 0.0, y: 2.0),
        ]]);
        let fixed = repair(&bowtie);
        assert!((fixed.unsigned_area() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn valid_shape_keeps_its_area() {
        let square = MultiPolygon::new(vec![polygon![
            (x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 1.0),
        ]]);
        assert!((repair(&square).unsigned_area() - 1.0).abs() < 1e-12);
    }
}
