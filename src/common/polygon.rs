use anyhow::{bail, Result};
use shapefile as shp;

/// Convert the rings of a shapefile polygon (any point flavour) into a geo::MultiPolygon<f64>.
fn rings_to_geo<P>(rings: &[shp::PolygonRing<P>], xy: impl Fn(&P) -> (f64, f64)) -> geo::MultiPolygon<f64> {
    /// Ensure first and last are the same for geo::LineString coords
    fn ensure_closed(coords: &mut Vec<geo::Coord<f64>>) {
        if !coords.is_empty() && coords[0] != coords[coords.len() - 1] {
            coords.push(coords[0])
        }
    }

    // Group: each exterior with its following holes (Shapefile stores rings in this order)
    let mut polys: Vec<geo::Polygon<f64>> = Vec::new();
    let mut current_exterior: Option<geo::LineString<f64>> = None;
    let mut current_holes: Vec<geo::LineString<f64>> = Vec::new();

    for ring in rings {
        let mut coords = ring.points().iter()
            .map(|pt| { let (x, y) = xy(pt); geo::Coord { x, y } })
            .collect::<Vec<_>>();
        ensure_closed(&mut coords);
        let ls = geo::LineString(coords);

        match ring {
            shp::PolygonRing::Outer(_) => {
                // flush previous polygon
                if let Some(ext) = current_exterior.take() {
                    polys.push(geo::Polygon::new(ext, std::mem::take(&mut current_holes)));
                }
                current_exterior = Some(ls);
            }
            shp::PolygonRing::Inner(_) => current_holes.push(ls),
        }
    }
    if let Some(ext) = current_exterior {
        polys.push(geo::Polygon::new(ext, current_holes));
    }

    geo::MultiPolygon(polys)
}

/// Convert a polygonal shapefile::Shape into a geo::MultiPolygon<f64>.
pub(crate) fn shape_to_multipolygon(shape: shp::Shape) -> Result<geo::MultiPolygon<f64>> {
    Ok(match shape {
        shp::Shape::Polygon(p) => rings_to_geo(p.rings(), |pt| (pt.x, pt.y)),
        shp::Shape::PolygonM(p) => rings_to_geo(p.rings(), |pt| (pt.x, pt.y)),
        shp::Shape::PolygonZ(p) => rings_to_geo(p.rings(), |pt| (pt.x, pt.y)),
        shp::Shape::NullShape => geo::MultiPolygon(Vec::new()),
        other => bail!("Expected a polygon shape, got {:?}", other.shapetype()),
    })
}
