use geo::Point;
use log::{debug, error};
use serde::{Deserialize, Serialize};

use crate::{
    dataset::Dataset,
    error::{Error, Result},
    landmark::Landmark,
    municipality::{Municipality, SelectionPolicy},
    pack::point_xy,
    search::SearchResult,
};

/// Parse a coordinate pair given as latitude then longitude.
pub fn parse_point(lat: &str, lon: &str) -> Result<Point<f64>> {
    let parse = |text: &str, name: &str, limit: f64| -> Result<f64> {
        let value = text.trim().parse::<f64>()
            .map_err(|_| Error::InputParse(format!("{name} {text:?} is not a number")))?;
        if !value.is_finite() || value.abs() > limit {
            return Err(Error::InputParse(format!("{name} {value} is out of range")));
        }
        Ok(value)
    };
    let lat = parse(lat, "latitude", 90.0)?;
    let lon = parse(lon, "longitude", 180.0)?;
    Ok(Point::new(lon, lat))
}

/// Summary of a municipality in a query answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitSummary {
    pub code: String,
    pub name: String,
    pub region: String,
    pub population: u64,
    #[serde(with = "point_xy")]
    pub centroid: Point<f64>,
    pub bbox: [[f64; 2]; 2],
    /// Whether the target is at least the unit's population.
    pub would_vanish: bool,
}

impl UnitSummary {
    fn new(municipality: &Municipality, target: u64) -> Self {
        Self {
            code: municipality.code.clone(),
            name: municipality.name.clone(),
            region: municipality.region.clone(),
            population: municipality.population,
            centroid: municipality.centroid,
            bbox: municipality.bbox,
            would_vanish: municipality.would_vanish(target),
        }
    }
}

/// Answer to a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub radius: SearchResult,
    pub containing_unit: UnitSummary,
    /// The containing unit itself when it would vanish, otherwise the
    /// nearest unit no larger than the target.
    pub nearest_unit_below_target: Option<UnitSummary>,
    pub highlighted_alternatives: Vec<Landmark>,
}

impl Dataset {
    /// Answer a query for the point `(lat, lon)` and a positive target.
    /// Fatal outcomes are logged before being returned.
    pub fn locate(&self, lat: &str, lon: &str, target: u64, policy: &dyn SelectionPolicy) -> Result<Location> {
        let result = parse_point(lat, lon)
            .and_then(|point| self.locate_point(point, target, policy));
        if let Err(err) = &result {
            if err.is_recoverable() {
                debug!("[locate] ({lat}, {lon}) target {target}: {err}");
            } else {
                error!("[locate] ({lat}, {lon}) target {target}: {err}");
            }
        }
        result
    }

    pub fn locate_point(&self, point: Point<f64>, target: u64, policy: &dyn SelectionPolicy) -> Result<Location> {
        if target == 0 {
            return Err(Error::InputParse("target must be positive".into()));
        }

        let outcome = self.find_radius(point, target)?;
        let city = self.municipalities().containing(self.source(), point)?;

        let nearest = if city.would_vanish(target) {
            Some(city)
        } else {
            self.municipalities().nearest_below(point, target, Some(&city.code))
        };

        let candidates = self.landmarks().iter()
            .filter(|landmark| landmark.code != city.code)
            .collect::<Vec<_>>();
        let highlighted = policy.select(point, &candidates).into_iter().cloned().collect();

        Ok(Location {
            radius: outcome.result,
            containing_unit: UnitSummary::new(city, target),
            nearest_unit_below_target: nearest.map(|m| UnitSummary::new(m, target)),
            highlighted_alternatives: highlighted,
        })
    }
}
