use std::f64::consts::PI;

use geo::{BoundingRect, Coord, MultiPolygon, Point, Rect};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    config::SearchConfig,
    error::{Error, Result},
    geom::{circle, Geometries},
    tiling::DetailRecord,
};

/// The final circle of a search: its centre and one point on its boundary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    #[serde(with = "crate::pack::point_xy")]
    pub inner_point: Point<f64>,
    #[serde(with = "crate::pack::point_xy")]
    pub outer_point: Point<f64>,
}

/// A search result with the numbers behind it.
#[derive(Debug, Clone)]
pub struct RadiusOutcome {
    pub result: SearchResult,
    /// Final radius, in coordinate degrees.
    pub radius: f64,
    /// Rounded population inside the final circle.
    pub population: u64,
    /// Every radius tried while growing, in order.
    pub growth_radii: Vec<f64>,
    /// Number of fine-tuning moves.
    pub iterations: usize,
}

/// Fine-tuning state. The variant records the direction of the last move
/// and the step the next move in that direction will use.
#[derive(Debug, Clone, Copy, PartialEq)]
enum TuneState {
    Growing { step: f64 },
    Shrinking { step: f64 },
    Converged,
}

impl TuneState {
    /// Next state and the factor to apply to the radius.
    /// Reversing direction moves with the current step and halves it afterwards.
    fn advance(self, population: u64, low: f64, high: f64) -> (Self, f64) {
        let (step, shrinking) = match self {
            TuneState::Converged => return (TuneState::Converged, 1.0),
            TuneState::Growing { step } => (step, false),
            TuneState::Shrinking { step } => (step, true),
        };
        let population = population as f64;

        if population > high {
            let next = if shrinking { step } else { step / 2.0 };
            (TuneState::Shrinking { step: next }, 1.0 - step)
        } else if population < low {
            let next = if shrinking { step / 2.0 } else { step };
            (TuneState::Growing { step: next }, 1.0 + step)
        } else {
            (TuneState::Converged, 1.0)
        }
    }
}

/// Circle search over a set of loaded detail records.
#[derive(Debug)]
pub struct RadiusSearch<'a> {
    records: Geometries,
    bounds: Option<Rect<f64>>,
    config: &'a SearchConfig,
}

impl<'a> RadiusSearch<'a> {
    pub fn new(records: Vec<DetailRecord>, config: &'a SearchConfig) -> Self {
        let (mut ids, mut shapes, mut values) = (Vec::new(), Vec::new(), Vec::new());
        let mut bounds: Option<Rect<f64>> = None;
        for record in records {
            if let Some(rect) = record.geometry.bounding_rect() {
                bounds = Some(match bounds {
                    None => rect,
                    Some(b) => Rect::new(
                        Coord { x: b.min().x.min(rect.min().x), y: b.min().y.min(rect.min().y) },
                        Coord { x: b.max().x.max(rect.max().x), y: b.max().y.max(rect.max().y) },
                    ),
                });
            }
            ids.push(record.id);
            shapes.push(record.geometry);
            values.push(record.value);
        }
        Self { records: Geometries::new(ids, shapes, values), bounds, config }
    }

    /// Smallest radius whose polygonal circle around `center` covers every
    /// loaded record. Growing past it cannot add population.
    pub fn covering_radius(&self, center: Point<f64>) -> f64 {
        let Some(bounds) = self.bounds else { return 0.0 };
        let far = |lo: f64, hi: f64, at: f64| (at - lo).abs().max((hi - at).abs());
        let dx = far(bounds.min().x, bounds.max().x, center.x());
        let dy = far(bounds.min().y, bounds.max().y, center.y());
        // the polygon's edges sit at r * cos(pi / n) from the centre
        dx.hypot(dy) / (PI / self.config.buffer_segments as f64).cos()
    }

    /// Population inside the circle of `radius` around `center`, rounded.
    pub fn population_at(&self, center: Point<f64>, radius: f64) -> u64 {
        let region = MultiPolygon::new(vec![circle(center, radius, self.config.buffer_segments)]);
        self.records.value_within(&region).round() as u64
    }

    /// Grow the circle until it holds `target` people, then tune the radius
    /// until the population is within the tolerance band. Growth stops with
    /// `UnreachableTarget` once the circle covers every loaded record.
    pub fn run(&self, center: Point<f64>, target: u64) -> Result<RadiusOutcome> {
        if target == 0 {
            return Err(Error::InputParse("target must be positive".into()));
        }
        let config = self.config;

        let mut radius = config.initial_radius;
        let mut population = self.population_at(center, radius);
        let mut growth_radii = vec![radius];
        let covering = self.covering_radius(center);
        while population < target {
            if radius >= covering || growth_radii.len() > config.max_growth_steps {
                return Err(Error::UnreachableTarget { target, reached: population });
            }
            radius *= config.growth_factor;
            population = self.population_at(center, radius);
            growth_radii.push(radius);
        }
        debug!("[search] grew to radius {radius:.5} ({population} people) in {} steps", growth_radii.len() - 1);

        let low = target as f64 * (1.0 - config.tolerance);
        let high = target as f64 * (1.0 + config.tolerance);
        let mut state = TuneState::Shrinking { step: config.initial_step };
        let mut iterations = 0;
        loop {
            let (next, factor) = state.advance(population, low, high);
            if next == TuneState::Converged { break }
            if iterations >= config.max_tune_iterations {
                return Err(Error::Convergence { iterations, radius, population });
            }
            radius *= factor;
            population = self.population_at(center, radius);
            state = next;
            iterations += 1;
            debug!("[search] tune {iterations}: {state:?} radius {radius:.5} ({population} people)");
        }

        let ring = circle(center, radius, config.buffer_segments);
        let outer_point = ring.exterior().0.first()
            .map(|&coord| Point::from(coord))
            .ok_or_else(|| Error::DataIntegrity("search circle has no vertices".into()))?;

        Ok(RadiusOutcome {
            result: SearchResult { inner_point: center, outer_point },
            radius,
            population,
            growth_radii,
            iterations,
        })
    }
}
