//! Two-phase search for the circle around a point that holds a target population.
mod quadrant;
mod radius;

pub use quadrant::{expand, Expansion};
pub use radius::{RadiusOutcome, RadiusSearch, SearchResult};

use geo::Point;

use crate::{config::SearchConfig, error::Result, pack::BlobSource, tiling::GridIndex};

/// Gather the cells around `point`, then run the radius search over them.
pub fn find_radius(index: &GridIndex, src: &dyn BlobSource, point: Point<f64>, target: u64, config: &SearchConfig) -> Result<RadiusOutcome> {
    let expansion = expand(index, src, point, target, config)?;
    RadiusSearch::new(expansion.records, config).run(point, target)
}
