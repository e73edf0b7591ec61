use std::sync::Mutex;

use geo::{Distance, Euclidean, Point};
use rand::{rngs::StdRng, seq::IndexedRandom, SeedableRng};

use crate::landmark::Landmark;

/// Chooses which landmarks to highlight next to a query result.
///
/// `candidates` never include the landmark of the containing municipality.
pub trait SelectionPolicy: Send + Sync {
    fn select<'a>(&self, point: Point<f64>, candidates: &[&'a Landmark]) -> Vec<&'a Landmark>;
}

/// Index of the candidate nearest to `point`, ties broken by code.
fn nearest(point: Point<f64>, candidates: &[&Landmark]) -> Option<usize> {
    candidates.iter().enumerate()
        .min_by(|(_, a), (_, b)| {
            Euclidean.distance(point, a.point)
                .total_cmp(&Euclidean.distance(point, b.point))
                .then_with(|| a.code.cmp(&b.code))
        })
        .map(|(i, _)| i)
}

/// Only the nearest landmark.
#[derive(Debug, Default, Clone, Copy)]
pub struct NearestOnly;

impl SelectionPolicy for NearestOnly {
    fn select<'a>(&self, point: Point<f64>, candidates: &[&'a Landmark]) -> Vec<&'a Landmark> {
        nearest(point, candidates).map(|i| candidates[i]).into_iter().collect()
    }
}

/// The nearest landmark plus one picked at random from the rest.
#[derive(Debug)]
pub struct NearestThenRandom {
    rng: Mutex<StdRng>,
}

impl NearestThenRandom {
    pub fn new() -> Self {
        Self { rng: Mutex::new(StdRng::from_os_rng()) }
    }

    /// A reproducible policy.
    pub fn seeded(seed: u64) -> Self {
        Self { rng: Mutex::new(StdRng::seed_from_u64(seed)) }
    }
}

impl Default for NearestThenRandom {
    fn default() -> Self { Self::new() }
}

impl SelectionPolicy for NearestThenRandom {
    fn select<'a>(&self, point: Point<f64>, candidates: &[&'a Landmark]) -> Vec<&'a Landmark> {
        let Some(first) = nearest(point, candidates) else { return Vec::new() };

        let rest = candidates.iter().enumerate()
            .filter(|&(i, _)| i != first)
            .map(|(_, &landmark)| landmark)
            .collect::<Vec<_>>();

        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        std::iter::once(candidates[first])
            .chain(rest.choose(&mut *rng).copied())
            .collect()
    }
}
