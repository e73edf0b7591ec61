use geo::Point;
use log::debug;

use crate::{
    config::SearchConfig,
    error::{Error, Result},
    pack::BlobSource,
    tiling::{DetailRecord, GridIndex},
};

/// The cells gathered around a query point.
#[derive(Debug, Clone)]
pub struct Expansion {
    /// Number of BFS rings added beyond the containing cell.
    pub rings: usize,
    /// Aggregate value of the counted cells.
    pub counted: f64,
    /// Ids of the cells whose aggregates reach the target.
    pub count_set: Vec<u32>,
    /// `count_set` plus one ring, ascending by id.
    pub load_set: Vec<u32>,
    /// Detail records of every cell in `load_set`.
    pub records: Vec<DetailRecord>,
}

/// Grow a ball of cells around `point` until its aggregate reaches `target`,
/// then load one ring beyond it so a circle centred at the point can spill
/// over the counted area.
pub fn expand(index: &GridIndex, src: &dyn BlobSource, point: Point<f64>, target: u64, config: &SearchConfig) -> Result<Expansion> {
    let start = index.locate_cell(point)?;
    let value = |positions: &[usize]| positions.iter().map(|&p| index.cells()[p].value).sum::<f64>();

    let mut rings = index.rings(start);
    let mut counted_positions = rings.next().unwrap_or_default();
    let mut ahead = rings.next().unwrap_or_default();
    let mut counted = value(&counted_positions);
    let mut k = 0;

    while counted < target as f64 {
        if ahead.is_empty() || k >= config.max_expansions {
            return Err(Error::UnreachableTarget { target, reached: counted.round() as u64 });
        }
        counted += value(&ahead);
        counted_positions.append(&mut ahead);
        ahead = rings.next().unwrap_or_default();
        k += 1;
    }

    let mut load_positions = counted_positions.iter().chain(&ahead).copied().collect::<Vec<_>>();
    load_positions.sort_unstable();

    let mut records = Vec::new();
    for &position in &load_positions {
        records.extend(index.load_details(src, position)?);
    }

    let ids = |positions: &[usize]| {
        let mut ids = positions.iter().map(|&p| index.cells()[p].id).collect::<Vec<_>>();
        ids.sort_unstable();
        ids
    };
    debug!("[search] expanded {k} rings: counted {counted:.1} over {} cells, loading {}", counted_positions.len(), load_positions.len());

    Ok(Expansion {
        rings: k,
        counted,
        count_set: ids(&counted_positions),
        load_set: ids(&load_positions),
        records,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Coord, MultiPolygon, Rect};

    use crate::config::GridSpec;
    use crate::pack::MemStore;
    use crate::tiling::{SourceFeature, TileIndexBuilder};

    fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![Rect::new(Coord { x: x0, y: y0 }, Coord { x: x1, y: y1 }).to_polygon()])
    }

    /// A 1x5 strip of unit cells, each holding 10.
    fn strip() -> (GridIndex, MemStore) {
        let features = (0..5)
            .map(|c| SourceFeature::new(format!("t{c}"), rect(c as f64, 0.0, c as f64 + 1.0, 1.0), 10.0))
            .collect();
        let built = TileIndexBuilder::new(rect(0.0, 0.0, 5.0, 1.0), GridSpec::new(1, 5), "tracts")
            .build(features)
            .unwrap();
        let mut store = MemStore::new();
        built.write(&mut store).unwrap();
        (built.to_index().unwrap(), store)
    }

    #[test]
    fn single_cell_suffices_for_small_targets() {
        let (index, store) = strip();
        let found = expand(&index, &store, Point::new(2.5, 0.5), 5, &SearchConfig::default()).unwrap();
        assert_eq!(found.rings, 0);
        assert_eq!(found.count_set, vec![2]);
        assert_eq!(found.load_set, vec![1, 2, 3]);
        assert_eq!(found.records.len(), 3);
    }

    #[test]
    fn count_set_grows_one_ring_at_a_time() {
        let (index, store) = strip();
        let found = expand(&index, &store, Point::new(0.5, 0.5), 25, &SearchConfig::default()).unwrap();
        assert_eq!(found.rings, 2);
        assert_eq!(found.count_set, vec![0, 1, 2]);
        assert_eq!(found.load_set, vec![0, 1, 2, 3]);
        assert!((found.counted - 30.0).abs() < 1e-9);
    }

    #[test]
    fn load_set_contains_count_set() {
        let (index, store) = strip();
        for target in [1, 10, 11, 30, 45] {
            let found = expand(&index, &store, Point::new(2.2, 0.3), target, &SearchConfig::default()).unwrap();
            assert!(found.count_set.iter().all(|id| found.load_set.contains(id)));
            assert!(found.counted >= target as f64);
        }
    }

    #[test]
    fn exhausting_the_graph_is_unreachable() {
        let (index, store) = strip();
        let err = expand(&index, &store, Point::new(0.5, 0.5), 51, &SearchConfig::default()).unwrap_err();
        assert!(matches!(err, Error::UnreachableTarget { target: 51, reached: 50 }));
    }

    #[test]
    fn expansion_cap_is_enforced() {
        let (index, store) = strip();
        let config = SearchConfig { max_expansions: 1, ..SearchConfig::default() };
        let err = expand(&index, &store, Point::new(0.5, 0.5), 25, &config).unwrap_err();
        assert!(matches!(err, Error::UnreachableTarget { reached: 20, .. }));
    }
}
