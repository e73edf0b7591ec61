use anyhow::{bail, Context, Result};
use geo::{Area, BooleanOps, BoundingRect, Intersects, MultiPolygon};
use log::{debug, info, warn};
use rayon::prelude::*;
use rstar::RTree;
use smallvec::SmallVec;

use crate::{
    config::GridSpec,
    geom::{envelope_of, repair, BoundingBox, Geometries},
    pack::{write_records, BlobSink},
    tiling::{
        cell::{cell_key, index_key},
        grid::Grid,
        index::IndexFile,
        DetailRecord, GridCell, GridIndex, SourceFeature,
    },
};

/// Relative tolerance under which a clipped rectangle counts as unclipped.
const FULL_CELL_EPSILON: f64 = 1e-9;

/// Offline construction of a grid tiling over a set of valued polygons.
#[derive(Debug, Clone)]
pub struct TileIndexBuilder {
    extent: MultiPolygon<f64>,
    spec: GridSpec,
    prefix: String,
    compress: bool,
}

/// The output of a build: surviving cells (sorted by id) and the detail
/// records of each cell, in the same order.
#[derive(Debug, Clone)]
pub struct BuiltTiling {
    pub extent: MultiPolygon<f64>,
    pub spec: GridSpec,
    pub prefix: String,
    pub cells: Vec<GridCell>,
    pub details: Vec<Vec<DetailRecord>>,
    compress: bool,
}

impl TileIndexBuilder {
    /// A builder over `extent` that stores its blobs under `prefix`.
    pub fn new(extent: MultiPolygon<f64>, spec: GridSpec, prefix: impl Into<String>) -> Self {
        Self { extent, spec, prefix: prefix.into(), compress: true }
    }

    /// Gzip detail blobs (on by default).
    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    pub fn build(&self, features: Vec<SourceFeature>) -> Result<BuiltTiling> {
        let extent = repair(&self.extent);
        let bounds = extent.bounding_rect()
            .context("Extent polygon is empty")?;
        let grid = Grid::new(bounds, self.spec);

        let sources = prepare_sources(features)?;
        info!("[tiling] {}: {} sources over a {}x{} grid", self.prefix, sources.len(), self.spec.rows, self.spec.cols);

        let slots = grid.slots().collect::<Vec<_>>();
        let mut built = slots.par_iter()
            .filter_map(|&(row, col)| build_cell(&grid, &extent, &sources, row, col))
            .collect::<Vec<_>>();
        built.sort_by_key(|(cell, _)| cell.id);

        let (mut cells, details): (Vec<_>, Vec<_>) = built.into_iter().unzip();
        link_neighbors(&mut cells);
        for cell in &mut cells {
            cell.key = cell_key(&self.prefix, cell.id);
        }

        info!("[tiling] {}: kept {} of {} cells", self.prefix, cells.len(), slots.len());
        Ok(BuiltTiling {
            extent,
            spec: self.spec,
            prefix: self.prefix.clone(),
            cells,
            details,
            compress: self.compress,
        })
    }
}

/// Repair source polygons and drop the ones left without area.
fn prepare_sources(features: Vec<SourceFeature>) -> Result<Geometries> {
    if let Some(bad) = features.iter().find(|f| !(f.value.is_finite() && f.value >= 0.0)) {
        bail!("Source {} has invalid value {}", bad.id, bad.value);
    }

    let repaired = features.into_par_iter()
        .map(|feature| SourceFeature { geometry: repair(&feature.geometry), ..feature })
        .collect::<Vec<_>>();

    let (mut ids, mut shapes, mut values) = (Vec::new(), Vec::new(), Vec::new());
    for feature in repaired {
        if feature.geometry.unsigned_area() <= 0.0 {
            warn!("[tiling] skipping source {} with zero area", feature.id);
            continue;
        }
        ids.push(feature.id);
        shapes.push(feature.geometry);
        values.push(feature.value);
    }

    Ok(Geometries::new(ids, shapes, values))
}

/// Clip one grid slot to the extent and apportion every overlapping source.
/// Returns `None` for slots with no positive-area piece.
fn build_cell(grid: &Grid, extent: &MultiPolygon<f64>, sources: &Geometries, row: u32, col: u32) -> Option<(GridCell, Vec<DetailRecord>)> {
    let rect = grid.rect(row, col);
    let rect_area = rect.unsigned_area();
    let rect_shape = MultiPolygon::new(vec![rect.to_polygon()]);

    if !extent.intersects(&rect_shape) { return None }
    let clipped = extent.intersection(&rect_shape);
    let clipped_area = clipped.unsigned_area();
    if clipped_area <= 0.0 { return None }

    let geometry = if (rect_area - clipped_area).abs() <= FULL_CELL_EPSILON * rect_area { rect_shape } else { clipped };

    let records = sources.pieces_within(&geometry).into_iter()
        .map(|(i, piece)| DetailRecord {
            id: sources.ids()[i].clone(),
            geometry: piece.geometry,
            value: sources.values()[i] * piece.ratio,
        })
        .collect::<Vec<_>>();
    if records.is_empty() { return None }

    let id = grid.spec().cell_id(row, col);
    debug!("[tiling] cell {id} ({row}, {col}): {} pieces", records.len());

    let cell = GridCell {
        id,
        row,
        col,
        geometry,
        neighbors: SmallVec::new(),
        neighbor_count: 0,
        value: records.iter().map(|r| r.value).sum(),
        key: String::new(),
    };
    Some((cell, records))
}

/// Two surviving cells are neighbors iff their geometries are not disjoint.
fn link_neighbors(cells: &mut [GridCell]) {
    let rtree = RTree::bulk_load(
        cells.iter().enumerate()
            .filter_map(|(i, cell)| cell.geometry.bounding_rect().map(|rect| BoundingBox::new(i, rect)))
            .collect()
    );

    let neighbors = cells.par_iter().enumerate()
        .map(|(i, cell)| {
            let Some(rect) = cell.geometry.bounding_rect() else { return SmallVec::new() };
            let mut ids = rtree.locate_in_envelope_intersecting(&envelope_of(&rect))
                .map(|bbox| bbox.idx())
                .filter(|&j| j != i && cell.geometry.intersects(&cells[j].geometry))
                .map(|j| cells[j].id)
                .collect::<SmallVec<[u32; 8]>>();
            ids.sort_unstable();
            ids
        })
        .collect::<Vec<_>>();

    for (cell, nbrs) in cells.iter_mut().zip(neighbors) {
        cell.neighbor_count = nbrs.len();
        cell.neighbors = nbrs;
    }
}

impl BuiltTiling {
    /// Persist `{prefix}/index.json` and one detail blob per cell.
    pub fn write(&self, sink: &mut dyn BlobSink) -> Result<()> {
        for (cell, records) in self.cells.iter().zip(&self.details) {
            let bytes = write_records(records, self.compress)
                .with_context(|| format!("Failed to encode cell {}", cell.id))?;
            sink.put(&cell.key, &bytes)?;
        }

        let file = IndexFile {
            extent: self.extent.clone(),
            grid: self.spec,
            cells: self.cells.clone(),
        };
        sink.put(&index_key(&self.prefix), &serde_json::to_vec(&file)?)
            .with_context(|| format!("Failed to write index for {}", self.prefix))?;

        info!("[tiling] {}: wrote {} cell blobs", self.prefix, self.cells.len());
        Ok(())
    }

    /// Sum of all cell values.
    pub fn total(&self) -> f64 {
        self.cells.iter().map(|cell| cell.value).sum()
    }

    /// An in-memory index over the built cells.
    pub fn to_index(&self) -> crate::Result<GridIndex> {
        GridIndex::from_cells(self.extent.clone(), self.spec, self.cells.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Coord, Rect};

    use crate::pack::{read_records, BlobSource, MemStore};

    fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![Rect::new(Coord { x: x0, y: y0 }, Coord { x: x1, y: y1 }).to_polygon()])
    }

    /// A 4x4 extent tiled 2x2, with a source straddling the centre.
    fn build() -> BuiltTiling {
        let features = vec![
            SourceFeature::new("centre", rect(1.0, 1.0, 3.0, 3.0), 400.0),
            SourceFeature::new("corner", rect(0.0, 0.0, 1.0, 1.0), 10.0),
        ];
        TileIndexBuilder::new(rect(0.0, 0.0, 4.0, 4.0), GridSpec::new(2, 2), "tracts")
            .build(features)
            .unwrap()
    }

    #[test]
    fn centre_source_is_split_evenly() {
        let built = build();
        assert_eq!(built.cells.len(), 4);
        let values = built.cells.iter().map(|c| c.value).collect::<Vec<_>>();
        assert!((values[0] - 110.0).abs() < 1e-9);
        for v in &values[1..] {
            assert!((v - 100.0).abs() < 1e-9);
        }
        assert!((built.total() - 410.0).abs() < 1e-9);
    }

    #[test]
    fn every_cell_touches_every_other_in_a_2x2_grid() {
        let built = build();
        for cell in &built.cells {
            assert_eq!(cell.neighbor_count, 3);
            assert!(!cell.neighbors.contains(&cell.id));
            assert!(cell.neighbors.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn empty_slots_are_dropped() {
        let features = vec![SourceFeature::new("corner", rect(0.0, 0.0, 1.0, 1.0), 10.0)];
        let built = TileIndexBuilder::new(rect(0.0, 0.0, 4.0, 4.0), GridSpec::new(2, 2), "tracts")
            .build(features)
            .unwrap();
        assert_eq!(built.cells.len(), 1);
        assert_eq!(built.cells[0].id, 0);
        assert!(built.cells[0].neighbors.is_empty());
    }

    #[test]
    fn cells_are_clipped_to_the_extent() {
        // L-shaped extent: the upper-right slot is outside
        let extent = MultiPolygon::new(vec![
            rect(0.0, 0.0, 4.0, 2.0).0[0].clone(),
            rect(0.0, 2.0, 2.0, 4.0).0[0].clone(),
        ]);
        let features = vec![SourceFeature::new("all", rect(0.0, 0.0, 4.0, 4.0), 160.0)];
        let built = TileIndexBuilder::new(extent, GridSpec::new(2, 2), "tracts")
            .build(features)
            .unwrap();
        assert_eq!(built.cells.iter().map(|c| c.id).collect::<Vec<_>>(), vec![0, 1, 2]);
        for cell in &built.cells {
            assert!((cell.value - 40.0).abs() < 1e-9);
        }
    }

    #[test]
    fn rebuilding_is_deterministic() {
        let (a, b) = (build(), build());
        assert_eq!(a.cells, b.cells);
        assert_eq!(a.details, b.details);
    }

    #[test]
    fn degenerate_sources_are_skipped() {
        let features = vec![
            SourceFeature::new("line", rect(1.0, 1.0, 1.0, 3.0), 50.0),
            SourceFeature::new("corner", rect(0.0, 0.0, 1.0, 1.0), 10.0),
        ];
        let built = TileIndexBuilder::new(rect(0.0, 0.0, 4.0, 4.0), GridSpec::new(2, 2), "tracts")
            .build(features)
            .unwrap();
        assert!((built.total() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn negative_values_are_rejected() {
        let features = vec![SourceFeature::new("bad", rect(0.0, 0.0, 1.0, 1.0), -1.0)];
        let result = TileIndexBuilder::new(rect(0.0, 0.0, 4.0, 4.0), GridSpec::new(2, 2), "tracts")
            .build(features);
        assert!(result.is_err());
    }

    #[test]
    fn write_persists_index_and_blobs() {
        let built = build();
        let mut store = MemStore::new();
        built.write(&mut store).unwrap();

        assert!(store.has("tracts/index.json"));
        assert_eq!(store.len(), 5);
        let records = read_records(&store.get("tracts/cells/cell-3.bin").unwrap()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "centre");
        assert!((records[0].value - 100.0).abs() < 1e-9);
    }
}
