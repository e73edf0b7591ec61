use ahash::AHashMap;
use anyhow::Context;
use geo::{BoundingRect, Coord, Intersects, MultiPolygon, Point, Rect};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    config::GridSpec,
    error::{Error, Result},
    graph::{Graph, Rings},
    pack::{read_records, wkb_hex, BlobSource},
    tiling::{cell::index_key, grid::Grid, DetailRecord, GridCell},
};

/// Slack for the boundary test in `locate_cell`, absorbing the rounding of
/// clipped cell edges.
const LOCATE_SLACK: f64 = 1e-9;

/// On-disk layout of `{prefix}/index.json`.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct IndexFile {
    #[serde(with = "wkb_hex")]
    pub(crate) extent: MultiPolygon<f64>,
    pub(crate) grid: GridSpec,
    pub(crate) cells: Vec<GridCell>,
}

/// A loaded tiling: the cells, a slot lookup, and the cell adjacency graph.
#[derive(Debug)]
pub struct GridIndex {
    extent: MultiPolygon<f64>,
    grid: Grid,
    cells: Vec<GridCell>,
    slots: AHashMap<(u32, u32), usize>,
    positions: AHashMap<u32, usize>,
    graph: Graph,
}

impl GridIndex {
    /// Read `{prefix}/index.json` from a blob source.
    pub fn load(src: &dyn BlobSource, prefix: &str) -> Result<Self> {
        let key = index_key(prefix);
        let bytes = src.get(&key)?;
        let file: IndexFile = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse {key}"))?;
        Self::from_cells(file.extent, file.grid, file.cells)
    }

    /// Assemble an index from cells, checking slot uniqueness and adjacency.
    pub fn from_cells(extent: MultiPolygon<f64>, spec: GridSpec, cells: Vec<GridCell>) -> Result<Self> {
        if spec.rows == 0 || spec.cols == 0 {
            return Err(Error::DataIntegrity(format!("grid of {} x {} has no slots", spec.rows, spec.cols)));
        }
        let bounds = extent.bounding_rect()
            .ok_or_else(|| Error::DataIntegrity("index extent is empty".into()))?;
        let grid = Grid::new(bounds, spec);

        let mut slots = AHashMap::with_capacity(cells.len());
        let mut positions = AHashMap::with_capacity(cells.len());
        for (i, cell) in cells.iter().enumerate() {
            if cell.row >= spec.rows || cell.col >= spec.cols {
                return Err(Error::DataIntegrity(format!("cell {} has slot ({}, {}) outside the grid", cell.id, cell.row, cell.col)));
            }
            if let Some(other) = slots.insert((cell.row, cell.col), i) {
                return Err(Error::DataIntegrity(format!(
                    "cells {} and {} both claim slot ({}, {})", cells[other].id, cell.id, cell.row, cell.col
                )));
            }
            if positions.insert(cell.id, i).is_some() {
                return Err(Error::DataIntegrity(format!("duplicate cell id {}", cell.id)));
            }
        }

        let adjacency = cells.iter()
            .map(|cell| cell.neighbors.iter()
                .map(|nbr| positions.get(nbr).map(|&j| j as u32).ok_or_else(|| {
                    Error::DataIntegrity(format!("cell {} lists unknown neighbor {nbr}", cell.id))
                }))
                .collect::<Result<Vec<_>>>())
            .collect::<Result<Vec<_>>>()?;

        let graph = Graph::new(&adjacency);
        if let Some(cell) = cells.iter().enumerate().find_map(|(i, cell)| (graph.degree(i) != cell.neighbor_count).then_some(cell)) {
            return Err(Error::DataIntegrity(format!(
                "cell {} lists {} neighbors but records a count of {}", cell.id, cell.neighbors.len(), cell.neighbor_count
            )));
        }
        debug!("[tiling] index of {} cells with {} adjacency entries", cells.len(), graph.edge_count());

        Ok(Self { extent, grid, cells, slots, positions, graph })
    }

    #[inline] pub fn len(&self) -> usize { self.cells.len() }

    #[inline] pub fn is_empty(&self) -> bool { self.cells.is_empty() }

    #[inline] pub fn cells(&self) -> &[GridCell] { &self.cells }

    #[inline] pub fn spec(&self) -> GridSpec { self.grid.spec() }

    #[inline] pub fn extent(&self) -> &MultiPolygon<f64> { &self.extent }

    /// Position in `cells()` of the cell with the given id.
    pub fn position(&self, id: u32) -> Option<usize> {
        self.positions.get(&id).copied()
    }

    /// Breadth-first rings of cell positions around `position`.
    pub(crate) fn rings(&self, position: usize) -> Rings<'_> {
        self.graph.rings(position)
    }

    /// Position of the single cell containing `point`.
    ///
    /// Only points outside the extent are out of coverage. A point inside it
    /// whose slot has no cell, or whose cell does not cover it, means the
    /// index is inconsistent.
    pub fn locate_cell(&self, point: Point<f64>) -> Result<usize> {
        if !self.extent.intersects(&point) {
            return Err(Error::out_of_coverage(point));
        }
        let Some(slot) = self.grid.slot_of(point) else {
            return Err(Error::DataIntegrity(format!(
                "({}, {}) is inside the extent but outside the grid", point.x(), point.y()
            )));
        };
        let Some(&position) = self.slots.get(&slot) else {
            return Err(Error::DataIntegrity(format!(
                "no cell registered for slot {slot:?} holding ({}, {})", point.x(), point.y()
            )));
        };

        let near = Rect::new(
            Coord { x: point.x() - LOCATE_SLACK, y: point.y() - LOCATE_SLACK },
            Coord { x: point.x() + LOCATE_SLACK, y: point.y() + LOCATE_SLACK },
        );
        let cell = &self.cells[position];
        if cell.geometry.intersects(&point) || cell.geometry.intersects(&near) {
            Ok(position)
        } else {
            Err(Error::DataIntegrity(format!(
                "cell {} registered for slot {slot:?} does not contain ({}, {})", cell.id, point.x(), point.y()
            )))
        }
    }

    /// Decode the detail records of the cell at `position`.
    pub fn load_details(&self, src: &dyn BlobSource, position: usize) -> Result<Vec<DetailRecord>> {
        let cell = &self.cells[position];
        let bytes = src.get(&cell.key)?;
        let records = read_records(&bytes)
            .with_context(|| format!("Failed to decode {}", cell.key))?;
        Ok(records)
    }
}
