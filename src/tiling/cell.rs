use geo::MultiPolygon;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// A valued polygon fed into the tile builder (a census tract, a municipality).
#[derive(Debug, Clone)]
pub struct SourceFeature {
    pub id: String,
    pub geometry: MultiPolygon<f64>,
    pub value: f64,
}

impl SourceFeature {
    pub fn new(id: impl Into<String>, geometry: MultiPolygon<f64>, value: f64) -> Self {
        Self { id: id.into(), geometry, value }
    }
}

/// The piece of one source feature that falls inside one grid cell, with the
/// share of its value apportioned by area.
#[derive(Debug, Clone, PartialEq)]
pub struct DetailRecord {
    pub id: String,
    pub geometry: MultiPolygon<f64>,
    pub value: f64,
}

/// One surviving slot of a tiling, as persisted in `index.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridCell {
    pub id: u32,
    pub row: u32,
    pub col: u32,
    /// Grid rectangle clipped to the extent.
    #[serde(with = "crate::pack::wkb_hex")]
    pub geometry: MultiPolygon<f64>,
    /// Ids of cells whose geometry is not disjoint from this one, ascending.
    pub neighbors: SmallVec<[u32; 8]>,
    pub neighbor_count: usize,
    /// Sum of the apportioned values of the cell's detail records.
    pub value: f64,
    /// Blob key of the cell's detail records.
    pub key: String,
}

/// Blob key for the detail records of cell `id` under `prefix`.
pub(crate) fn cell_key(prefix: &str, id: u32) -> String {
    format!("{prefix}/cells/cell-{id}.bin")
}

/// Blob key for the index of the tiling under `prefix`.
pub(crate) fn index_key(prefix: &str) -> String {
    format!("{prefix}/index.json")
}
