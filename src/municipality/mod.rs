//! Municipalities: which one contains a point, and which small ones are near it.
mod select;

pub use select::{NearestOnly, NearestThenRandom, SelectionPolicy};

use ahash::AHashMap;
use anyhow::{ensure, Context};
use geo::{BoundingRect, Centroid, Contains, Distance, Euclidean, Intersects, MultiPolygon, Point};
use log::warn;
use rstar::{primitives::GeomWithData, RTree};
use serde::{Deserialize, Serialize};

use crate::{
    config::SearchConfig,
    error::{Error, Result},
    pack::{point_xy, wkb_hex, BlobSink, BlobSource},
    tiling::{GridIndex, SourceFeature},
};

pub(crate) const PREFIX: &str = "municipalities";
pub(crate) const RECORDS_KEY: &str = "municipalities/records.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Municipality {
    pub code: String,
    pub name: String,
    pub region: String,
    pub population: u64,
    #[serde(with = "wkb_hex")]
    pub geometry: MultiPolygon<f64>,
    #[serde(with = "point_xy")]
    pub centroid: Point<f64>,
    /// `[[min_x, min_y], [max_x, max_y]]`
    pub bbox: [[f64; 2]; 2],
}

impl Municipality {
    /// Derive the centroid and bounding box from `geometry`.
    pub fn new(code: impl Into<String>, name: impl Into<String>, region: impl Into<String>, population: u64, geometry: MultiPolygon<f64>) -> anyhow::Result<Self> {
        let code = code.into();
        let centroid = geometry.centroid()
            .with_context(|| format!("Municipality {code} has an empty geometry"))?;
        let rect = geometry.bounding_rect()
            .with_context(|| format!("Municipality {code} has an empty geometry"))?;
        Ok(Self {
            code,
            name: name.into(),
            region: region.into(),
            population,
            geometry,
            centroid,
            bbox: [rect.min().into(), rect.max().into()],
        })
    }

    /// A municipality no larger than the target would be emptied by it.
    #[inline] pub fn would_vanish(&self, target: u64) -> bool { self.population <= target }
}

/// Municipality outlines as tiling sources, keyed by code and valued by
/// population, for the coarse grid under `municipalities/`.
pub fn features(municipalities: &[Municipality]) -> Vec<SourceFeature> {
    municipalities.iter()
        .map(|m| SourceFeature::new(m.code.clone(), m.geometry.clone(), m.population as f64))
        .collect()
}

pub fn save(municipalities: &[Municipality], sink: &mut dyn BlobSink) -> anyhow::Result<()> {
    sink.put(RECORDS_KEY, &serde_json::to_vec(municipalities)?)
}

/// Municipality lookups over the coarse grid and a centroid R-tree.
#[derive(Debug)]
pub struct MunicipalityLocator {
    records: Vec<Municipality>,
    by_code: AHashMap<String, usize>,
    centroids: RTree<GeomWithData<[f64; 2], usize>>,
    grid: GridIndex,
    max_fallback_distance: f64,
}

impl MunicipalityLocator {
    /// Build a locator, rejecting duplicate codes.
    pub fn new(records: Vec<Municipality>, grid: GridIndex, config: &SearchConfig) -> Result<Self> {
        let mut by_code = AHashMap::with_capacity(records.len());
        for (i, m) in records.iter().enumerate() {
            if by_code.insert(m.code.clone(), i).is_some() {
                return Err(Error::DataIntegrity(format!("duplicate municipality code {}", m.code)));
            }
        }

        let centroids = RTree::bulk_load(
            records.iter().enumerate()
                .map(|(i, m)| GeomWithData::new([m.centroid.x(), m.centroid.y()], i))
                .collect()
        );

        Ok(Self { records, by_code, centroids, grid, max_fallback_distance: config.max_fallback_distance })
    }

    /// Read `municipalities/records.json` and the coarse grid index.
    pub fn load(src: &dyn BlobSource, config: &SearchConfig) -> Result<Self> {
        let bytes = src.get(RECORDS_KEY)?;
        let records = serde_json::from_slice(&bytes)
            .context("Failed to parse municipalities/records.json")?;
        let grid = GridIndex::load(src, PREFIX)?;
        Self::new(records, grid, config)
    }

    #[inline] pub fn len(&self) -> usize { self.records.len() }

    #[inline] pub fn is_empty(&self) -> bool { self.records.is_empty() }

    #[inline] pub fn records(&self) -> &[Municipality] { &self.records }

    pub fn get(&self, code: &str) -> Option<&Municipality> {
        self.by_code.get(code).map(|&i| &self.records[i])
    }

    /// The municipality whose outline contains `point`, falling back to the
    /// nearest centroid where the outlines leave gaps. Points outside the
    /// extent fall back only within `max_fallback_distance`.
    pub fn containing(&self, src: &dyn BlobSource, point: Point<f64>) -> Result<&Municipality> {
        let position = match self.grid.locate_cell(point) {
            Ok(position) => position,
            Err(Error::OutOfCoverage { .. }) => return self.nearest_fallback(point, self.max_fallback_distance),
            Err(err) => return Err(err),
        };

        // pieces are cut along cell edges, so test them boundary-inclusive
        let mut codes = self.grid.load_details(src, position)?.into_iter()
            .filter(|piece| piece.geometry.intersects(&point))
            .map(|piece| piece.id)
            .collect::<Vec<_>>();
        codes.sort_unstable();
        codes.dedup();
        if codes.len() > 1 {
            codes.retain(|code| self.get(code).is_some_and(|m| m.geometry.contains(&point)));
        }

        match codes.as_slice() {
            [] => self.nearest_fallback(point, f64::INFINITY),
            [code] => self.get(code).ok_or_else(|| {
                Error::DataIntegrity(format!("coarse grid references unknown municipality {code}"))
            }),
            many => Err(Error::DataIntegrity(format!(
                "({}, {}) lies in several municipalities: {}", point.x(), point.y(), many.join(", ")
            ))),
        }
    }

    fn nearest_fallback(&self, point: Point<f64>, max_distance: f64) -> Result<&Municipality> {
        let nearest = self.centroids.nearest_neighbor(&[point.x(), point.y()])
            .map(|entry| &self.records[entry.data])
            .ok_or_else(|| Error::out_of_coverage(point))?;

        let distance = Euclidean.distance(point, nearest.centroid);
        if distance > max_distance {
            return Err(Error::out_of_coverage(point));
        }
        warn!("[municipality] ({}, {}) is in no outline; using nearest centroid {} at {distance:.4}", point.x(), point.y(), nearest.code);
        Ok(nearest)
    }

    /// The municipality with population at most `target` whose centroid is
    /// nearest to `point`, skipping `exclude`.
    pub fn nearest_below(&self, point: Point<f64>, target: u64, exclude: Option<&str>) -> Option<&Municipality> {
        self.centroids.nearest_neighbor_iter(&[point.x(), point.y()])
            .map(|entry| &self.records[entry.data])
            .find(|m| m.population <= target && Some(m.code.as_str()) != exclude)
    }
}

/// Check that every municipality code is unique and non-empty.
pub(crate) fn validate(municipalities: &[Municipality]) -> anyhow::Result<()> {
    let mut seen = ahash::AHashSet::with_capacity(municipalities.len());
    for m in municipalities {
        ensure!(!m.code.is_empty(), "Municipality {:?} has an empty code", m.name);
        ensure!(seen.insert(m.code.as_str()), "Duplicate municipality code {}", m.code);
    }
    Ok(())
}
