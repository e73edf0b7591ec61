//! Well-known places (state capitals, monuments) shown next to a query result,
//! each with its own circle for the current target.

use std::path::Path;

use anyhow::Context;
use geo::Point;
use log::info;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    common::write_atomic,
    config::SearchConfig,
    error::Result,
    pack::{point_xy, BlobSink, BlobSource},
    search::{find_radius, SearchResult},
    tiling::GridIndex,
};

pub(crate) const LANDMARKS_KEY: &str = "landmarks.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    /// Code of the municipality the landmark lies in.
    pub code: String,
    pub name: String,
    pub region: String,
    pub display_text: String,
    #[serde(default)]
    pub complement: String,
    /// Location as `[lon, lat]`.
    #[serde(with = "point_xy")]
    pub point: Point<f64>,
    /// Circle for the target the landmarks were last computed with.
    #[serde(default)]
    pub radius: Option<SearchResult>,
}

/// Compute the circle of every landmark for `target`.
pub fn precompute(landmarks: Vec<Landmark>, tracts: &GridIndex, src: &dyn BlobSource, target: u64, config: &SearchConfig) -> Result<Vec<Landmark>> {
    let landmarks = landmarks.into_par_iter()
        .map(|landmark| {
            let outcome = find_radius(tracts, src, landmark.point, target, config)?;
            info!("[landmark] {} ({}): radius {:.4}", landmark.name, landmark.code, outcome.radius);
            Ok(Landmark { radius: Some(outcome.result), ..landmark })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(landmarks)
}

/// Landmarks stored with a dataset. A dataset without landmarks has none.
pub fn load(src: &dyn BlobSource) -> Result<Vec<Landmark>> {
    if !src.has(LANDMARKS_KEY) { return Ok(Vec::new()) }
    let bytes = src.get(LANDMARKS_KEY)?;
    let landmarks = serde_json::from_slice(&bytes)
        .context("Failed to parse landmarks.json")?;
    Ok(landmarks)
}

pub fn save(landmarks: &[Landmark], sink: &mut dyn BlobSink) -> anyhow::Result<()> {
    sink.put(LANDMARKS_KEY, &serde_json::to_vec_pretty(landmarks)?)
}

/// Replace `{snapshot}/landmarks.json` in place.
pub fn save_atomic(landmarks: &[Landmark], snapshot: &Path) -> anyhow::Result<()> {
    write_atomic(&snapshot.join(LANDMARKS_KEY), &serde_json::to_vec_pretty(landmarks)?)
}
