//! The target value queries are run against, cached as `count.json`.
//!
//! The count is refreshed independently of the dataset, so it is written
//! with an atomic file replace and is not part of the manifest.

use std::{path::Path, str::FromStr};

use anyhow::{anyhow, ensure, Context, Result};
use serde::{Deserialize, Serialize};

use crate::{common::write_atomic, pack::{BlobSink, BlobSource}};

pub(crate) const COUNT_KEY: &str = "count.json";

/// Which total the target is taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Measure {
    #[default]
    Deaths,
    Cases,
}

impl FromStr for Measure {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "deaths" => Ok(Self::Deaths),
            "cases" => Ok(Self::Cases),
            other => Err(anyhow!("Unknown measure: {other}")),
        }
    }
}

/// One row of a per-place case report.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseRow {
    pub date: String,
    pub place_type: String,
    /// Whether this is the latest report for its place.
    pub is_last: bool,
    pub deaths: u64,
    pub confirmed: u64,
    pub estimated_population: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetCount {
    /// Date of the latest report included.
    pub time: String,
    pub deaths: u64,
    pub cases: u64,
    /// Number of cities with fewer residents than `cases`.
    pub vanishing_cities: u64,
}

impl TargetCount {
    /// Sum the latest city-level reports.
    pub fn from_case_rows(rows: &[CaseRow]) -> Result<Self> {
        let latest = rows.iter()
            .filter(|row| row.is_last && row.place_type == "city")
            .collect::<Vec<_>>();
        ensure!(!latest.is_empty(), "No latest city-level rows in case report");

        let deaths = latest.iter().map(|row| row.deaths).sum::<u64>();
        let cases = latest.iter().map(|row| row.confirmed).sum::<u64>();
        let vanishing_cities = latest.iter()
            .filter(|row| row.estimated_population.is_some_and(|p| p < cases))
            .count() as u64;
        let time = latest.iter()
            .map(|row| row.date.as_str())
            .max()
            .unwrap_or_default()
            .to_string();

        Ok(Self { time, deaths, cases, vanishing_cities })
    }

    #[inline]
    pub fn get(&self, measure: Measure) -> u64 {
        match measure {
            Measure::Deaths => self.deaths,
            Measure::Cases => self.cases,
        }
    }

    pub fn load(src: &dyn BlobSource) -> Result<Self> {
        let bytes = src.get(COUNT_KEY)?;
        serde_json::from_slice(&bytes).context("Failed to parse count.json")
    }

    pub fn save(&self, sink: &mut dyn BlobSink) -> Result<()> {
        sink.put(COUNT_KEY, &serde_json::to_vec_pretty(self)?)
    }

    /// Replace `{snapshot}/count.json` so readers never see a partial file.
    pub fn save_atomic(&self, snapshot: &Path) -> Result<()> {
        write_atomic(&snapshot.join(COUNT_KEY), &serde_json::to_vec_pretty(self)?)?;
        log::info!("[count] {} deaths, {} cases as of {}", self.deaths, self.cases, self.time);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pack::{DiskStore, MemStore};

    fn row(date: &str, place_type: &str, is_last: bool, deaths: u64, confirmed: u64, population: Option<u64>) -> CaseRow {
        CaseRow {
            date: date.into(),
            place_type: place_type.into(),
            is_last,
            deaths,
            confirmed,
            estimated_population: population,
        }
    }

    fn report() -> Vec<CaseRow> {
        vec![
            row("2020-06-01", "city", false, 90, 900, Some(12_000_000)),
            row("2020-06-02", "city", true, 100, 1_000, Some(12_000_000)),
            row("2020-06-02", "city", true, 7, 70, Some(800)),
            row("2020-06-01", "city", true, 3, 30, Some(2_000)),
            row("2020-06-02", "state", true, 500, 5_000, Some(40_000_000)),
            row("2020-06-02", "city", true, 0, 0, None),
        ]
    }

    #[test]
    fn only_latest_city_rows_count() {
        let count = TargetCount::from_case_rows(&report()).unwrap();
        assert_eq!(count.deaths, 110);
        assert_eq!(count.cases, 1_100);
        assert_eq!(count.vanishing_cities, 1);
        assert_eq!(count.time, "2020-06-02");
        assert_eq!(count.get(Measure::Deaths), 110);
        assert_eq!(count.get(Measure::Cases), 1_100);
    }

    #[test]
    fn empty_reports_are_rejected() {
        assert!(TargetCount::from_case_rows(&[]).is_err());
        assert!(TargetCount::from_case_rows(&[row("2020-06-02", "state", true, 1, 1, None)]).is_err());
    }

    #[test]
    fn measures_parse() {
        assert_eq!("deaths".parse::<Measure>().unwrap(), Measure::Deaths);
        assert_eq!(" Cases".parse::<Measure>().unwrap(), Measure::Cases);
        assert!("recovered".parse::<Measure>().is_err());
    }

    #[test]
    fn store_round_trip() {
        let count = TargetCount::from_case_rows(&report()).unwrap();
        let mut store = MemStore::new();
        count.save(&mut store).unwrap();
        assert_eq!(TargetCount::load(&store).unwrap(), count);
    }

    #[test]
    fn atomic_save_replaces_previous_count() {
        let dir = tempfile::tempdir().unwrap();
        let old = TargetCount { time: "2020-05-01".into(), deaths: 1, cases: 2, vanishing_cities: 0 };
        old.save_atomic(dir.path()).unwrap();
        let new = TargetCount::from_case_rows(&report()).unwrap();
        new.save_atomic(dir.path()).unwrap();

        assert_eq!(TargetCount::load(&DiskStore::new(dir.path())).unwrap(), new);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
