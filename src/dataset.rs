//! A built dataset: tract tiling, municipality tiling, landmarks and count.
//!
//! A dataset directory holds versioned snapshots and a `CURRENT` pointer
//! naming the live one (see `pack::publish`). Layout of a snapshot:
//!
//! ```text
//! manifest.json
//! tracts/index.json            tracts/cells/cell-{id}.bin
//! municipalities/index.json    municipalities/cells/cell-{id}.bin
//! municipalities/records.json
//! landmarks.json               count.json
//! ```
//!
//! `landmarks.json` and `count.json` depend on the current target and are
//! refreshed in place inside the live snapshot, so the manifest does not
//! hash them.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context;
use geo::{MultiPolygon, Point};
use log::info;

use crate::{
    config::{BuildConfig, SearchConfig},
    count::{Measure, TargetCount, COUNT_KEY},
    error::{Error, Result},
    landmark::{self, Landmark},
    municipality::{self, Municipality, MunicipalityLocator},
    pack::{current_snapshot, publish, staging_dir, BlobSink, BlobSource, DiskStore, HashingSink, Manifest},
    search::{find_radius, RadiusOutcome},
    tiling::{GridIndex, SourceFeature, TileIndexBuilder},
};

pub(crate) const TRACTS_PREFIX: &str = "tracts";
pub(crate) const MANIFEST_VERSION: &str = "1";

/// Raw inputs of a dataset build.
#[derive(Debug, Clone)]
pub struct DatasetSources {
    /// National outline; the grids cover its bounding rectangle.
    pub extent: MultiPolygon<f64>,
    pub tracts: Vec<SourceFeature>,
    pub municipalities: Vec<Municipality>,
    pub landmarks: Vec<Landmark>,
    pub count: Option<TargetCount>,
}

/// Tile every layer and write the dataset blobs and manifest to `sink`.
pub fn build_dataset(sources: DatasetSources, config: &BuildConfig, sink: &mut dyn BlobSink) -> anyhow::Result<Manifest> {
    municipality::validate(&sources.municipalities)?;
    let tract_count = sources.tracts.len();

    let tracts = TileIndexBuilder::new(sources.extent.clone(), config.tracts, TRACTS_PREFIX)
        .with_compression(config.compress)
        .build(sources.tracts)?;
    let municipalities = TileIndexBuilder::new(sources.extent, config.municipalities, municipality::PREFIX)
        .with_compression(config.compress)
        .build(municipality::features(&sources.municipalities))?;

    let mut manifest = Manifest::new(&config.crs);
    {
        let mut hashing = HashingSink::new(sink);
        tracts.write(&mut hashing)?;
        municipalities.write(&mut hashing)?;
        municipality::save(&sources.municipalities, &mut hashing)?;
        manifest.files = std::mem::take(&mut hashing.files);
    }

    landmark::save(&sources.landmarks, sink)?;
    if let Some(count) = &sources.count {
        count.save(sink)?;
    }

    manifest.grids.insert(TRACTS_PREFIX.into(), config.tracts);
    manifest.grids.insert(municipality::PREFIX.into(), config.municipalities);
    manifest.counts.insert("tracts".into(), tract_count);
    manifest.counts.insert("tract_cells".into(), tracts.cells.len());
    manifest.counts.insert("municipalities".into(), sources.municipalities.len());
    manifest.counts.insert("municipality_cells".into(), municipalities.cells.len());
    manifest.counts.insert("landmarks".into(), sources.landmarks.len());
    manifest.write(sink)?;

    info!(
        "[dataset] built {} tract cells and {} municipality cells from {tract_count} tracts",
        tracts.cells.len(), municipalities.cells.len()
    );
    Ok(manifest)
}

/// Build into a staging directory under `dir` and publish it as the next
/// snapshot. Snapshots already open elsewhere stay on disk.
/// A count in the live snapshot is carried over unless `sources` has one.
pub fn build_dataset_dir(mut sources: DatasetSources, config: &BuildConfig, dir: &Path) -> anyhow::Result<Manifest> {
    if sources.count.is_none() {
        if let Ok(live) = current_snapshot(dir) {
            let previous = DiskStore::new(live);
            if previous.has(COUNT_KEY) {
                sources.count = Some(TargetCount::load(&previous).context("Failed to carry over count.json")?);
            }
        }
    }

    let staging = staging_dir(dir)?;
    let mut store = DiskStore::new(staging.path());
    let manifest = build_dataset(sources, config, &mut store)?;
    publish(staging, dir)?;
    Ok(manifest)
}

/// A dataset opened for queries. Immutable, and shareable across threads.
pub struct Dataset {
    src: Arc<dyn BlobSource>,
    manifest: Manifest,
    tracts: GridIndex,
    municipalities: MunicipalityLocator,
    landmarks: Vec<Landmark>,
    config: SearchConfig,
    snapshot: Option<PathBuf>,
}

impl Dataset {
    pub fn open(src: Arc<dyn BlobSource>, config: SearchConfig) -> Result<Self> {
        let manifest = Manifest::from_source(src.as_ref())?;
        if manifest.version != MANIFEST_VERSION {
            return Err(Error::DataIntegrity(format!("unsupported dataset version {}", manifest.version)));
        }

        let tracts = GridIndex::load(src.as_ref(), TRACTS_PREFIX)?;
        let municipalities = MunicipalityLocator::load(src.as_ref(), &config)?;
        let landmarks = landmark::load(src.as_ref())?;
        info!(
            "[dataset] opened {} tract cells, {} municipalities, {} landmarks",
            tracts.len(), municipalities.len(), landmarks.len()
        );

        Ok(Self { src, manifest, tracts, municipalities, landmarks, config, snapshot: None })
    }

    /// Open the live snapshot of a dataset directory. The handle stays on
    /// that snapshot when a rebuild publishes a newer one.
    pub fn open_dir(dir: &Path, config: SearchConfig) -> Result<Self> {
        let snapshot = current_snapshot(dir)?;
        let mut dataset = Self::open(Arc::new(DiskStore::new(&snapshot)), config)?;
        dataset.snapshot = Some(snapshot);
        Ok(dataset)
    }

    #[inline] pub fn manifest(&self) -> &Manifest { &self.manifest }

    #[inline] pub fn tracts(&self) -> &GridIndex { &self.tracts }

    #[inline] pub fn municipalities(&self) -> &MunicipalityLocator { &self.municipalities }

    #[inline] pub fn landmarks(&self) -> &[Landmark] { &self.landmarks }

    #[inline] pub fn config(&self) -> &SearchConfig { &self.config }

    #[inline] pub fn source(&self) -> &dyn BlobSource { self.src.as_ref() }

    /// Snapshot directory this handle reads, when opened with `open_dir`.
    #[inline] pub fn snapshot_dir(&self) -> Option<&Path> { self.snapshot.as_deref() }

    /// The cached count, re-read on every call since it is refreshed in place.
    pub fn count(&self) -> Result<Option<TargetCount>> {
        if !self.src.has(COUNT_KEY) { return Ok(None) }
        Ok(Some(TargetCount::load(self.src.as_ref())?))
    }

    /// Current target for `measure`, read from `count.json`.
    pub fn target(&self, measure: Measure) -> Result<u64> {
        Ok(TargetCount::load(self.src.as_ref())?.get(measure))
    }

    /// Quadrant expansion followed by the radius search.
    pub fn find_radius(&self, point: Point<f64>, target: u64) -> Result<RadiusOutcome> {
        find_radius(&self.tracts, self.src.as_ref(), point, target, &self.config)
    }

    /// Landmarks with their circles recomputed for `target`.
    pub fn precompute_landmarks(&self, target: u64) -> Result<Vec<Landmark>> {
        landmark::precompute(self.landmarks.clone(), &self.tracts, self.src.as_ref(), target, &self.config)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use geo::{Coord, Rect};

    use crate::config::GridSpec;
    use crate::pack::{validate_dataset, MemStore};

    fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![Rect::new(Coord { x: x0, y: y0 }, Coord { x: x1, y: y1 }).to_polygon()])
    }

    /// A 4 x 2 territory: a dense western city and a sparse eastern town,
    /// with a sliver along the north edge left out of both outlines.
    pub(crate) fn sources() -> DatasetSources {
        let tracts = (0..8)
            .flat_map(|c| (0..4).map(move |r| (r, c)))
            .map(|(r, c)| {
                let (x, y) = (c as f64 * 0.5, r as f64 * 0.5);
                let value = if c < 4 { 2_000.0 } else { 50.0 };
                SourceFeature::new(format!("t{r}{c}"), rect(x, y, x + 0.5, y + 0.5), value)
            })
            .collect();
        let municipalities = vec![
            Municipality::new("100", "Bigtown", "AA", 32_000, rect(0.0, 0.0, 2.0, 1.9)).unwrap(),
            Municipality::new("200", "Smallville", "BB", 800, rect(2.0, 0.0, 4.0, 1.9)).unwrap(),
        ];
        let landmark = |code: &str, x: f64, y: f64| Landmark {
            code: code.into(),
            name: format!("landmark {code}"),
            region: "AA".into(),
            display_text: String::new(),
            complement: String::new(),
            point: Point::new(x, y),
            radius: None,
        };
        DatasetSources {
            extent: rect(0.0, 0.0, 4.0, 2.0),
            tracts,
            municipalities,
            landmarks: vec![landmark("100", 1.0, 1.0), landmark("200", 3.0, 1.0)],
            count: Some(TargetCount { time: "2020-06-02".into(), deaths: 1_000, cases: 9_000, vanishing_cities: 1 }),
        }
    }

    pub(crate) fn config() -> BuildConfig {
        BuildConfig::default().with_grids(GridSpec::new(8, 16), GridSpec::new(2, 4))
    }

    pub(crate) fn open(sources: DatasetSources) -> Dataset {
        let mut store = MemStore::new();
        build_dataset(sources, &config(), &mut store).unwrap();
        Dataset::open(Arc::new(store), SearchConfig::default()).unwrap()
    }

    #[test]
    fn build_writes_a_valid_manifest() {
        let mut store = MemStore::new();
        let manifest = build_dataset(sources(), &config(), &mut store).unwrap();
        assert_eq!(manifest.counts["tracts"], 32);
        assert_eq!(manifest.counts["tract_cells"], 128);
        assert_eq!(manifest.counts["municipality_cells"], 8);
        assert_eq!(manifest.grids["tracts"], GridSpec::new(8, 16));
        assert!(!manifest.files.contains_key("count.json"));
        assert!(!manifest.files.contains_key("landmarks.json"));
        assert!(manifest.files.contains_key("municipalities/records.json"));

        validate_dataset(&store).unwrap();
    }

    #[test]
    fn duplicate_municipality_codes_fail_the_build() {
        let mut sources = sources();
        sources.municipalities[1].code = "100".into();
        assert!(build_dataset(sources, &config(), &mut MemStore::new()).is_err());
    }

    #[test]
    fn open_loads_every_layer() {
        let dataset = open(sources());
        assert_eq!(dataset.tracts().len(), 128);
        assert_eq!(dataset.municipalities().len(), 2);
        assert_eq!(dataset.landmarks().len(), 2);
        assert_eq!(dataset.target(Measure::Deaths).unwrap(), 1_000);
        assert_eq!(dataset.target(Measure::Cases).unwrap(), 9_000);
    }

    #[test]
    fn datasets_without_a_count_have_no_target() {
        let dataset = open(DatasetSources { count: None, ..sources() });
        assert_eq!(dataset.count().unwrap(), None);
        assert!(dataset.target(Measure::Deaths).is_err());
    }

    #[test]
    fn dataset_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Dataset>();
    }

    #[test]
    fn precomputed_landmarks_have_radii() {
        let dataset = open(sources());
        let landmarks = dataset.precompute_landmarks(1_000).unwrap();
        assert!(landmarks.iter().all(|l| l.radius.is_some()));
    }

    #[test]
    fn build_dir_publishes_and_keeps_the_count() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("dataset");
        build_dataset_dir(sources(), &config(), &dir).unwrap();

        let rebuilt = DatasetSources { count: None, ..sources() };
        build_dataset_dir(rebuilt, &config(), &dir).unwrap();

        let dataset = Dataset::open_dir(&dir, SearchConfig::default()).unwrap();
        assert_eq!(dataset.target(Measure::Deaths).unwrap(), 1_000);
        assert_eq!(dataset.snapshot_dir(), Some(dir.join("v0002").as_path()));
        validate_dataset(&DiskStore::new(current_snapshot(&dir).unwrap())).unwrap();
    }

    #[test]
    fn open_handles_keep_their_snapshot_across_rebuilds() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("dataset");
        build_dataset_dir(sources(), &config(), &dir).unwrap();
        let before = Dataset::open_dir(&dir, SearchConfig::default()).unwrap();
        let point = Point::new(1.0, 1.0);
        let expected = before.find_radius(point, 100).unwrap();

        // a rebuild with a hundredth of the population needs a far wider circle
        let mut sparse = sources();
        for tract in &mut sparse.tracts {
            tract.value /= 100.0;
        }
        build_dataset_dir(sparse, &config(), &dir).unwrap();
        let after = Dataset::open_dir(&dir, SearchConfig::default()).unwrap();
        assert!(after.find_radius(point, 100).unwrap().radius > expected.radius);

        let again = before.find_radius(point, 100).unwrap();
        assert_eq!(again.radius, expected.radius);
        assert_eq!(again.population, expected.population);
        assert_ne!(before.snapshot_dir(), after.snapshot_dir());
    }
}
