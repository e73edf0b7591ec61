//! Tunables for tiling and searching.
//!
//! Both structs deserialize from partial JSON, falling back to field defaults.
use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

/// Grid dimensions for one tiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GridSpec {
    pub rows: u32,
    pub cols: u32,
}

impl GridSpec {
    pub fn new(rows: u32, cols: u32) -> Self {
        assert!(rows > 0 && cols > 0, "grid dimensions must be positive");
        Self { rows, cols }
    }

    /// Fine grid used for census tracts.
    pub const fn tracts() -> Self { Self { rows: 150, cols: 150 } }

    /// Coarse grid used for municipality outlines.
    pub const fn municipalities() -> Self { Self { rows: 30, cols: 30 } }

    #[inline] pub fn cell_count(&self) -> usize { self.rows as usize * self.cols as usize }

    /// Cell id of a grid slot (row-major).
    #[inline] pub fn cell_id(&self, row: u32, col: u32) -> u32 { row * self.cols + col }
}

/// Parameters of the radius search and the quadrant expansion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchConfig {
    /// Starting radius, in coordinate degrees.
    #[serde(default = "SearchConfig::default_initial_radius")]
    pub initial_radius: f64,

    #[serde(default = "SearchConfig::default_growth_factor")]
    pub growth_factor: f64,

    /// Half-width of the acceptance band as a fraction of the target.
    #[serde(default = "SearchConfig::default_tolerance")]
    pub tolerance: f64,

    #[serde(default = "SearchConfig::default_initial_step")]
    pub initial_step: f64,

    /// Vertices on the circular buffer ring.
    #[serde(default = "SearchConfig::default_buffer_segments")]
    pub buffer_segments: usize,

    #[serde(default = "SearchConfig::default_max_growth_steps")]
    pub max_growth_steps: usize,

    #[serde(default = "SearchConfig::default_max_tune_iterations")]
    pub max_tune_iterations: usize,

    #[serde(default = "SearchConfig::default_max_expansions")]
    pub max_expansions: usize,

    /// Furthest a nearest-centroid fallback may reach for points outside the
    /// extent, in coordinate degrees. Gaps inside the extent always fall back.
    #[serde(default = "SearchConfig::default_max_fallback_distance")]
    pub max_fallback_distance: f64,
}

impl SearchConfig {
    const fn default_initial_radius() -> f64 { 0.01 }
    const fn default_growth_factor() -> f64 { 1.5 }
    const fn default_tolerance() -> f64 { 0.1 }
    const fn default_initial_step() -> f64 { 0.5 }
    const fn default_buffer_segments() -> usize { 64 }
    const fn default_max_growth_steps() -> usize { 64 }
    const fn default_max_tune_iterations() -> usize { 100 }
    const fn default_max_expansions() -> usize { 10_000 }
    const fn default_max_fallback_distance() -> f64 { 0.5 }

    pub fn with_initial_radius(mut self, radius: f64) -> Self {
        assert!(radius > 0.0, "initial radius must be positive");
        self.initial_radius = radius;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        assert!((0.0..1.0).contains(&tolerance), "tolerance must be in [0, 1)");
        self.tolerance = tolerance;
        self
    }

    pub fn with_max_tune_iterations(mut self, iterations: usize) -> Self {
        self.max_tune_iterations = iterations;
        self
    }

    pub fn with_max_growth_steps(mut self, steps: usize) -> Self {
        self.max_growth_steps = steps;
        self
    }

    pub fn with_max_fallback_distance(mut self, distance: f64) -> Self {
        self.max_fallback_distance = distance;
        self
    }

    /// Parse a (possibly partial) JSON config and check its invariants.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let config: Self = serde_json::from_slice(bytes).context("Failed to parse search config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.initial_radius > 0.0, "initial_radius must be positive");
        ensure!(self.growth_factor > 1.0, "growth_factor must exceed 1");
        ensure!((0.0..1.0).contains(&self.tolerance), "tolerance must be in [0, 1)");
        ensure!(self.initial_step > 0.0 && self.initial_step < 1.0, "initial_step must be in (0, 1)");
        ensure!(self.buffer_segments >= 8, "buffer_segments must be at least 8");
        Ok(())
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            initial_radius: Self::default_initial_radius(),
            growth_factor: Self::default_growth_factor(),
            tolerance: Self::default_tolerance(),
            initial_step: Self::default_initial_step(),
            buffer_segments: Self::default_buffer_segments(),
            max_growth_steps: Self::default_max_growth_steps(),
            max_tune_iterations: Self::default_max_tune_iterations(),
            max_expansions: Self::default_max_expansions(),
            max_fallback_distance: Self::default_max_fallback_distance(),
        }
    }
}

/// How a dataset is tiled and stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildConfig {
    #[serde(default = "GridSpec::tracts")]
    pub tracts: GridSpec,

    #[serde(default = "GridSpec::municipalities")]
    pub municipalities: GridSpec,

    /// Coordinate reference system recorded in the manifest.
    #[serde(default = "BuildConfig::default_crs")]
    pub crs: String,

    /// Gzip cell detail blobs.
    #[serde(default = "BuildConfig::default_compress")]
    pub compress: bool,
}

impl BuildConfig {
    fn default_crs() -> String { "EPSG:4674".into() }
    const fn default_compress() -> bool { true }

    pub fn with_grids(mut self, tracts: GridSpec, municipalities: GridSpec) -> Self {
        self.tracts = tracts;
        self.municipalities = municipalities;
        self
    }

    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            tracts: GridSpec::tracts(),
            municipalities: GridSpec::municipalities(),
            crs: Self::default_crs(),
            compress: Self::default_compress(),
        }
    }
}

/// A config file: `{ "build": { ... }, "search": { ... } }`, both optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub build: BuildConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

impl Config {
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let config: Self = serde_json::from_slice(bytes).context("Failed to parse config")?;
        for grid in [config.build.tracts, config.build.municipalities] {
            ensure!(grid.rows > 0 && grid.cols > 0, "grid dimensions must be positive");
        }
        config.search.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &std::path::Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_json(&bytes)
    }
}
