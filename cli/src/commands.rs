pub mod build;
pub mod count;
pub mod landmarks;
pub mod locate;

use std::path::Path;

use anyhow::{Context, Result};
use log::warn;
use popradius::{landmark, Config, Dataset, Measure};

/// The config file named on the command line, or defaults.
pub(crate) fn load_config(cli: &crate::cli::Cli) -> Result<Config> {
    match &cli.config {
        Some(path) => Config::from_path(path),
        None => Ok(Config::default()),
    }
}

/// Recompute the stored landmark circles for the dataset's current count.
/// Does nothing when the dataset has no landmarks or no count yet.
pub(crate) fn refresh_landmarks(dir: &Path, config: &Config, measure: Measure) -> Result<()> {
    let dataset = Dataset::open_dir(dir, config.search.clone())?;
    let Some(count) = dataset.count()? else {
        warn!("[landmarks] {} has no count.json; skipping landmarks", dir.display());
        return Ok(());
    };
    if dataset.landmarks().is_empty() { return Ok(()) }

    let target = count.get(measure);
    println!("[landmarks] computing {} landmark circles for target {target}", dataset.landmarks().len());
    let landmarks = dataset.precompute_landmarks(target)?;
    let snapshot = dataset.snapshot_dir().context("dataset was not opened from a directory")?;
    landmark::save_atomic(&landmarks, snapshot)?;
    Ok(())
}
