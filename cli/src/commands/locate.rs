use anyhow::{Context, Result};
use popradius::{Dataset, Measure, NearestThenRandom};

pub fn run(cli: &crate::cli::Cli, args: &crate::cli::LocateArgs) -> Result<()> {
    let config = super::load_config(cli)?;
    let dataset = Dataset::open_dir(&args.dataset, config.search)
        .with_context(|| format!("[locate] Failed to open dataset {}", args.dataset.display()))?;

    let target = match args.target {
        Some(target) => target,
        None => dataset.target(args.measure.parse::<Measure>()?)?,
    };
    let policy = match args.seed {
        Some(seed) => NearestThenRandom::seeded(seed),
        None => NearestThenRandom::new(),
    };

    let location = dataset.locate(&args.lat, &args.lon, target, &policy)?;
    println!("{}", serde_json::to_string_pretty(&location)?);
    Ok(())
}
