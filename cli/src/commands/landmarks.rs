use anyhow::Result;
use popradius::Measure;

pub fn run(cli: &crate::cli::Cli, args: &crate::cli::LandmarksArgs) -> Result<()> {
    let config = super::load_config(cli)?;
    let measure = args.measure.parse::<Measure>()?;
    super::refresh_landmarks(&args.dataset, &config, measure)
}
