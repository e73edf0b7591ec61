use anyhow::Result;
use popradius::{current_snapshot, source, Measure, TargetCount};

pub fn run(cli: &crate::cli::Cli, args: &crate::cli::CountArgs) -> Result<()> {
    let config = super::load_config(cli)?;

    let count = TargetCount::from_case_rows(&source::read_case_rows(&args.cases)?)?;
    count.save_atomic(&current_snapshot(&args.dataset)?)?;
    println!("{}", serde_json::to_string_pretty(&count)?);

    super::refresh_landmarks(&args.dataset, &config, Measure::Deaths)
}
