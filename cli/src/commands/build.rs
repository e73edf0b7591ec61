use anyhow::Result;
use popradius::{build_dataset_dir, prune_snapshots, source::{self, SourceFields}, DatasetSources, Measure, TargetCount};

pub fn run(cli: &crate::cli::Cli, args: &crate::cli::BuildArgs) -> Result<()> {
    let config = super::load_config(cli)?;
    let fields = SourceFields::default();

    println!("[build] reading sources");
    let count = match &args.cases {
        Some(path) => Some(TargetCount::from_case_rows(&source::read_case_rows(path)?)?),
        None => None,
    };
    let sources = DatasetSources {
        extent: source::read_extent(&args.extent)?,
        tracts: source::read_tracts(&args.tracts, &args.tract_populations, &fields)?,
        municipalities: source::read_municipalities(&args.municipalities, &args.municipality_populations, &fields)?,
        landmarks: match &args.landmarks {
            Some(path) => source::read_landmarks(path)?,
            None => Vec::new(),
        },
        count,
    };

    println!("[build] tiling {} tracts and {} municipalities", sources.tracts.len(), sources.municipalities.len());
    let manifest = build_dataset_dir(sources, &config.build, &args.output)?;
    println!("[build] wrote {} files to {}", manifest.files.len(), args.output.display());
    if let Some(keep) = args.keep {
        prune_snapshots(&args.output, usize::try_from(keep)?)?;
    }

    super::refresh_landmarks(&args.output, &config, Measure::Deaths)
}
