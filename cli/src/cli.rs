use std::path::PathBuf;

/// Population radius CLI
#[derive(clap::Parser, Debug)]
#[command(name = "popradius", version, about, propagate_version = true)]
pub struct Cli {
    /// Increase output verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// JSON config file with optional "build" and "search" sections
    #[arg(short, long, global = true, value_hint = clap::ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Build a dataset from census shapefiles and population tables
    Build(BuildArgs),

    /// Find the circle around a point holding the current target
    Locate(LocateArgs),

    /// Refresh the dataset's target count from a case report
    Count(CountArgs),

    /// Recompute landmark circles for the current target
    Landmarks(LandmarksArgs),
}

#[derive(clap::Args, Debug)]
pub struct BuildArgs {
    /// National outline shapefile
    #[arg(long, value_hint = clap::ValueHint::FilePath)]
    pub extent: PathBuf,

    /// Census tract shapefile
    #[arg(long, value_hint = clap::ValueHint::FilePath)]
    pub tracts: PathBuf,

    /// Tract population table (.csv or .csv.gz)
    #[arg(long, value_hint = clap::ValueHint::FilePath)]
    pub tract_populations: PathBuf,

    /// Municipality outline shapefile
    #[arg(long, value_hint = clap::ValueHint::FilePath)]
    pub municipalities: PathBuf,

    /// Municipality population table (.csv or .csv.gz)
    #[arg(long, value_hint = clap::ValueHint::FilePath)]
    pub municipality_populations: PathBuf,

    /// JSON list of landmarks
    #[arg(long, value_hint = clap::ValueHint::FilePath)]
    pub landmarks: Option<PathBuf>,

    /// Case report to compute the initial count from
    #[arg(long, value_hint = clap::ValueHint::FilePath)]
    pub cases: Option<PathBuf>,

    /// Output dataset directory; each build is published as a new snapshot
    #[arg(short, long, value_hint = clap::ValueHint::DirPath)]
    pub output: PathBuf,

    /// Delete all but this many snapshots after publishing
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub keep: Option<u64>,
}

#[derive(clap::Args, Debug)]
pub struct LocateArgs {
    /// Dataset directory
    #[arg(value_hint = clap::ValueHint::DirPath)]
    pub dataset: PathBuf,

    /// Latitude in degrees
    #[arg(allow_hyphen_values = true)]
    pub lat: String,

    /// Longitude in degrees
    #[arg(allow_hyphen_values = true)]
    pub lon: String,

    /// Explicit target instead of the dataset's count
    #[arg(short, long)]
    pub target: Option<u64>,

    /// Which count to use as the target: deaths or cases
    #[arg(short, long, default_value = "deaths")]
    pub measure: String,

    /// Seed for picking the random alternative
    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(clap::Args, Debug)]
pub struct CountArgs {
    /// Dataset directory
    #[arg(value_hint = clap::ValueHint::DirPath)]
    pub dataset: PathBuf,

    /// Case report (.csv or .csv.gz)
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub cases: PathBuf,
}

#[derive(clap::Args, Debug)]
pub struct LandmarksArgs {
    /// Dataset directory
    #[arg(value_hint = clap::ValueHint::DirPath)]
    pub dataset: PathBuf,

    /// Which count to use as the target: deaths or cases
    #[arg(short, long, default_value = "deaths")]
    pub measure: String,
}
