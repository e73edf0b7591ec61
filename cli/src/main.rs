mod cli;
mod commands;

use cli::{Cli, Commands};
use commands::{build, count, landmarks, locate};

pub fn run() -> anyhow::Result<()> {
    use clap::Parser;

    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        _ => log::LevelFilter::Debug,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    match &cli.command {
        Commands::Build(args) => build::run(&cli, args),
        Commands::Locate(args) => locate::run(&cli, args),
        Commands::Count(args) => count::run(&cli, args),
        Commands::Landmarks(args) => landmarks::run(&cli, args),
    }
}

fn main() -> anyhow::Result<()> { run() }
