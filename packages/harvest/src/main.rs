#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the stayscout harvester.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use stayscout_harvest::config::{RunConfig, RunOverrides, default_localities};
use stayscout_harvest::{HarvestError, run_harvest, run_merge, spawn_interrupt_listener};
use stayscout_sink::{SinkLayout, TOTAL_FILE};
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "stayscout_harvest", about = "Lodging listing harvester")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl and enrich listings for the configured localities
    Run {
        /// Comma-separated localities, in harvest order
        #[arg(long)]
        localities: Option<String>,
        /// Maximum listings per locality (0 for unlimited)
        #[arg(long)]
        limit: Option<usize>,
        /// Directory the datasets are written to
        #[arg(long)]
        output_dir: Option<PathBuf>,
        /// Dataset files to keep up to date: `per_locality`, `cumulative` or `both`
        #[arg(long)]
        layout: Option<String>,
        /// Run configuration file (defaults to `stayscout.toml` when present)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Site definition file replacing the built-in Booking definition
        #[arg(long)]
        site: Option<PathBuf>,
    },
    /// Merge every dataset in a directory into one file
    Merge {
        /// Directory holding the datasets
        #[arg(long, default_value = "output")]
        input: PathBuf,
        /// Consolidated output file
        #[arg(long)]
        output: Option<PathBuf>,
        /// Also read `total_accommodations.csv` when locality files are present
        #[arg(long)]
        include_total: bool,
    },
    /// List the built-in localities
    Localities,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        let multi = stayscout_cli_utils::init_logger();
        return stayscout_harvest::interactive::run(&multi).await;
    };

    match command {
        Commands::Run {
            localities,
            limit,
            output_dir,
            layout,
            config,
            site,
        } => {
            let multi = stayscout_cli_utils::init_logger();
            let layout = layout
                .map(|l| {
                    l.parse::<SinkLayout>()
                        .map_err(|_| HarvestError::Config(format!("unknown layout '{l}'")))
                })
                .transpose()?;
            let config = RunConfig::load(config.as_deref())?
                .with_overrides(RunOverrides {
                    localities: localities.map(|l| {
                        l.split(',')
                            .map(str::trim)
                            .filter(|s| !s.is_empty())
                            .map(str::to_owned)
                            .collect()
                    }),
                    limit,
                    output_dir,
                    layout,
                    site,
                })
                .validated()?;

            let cancel = CancellationToken::new();
            spawn_interrupt_listener(cancel.clone())?;
            run_harvest(&config, Some(&multi), &cancel).await?;
        }
        Commands::Merge {
            input,
            output,
            include_total,
        } => {
            pretty_env_logger::init();
            let output = output.unwrap_or_else(|| input.join("merged").join(TOTAL_FILE));
            run_merge(&input, &output, include_total)?;
        }
        Commands::Localities => {
            for locality in default_localities()? {
                println!("{locality}");
            }
        }
    }

    Ok(())
}
