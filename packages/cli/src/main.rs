#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command line entry point for county housing unit inventories.
//!
//! `housing_inventory run --county davis` runs one county end to end;
//! without `--county` the county is picked interactively from the
//! registry. `housing_inventory counties` lists what is registered.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use dialoguer::Select;
use housing_inventory::{pipeline, registry};
use housing_inventory_cli_utils::IndicatifProgress;
use housing_inventory_models::config::CountyConfig;

#[derive(Parser)]
#[command(name = "housing_inventory", about = "County housing unit inventory tool")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the housing unit inventory for a county
    Run {
        /// Registered county id (prompted for when omitted)
        #[arg(long)]
        county: Option<String>,
        /// Directory holding the county's input files
        #[arg(long, default_value = "Inputs")]
        input_dir: PathBuf,
        /// Directory the inventory `GeoJSON` and CSV are written to
        #[arg(long, default_value = "Outputs")]
        output_dir: PathBuf,
    },
    /// List registered counties
    Counties,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = housing_inventory_cli_utils::init_logger();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            county,
            input_dir,
            output_dir,
        } => {
            let config = match county {
                Some(id) => registry::county(&id)?,
                None => select_county()?,
            };

            let progress = IndicatifProgress::steps_bar(
                &multi,
                config.name(),
                pipeline::STAGE_COUNT,
            );
            let summary = pipeline::run(&config, &input_dir, &output_dir, &progress)?;

            log::info!(
                "{} parcels -> {} inventory units ({} dwelling units)",
                summary.parcels,
                summary.units,
                summary.dwelling_units
            );
            println!("Wrote {}", summary.geojson_path.display());
            println!("Wrote {}", summary.csv_path.display());
        }
        Commands::Counties => {
            for county in registry::all_counties() {
                println!("{:<12} {}", county.id(), county.name());
            }
        }
    }

    Ok(())
}

/// Prompts for one of the registered counties.
fn select_county() -> Result<CountyConfig, Box<dyn std::error::Error>> {
    let mut counties = registry::all_counties();
    let labels: Vec<String> = counties
        .iter()
        .map(|county| format!("{} ({})", county.name(), county.id()))
        .collect();

    let idx = Select::new()
        .with_prompt("Which county?")
        .items(&labels)
        .default(0)
        .interact()?;

    Ok(counties.swap_remove(idx))
}
