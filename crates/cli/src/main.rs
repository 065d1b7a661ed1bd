//! `basin` command-line interface.

mod config;
mod delineate;
mod outlets;
mod report;
mod source;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "basin",
    version,
    about = "Watershed delineation from D8 drainage-direction rasters"
)]
struct Cli {
    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Delineate the upstream area of every outlet in a run configuration
    Delineate {
        /// Path to the JSON run configuration
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Print metadata and statistics for a GeoTIFF raster
    Info {
        /// Path to the raster
        raster: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    match cli.command {
        Command::Delineate { config } => delineate::run(config::RunConfig::load(&config)?),
        Command::Info { raster } => info(&raster),
    }
}

fn info(path: &PathBuf) -> Result<()> {
    let raster: basin_core::Raster<f64> = basin_core::io::read_geotiff(path)?;

    let (rows, cols) = raster.shape();
    let (min_x, min_y, max_x, max_y) = raster.bounds();
    let stats = raster.statistics();

    println!("{}", path.display());
    println!("  size:      {} x {} ({} cells)", cols, rows, raster.len());
    println!("  cell size: {}", raster.cell_size());
    if let Some(crs) = raster.crs() {
        println!("  crs:       {}", crs);
    }
    println!(
        "  bounds:    ({:.6}, {:.6}) - ({:.6}, {:.6})",
        min_x, min_y, max_x, max_y
    );
    match (stats.min, stats.max, stats.mean) {
        (Some(min), Some(max), Some(mean)) => {
            println!("  min/max:   {} / {}", min, max);
            println!("  mean:      {:.4}", mean);
        }
        _ => println!("  no valid cells"),
    }
    println!(
        "  valid:     {} cells ({} nodata)",
        stats.valid_count, stats.nodata_count
    );

    Ok(())
}
