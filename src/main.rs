pub mod types;
pub mod error;
pub mod config;
pub mod data;
pub mod partition;
pub mod nearest;
pub mod projection;
pub mod map;
pub mod render;
pub mod controller;
pub mod server;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the interactive airport map
    Serve {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Write the Voronoi partition of the dataset as GeoJSON
    Partition {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
        #[arg(short, long, value_name = "FILE", default_value = "voronoi.geojson")]
        output: PathBuf,
    },
    /// Print the airport nearest to a location
    Nearest {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Serve { config } => {
            info!(?config, "serving map");
            let app_config = config::AppConfig::load_or_default(config)?;
            server::start_server(app_config).await?;
        }
        Commands::Partition { config, output } => {
            let app_config = config::AppConfig::load_or_default(config)?;

            // 1. Load Data
            let points = data::load(&app_config.input.dataset)?;

            // 2. Build Partition
            let partition = partition::try_build(&points, app_config.partition.bounds)?;

            // 3. Write GeoJSON
            let fc = render::partition_geojson(&partition, &points);
            let file = File::create(output)
                .with_context(|| format!("Failed to create output file: {:?}", output))?;
            serde_json::to_writer(BufWriter::new(file), &fc)
                .context("Failed to write partition GeoJSON")?;

            info!(cells = partition.len(), ?output, "partition written");
        }
        Commands::Nearest { config, lat, lon } => {
            let app_config = config::AppConfig::load_or_default(config)?;
            let points = data::load(&app_config.input.dataset)?;

            let index = nearest::NearestIndex::build(&points);
            let hit = index.nearest(&points, *lon, *lat)?;
            let entity = points
                .get(hit.index)
                .ok_or_else(|| anyhow!("nearest airport missing from the dataset"))?;
            println!(
                "{} ({}) at {:.5}, {:.5}, {:.1} km away",
                entity.display_name(),
                entity.display_iata_code(),
                entity.lat(),
                entity.lon(),
                hit.distance_m / 1000.0
            );
            if let Some(url) = entity.wikipedia() {
                println!("{url}");
            }
        }
    }

    Ok(())
}
