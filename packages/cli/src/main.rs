#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the airspace transition enrichment toolchain.
//!
//! Uses `indicatif-log-bridge` (via [`airspace_cli_utils::init_logger`])
//! to route `log` output through `indicatif::MultiProgress` so that log
//! lines and progress bars never fight for the terminal.

use std::path::PathBuf;
use std::time::Instant;

use airspace_cli_utils::IndicatifProgress;
use airspace_database::{json_lines, observations_db};
use airspace_enrich::config::{EnrichConfig, ObservationSourceConfig};
use airspace_spatial::RegionCatalog;
use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "airspace", about = "Airspace transition enrichment tool")]
struct Cli {
    /// TOML run configuration. Defaults apply when omitted.
    #[arg(long, global = true, env = "AIRSPACE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enrich observations with regions, transitions, and rates
    Run(RunArgs),
    /// List the region catalog with computed areas
    Regions {
        /// `GeoJSON` region boundaries (overrides `[regions] path`)
        #[arg(long, env = "AIRSPACE_REGIONS")]
        regions: Option<PathBuf>,
        /// Feature property holding the region identifier
        #[arg(long)]
        id_property: Option<String>,
    },
    /// Load a JSON-lines capture into the `DuckDB` observation store
    Import {
        /// JSON-lines file of state vectors or `/states/all` responses
        input: PathBuf,
        /// Observation store to write (defaults to the configured store)
        #[arg(long)]
        store: Option<PathBuf>,
        /// Table to write
        #[arg(long)]
        table: Option<String>,
    },
}

/// Overrides for the `run` subcommand; each replaces its config-file
/// counterpart when given.
#[derive(Args, Default)]
struct RunArgs {
    /// `GeoJSON` region boundaries
    #[arg(long, env = "AIRSPACE_REGIONS")]
    regions: Option<PathBuf>,
    /// Feature property holding the region identifier
    #[arg(long)]
    id_property: Option<String>,
    /// Read observations from this `DuckDB` observation store
    #[arg(long, env = "AIRSPACE_OBSERVATIONS", conflicts_with = "json_lines")]
    observations: Option<PathBuf>,
    /// Observation table within the store
    #[arg(long)]
    table: Option<String>,
    /// Read observations from a JSON-lines capture instead of `DuckDB`
    #[arg(long)]
    json_lines: Option<PathBuf>,
    /// Output `DuckDB` file
    #[arg(long, env = "AIRSPACE_OUTPUT")]
    output: Option<PathBuf>,
    /// Also export the output tables as Parquet into this directory
    #[arg(long)]
    parquet_dir: Option<PathBuf>,
    /// Trailing rate window in hours (default: span of the batch)
    #[arg(long)]
    window_hours: Option<f64>,
    /// Drop on-ground observations before tracking
    #[arg(long)]
    airborne_only: bool,
    /// Number of regions the catalog is expected to contain
    #[arg(long)]
    expected_regions: Option<usize>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = airspace_cli_utils::init_logger();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => EnrichConfig::load(path)?,
        None => EnrichConfig::default(),
    };

    match cli.command {
        Commands::Run(args) => {
            let config = apply_overrides(config, args);
            config.validate()?;

            let start = Instant::now();
            let progress = IndicatifProgress::batch_bar(&multi, "Enriching observations");
            let summary = airspace_enrich::run(&config, progress.as_ref())?;

            println!("{summary}");
            log::info!("Finished in {:.1}s", start.elapsed().as_secs_f64());
        }
        Commands::Regions {
            regions,
            id_property,
        } => {
            let path = regions.unwrap_or(config.regions.path);
            let id_property = id_property.unwrap_or(config.regions.id_property);
            let catalog = RegionCatalog::load(&path, &id_property)?;

            println!("{:<4} {:<24} {:>16} DEGENERATE", "#", "ID", "AREA (SQ MI)");
            println!("{}", "-".repeat(58));
            for (i, region) in catalog.regions().iter().enumerate() {
                println!(
                    "{:<4} {:<24} {:>16.1} {}",
                    i,
                    region.id,
                    region.area_sq_mi,
                    if region.is_degenerate() { "yes" } else { "" }
                );
            }

            if catalog.len() != config.expected_regions {
                log::warn!(
                    "Expected {} regions, loaded {}",
                    config.expected_regions,
                    catalog.len()
                );
            }
        }
        Commands::Import {
            input,
            store,
            table,
        } => {
            let (default_store, default_table) = match config.observations {
                ObservationSourceConfig::Duckdb { path, table } => (path, table),
                ObservationSourceConfig::JsonLines { .. } => (
                    airspace_database::paths::observations_db_path(),
                    observations_db::DEFAULT_TABLE.to_string(),
                ),
            };
            let store = store.unwrap_or(default_store);
            let table = table.unwrap_or(default_table);

            let batch = json_lines::read_file(&input)?;
            let conn = observations_db::open(&store, &table)?;
            let inserted = observations_db::insert_state_vectors(&conn, &table, &batch.records)?;

            println!(
                "Imported {inserted} state vectors into {} ({table}); {} unreadable lines",
                store.display(),
                batch.unreadable
            );
        }
    }

    Ok(())
}

/// Applies `run` flags on top of the loaded configuration.
fn apply_overrides(mut config: EnrichConfig, args: RunArgs) -> EnrichConfig {
    if let Some(path) = args.regions {
        config.regions.path = path;
    }
    if let Some(id_property) = args.id_property {
        config.regions.id_property = id_property;
    }

    if let Some(path) = args.json_lines {
        config.observations = ObservationSourceConfig::JsonLines { path };
    } else if args.observations.is_some() || args.table.is_some() {
        let (default_path, default_table) = match config.observations {
            ObservationSourceConfig::Duckdb { path, table } => (path, table),
            ObservationSourceConfig::JsonLines { .. } => (
                airspace_database::paths::observations_db_path(),
                observations_db::DEFAULT_TABLE.to_string(),
            ),
        };
        config.observations = ObservationSourceConfig::Duckdb {
            path: args.observations.unwrap_or(default_path),
            table: args.table.unwrap_or(default_table),
        };
    }

    if let Some(database) = args.output {
        config.output.database = database;
    }
    if args.parquet_dir.is_some() {
        config.output.parquet_dir = args.parquet_dir;
    }
    if args.window_hours.is_some() {
        config.window_hours = args.window_hours;
    }
    if args.airborne_only {
        config.airborne_only = true;
    }
    if let Some(expected) = args.expected_regions {
        config.expected_regions = expected;
    }

    config
}
