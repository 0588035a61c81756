#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Batch enrichment pipeline.
//!
//! Takes a materialized batch of raw state vectors and a region catalog and
//! produces the three output datasets: enriched observations (one region
//! per observation), enriched regions (boundary, area, and rates), and
//! transition events. [`enrich`] is the pure core; [`run`] wraps it with
//! configuration-driven input loading and output writing.

pub mod config;
pub mod progress;

use std::fmt;

use airspace_database::{DbError, json_lines, observations_db, output_db};
use airspace_models::{
    AircraftObservation, EnrichedObservation, EnrichedRegion, RateWindow, RawStateVector,
    TransitionEvent,
};
use airspace_spatial::{CatalogError, RegionCatalog, SpatialAssigner};
use rayon::prelude::*;
use serde::Serialize;

use crate::config::{EnrichConfig, ObservationSourceConfig};
use crate::progress::ProgressCallback;

/// Errors that abort an enrichment run.
#[derive(Debug, thiserror::Error)]
pub enum EnrichError {
    /// Region geometry is unreachable or malformed.
    #[error("Region data unavailable: {0}")]
    DataUnavailable(#[from] CatalogError),

    /// The observation source is empty or unreadable.
    #[error("Upstream observation data missing: {message}")]
    UpstreamDataMissing { message: String },

    /// Writing the output tables failed.
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// The run configuration is invalid.
    #[error("Invalid configuration: {message}")]
    Config { message: String },

    /// The configuration file is not valid TOML.
    #[error("Failed to parse configuration: {0}")]
    Toml(#[from] toml::de::Error),

    /// File system error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Knobs for the pure pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EnrichOptions {
    /// Drop `on_ground` observations before tracking.
    pub airborne_only: bool,
    /// Trailing rate window in hours; `None` uses the span of the batch.
    pub window_hours: Option<f64>,
}

impl From<&EnrichConfig> for EnrichOptions {
    fn from(config: &EnrichConfig) -> Self {
        Self {
            airborne_only: config.airborne_only,
            window_hours: config.window_hours,
        }
    }
}

/// Counts describing one run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EnrichmentSummary {
    pub input_records: u64,
    /// Records skipped for missing or invalid mandatory fields.
    pub malformed: u64,
    /// Records dropped by the airborne filter.
    pub filtered_on_ground: u64,
    pub enriched: u64,
    /// Distinct aircraft tracked.
    pub aircraft: u64,
    pub transitions: u64,
    pub regions: u64,
    pub degenerate_regions: u64,
    pub window: RateWindow,
}

impl fmt::Display for EnrichmentSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<22} {}", "Input records", self.input_records)?;
        writeln!(f, "{:<22} {}", "Malformed (skipped)", self.malformed)?;
        writeln!(f, "{:<22} {}", "On ground (filtered)", self.filtered_on_ground)?;
        writeln!(f, "{:<22} {}", "Enriched observations", self.enriched)?;
        writeln!(f, "{:<22} {}", "Aircraft", self.aircraft)?;
        writeln!(f, "{:<22} {}", "Transitions", self.transitions)?;
        writeln!(
            f,
            "{:<22} {} ({} degenerate)",
            "Regions", self.regions, self.degenerate_regions
        )?;
        write!(
            f,
            "{:<22} {}..{} ({:.2} h)",
            "Rate window",
            self.window.start,
            self.window.end,
            self.window.hours()
        )
    }
}

/// The three output datasets plus run counts.
#[derive(Debug, Clone)]
pub struct EnrichmentOutput {
    /// Sorted by `(timestamp, icao24)`.
    pub observations: Vec<EnrichedObservation>,
    /// In catalog order, one per region.
    pub regions: Vec<EnrichedRegion>,
    /// Sorted by `(timestamp, icao24)`.
    pub transitions: Vec<TransitionEvent>,
    pub summary: EnrichmentSummary,
}

/// Runs region assignment, transition detection, and rate aggregation over
/// one batch.
///
/// Malformed records are logged and skipped. The output does not depend on
/// the order of `records`, except that observations of one aircraft sharing
/// a timestamp keep their relative order.
///
/// # Errors
///
/// Returns [`EnrichError::UpstreamDataMissing`] if `records` is empty or no
/// usable observation remains after validation and filtering.
#[allow(clippy::cast_possible_truncation)]
pub fn enrich(
    catalog: &RegionCatalog,
    records: Vec<RawStateVector>,
    options: EnrichOptions,
    progress: &dyn ProgressCallback,
) -> Result<EnrichmentOutput, EnrichError> {
    if records.is_empty() {
        return Err(EnrichError::UpstreamDataMissing {
            message: "observation source returned no records".to_string(),
        });
    }

    let input_records = records.len() as u64;
    let mut malformed = 0u64;
    let mut filtered_on_ground = 0u64;
    let mut observations = Vec::with_capacity(records.len());

    for record in records {
        match AircraftObservation::try_from(record) {
            Ok(observation) if options.airborne_only && observation.on_ground == Some(true) => {
                filtered_on_ground += 1;
            }
            Ok(observation) => observations.push(observation),
            Err(e) => {
                log::warn!("Skipping malformed observation: {e}");
                malformed += 1;
            }
        }
    }

    if malformed > 0 {
        log::info!("Skipped {malformed} malformed observations");
    }
    if filtered_on_ground > 0 {
        log::info!("Filtered {filtered_on_ground} on-ground observations");
    }

    let (Some(min_timestamp), Some(max_timestamp)) = (
        observations.iter().map(|o| o.timestamp).min(),
        observations.iter().map(|o| o.timestamp).max(),
    ) else {
        return Err(EnrichError::UpstreamDataMissing {
            message: format!("none of {input_records} records is a usable observation"),
        });
    };

    progress.set_message("Assigning regions".to_string());
    progress.set_total(observations.len() as u64);

    let assigner = SpatialAssigner::new(catalog);
    let mut enriched: Vec<EnrichedObservation> = observations
        .into_par_iter()
        .map(|observation| {
            let region_id = assigner.assign_observation(&observation);
            progress.inc(1);
            EnrichedObservation {
                observation,
                region_id,
            }
        })
        .collect();

    enriched.sort_by(|a, b| {
        a.observation
            .timestamp
            .cmp(&b.observation.timestamp)
            .then_with(|| a.observation.icao24.cmp(&b.observation.icao24))
    });

    progress.set_message("Detecting transitions".to_string());
    let outcome = airspace_transitions::detect_transitions(&enriched);

    let window = options.window_hours.map_or_else(
        || RateWindow::from_span(min_timestamp, max_timestamp),
        |hours| RateWindow::trailing(max_timestamp, hours),
    );

    progress.set_message("Aggregating rates".to_string());
    let mut rates =
        airspace_transitions::aggregate(&outcome.transitions, catalog.regions(), window);

    let regions: Vec<EnrichedRegion> = catalog
        .regions()
        .iter()
        .enumerate()
        .filter_map(|(catalog_index, region)| {
            let rate = rates.remove(&region.id)?;
            Some(EnrichedRegion {
                region_id: region.id.clone(),
                catalog_index,
                boundary_geojson: region.boundary_geojson(),
                area_sq_mi: region.area_sq_mi,
                degenerate: region.is_degenerate(),
                rate,
            })
        })
        .collect();

    let summary = EnrichmentSummary {
        input_records,
        malformed,
        filtered_on_ground,
        enriched: enriched.len() as u64,
        aircraft: outcome.occupancy.len() as u64,
        transitions: outcome.transitions.len() as u64,
        regions: regions.len() as u64,
        degenerate_regions: catalog.degenerate_count() as u64,
        window,
    };

    progress.finish(format!(
        "Enriched {} observations, {} transitions",
        summary.enriched, summary.transitions
    ));

    Ok(EnrichmentOutput {
        observations: enriched,
        regions,
        transitions: outcome.transitions,
        summary,
    })
}

/// Reads raw state vectors from the configured source.
///
/// # Errors
///
/// Returns [`EnrichError::UpstreamDataMissing`] if the source cannot be
/// opened or read.
pub fn load_observations(
    source: &ObservationSourceConfig,
) -> Result<Vec<RawStateVector>, EnrichError> {
    let upstream = |e: DbError| EnrichError::UpstreamDataMissing {
        message: e.to_string(),
    };

    match source {
        ObservationSourceConfig::Duckdb { path, table } => {
            log::info!("Reading observations from {} ({table})", path.display());
            let conn = observations_db::open_read_only(path).map_err(upstream)?;
            observations_db::load_state_vectors(&conn, table).map_err(upstream)
        }
        ObservationSourceConfig::JsonLines { path } => {
            log::info!("Reading observations from {}", path.display());
            let batch = json_lines::read_file(path).map_err(upstream)?;
            Ok(batch.records)
        }
    }
}

/// Loads regions and observations, enriches them, and writes the outputs.
///
/// Outputs are replaced in a single transaction, so a failed run leaves the
/// previous outputs in place.
///
/// # Errors
///
/// Returns [`EnrichError`] if any input is unavailable or the outputs
/// cannot be written.
pub fn run(
    config: &EnrichConfig,
    progress: &dyn ProgressCallback,
) -> Result<EnrichmentSummary, EnrichError> {
    config.validate()?;

    let catalog = RegionCatalog::load(&config.regions.path, &config.regions.id_property)?;
    if catalog.len() != config.expected_regions {
        log::warn!(
            "Expected {} regions, loaded {}",
            config.expected_regions,
            catalog.len()
        );
    }

    let records = load_observations(&config.observations)?;
    let output = enrich(&catalog, records, EnrichOptions::from(config), progress)?;

    let mut conn = output_db::open(&config.output.database)?;
    output_db::write_outputs(
        &mut conn,
        &output.observations,
        &output.regions,
        &output.transitions,
    )?;

    if let Some(dir) = &config.output.parquet_dir {
        output_db::export_parquet(&conn, dir)?;
    }

    log::info!(
        "Enrichment complete: {} observations, {} transitions, {} regions",
        output.summary.enriched,
        output.summary.transitions,
        output.summary.regions
    );

    Ok(output.summary)
}
