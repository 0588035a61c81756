//! Run configuration, deserialized from TOML.
//!
//! Every field has a default pointing at the canonical `data/` layout, so
//! an empty file (or no file) is a valid configuration.

use std::path::{Path, PathBuf};

use airspace_database::{observations_db, paths};
use airspace_models::DEFAULT_REGION_COUNT;
use serde::{Deserialize, Serialize};

use crate::EnrichError;

/// Configuration for one enrichment run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EnrichConfig {
    /// Catalog size to expect; a mismatch is logged, not fatal.
    pub expected_regions: usize,
    /// Drop `on_ground` observations before tracking.
    pub airborne_only: bool,
    /// Rate window length ending at the latest observation. `None` uses
    /// the full span of the batch.
    pub window_hours: Option<f64>,
    pub regions: RegionSourceConfig,
    pub observations: ObservationSourceConfig,
    pub output: OutputConfig,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            expected_regions: DEFAULT_REGION_COUNT,
            airborne_only: false,
            window_hours: None,
            regions: RegionSourceConfig::default(),
            observations: ObservationSourceConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

/// Where the airspace boundary polygons come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegionSourceConfig {
    /// `GeoJSON` `FeatureCollection` of region polygons.
    pub path: PathBuf,
    /// Feature property holding the region identifier.
    pub id_property: String,
}

impl Default for RegionSourceConfig {
    fn default() -> Self {
        Self {
            path: paths::regions_path(),
            id_property: "IDENT".to_string(),
        }
    }
}

/// Where the raw state vectors come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObservationSourceConfig {
    /// The consumer's `DuckDB` observation store.
    Duckdb {
        #[serde(default = "paths::observations_db_path")]
        path: PathBuf,
        #[serde(default = "default_table")]
        table: String,
    },
    /// A newline-delimited JSON capture of producer messages.
    JsonLines { path: PathBuf },
}

impl Default for ObservationSourceConfig {
    fn default() -> Self {
        Self::Duckdb {
            path: paths::observations_db_path(),
            table: default_table(),
        }
    }
}

fn default_table() -> String {
    observations_db::DEFAULT_TABLE.to_string()
}

/// Where the enriched tables are written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    /// Output `DuckDB` file.
    pub database: PathBuf,
    /// Directory for Parquet copies of the output tables; skipped if unset.
    pub parquet_dir: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            database: paths::output_db_path(),
            parquet_dir: None,
        }
    }
}

impl EnrichConfig {
    /// Reads and validates a TOML configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`EnrichError`] if the file cannot be read, is not valid
    /// TOML for this schema, or fails validation.
    pub fn load(path: &Path) -> Result<Self, EnrichError> {
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&contents)?;
        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parses and validates a TOML configuration string.
    ///
    /// # Errors
    ///
    /// Returns [`EnrichError`] on a parse or validation failure.
    pub fn from_toml_str(contents: &str) -> Result<Self, EnrichError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`EnrichError::Config`] for a non-positive window or an
    /// empty identifier property.
    pub fn validate(&self) -> Result<(), EnrichError> {
        if let Some(hours) = self.window_hours
            && (!hours.is_finite() || hours <= 0.0)
        {
            return Err(EnrichError::Config {
                message: format!("window_hours must be positive, got {hours}"),
            });
        }

        if self.regions.id_property.trim().is_empty() {
            return Err(EnrichError::Config {
                message: "regions.id_property must not be empty".to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = EnrichConfig::from_toml_str("").unwrap();
        assert_eq!(config, EnrichConfig::default());
        assert_eq!(config.expected_regions, 20);
        assert_eq!(config.regions.id_property, "IDENT");
        assert!(matches!(
            config.observations,
            ObservationSourceConfig::Duckdb { ref table, .. } if table == "airspace"
        ));
    }

    #[test]
    fn parses_full_config() {
        let config = EnrichConfig::from_toml_str(
            r#"
            expected_regions = 22
            airborne_only = true
            window_hours = 0.5

            [regions]
            path = "boundaries.geojson"
            id_property = "NAME"

            [observations]
            type = "json_lines"
            path = "capture.jsonl"

            [output]
            database = "out.duckdb"
            parquet_dir = "parquet"
            "#,
        )
        .unwrap();

        assert_eq!(config.expected_regions, 22);
        assert!(config.airborne_only);
        assert_eq!(config.window_hours, Some(0.5));
        assert_eq!(config.regions.path, PathBuf::from("boundaries.geojson"));
        assert_eq!(
            config.observations,
            ObservationSourceConfig::JsonLines {
                path: PathBuf::from("capture.jsonl"),
            }
        );
        assert_eq!(config.output.parquet_dir, Some(PathBuf::from("parquet")));
    }

    #[test]
    fn duckdb_source_fills_missing_fields() {
        let config = EnrichConfig::from_toml_str(
            r#"
            [observations]
            type = "duckdb"
            table = "state_vectors"
            "#,
        )
        .unwrap();

        assert_eq!(
            config.observations,
            ObservationSourceConfig::Duckdb {
                path: paths::observations_db_path(),
                table: "state_vectors".to_string(),
            }
        );
    }

    #[test]
    fn rejects_non_positive_window() {
        let err = EnrichConfig::from_toml_str("window_hours = 0.0").unwrap_err();
        assert!(matches!(err, EnrichError::Config { .. }));
    }

    #[test]
    fn rejects_unknown_keys() {
        let err = EnrichConfig::from_toml_str("windw_hours = 1.0").unwrap_err();
        assert!(matches!(err, EnrichError::Toml(_)));
    }
}
