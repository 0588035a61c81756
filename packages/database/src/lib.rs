#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! `DuckDB` storage for the airspace enrichment pipeline.
//!
//! Reads raw `OpenSky` state vectors from the observation store written by
//! the Kafka consumer (or from the producer's JSON-lines messages), and
//! writes the three enriched output tables, optionally exporting them to
//! Parquet.

pub mod json_lines;
pub mod observations_db;
pub mod output_db;
pub mod paths;

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// `DuckDB` query error.
    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    /// File system error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Data conversion error.
    #[error("Data conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },
}

/// Rejects anything but a plain SQL identifier, since table names cannot
/// be bound as parameters.
///
/// # Errors
///
/// Returns [`DbError::Conversion`] if `name` is empty or contains
/// characters other than ASCII alphanumerics and underscores.
pub fn validate_identifier(name: &str) -> Result<&str, DbError> {
    let valid = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid {
        Ok(name)
    } else {
        Err(DbError::Conversion {
            message: format!("invalid table name {name:?}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_identifiers() {
        assert_eq!(validate_identifier("airspace").unwrap(), "airspace");
        assert_eq!(validate_identifier("state_vectors_2").unwrap(), "state_vectors_2");
    }

    #[test]
    fn rejects_injection_attempts() {
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("1table").is_err());
        assert!(validate_identifier("airspace; DROP TABLE x").is_err());
        assert!(validate_identifier("\"quoted\"").is_err());
    }
}
