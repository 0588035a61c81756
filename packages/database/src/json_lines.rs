//! Newline-delimited JSON state vector captures.
//!
//! Each line is either one keyed state vector, as published to the
//! `airspace-events` topic, or a whole `OpenSky` `/states/all` response whose
//! `states` member holds positional arrays. Lines that are not valid JSON
//! are skipped and counted.

use std::io::BufRead;
use std::path::Path;

use airspace_models::RawStateVector;
use serde_json::Value;

use crate::DbError;

/// Key order of the positional arrays in an `OpenSky` `states` response.
pub const STATE_VECTOR_KEYS: [&str; 17] = [
    "icao24",
    "callsign",
    "origin_country",
    "time_position",
    "last_contact",
    "longitude",
    "latitude",
    "baro_altitude",
    "on_ground",
    "velocity",
    "true_track",
    "vertical_rate",
    "sensors",
    "geo_altitude",
    "squawk",
    "spi",
    "position_source",
];

/// State vectors read from a capture plus the number of unreadable lines.
#[derive(Debug, Default)]
pub struct JsonLinesBatch {
    pub records: Vec<RawStateVector>,
    pub unreadable: u64,
}

/// Reads a JSON-lines capture file.
///
/// # Errors
///
/// Returns [`DbError::Io`] if the file cannot be opened or read.
pub fn read_file(path: &Path) -> Result<JsonLinesBatch, DbError> {
    let file = std::fs::File::open(path)?;
    let batch = read(std::io::BufReader::new(file))?;
    log::info!(
        "Read {} state vectors from {} ({} unreadable lines)",
        batch.records.len(),
        path.display(),
        batch.unreadable
    );
    Ok(batch)
}

/// Reads JSON-lines state vectors from any buffered reader.
///
/// # Errors
///
/// Returns [`DbError::Io`] if the reader fails.
pub fn read(reader: impl BufRead) -> Result<JsonLinesBatch, DbError> {
    let mut batch = JsonLinesBatch::default();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match parse_line(line) {
            Ok(records) => batch.records.extend(records),
            Err(e) => {
                log::warn!("Skipping unreadable line {}: {e}", line_no + 1);
                batch.unreadable += 1;
            }
        }
    }

    Ok(batch)
}

fn parse_line(line: &str) -> Result<Vec<RawStateVector>, serde_json::Error> {
    let value: Value = serde_json::from_str(line)?;

    match value.get("states") {
        Some(Value::Array(states)) => states.iter().map(positional_to_keyed).collect(),
        Some(Value::Null) => Ok(Vec::new()),
        _ => Ok(vec![serde_json::from_value(value)?]),
    }
}

/// Zips a positional `OpenSky` state array with [`STATE_VECTOR_KEYS`].
///
/// # Errors
///
/// Returns an error if a field has the wrong JSON type.
pub fn positional_to_keyed(state: &Value) -> Result<RawStateVector, serde_json::Error> {
    let fields = state.as_array().map(Vec::as_slice).unwrap_or_default();
    let keyed: serde_json::Map<String, Value> = STATE_VECTOR_KEYS
        .iter()
        .zip(fields)
        .map(|(key, value)| ((*key).to_string(), value.clone()))
        .collect();

    serde_json::from_value(Value::Object(keyed))
}
