//! Raw `OpenSky` state vector storage in `DuckDB`.
//!
//! The observation store is written by the Kafka consumer: one table
//! (`airspace` by default) keyed by `(icao24, last_contact)` holding the
//! 17 state-vector fields. The enrichment pipeline only reads it; the
//! `import` path exists to load producer JSON-lines captures into the same
//! shape.

use std::collections::BTreeMap;
use std::path::Path;

use airspace_models::RawStateVector;
use duckdb::{AccessMode, Config, Connection};

use crate::{DbError, validate_identifier};

/// Default observation table name.
pub const DEFAULT_TABLE: &str = "airspace";

/// Number of rows per INSERT chunk.
const CHUNK_SIZE: usize = 2_000;

/// Opens (or creates) the observation store and ensures `table` exists.
///
/// # Errors
///
/// Returns [`DbError`] if the connection or schema creation fails.
pub fn open(path: &Path, table: &str) -> Result<Connection, DbError> {
    if let Some(parent) = path.parent() {
        crate::paths::ensure_dir(parent)?;
    }

    let conn = Connection::open(path)?;
    create_schema(&conn, table)?;

    Ok(conn)
}

/// Opens an existing observation store without taking a write lock, so
/// the consumer can keep appending while enrichment runs.
///
/// # Errors
///
/// Returns [`DbError`] if the file does not exist or cannot be opened.
pub fn open_read_only(path: &Path) -> Result<Connection, DbError> {
    if !path.exists() {
        return Err(DbError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("observation store not found: {}", path.display()),
        )));
    }

    let config = Config::default().access_mode(AccessMode::ReadOnly)?;
    Ok(Connection::open_with_flags(path, config)?)
}

/// Creates the consumer's state-vector table if it does not exist.
///
/// # Errors
///
/// Returns [`DbError`] if `table` is not a plain identifier or the DDL
/// fails.
pub fn create_schema(conn: &Connection, table: &str) -> Result<(), DbError> {
    let table = validate_identifier(table)?;
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            icao24 VARCHAR(6) NOT NULL,
            callsign VARCHAR(10) NULL,
            origin_country VARCHAR(50) NULL,
            time_position INTEGER NULL,
            last_contact INTEGER NOT NULL,
            longitude DOUBLE PRECISION NULL,
            latitude DOUBLE PRECISION NULL,
            baro_altitude DOUBLE PRECISION NULL,
            on_ground BOOLEAN NOT NULL,
            velocity DOUBLE PRECISION NULL,
            true_track DOUBLE PRECISION NULL,
            vertical_rate DOUBLE PRECISION NULL,
            sensors INTEGER ARRAY NULL,
            geo_altitude DOUBLE PRECISION NULL,
            squawk VARCHAR(4) NULL,
            spi BOOLEAN NOT NULL,
            position_source INTEGER NULL,
            PRIMARY KEY (icao24, last_contact)
        );"
    ))?;

    Ok(())
}

/// Reads every state vector from `table`.
///
/// Rows come back in storage order; the pipeline does not depend on it.
///
/// # Errors
///
/// Returns [`DbError`] if the table is missing or a row cannot be decoded.
pub fn load_state_vectors(conn: &Connection, table: &str) -> Result<Vec<RawStateVector>, DbError> {
    let table = validate_identifier(table)?;
    let mut stmt = conn.prepare(&format!(
        "SELECT icao24, callsign, origin_country,
                CAST(time_position AS BIGINT), CAST(last_contact AS BIGINT),
                CAST(longitude AS DOUBLE), CAST(latitude AS DOUBLE),
                CAST(baro_altitude AS DOUBLE), on_ground,
                CAST(velocity AS DOUBLE), CAST(true_track AS DOUBLE),
                CAST(vertical_rate AS DOUBLE), CAST(sensors AS VARCHAR),
                CAST(geo_altitude AS DOUBLE), squawk, spi,
                CAST(position_source AS BIGINT)
         FROM {table}"
    ))?;
    let mut rows = stmt.query([])?;
    let mut records = Vec::new();

    while let Some(row) = rows.next()? {
        let sensors_json: Option<String> = row.get(12)?;
        let sensors = sensors_json
            .as_deref()
            .map(serde_json::from_str::<Vec<i64>>)
            .transpose()?;

        records.push(RawStateVector {
            icao24: row.get(0)?,
            callsign: row.get(1)?,
            origin_country: row.get(2)?,
            time_position: row.get(3)?,
            last_contact: row.get(4)?,
            longitude: row.get(5)?,
            latitude: row.get(6)?,
            baro_altitude: row.get(7)?,
            on_ground: row.get(8)?,
            velocity: row.get(9)?,
            true_track: row.get(10)?,
            vertical_rate: row.get(11)?,
            sensors,
            geo_altitude: row.get(13)?,
            squawk: row.get(14)?,
            spi: row.get(15)?,
            position_source: row.get(16)?,
        });
    }

    log::info!("Read {} state vectors from {table}", records.len());
    Ok(records)
}

/// Inserts state vectors with `INSERT OR REPLACE` semantics on
/// `(icao24, last_contact)`.
///
/// Records without `icao24` or `last_contact` cannot be keyed and are
/// skipped. Missing `on_ground`/`spi` flags are stored as `false`.
///
/// Returns the number of rows written.
///
/// # Errors
///
/// Returns [`DbError`] if any database operation fails.
pub fn insert_state_vectors(
    conn: &Connection,
    table: &str,
    records: &[RawStateVector],
) -> Result<u64, DbError> {
    let table = validate_identifier(table)?;

    // Deduplicate within the batch: keep last occurrence of each key
    let mut last_seen: BTreeMap<(&str, i64), usize> = BTreeMap::new();
    let mut unkeyed = 0usize;
    for (i, record) in records.iter().enumerate() {
        match (record.icao24.as_deref(), record.last_contact) {
            (Some(icao24), Some(last_contact)) => {
                last_seen.insert((icao24, last_contact), i);
            }
            _ => unkeyed += 1,
        }
    }
    if unkeyed > 0 {
        log::warn!("Skipping {unkeyed} state vectors without icao24/last_contact");
    }

    let mut indices: Vec<usize> = last_seen.into_values().collect();
    indices.sort_unstable();
    let deduped: Vec<&RawStateVector> = indices.into_iter().map(|i| &records[i]).collect();

    let mut total_inserted = 0u64;

    for chunk in deduped.chunks(CHUNK_SIZE) {
        let mut sql = format!(
            "INSERT OR REPLACE INTO {table} (
                icao24, callsign, origin_country, time_position, last_contact,
                longitude, latitude, baro_altitude, on_ground, velocity,
                true_track, vertical_rate, sensors, geo_altitude, squawk,
                spi, position_source
            ) VALUES "
        );

        for (i, _) in chunk.iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push_str(
                "(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, CAST(? AS INTEGER[]), ?, ?, ?, ?)",
            );
        }

        let mut stmt = conn.prepare(&sql)?;
        let mut param_idx = 1usize;

        for record in chunk {
            let sensors = record
                .sensors
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?;

            stmt.raw_bind_parameter(param_idx, record.icao24.as_deref())?;
            stmt.raw_bind_parameter(param_idx + 1, record.callsign.as_deref())?;
            stmt.raw_bind_parameter(param_idx + 2, record.origin_country.as_deref())?;
            stmt.raw_bind_parameter(param_idx + 3, record.time_position)?;
            stmt.raw_bind_parameter(param_idx + 4, record.last_contact)?;
            stmt.raw_bind_parameter(param_idx + 5, record.longitude)?;
            stmt.raw_bind_parameter(param_idx + 6, record.latitude)?;
            stmt.raw_bind_parameter(param_idx + 7, record.baro_altitude)?;
            stmt.raw_bind_parameter(param_idx + 8, record.on_ground.unwrap_or(false))?;
            stmt.raw_bind_parameter(param_idx + 9, record.velocity)?;
            stmt.raw_bind_parameter(param_idx + 10, record.true_track)?;
            stmt.raw_bind_parameter(param_idx + 11, record.vertical_rate)?;
            stmt.raw_bind_parameter(param_idx + 12, sensors.as_deref())?;
            stmt.raw_bind_parameter(param_idx + 13, record.geo_altitude)?;
            stmt.raw_bind_parameter(param_idx + 14, record.squawk.as_deref())?;
            stmt.raw_bind_parameter(param_idx + 15, record.spi.unwrap_or(false))?;
            stmt.raw_bind_parameter(param_idx + 16, record.position_source)?;

            param_idx += 17;
        }

        let rows = stmt.raw_execute()?;
        total_inserted += u64::try_from(rows).unwrap_or(0);
        log::info!("Batch committed. Total records inserted: {total_inserted}");
    }

    Ok(total_inserted)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector(icao24: &str, last_contact: i64, lat: Option<f64>) -> RawStateVector {
        RawStateVector {
            icao24: Some(icao24.to_string()),
            callsign: Some("SKW5501 ".to_string()),
            origin_country: Some("United States".to_string()),
            time_position: Some(last_contact - 1),
            last_contact: Some(last_contact),
            longitude: Some(-111.5),
            latitude: lat,
            baro_altitude: Some(10_000.0),
            on_ground: Some(false),
            velocity: Some(220.0),
            true_track: Some(90.0),
            vertical_rate: Some(0.0),
            sensors: Some(vec![1, 2]),
            geo_altitude: Some(10_100.0),
            squawk: Some("1200".to_string()),
            spi: Some(false),
            position_source: Some(0),
        }
    }

    #[test]
    fn round_trips_state_vectors() {
        let conn = Connection::open_in_memory().unwrap();
        create_schema(&conn, DEFAULT_TABLE).unwrap();

        let records = vec![vector("a1b2c3", 100, Some(40.0)), vector("d4e5f6", 101, None)];
        let inserted = insert_state_vectors(&conn, DEFAULT_TABLE, &records).unwrap();
        assert_eq!(inserted, 2);

        let mut loaded = load_state_vectors(&conn, DEFAULT_TABLE).unwrap();
        loaded.sort_by(|a, b| a.icao24.cmp(&b.icao24));
        assert_eq!(loaded, records);
    }

    #[test]
    fn replaces_rows_with_same_key() {
        let conn = Connection::open_in_memory().unwrap();
        create_schema(&conn, DEFAULT_TABLE).unwrap();

        insert_state_vectors(&conn, DEFAULT_TABLE, &[vector("a1b2c3", 100, Some(40.0))]).unwrap();
        insert_state_vectors(&conn, DEFAULT_TABLE, &[vector("a1b2c3", 100, Some(41.0))]).unwrap();

        let loaded = load_state_vectors(&conn, DEFAULT_TABLE).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].latitude, Some(41.0));
    }

    #[test]
    fn skips_records_without_key() {
        let conn = Connection::open_in_memory().unwrap();
        create_schema(&conn, DEFAULT_TABLE).unwrap();

        let mut unkeyed = vector("a1b2c3", 100, Some(40.0));
        unkeyed.last_contact = None;
        let inserted = insert_state_vectors(
            &conn,
            DEFAULT_TABLE,
            &[unkeyed, vector("d4e5f6", 100, Some(40.0))],
        )
        .unwrap();

        assert_eq!(inserted, 1);
    }

    #[test]
    fn missing_table_is_an_error() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(load_state_vectors(&conn, "no_such_table").is_err());
    }

    #[test]
    fn read_only_open_requires_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = open_read_only(&dir.path().join("missing.duckdb")).unwrap_err();
        assert!(matches!(err, DbError::Io(_)));
    }
}
