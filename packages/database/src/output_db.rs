//! Enriched output tables in `DuckDB`.
//!
//! A run replaces three tables wholesale inside one transaction, so a
//! failed run leaves the previous outputs intact and re-running on the
//! same input produces identical tables:
//!
//! - `enriched_observations`: every valid observation plus `region_id`
//! - `enriched_regions`: every catalog region with its `GeoJSON` boundary,
//!   area, and rates
//! - `transitions`: every `ENTRY`/`EXIT` event
//!
//! Geometry is stored as `GeoJSON` TEXT (no spatial extension needed).

use std::path::Path;

use airspace_models::{EnrichedObservation, EnrichedRegion, TransitionEvent, epoch_to_datetime};
use duckdb::Connection;

use crate::DbError;

/// Number of rows per INSERT chunk.
const CHUNK_SIZE: usize = 5_000;

/// Parquet file names, matching the tables written by [`write_outputs`].
pub const PARQUET_FILES: [(&str, &str); 3] = [
    ("enriched_observations", "opensky_enriched.parquet"),
    ("enriched_regions", "airspace_enriched.parquet"),
    ("transitions", "transitions.parquet"),
];

/// Row counts written by [`write_outputs`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteCounts {
    pub observations: u64,
    pub regions: u64,
    pub transitions: u64,
}

/// Opens (or creates) the output `DuckDB`.
///
/// # Errors
///
/// Returns [`DbError`] if the parent directory or connection cannot be
/// created.
pub fn open(path: &Path) -> Result<Connection, DbError> {
    if let Some(parent) = path.parent() {
        crate::paths::ensure_dir(parent)?;
    }

    let conn = Connection::open(path)?;
    conn.execute_batch("SET threads = 4; SET memory_limit = '512MB';")?;

    Ok(conn)
}

fn create_schema(conn: &Connection) -> Result<(), DbError> {
    conn.execute_batch(
        "CREATE OR REPLACE TABLE enriched_observations (
            icao24 TEXT NOT NULL,
            callsign TEXT,
            origin_country TEXT,
            time_position BIGINT NOT NULL,
            datetime TIMESTAMP,
            last_contact BIGINT,
            longitude DOUBLE NOT NULL,
            latitude DOUBLE NOT NULL,
            altitude DOUBLE,
            geo_altitude DOUBLE,
            on_ground BOOLEAN,
            velocity DOUBLE,
            true_track DOUBLE,
            vertical_rate DOUBLE,
            squawk TEXT,
            region_id TEXT NOT NULL
        );

        CREATE OR REPLACE TABLE enriched_regions (
            region_id TEXT PRIMARY KEY,
            catalog_index INTEGER NOT NULL,
            boundary_geojson TEXT NOT NULL,
            area_sq_mi DOUBLE NOT NULL,
            degenerate BOOLEAN NOT NULL,
            window_start BIGINT NOT NULL,
            window_end BIGINT NOT NULL,
            window_hours DOUBLE NOT NULL,
            entrance_count BIGINT NOT NULL,
            exit_count BIGINT NOT NULL,
            event_count BIGINT NOT NULL,
            entrance_rate DOUBLE,
            exit_rate DOUBLE,
            event_rate DOUBLE
        );

        CREATE OR REPLACE TABLE transitions (
            icao24 TEXT NOT NULL,
            callsign TEXT,
            time_position BIGINT NOT NULL,
            datetime TIMESTAMP,
            kind TEXT NOT NULL,
            region_id TEXT NOT NULL,
            previous_region_id TEXT,
            next_region_id TEXT NOT NULL
        );",
    )?;

    Ok(())
}

/// Replaces all three output tables with the given rows.
///
/// # Errors
///
/// Returns [`DbError`] if any statement fails; the transaction is rolled
/// back and previous outputs are kept.
pub fn write_outputs(
    conn: &mut Connection,
    observations: &[EnrichedObservation],
    regions: &[EnrichedRegion],
    transitions: &[TransitionEvent],
) -> Result<WriteCounts, DbError> {
    let tx = conn.transaction()?;

    create_schema(&tx)?;
    let counts = WriteCounts {
        observations: insert_observations(&tx, observations)?,
        regions: insert_regions(&tx, regions)?,
        transitions: insert_transitions(&tx, transitions)?,
    };

    tx.commit()?;

    log::info!(
        "Wrote {} enriched observations, {} regions, {} transitions",
        counts.observations,
        counts.regions,
        counts.transitions
    );

    Ok(counts)
}

/// Copies each output table to a Parquet file in `dir`.
///
/// # Errors
///
/// Returns [`DbError`] if the directory cannot be created or a `COPY`
/// fails (for example when the Parquet extension is unavailable).
pub fn export_parquet(conn: &Connection, dir: &Path) -> Result<(), DbError> {
    crate::paths::ensure_dir(dir)?;

    for (table, file_name) in PARQUET_FILES {
        let path = dir.join(file_name);
        let escaped = path.display().to_string().replace('\'', "''");
        conn.execute_batch(&format!(
            "COPY {table} TO '{escaped}' (FORMAT PARQUET);"
        ))?;
        log::info!("Exported {table} to {}", path.display());
    }

    Ok(())
}

/// Returns the number of rows in an output table.
///
/// # Errors
///
/// Returns [`DbError`] if `table` is not an identifier or the query fails.
pub fn count_rows(conn: &Connection, table: &str) -> Result<u64, DbError> {
    let table = crate::validate_identifier(table)?;
    let mut stmt = conn.prepare(&format!("SELECT COUNT(*) FROM {table}"))?;
    let count: i64 = stmt.query_row([], |row| row.get(0))?;
    Ok(u64::try_from(count).unwrap_or(0))
}

fn format_datetime(timestamp: i64) -> Option<String> {
    epoch_to_datetime(timestamp).map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn placeholders(row: &str, count: usize) -> String {
    let mut sql = String::with_capacity((row.len() + 2) * count);
    for i in 0..count {
        if i > 0 {
            sql.push_str(", ");
        }
        sql.push_str(row);
    }
    sql
}

fn insert_observations(
    conn: &Connection,
    observations: &[EnrichedObservation],
) -> Result<u64, DbError> {
    let mut total = 0u64;

    for chunk in observations.chunks(CHUNK_SIZE) {
        let sql = format!(
            "INSERT INTO enriched_observations (
                icao24, callsign, origin_country, time_position, datetime,
                last_contact, longitude, latitude, altitude, geo_altitude,
                on_ground, velocity, true_track, vertical_rate, squawk, region_id
            ) VALUES {}",
            placeholders("(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)", chunk.len())
        );

        let mut stmt = conn.prepare(&sql)?;
        let mut param_idx = 1usize;

        for enriched in chunk {
            let obs = &enriched.observation;
            stmt.raw_bind_parameter(param_idx, obs.icao24.as_str())?;
            stmt.raw_bind_parameter(param_idx + 1, obs.callsign.as_deref())?;
            stmt.raw_bind_parameter(param_idx + 2, obs.origin_country.as_deref())?;
            stmt.raw_bind_parameter(param_idx + 3, obs.timestamp)?;
            stmt.raw_bind_parameter(param_idx + 4, format_datetime(obs.timestamp))?;
            stmt.raw_bind_parameter(param_idx + 5, obs.last_contact)?;
            stmt.raw_bind_parameter(param_idx + 6, obs.longitude)?;
            stmt.raw_bind_parameter(param_idx + 7, obs.latitude)?;
            stmt.raw_bind_parameter(param_idx + 8, obs.altitude)?;
            stmt.raw_bind_parameter(param_idx + 9, obs.geo_altitude)?;
            stmt.raw_bind_parameter(param_idx + 10, obs.on_ground)?;
            stmt.raw_bind_parameter(param_idx + 11, obs.velocity)?;
            stmt.raw_bind_parameter(param_idx + 12, obs.heading)?;
            stmt.raw_bind_parameter(param_idx + 13, obs.vertical_rate)?;
            stmt.raw_bind_parameter(param_idx + 14, obs.squawk.as_deref())?;
            stmt.raw_bind_parameter(param_idx + 15, enriched.region_id.as_str())?;
            param_idx += 16;
        }

        let rows = stmt.raw_execute()?;
        total += u64::try_from(rows).unwrap_or(0);
    }

    Ok(total)
}

fn insert_regions(conn: &Connection, regions: &[EnrichedRegion]) -> Result<u64, DbError> {
    let mut total = 0u64;

    for chunk in regions.chunks(CHUNK_SIZE) {
        let sql = format!(
            "INSERT INTO enriched_regions (
                region_id, catalog_index, boundary_geojson, area_sq_mi, degenerate,
                window_start, window_end, window_hours,
                entrance_count, exit_count, event_count,
                entrance_rate, exit_rate, event_rate
            ) VALUES {}",
            placeholders("(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)", chunk.len())
        );

        let mut stmt = conn.prepare(&sql)?;
        let mut param_idx = 1usize;

        for region in chunk {
            let rate = &region.rate;
            let catalog_index = i32::try_from(region.catalog_index).unwrap_or(i32::MAX);

            stmt.raw_bind_parameter(param_idx, region.region_id.as_str())?;
            stmt.raw_bind_parameter(param_idx + 1, catalog_index)?;
            stmt.raw_bind_parameter(param_idx + 2, region.boundary_geojson.as_str())?;
            stmt.raw_bind_parameter(param_idx + 3, region.area_sq_mi)?;
            stmt.raw_bind_parameter(param_idx + 4, region.degenerate)?;
            stmt.raw_bind_parameter(param_idx + 5, rate.window.start)?;
            stmt.raw_bind_parameter(param_idx + 6, rate.window.end)?;
            stmt.raw_bind_parameter(param_idx + 7, rate.window.hours())?;
            stmt.raw_bind_parameter(param_idx + 8, to_i64(rate.entrance_count))?;
            stmt.raw_bind_parameter(param_idx + 9, to_i64(rate.exit_count))?;
            stmt.raw_bind_parameter(param_idx + 10, to_i64(rate.event_count))?;
            stmt.raw_bind_parameter(param_idx + 11, rate.entrance_rate)?;
            stmt.raw_bind_parameter(param_idx + 12, rate.exit_rate)?;
            stmt.raw_bind_parameter(param_idx + 13, rate.event_rate)?;
            param_idx += 14;
        }

        let rows = stmt.raw_execute()?;
        total += u64::try_from(rows).unwrap_or(0);
    }

    Ok(total)
}

fn insert_transitions(conn: &Connection, transitions: &[TransitionEvent]) -> Result<u64, DbError> {
    let mut total = 0u64;

    for chunk in transitions.chunks(CHUNK_SIZE) {
        let sql = format!(
            "INSERT INTO transitions (
                icao24, callsign, time_position, datetime, kind,
                region_id, previous_region_id, next_region_id
            ) VALUES {}",
            placeholders("(?, ?, ?, ?, ?, ?, ?, ?)", chunk.len())
        );

        let mut stmt = conn.prepare(&sql)?;
        let mut param_idx = 1usize;

        for event in chunk {
            stmt.raw_bind_parameter(param_idx, event.icao24.as_str())?;
            stmt.raw_bind_parameter(param_idx + 1, event.callsign.as_deref())?;
            stmt.raw_bind_parameter(param_idx + 2, event.timestamp)?;
            stmt.raw_bind_parameter(param_idx + 3, format_datetime(event.timestamp))?;
            stmt.raw_bind_parameter(param_idx + 4, event.kind.as_ref())?;
            stmt.raw_bind_parameter(param_idx + 5, event.region_id.as_str())?;
            stmt.raw_bind_parameter(
                param_idx + 6,
                event.previous_region_id.as_ref().map(|r| r.as_str()),
            )?;
            stmt.raw_bind_parameter(param_idx + 7, event.next_region_id.as_str())?;
            param_idx += 8;
        }

        let rows = stmt.raw_execute()?;
        total += u64::try_from(rows).unwrap_or(0);
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use airspace_models::{
        AircraftObservation, OUTSIDE_LABEL, RateWindow, RegionId, RegionRate, TransitionKind,
    };

    fn observation(icao24: &str, timestamp: i64, region_id: RegionId) -> EnrichedObservation {
        EnrichedObservation {
            observation: AircraftObservation {
                icao24: icao24.to_string(),
                timestamp,
                latitude: 40.0,
                longitude: -111.0,
                altitude: Some(9_000.0),
                velocity: None,
                heading: Some(45.0),
                callsign: Some("DAL42".to_string()),
                origin_country: None,
                on_ground: Some(false),
                vertical_rate: None,
                geo_altitude: None,
                squawk: None,
                last_contact: Some(timestamp),
            },
            region_id,
        }
    }

    fn region(id: &str, degenerate: bool) -> EnrichedRegion {
        EnrichedRegion {
            region_id: id.to_string(),
            catalog_index: 0,
            boundary_geojson: r#"{"type":"MultiPolygon","coordinates":[]}"#.to_string(),
            area_sq_mi: if degenerate { 0.0 } else { 1_000.0 },
            degenerate,
            rate: RegionRate {
                region_id: id.to_string(),
                window: RateWindow::from_span(0, 3600),
                entrance_count: 2,
                exit_count: 1,
                event_count: 3,
                entrance_rate: (!degenerate).then_some(0.002),
                exit_rate: (!degenerate).then_some(0.001),
                event_rate: (!degenerate).then_some(0.003),
            },
        }
    }

    fn transition(timestamp: i64, kind: TransitionKind) -> TransitionEvent {
        TransitionEvent {
            icao24: "a1b2c3".to_string(),
            callsign: None,
            timestamp,
            kind,
            region_id: RegionId::Outside,
            previous_region_id: None,
            next_region_id: RegionId::Outside,
        }
    }

    #[test]
    fn writes_all_three_tables() {
        let mut conn = Connection::open_in_memory().unwrap();
        let counts = write_outputs(
            &mut conn,
            &[
                observation("a1b2c3", 0, RegionId::region("ZLC")),
                observation("a1b2c3", 10, RegionId::Outside),
            ],
            &[region("ZLC", false), region("FLAT", true)],
            &[transition(0, TransitionKind::Entry)],
        )
        .unwrap();

        assert_eq!(
            counts,
            WriteCounts {
                observations: 2,
                regions: 2,
                transitions: 1,
            }
        );
        assert_eq!(count_rows(&conn, "enriched_observations").unwrap(), 2);

        let outside: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM enriched_observations WHERE region_id = ?",
                [OUTSIDE_LABEL],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(outside, 1);

        let rate: Option<f64> = conn
            .query_row(
                "SELECT event_rate FROM enriched_regions WHERE region_id = 'FLAT'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(rate, None);

        let (kind, previous): (String, Option<String>) = conn
            .query_row("SELECT kind, previous_region_id FROM transitions", [], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .unwrap();
        assert_eq!(kind, "ENTRY");
        assert_eq!(previous, None);
    }

    #[test]
    fn rewriting_replaces_previous_rows() {
        let mut conn = Connection::open_in_memory().unwrap();
        let observations = vec![observation("a1b2c3", 0, RegionId::region("ZLC"))];

        write_outputs(&mut conn, &observations, &[], &[]).unwrap();
        write_outputs(&mut conn, &observations, &[], &[]).unwrap();

        assert_eq!(count_rows(&conn, "enriched_observations").unwrap(), 1);
        assert_eq!(count_rows(&conn, "transitions").unwrap(), 0);
    }

    #[test]
    fn opens_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.duckdb");
        let mut conn = open(&path).unwrap();
        write_outputs(&mut conn, &[], &[region("ZDV", false)], &[]).unwrap();
        assert!(path.exists());
        assert_eq!(count_rows(&conn, "enriched_regions").unwrap(), 1);
    }
}
