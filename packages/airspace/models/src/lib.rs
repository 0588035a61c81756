#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Aircraft observation, airspace region, and transition event types.
//!
//! These types are shared by every stage of the enrichment pipeline: raw
//! `OpenSky` state vectors come in, are validated into
//! [`AircraftObservation`]s, labelled with a [`RegionId`], and reduced to
//! [`TransitionEvent`]s and per-region [`RegionRate`]s.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;

/// Label used for observations that fall inside no tracked region.
pub const OUTSIDE_LABEL: &str = "Outside National Airspace";

/// Number of fixed airspace regions a complete catalog contains.
pub const DEFAULT_REGION_COUNT: usize = 20;

const SECONDS_PER_HOUR: f64 = 3600.0;

/// Region assignment for a single observation.
///
/// Either a named catalog region or the [`RegionId::Outside`] sentinel.
/// Serializes as a plain string; the sentinel uses [`OUTSIDE_LABEL`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum RegionId {
    /// A region from the catalog, by identifier (e.g. `"ZDV"`).
    Region(String),
    /// Not inside any tracked region.
    Outside,
}

impl RegionId {
    /// Creates a region identifier.
    #[must_use]
    pub fn region(id: impl Into<String>) -> Self {
        Self::Region(id.into())
    }

    /// Returns `true` for the [`RegionId::Outside`] sentinel.
    #[must_use]
    pub const fn is_outside(&self) -> bool {
        matches!(self, Self::Outside)
    }

    /// Returns the string form, [`OUTSIDE_LABEL`] for the sentinel.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Region(id) => id,
            Self::Outside => OUTSIDE_LABEL,
        }
    }
}

impl std::fmt::Display for RegionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for RegionId {
    fn from(value: String) -> Self {
        if value == OUTSIDE_LABEL {
            Self::Outside
        } else {
            Self::Region(value)
        }
    }
}

impl From<RegionId> for String {
    fn from(value: RegionId) -> Self {
        match value {
            RegionId::Region(id) => id,
            RegionId::Outside => OUTSIDE_LABEL.to_string(),
        }
    }
}

/// An `OpenSky` state vector exactly as it arrives from the observation
/// store. Every field is nullable; see [`AircraftObservation`] for the
/// validated form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawStateVector {
    /// ICAO 24-bit transponder address (hex string).
    pub icao24: Option<String>,
    /// Callsign, space-padded to 8 characters by `OpenSky`.
    pub callsign: Option<String>,
    /// Country inferred from the ICAO address.
    pub origin_country: Option<String>,
    /// Epoch seconds of the last position update.
    pub time_position: Option<i64>,
    /// Epoch seconds of the last message of any kind.
    pub last_contact: Option<i64>,
    /// WGS84 longitude in degrees.
    pub longitude: Option<f64>,
    /// WGS84 latitude in degrees.
    pub latitude: Option<f64>,
    /// Barometric altitude in meters.
    pub baro_altitude: Option<f64>,
    /// Whether the position came from a surface report.
    pub on_ground: Option<bool>,
    /// Ground speed in m/s.
    pub velocity: Option<f64>,
    /// True track in degrees clockwise from north.
    pub true_track: Option<f64>,
    /// Vertical rate in m/s.
    pub vertical_rate: Option<f64>,
    /// Receiver IDs that contributed to this state vector.
    pub sensors: Option<Vec<i64>>,
    /// Geometric altitude in meters.
    pub geo_altitude: Option<f64>,
    /// Transponder code.
    pub squawk: Option<String>,
    /// Special purpose indicator.
    pub spi: Option<bool>,
    /// Origin of the position (0 ADS-B, 1 ASTERIX, 2 MLAT, 3 FLARM).
    pub position_source: Option<i64>,
}

/// A record rejected during validation. Skipped and logged, never fatal.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ObservationError {
    /// A mandatory field (id, timestamp, latitude, longitude) is null.
    #[error("Malformed observation {icao24}: missing {field}")]
    MissingField {
        /// Aircraft identifier, or `"<unknown>"` when the id itself is missing.
        icao24: String,
        /// Name of the missing field.
        field: &'static str,
    },

    /// Latitude/longitude outside the WGS84 range or not finite.
    #[error("Malformed observation {icao24}: invalid coordinate ({latitude}, {longitude})")]
    InvalidCoordinate {
        /// Aircraft identifier.
        icao24: String,
        /// Reported latitude.
        latitude: f64,
        /// Reported longitude.
        longitude: f64,
    },
}

/// A validated, immutable aircraft position report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AircraftObservation {
    /// Lowercase ICAO 24-bit address.
    pub icao24: String,
    /// Position timestamp in epoch seconds.
    pub timestamp: i64,
    /// WGS84 latitude in degrees.
    pub latitude: f64,
    /// WGS84 longitude in degrees.
    pub longitude: f64,
    /// Altitude in meters (barometric, falling back to geometric).
    pub altitude: Option<f64>,
    /// Ground speed in m/s.
    pub velocity: Option<f64>,
    /// True track in degrees.
    pub heading: Option<f64>,
    /// Trimmed callsign; `None` when blank.
    pub callsign: Option<String>,
    pub origin_country: Option<String>,
    pub on_ground: Option<bool>,
    pub vertical_rate: Option<f64>,
    pub geo_altitude: Option<f64>,
    pub squawk: Option<String>,
    pub last_contact: Option<i64>,
}

impl TryFrom<RawStateVector> for AircraftObservation {
    type Error = ObservationError;

    fn try_from(raw: RawStateVector) -> Result<Self, Self::Error> {
        let icao24 = raw
            .icao24
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_ascii_lowercase)
            .ok_or_else(|| ObservationError::MissingField {
                icao24: "<unknown>".to_string(),
                field: "icao24",
            })?;

        let missing = |field| ObservationError::MissingField {
            icao24: icao24.clone(),
            field,
        };

        let timestamp = raw.time_position.ok_or_else(|| missing("time_position"))?;
        let latitude = raw.latitude.ok_or_else(|| missing("latitude"))?;
        let longitude = raw.longitude.ok_or_else(|| missing("longitude"))?;

        if !latitude.is_finite()
            || !longitude.is_finite()
            || !(-90.0..=90.0).contains(&latitude)
            || !(-180.0..=180.0).contains(&longitude)
        {
            return Err(ObservationError::InvalidCoordinate {
                icao24,
                latitude,
                longitude,
            });
        }

        let callsign = raw
            .callsign
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Ok(Self {
            icao24,
            timestamp,
            latitude,
            longitude,
            altitude: raw.baro_altitude.or(raw.geo_altitude),
            velocity: raw.velocity,
            heading: raw.true_track,
            callsign,
            origin_country: raw.origin_country,
            on_ground: raw.on_ground,
            vertical_rate: raw.vertical_rate,
            geo_altitude: raw.geo_altitude,
            squawk: raw.squawk,
            last_contact: raw.last_contact,
        })
    }
}

/// An observation labelled with exactly one region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedObservation {
    #[serde(flatten)]
    pub observation: AircraftObservation,
    pub region_id: RegionId,
}

/// Direction of a region transition.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum TransitionKind {
    /// Aircraft observed inside a region it was not in before.
    Entry,
    /// Aircraft observed leaving the region it was in.
    Exit,
}

/// A discrete region change for one aircraft.
///
/// A change from `R` to `R'` produces an `EXIT` for `R` followed by an
/// `ENTRY` for `R'`, both stamped with the timestamp of the observation
/// that revealed the change. Both events carry
/// `previous_region_id = R` and `next_region_id = R'`. The first
/// observation of an aircraft produces a single `ENTRY` with no previous
/// region.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransitionEvent {
    pub icao24: String,
    pub callsign: Option<String>,
    pub timestamp: i64,
    pub kind: TransitionKind,
    /// The region this event is about: the one entered or exited.
    pub region_id: RegionId,
    /// Region occupied before the triggering observation.
    pub previous_region_id: Option<RegionId>,
    /// Region occupied after the triggering observation.
    pub next_region_id: RegionId,
}

/// Closed time interval `[start, end]` in epoch seconds over which rates
/// are computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateWindow {
    pub start: i64,
    pub end: i64,
}

impl RateWindow {
    /// Window spanning the earliest to the latest timestamp.
    #[must_use]
    pub const fn from_span(min_timestamp: i64, max_timestamp: i64) -> Self {
        if min_timestamp <= max_timestamp {
            Self {
                start: min_timestamp,
                end: max_timestamp,
            }
        } else {
            Self {
                start: max_timestamp,
                end: min_timestamp,
            }
        }
    }

    /// Window of `hours` ending at `end`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn trailing(end: i64, hours: f64) -> Self {
        let seconds = (hours.max(0.0) * SECONDS_PER_HOUR).round() as i64;
        Self {
            start: end.saturating_sub(seconds),
            end,
        }
    }

    /// Duration in hours. Computed on the absolute difference so bounds
    /// from corrupt timestamps cannot overflow.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub const fn hours(&self) -> f64 {
        self.end.abs_diff(self.start) as f64 / SECONDS_PER_HOUR
    }

    #[must_use]
    pub const fn contains(&self, timestamp: i64) -> bool {
        timestamp >= self.start && timestamp <= self.end
    }
}

/// Entrance/exit activity for one region over a [`RateWindow`].
///
/// Rates are events per hour per square mile. They are `None` when the
/// region is degenerate (non-positive area) or the window has no length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionRate {
    pub region_id: String,
    pub window: RateWindow,
    pub entrance_count: u64,
    pub exit_count: u64,
    /// `entrance_count + exit_count`.
    pub event_count: u64,
    pub entrance_rate: Option<f64>,
    pub exit_rate: Option<f64>,
    pub event_rate: Option<f64>,
}

/// A catalog region joined with its rates, ready for output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedRegion {
    pub region_id: String,
    /// Position in catalog order (tie-break order for overlaps).
    pub catalog_index: usize,
    /// Region boundary as a `GeoJSON` geometry string.
    pub boundary_geojson: String,
    pub area_sq_mi: f64,
    /// Zero/invalid area; excluded from rate normalization.
    pub degenerate: bool,
    pub rate: RegionRate,
}

/// Converts epoch seconds to a UTC date-time.
#[must_use]
pub fn epoch_to_datetime(timestamp: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(timestamp, 0)
}
