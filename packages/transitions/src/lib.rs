#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Region transition detection and rate aggregation.
//!
//! [`tracker`] turns region-labelled observations into per-aircraft
//! `ENTRY`/`EXIT` events; [`rates`] counts those events per region over a
//! time window and normalizes them by region area.

pub mod rates;
pub mod tracker;

pub use rates::aggregate;
pub use tracker::{OccupancyState, TrackingOutcome, detect_transitions};
