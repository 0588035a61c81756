#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Airspace region catalog and point-in-polygon region assignment.
//!
//! Loads the static region polygons once, builds an R-tree over their
//! bounding boxes, and labels each aircraft position with the first
//! region (in catalog order) that contains it, or
//! [`RegionId::Outside`] when none does.
//!
//! [`SpatialAssigner`] holds no mutable state, so it can be shared across
//! threads and queried for every observation in parallel.

pub mod catalog;

pub use catalog::{Region, RegionCatalog};

use airspace_models::{AircraftObservation, RegionId};
use geo::{Intersects, MultiPolygon};
use rstar::{AABB, RTree, RTreeObject};
use thiserror::Error;

/// Failures loading the region catalog. Every variant means region data
/// is unavailable and the run cannot proceed.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The geometry source could not be read.
    #[error("Failed to read region source {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The geometry source is not valid `GeoJSON`.
    #[error("Malformed region GeoJSON: {message}")]
    Parse { message: String },

    /// The geometry source contained no regions.
    #[error("Region source contains no regions")]
    Empty,

    /// A feature lacks the identifier property.
    #[error("Region feature {index} has no '{property}' identifier")]
    MissingIdentifier { index: usize, property: String },

    /// Two features share an identifier.
    #[error("Duplicate region identifier: {id}")]
    DuplicateIdentifier { id: String },

    /// A feature uses the outside sentinel as its identifier.
    #[error("Region identifier '{id}' is reserved")]
    ReservedIdentifier { id: String },

    /// A feature's geometry is not a polygon or multipolygon.
    #[error("Region {id} has unsupported geometry type {kind}")]
    UnsupportedGeometry { id: String, kind: &'static str },
}

/// A region polygon stored in the R-tree with its catalog position.
struct RegionEntry {
    id: String,
    catalog_index: usize,
    envelope: AABB<[f64; 2]>,
    polygon: MultiPolygon<f64>,
}

impl RTreeObject for RegionEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Pre-built spatial index over a [`RegionCatalog`].
pub struct SpatialAssigner {
    regions: RTree<RegionEntry>,
}

impl SpatialAssigner {
    /// Builds the R-tree index from the catalog.
    #[must_use]
    pub fn new(catalog: &RegionCatalog) -> Self {
        let entries = catalog
            .regions()
            .iter()
            .enumerate()
            .map(|(catalog_index, region)| RegionEntry {
                id: region.id.clone(),
                catalog_index,
                envelope: compute_envelope(&region.polygon),
                polygon: region.polygon.clone(),
            })
            .collect();

        let regions = RTree::bulk_load(entries);
        log::debug!("Built region index with {} entries", regions.size());

        Self { regions }
    }

    /// Returns the region containing `(lng, lat)`.
    ///
    /// Points on a boundary count as inside. When regions overlap, the one
    /// earliest in catalog order wins; the R-tree yields candidates in
    /// arbitrary order so the lowest catalog index is selected explicitly.
    #[must_use]
    pub fn assign(&self, lng: f64, lat: f64) -> RegionId {
        let point = geo::Point::new(lng, lat);
        let query_env = AABB::from_point([lng, lat]);

        self.regions
            .locate_in_envelope_intersecting(&query_env)
            .filter(|entry| entry.polygon.intersects(&point))
            .min_by_key(|entry| entry.catalog_index)
            .map_or(RegionId::Outside, |entry| RegionId::region(entry.id.clone()))
    }

    /// Returns the region containing the observation's position.
    #[must_use]
    pub fn assign_observation(&self, observation: &AircraftObservation) -> RegionId {
        self.assign(observation.longitude, observation.latitude)
    }
}

/// Compute the bounding box envelope for a [`MultiPolygon`].
fn compute_envelope(mp: &MultiPolygon<f64>) -> AABB<[f64; 2]> {
    use geo::BoundingRect;

    mp.bounding_rect().map_or_else(
        || AABB::from_point([0.0, 0.0]),
        |rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
    )
}
