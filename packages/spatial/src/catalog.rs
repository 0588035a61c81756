//! Static airspace region catalog.
//!
//! Loads named region polygons from a `GeoJSON` `FeatureCollection` and
//! keeps them in file order. That order is the tie-break for overlapping
//! regions, so it must never be re-sorted after load.

use std::collections::BTreeSet;
use std::path::Path;

use airspace_models::OUTSIDE_LABEL;
use geo::{ChamberlainDuquetteArea, MultiPolygon};
use geojson::{Feature, GeoJson};

use crate::CatalogError;

const SQ_METERS_PER_SQ_MILE: f64 = 2_589_988.110_336;

/// Areas below this (about a quarter square meter) are rounding noise
/// from flat rings.
const MIN_AREA_SQ_MI: f64 = 1e-7;

/// One airspace region with its boundary and computed area.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    /// Stable identifier (e.g. `"ZDV"`).
    pub id: String,
    pub polygon: MultiPolygon<f64>,
    /// Spherical area in square miles.
    pub area_sq_mi: f64,
}

impl Region {
    /// Creates a region and computes its area from the polygon.
    #[must_use]
    pub fn new(id: impl Into<String>, polygon: MultiPolygon<f64>) -> Self {
        let area_sq_mi = polygon.chamberlain_duquette_unsigned_area() / SQ_METERS_PER_SQ_MILE;
        Self {
            id: id.into(),
            polygon,
            area_sq_mi,
        }
    }

    /// Zero, negligible, or non-finite area. Such regions still take part in
    /// assignment but are excluded from rate normalization.
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        !self.area_sq_mi.is_finite() || self.area_sq_mi < MIN_AREA_SQ_MI
    }

    /// The boundary serialized as a `GeoJSON` geometry.
    #[must_use]
    pub fn boundary_geojson(&self) -> String {
        geojson::Geometry::new(geojson::Value::from(&self.polygon)).to_string()
    }
}

/// Ordered, immutable set of regions.
#[derive(Debug, Clone)]
pub struct RegionCatalog {
    regions: Vec<Region>,
}

impl RegionCatalog {
    /// Reads a `GeoJSON` file and builds the catalog.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] if the file cannot be read or its contents
    /// do not form a valid, non-empty region set.
    pub fn load(path: &Path, id_property: &str) -> Result<Self, CatalogError> {
        let contents = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let catalog = Self::from_geojson_str(&contents, id_property)?;
        log::info!(
            "Loaded {} airspace regions from {}",
            catalog.len(),
            path.display()
        );
        Ok(catalog)
    }

    /// Parses a `GeoJSON` `FeatureCollection` (or single `Feature`) whose
    /// features carry the region identifier in `id_property`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on malformed `GeoJSON`, a feature without an
    /// identifier, non-polygonal geometry, or an invalid region set.
    pub fn from_geojson_str(geojson_str: &str, id_property: &str) -> Result<Self, CatalogError> {
        let geojson: GeoJson = geojson_str.parse().map_err(|e: geojson::Error| {
            CatalogError::Parse {
                message: e.to_string(),
            }
        })?;

        let features = match geojson {
            GeoJson::FeatureCollection(collection) => collection.features,
            GeoJson::Feature(feature) => vec![feature],
            GeoJson::Geometry(_) => {
                return Err(CatalogError::Parse {
                    message: "expected a FeatureCollection, found a bare Geometry".to_string(),
                });
            }
        };

        let regions = features
            .into_iter()
            .enumerate()
            .map(|(index, feature)| feature_to_region(index, feature, id_property))
            .collect::<Result<Vec<_>, _>>()?;

        Self::from_regions(regions)
    }

    /// Builds a catalog from regions already in memory, preserving order.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] if the set is empty, an identifier repeats,
    /// or an identifier collides with the outside sentinel.
    pub fn from_regions(regions: Vec<Region>) -> Result<Self, CatalogError> {
        if regions.is_empty() {
            return Err(CatalogError::Empty);
        }

        let mut seen = BTreeSet::new();
        for region in &regions {
            if region.id == OUTSIDE_LABEL {
                return Err(CatalogError::ReservedIdentifier {
                    id: region.id.clone(),
                });
            }
            if !seen.insert(region.id.as_str()) {
                return Err(CatalogError::DuplicateIdentifier {
                    id: region.id.clone(),
                });
            }
            if region.is_degenerate() {
                log::warn!(
                    "Region {} has degenerate area ({}); it will have no normalized rates",
                    region.id,
                    region.area_sq_mi
                );
            }
        }

        Ok(Self { regions })
    }

    /// Regions in catalog order.
    #[must_use]
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Looks up a region by identifier.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Region> {
        self.regions.iter().find(|r| r.id == id)
    }

    /// Number of regions with degenerate area.
    #[must_use]
    pub fn degenerate_count(&self) -> usize {
        self.regions.iter().filter(|r| r.is_degenerate()).count()
    }
}

fn feature_to_region(
    index: usize,
    feature: Feature,
    id_property: &str,
) -> Result<Region, CatalogError> {
    let id = feature
        .property(id_property)
        .and_then(|value| match value {
            serde_json::Value::String(s) => Some(s.trim().to_string()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .filter(|s| !s.is_empty())
        .ok_or_else(|| CatalogError::MissingIdentifier {
            index,
            property: id_property.to_string(),
        })?;

    let Some(geometry) = feature.geometry else {
        return Err(CatalogError::UnsupportedGeometry {
            id,
            kind: "null",
        });
    };

    let geometry: geo::Geometry<f64> =
        geometry
            .try_into()
            .map_err(|e: geojson::Error| CatalogError::Parse {
                message: format!("region {id}: {e}"),
            })?;

    let polygon = match geometry {
        geo::Geometry::MultiPolygon(mp) => mp,
        geo::Geometry::Polygon(p) => MultiPolygon(vec![p]),
        other => {
            return Err(CatalogError::UnsupportedGeometry {
                id,
                kind: geometry_kind(&other),
            });
        }
    };

    Ok(Region::new(id, polygon))
}

const fn geometry_kind(geometry: &geo::Geometry<f64>) -> &'static str {
    match geometry {
        geo::Geometry::Point(_) => "Point",
        geo::Geometry::Line(_) => "Line",
        geo::Geometry::LineString(_) => "LineString",
        geo::Geometry::Polygon(_) => "Polygon",
        geo::Geometry::MultiPoint(_) => "MultiPoint",
        geo::Geometry::MultiLineString(_) => "MultiLineString",
        geo::Geometry::MultiPolygon(_) => "MultiPolygon",
        geo::Geometry::GeometryCollection(_) => "GeometryCollection",
        geo::Geometry::Rect(_) => "Rect",
        geo::Geometry::Triangle(_) => "Triangle",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;
    use std::io::Write as _;

    const TWO_SECTORS: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "properties": { "IDENT": "ZLC" },
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[-112, 40], [-110, 40], [-110, 42], [-112, 42], [-112, 40]]]
                }
            },
            {
                "type": "Feature",
                "properties": { "IDENT": "ZDV" },
                "geometry": {
                    "type": "MultiPolygon",
                    "coordinates": [[[[-110, 37], [-108, 37], [-108, 40], [-110, 40], [-110, 37]]]]
                }
            }
        ]
    }"#;

    #[test]
    fn loads_features_in_file_order() {
        let catalog = RegionCatalog::from_geojson_str(TWO_SECTORS, "IDENT").unwrap();
        let ids: Vec<&str> = catalog.regions().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["ZLC", "ZDV"]);
        assert!(catalog.regions().iter().all(|r| r.area_sq_mi > 1_000.0));
        assert_eq!(catalog.degenerate_count(), 0);
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(TWO_SECTORS.as_bytes()).unwrap();

        let catalog = RegionCatalog::load(file.path(), "IDENT").unwrap();
        assert_eq!(catalog.len(), 2);
        assert!(catalog.get("ZDV").is_some());
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = RegionCatalog::load(Path::new("/nonexistent/regions.geojson"), "IDENT")
            .unwrap_err();
        assert!(matches!(err, CatalogError::Io { .. }));
    }

    #[test]
    fn empty_collection_is_rejected() {
        let err = RegionCatalog::from_geojson_str(
            r#"{"type": "FeatureCollection", "features": []}"#,
            "IDENT",
        )
        .unwrap_err();
        assert!(matches!(err, CatalogError::Empty));
    }

    #[test]
    fn malformed_json_is_rejected() {
        let err = RegionCatalog::from_geojson_str("{ not json", "IDENT").unwrap_err();
        assert!(matches!(err, CatalogError::Parse { .. }));
    }

    #[test]
    fn missing_identifier_is_rejected() {
        let err = RegionCatalog::from_geojson_str(TWO_SECTORS, "NAME").unwrap_err();
        assert!(matches!(
            err,
            CatalogError::MissingIdentifier { index: 0, .. }
        ));
    }

    #[test]
    fn duplicate_identifier_is_rejected() {
        let polygon = MultiPolygon(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 1.0, y: 1.0),
        ]]);
        let err = RegionCatalog::from_regions(vec![
            Region::new("ZAB", polygon.clone()),
            Region::new("ZAB", polygon),
        ])
        .unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateIdentifier { .. }));
    }

    #[test]
    fn outside_label_is_reserved() {
        let polygon = MultiPolygon(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 1.0, y: 1.0),
        ]]);
        let err =
            RegionCatalog::from_regions(vec![Region::new(OUTSIDE_LABEL, polygon)]).unwrap_err();
        assert!(matches!(err, CatalogError::ReservedIdentifier { .. }));
    }

    #[test]
    fn point_geometry_is_unsupported() {
        let geojson = r#"{
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "properties": { "IDENT": "ZKC" },
                "geometry": { "type": "Point", "coordinates": [-95, 39] }
            }]
        }"#;
        let err = RegionCatalog::from_geojson_str(geojson, "IDENT").unwrap_err();
        assert!(matches!(
            err,
            CatalogError::UnsupportedGeometry { kind: "Point", .. }
        ));
    }

    #[test]
    fn collinear_polygon_is_degenerate() {
        let flat = MultiPolygon(vec![polygon![
            (x: -100.0, y: 40.0),
            (x: -99.0, y: 40.0),
            (x: -98.0, y: 40.0),
        ]]);
        let region = Region::new("FLAT", flat);
        assert!(region.is_degenerate());

        let catalog = RegionCatalog::from_regions(vec![region]).unwrap();
        assert_eq!(catalog.degenerate_count(), 1);
    }

    #[test]
    fn boundary_serializes_as_multipolygon() {
        let catalog = RegionCatalog::from_geojson_str(TWO_SECTORS, "IDENT").unwrap();
        let json = catalog.regions()[0].boundary_geojson();
        assert!(json.contains("\"MultiPolygon\""));
    }
}
