use std::path::Path;

use geo_types::Geometry;
use geojson::GeoJson;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BoundaryError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid GeoJSON in {path}: {message}")]
    Parse { path: String, message: String },
    #[error("Boundary {path} contains no polygon geometry")]
    NoPolygon { path: String },
    #[error("Boundary polygon is empty or has an open ring")]
    Degenerate,
}

/// The validated region of interest. Scene imagery is clipped to this
/// polygon at acquisition time, so extraction only needs to know that a
/// well-formed boundary exists; the per-pixel mask comes from the scene
/// classification band.
#[derive(Debug, Clone)]
pub struct Boundary {
    pub polygons: Vec<geo_types::Polygon<f64>>,
}

impl Boundary {
    /// Load and validate a GeoJSON boundary file. Accepts a Polygon or
    /// MultiPolygon at the top level, inside a Feature, or as the first
    /// polygonal member of a FeatureCollection.
    pub fn load(path: &Path) -> Result<Self, BoundaryError> {
        let contents = std::fs::read_to_string(path).map_err(|e| BoundaryError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        let geojson: GeoJson = contents.parse().map_err(|e: geojson::Error| {
            BoundaryError::Parse {
                path: path.display().to_string(),
                message: e.to_string(),
            }
        })?;

        let geometry: Geometry<f64> =
            geo_types::GeometryCollection::<f64>::try_from(&geojson)
                .map_err(|e: geojson::Error| BoundaryError::Parse {
                    path: path.display().to_string(),
                    message: e.to_string(),
                })?
                .into_iter()
                .find(|g| matches!(g, Geometry::Polygon(_) | Geometry::MultiPolygon(_)))
                .ok_or_else(|| BoundaryError::NoPolygon {
                    path: path.display().to_string(),
                })?;

        let polygons = match geometry {
            Geometry::Polygon(p) => vec![p],
            Geometry::MultiPolygon(mp) => mp.0,
            _ => unreachable!(),
        };

        let boundary = Self { polygons };
        boundary.validate()?;
        Ok(boundary)
    }

    /// Non-empty, and every ring closed (first point == last point).
    /// geo-types closes exteriors on construction, but hand-written GeoJSON
    /// can still carry degenerate rings with fewer than four coordinates.
    fn validate(&self) -> Result<(), BoundaryError> {
        if self.polygons.is_empty() {
            return Err(BoundaryError::Degenerate);
        }
        for poly in &self.polygons {
            let ext = poly.exterior();
            if ext.0.len() < 4 || ext.0.first() != ext.0.last() {
                return Err(BoundaryError::Degenerate);
            }
        }
        Ok(())
    }
}
