//! Image-archive and land-cover collaborator interfaces.
//!
//! The archive is an external service. Components only see the traits below,
//! injected through the application state; [`ArchiveGateway`] is the HTTP
//! implementation used in production and tests substitute in-memory fakes.

use chrono::{DateTime, NaiveDate, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ServiceResult;
use crate::geometry::LonLat;

mod gateway;

pub use gateway::ArchiveGateway;

// ---

/// Source of satellite scenes.
pub trait ImageArchive: Send + Sync {
    /// Scenes matching the query's date range, bounds and metadata filters,
    /// with per-pixel samples of the selected bands at the query's scale.
    fn query_scenes<'a>(&'a self, query: &'a CollectionQuery)
        -> BoxFuture<'a, ServiceResult<Vec<Scene>>>;
}

/// Source of land-cover class histograms.
pub trait LandCoverSource: Send + Sync {
    /// Per-class pixel counts inside the request geometry, in the source's
    /// natural key order. `Ok(None)` means the raster band is absent for the
    /// geometry.
    fn frequency_histogram<'a>(
        &'a self,
        request: &'a HistogramRequest,
    ) -> BoxFuture<'a, ServiceResult<Option<Vec<(String, f64)>>>>;
}

/// Comparison applied by a [`MetadataFilter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    // ---
    LessThan,
}

/// `filter-by-metadata(field, operator, threshold)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataFilter {
    // ---
    pub field: String,
    pub operator: FilterOperator,
    pub threshold: f64,
}

impl MetadataFilter {
    pub fn less_than(field: &str, threshold: f64) -> Self {
        Self {
            field: field.to_string(),
            operator: FilterOperator::LessThan,
            threshold,
        }
    }

    /// Scenes lacking the property, or carrying a non-numeric value, never match.
    pub fn matches(&self, scene: &Scene) -> bool {
        // ---
        let Some(value) = scene.properties.get(&self.field).and_then(Value::as_f64) else {
            return false;
        };
        match self.operator {
            FilterOperator::LessThan => value < self.threshold,
        }
    }
}

/// Query sent to the image archive.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionQuery {
    // ---
    pub collection: String,
    /// First acquisition date included.
    pub start: NaiveDate,
    /// First acquisition date excluded.
    pub end_exclusive: NaiveDate,
    /// Bounds geometry as a closed `[lon, lat]` ring.
    pub ring: Vec<[f64; 2]>,
    pub metadata: Vec<MetadataFilter>,
    pub bands: Vec<String>,
    pub scale: u32,
    pub max_pixels: u64,
}

/// One satellite pass, sampled on the query grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    // ---
    pub id: String,
    pub acquired: DateTime<Utc>,
    #[serde(default)]
    pub properties: Map<String, Value>,
    #[serde(default)]
    pub pixels: Vec<ScenePixel>,
}

/// Band values at one grid cell centre.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScenePixel {
    // ---
    pub lon: f64,
    pub lat: f64,
    /// Near-infrared reflectance.
    pub nir: f64,
    /// Red reflectance.
    pub red: f64,
    /// Cloud probability in percent.
    pub cloud_probability: f64,
}

impl ScenePixel {
    pub fn position(&self) -> LonLat {
        LonLat::new(self.lon, self.lat)
    }
}

/// Histogram reduction request for the land-cover raster.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramRequest {
    // ---
    pub asset: String,
    pub band: String,
    pub ring: Vec<[f64; 2]>,
    pub scale: u32,
    pub max_pixels: u64,
}
