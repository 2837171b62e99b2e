//! Runs the three analyses for one polygon and merges them into the response.

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::info;

use crate::archive::{ImageArchive, LandCoverSource};
use crate::baseline::BaselineSettings;
use crate::climate::assemble_climate;
use crate::config::{Config, DEFAULT_MAX_RANGE_DAYS};
use crate::geometry::Polygon;
use crate::models::{
    ClimateRecord, CombinedResult, DateRange, NdviRecord, ResultStatus, SeriesOutcome,
    SiteAnnotations,
};
use crate::ndvi::{aggregate_ndvi, NdviSettings};
use crate::power::ClimateSource;
use crate::regions::{classify_region, Classification, RegionSettings};

// ---

/// Settings for every analysis component.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisSettings {
    // ---
    /// Longest accepted request range, in days.
    pub max_range_days: u32,
    pub ndvi: NdviSettings,
    pub baseline: BaselineSettings,
    pub regions: RegionSettings,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            max_range_days: DEFAULT_MAX_RANGE_DAYS,
            ndvi: NdviSettings::default(),
            baseline: BaselineSettings::default(),
            regions: RegionSettings::default(),
        }
    }
}

impl From<&Config> for AnalysisSettings {
    fn from(cfg: &Config) -> Self {
        Self {
            max_range_days: cfg.max_range_days,
            ndvi: cfg.ndvi.clone(),
            baseline: cfg.baseline.clone(),
            regions: cfg.regions.clone(),
        }
    }
}

/// Shared application state: collaborator clients, built once per process.
#[derive(Clone)]
pub struct AppState {
    // ---
    pub archive: Arc<dyn ImageArchive>,
    pub landcover: Arc<dyn LandCoverSource>,
    pub climate: Arc<dyn ClimateSource>,
    pub settings: Arc<AnalysisSettings>,
}

/// Raw outcomes of one analysis run, before wire assembly.
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    // ---
    pub ndvi: SeriesOutcome<NdviRecord>,
    pub climate: SeriesOutcome<ClimateRecord>,
    pub classification: Classification,
}

/// Run NDVI aggregation, climate assembly and region classification
/// concurrently for one polygon.
pub async fn analyze(
    state: &AppState,
    polygon: &Polygon,
    range: &DateRange,
    today: NaiveDate,
) -> Analysis {
    // ---
    let settings = &state.settings;
    let (ndvi, climate, classification) = tokio::join!(
        aggregate_ndvi(state.archive.as_ref(), polygon, range, &settings.ndvi),
        assemble_climate(
            state.climate.as_ref(),
            polygon,
            range,
            &settings.baseline,
            today
        ),
        classify_region(state.landcover.as_ref(), polygon, &settings.regions),
    );

    Analysis {
        ndvi: SeriesOutcome::from_result(ndvi),
        climate: match climate {
            Ok(series) => series.into_outcome(),
            Err(e) => SeriesOutcome::from_result(Err(e)),
        },
        classification,
    }
}

/// Structural merge of the analysis outcomes into the response payload.
pub fn combine(analysis: Analysis, annotations: Option<SiteAnnotations>) -> CombinedResult {
    // ---
    let (ndvi_data, ndvi_status) = analysis.ndvi.into_parts();
    let (nasa_power_data, climate_status) = analysis.climate.into_parts();
    let (dominant_region, regions, regions_status) = analysis.classification.into_parts();

    info!(
        "Combined result: {} NDVI days, {} climate days, dominant region {:?}",
        ndvi_data.len(),
        nasa_power_data.len(),
        dominant_region.name
    );

    CombinedResult {
        ndvi_data,
        nasa_power_data,
        dominant_region,
        regions,
        status: ResultStatus {
            ndvi: ndvi_status,
            climate: climate_status,
            regions: regions_status,
        },
        annotations,
    }
}
