//! Request, record and response models for the forage-monitor service.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{ServiceError, ServiceResult};

// ---

/// Inclusive calendar date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    // ---
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    // ---
    pub fn new(start: NaiveDate, end: NaiveDate) -> ServiceResult<Self> {
        // ---
        if start > end {
            return Err(ServiceError::InvalidDateRange(format!(
                "start {start} is after end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// Resolve optional request bounds, defaulting to 1 January of the end
    /// year through `today`.
    pub fn resolve(
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        today: NaiveDate,
    ) -> ServiceResult<Self> {
        // ---
        let end = end.unwrap_or(today);
        let start = match start {
            Some(start) => start,
            None => NaiveDate::from_ymd_opt(end.year(), 1, 1).ok_or_else(|| {
                ServiceError::InvalidDateRange(format!("no 1 January for year {}", end.year()))
            })?,
        };
        Self::new(start, end)
    }

    /// Reject ranges longer than `max_days` days.
    pub fn within_span(self, max_days: u32) -> ServiceResult<Self> {
        // ---
        if self.day_count() > max_days as usize {
            return Err(ServiceError::InvalidDateRange(format!(
                "{} to {} spans {} days, at most {max_days} are allowed",
                self.start,
                self.end,
                self.day_count()
            )));
        }
        Ok(self)
    }

    /// Number of calendar days in the range, both ends included.
    pub fn day_count(&self) -> usize {
        (self.end - self.start).num_days() as usize + 1
    }

    /// Every calendar day from `start` to `end`, ascending.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d <= end)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// One day of the NDVI series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NdviRecord {
    // ---
    pub date: NaiveDate,
    pub ndvi: Option<f64>,
}

/// One day of the climate series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClimateRecord {
    // ---
    pub date: NaiveDate,
    pub temperature: Option<f64>,
    pub radiation_p95: Option<f64>,
    pub latitude: f64,
}

/// Share of the polygon covered by one eco-region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionPercentage {
    // ---
    pub name: String,
    pub percentage: f64,
}

/// Result of a primary series fetch, keeping "nothing matched" apart from
/// "the fetch failed".
#[derive(Debug, Clone, PartialEq)]
pub enum SeriesOutcome<T> {
    // ---
    Data(Vec<T>),
    Empty,
    Failed { cause: String },
    /// Part of the fetch failed; the records that could be built are kept.
    Degraded { records: Vec<T>, cause: String },
}

impl<T> SeriesOutcome<T> {
    // ---
    pub fn from_result(result: ServiceResult<Vec<T>>) -> Self {
        // ---
        match result {
            Ok(records) if records.is_empty() => SeriesOutcome::Empty,
            Ok(records) => SeriesOutcome::Data(records),
            Err(e) => SeriesOutcome::Failed {
                cause: e.to_string(),
            },
        }
    }

    /// Split into the wire-level records and status.
    pub fn into_parts(self) -> (Vec<T>, OutcomeStatus) {
        // ---
        match self {
            SeriesOutcome::Data(records) => (records, OutcomeStatus::Ok),
            SeriesOutcome::Empty => (Vec::new(), OutcomeStatus::Empty),
            SeriesOutcome::Failed { cause } => (Vec::new(), OutcomeStatus::Failed { cause }),
            SeriesOutcome::Degraded { records, cause } => {
                (records, OutcomeStatus::Failed { cause })
            }
        }
    }
}

/// Wire form of an outcome tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum OutcomeStatus {
    // ---
    Ok,
    Empty,
    Failed { cause: String },
}

/// Body of `POST /ndvi/`.
#[derive(Debug, Clone, Deserialize)]
pub struct NdviRequest {
    // ---
    /// Rings of `[longitude, latitude]` pairs; only the first (outer) ring is used.
    pub coordinates: Vec<Vec<Vec<f64>>>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub forage_resource: Option<String>,
    #[serde(default)]
    pub woody_presence: Option<bool>,
    #[serde(default)]
    pub woody_percentage: Option<f64>,
}

impl NdviRequest {
    /// Site annotations echoed back with the result, if any were sent.
    pub fn annotations(&self) -> Option<SiteAnnotations> {
        // ---
        if self.forage_resource.is_none()
            && self.woody_presence.is_none()
            && self.woody_percentage.is_none()
        {
            return None;
        }
        let woody_presence = self.woody_presence.unwrap_or(false);
        Some(SiteAnnotations {
            forage_resource: self.forage_resource.clone(),
            woody_presence,
            woody_percentage: if woody_presence {
                self.woody_percentage.unwrap_or(0.0)
            } else {
                0.0
            },
        })
    }
}

/// Descriptive metadata about the surveyed site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteAnnotations {
    // ---
    pub forage_resource: Option<String>,
    pub woody_presence: bool,
    pub woody_percentage: f64,
}

/// Per-component outcome tags in the response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultStatus {
    // ---
    pub ndvi: OutcomeStatus,
    pub climate: OutcomeStatus,
    pub regions: OutcomeStatus,
}

/// Response of `POST /ndvi/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedResult {
    // ---
    pub ndvi_data: Vec<NdviRecord>,
    pub nasa_power_data: Vec<ClimateRecord>,
    pub dominant_region: RegionPercentage,
    pub regions: Vec<RegionPercentage>,
    pub status: ResultStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<SiteAnnotations>,
}
