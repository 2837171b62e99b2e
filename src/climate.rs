//! Daily climate series: current temperature alongside the historical
//! radiation baseline, one record per calendar day of the request.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::baseline::{build_radiation_baseline, BaselineSettings};
use crate::error::ServiceResult;
use crate::geometry::{centroid, Polygon};
use crate::models::{ClimateRecord, DateRange, SeriesOutcome};
use crate::power::{ClimateSource, TEMPERATURE_PARAMETER};

// ---

/// Contiguous climate series plus the cause of a failed temperature fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct ClimateSeries {
    // ---
    pub records: Vec<ClimateRecord>,
    pub temperature_error: Option<String>,
}

impl ClimateSeries {
    /// Tag the series: a failed temperature fetch keeps the records but
    /// reports the component as failed.
    pub fn into_outcome(self) -> SeriesOutcome<ClimateRecord> {
        // ---
        match self.temperature_error {
            Some(cause) => SeriesOutcome::Degraded {
                records: self.records,
                cause,
            },
            None => SeriesOutcome::from_result(Ok(self.records)),
        }
    }
}

/// Assemble the climate series for `polygon` over `range`.
///
/// Always yields exactly one record per day of `range`, in order; days
/// without data carry `null` values. A failed temperature fetch leaves every
/// temperature `null` and is reported in `temperature_error`.
pub async fn assemble_climate(
    source: &dyn ClimateSource,
    polygon: &Polygon,
    range: &DateRange,
    settings: &BaselineSettings,
    today: NaiveDate,
) -> ServiceResult<ClimateSeries> {
    // ---
    let point = centroid(polygon)?;

    let (temperature, baseline) = tokio::join!(
        source.daily_series(point, TEMPERATURE_PARAMETER, range.start, range.end),
        build_radiation_baseline(source, point, range, settings, today),
    );

    let (temperature, temperature_error) = match temperature {
        Ok(series) => (series, None),
        Err(e) => {
            warn!("Temperature fetch failed, keeping baseline only: {}", e);
            (BTreeMap::new(), Some(e.to_string()))
        }
    };

    let records: Vec<ClimateRecord> = range
        .days()
        .map(|date| ClimateRecord {
            date,
            temperature: temperature.get(&date).copied(),
            radiation_p95: baseline.get(date),
            latitude: point.lat,
        })
        .collect();

    info!(
        "Climate series: {} days, {} with temperature, {} with radiation baseline",
        records.len(),
        records.iter().filter(|r| r.temperature.is_some()).count(),
        records.iter().filter(|r| r.radiation_p95.is_some()).count()
    );
    Ok(ClimateSeries {
        records,
        temperature_error,
    })
}
