//! Point-climate client for the NASA POWER daily API.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::NaiveDate;
use futures::future::BoxFuture;
use reqwest::Client;
use serde_json::Value;

use crate::error::{ServiceError, ServiceResult};
use crate::geometry::LonLat;

const SOURCE: &str = "point-climate API";

/// POWER marks missing days with this fill value.
const FILL_VALUE: f64 = -999.0;

/// Daily air temperature at 2 m.
pub const TEMPERATURE_PARAMETER: &str = "T2M";

/// All-sky surface shortwave downward irradiance.
pub const RADIATION_PARAMETER: &str = "ALLSKY_SFC_SW_DWN";

/// Source of daily point samples.
pub trait ClimateSource: Send + Sync {
    /// Daily values of `parameter` at `point` for `start..=end`. Days the
    /// source reports as missing are absent from the map.
    fn daily_series<'a>(
        &'a self,
        point: LonLat,
        parameter: &'a str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> BoxFuture<'a, ServiceResult<BTreeMap<NaiveDate, f64>>>;
}

/// POWER API client
///
pub struct PowerClient {
    client: Client,
    url: String,
    community: String,
}

impl PowerClient {
    /// Returns a new instance of PowerClient
    ///
    /// # Arguments
    ///
    /// * 'url' - daily point endpoint
    /// * 'community' - POWER user community (`AG`, `RE` or `SB`)
    /// * 'timeout' - timeout applied to every request
    pub fn new(url: &str, community: &str, timeout: Duration) -> ServiceResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            url: url.to_string(),
            community: community.to_string(),
        })
    }
}

impl ClimateSource for PowerClient {
    fn daily_series<'a>(
        &'a self,
        point: LonLat,
        parameter: &'a str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> BoxFuture<'a, ServiceResult<BTreeMap<NaiveDate, f64>>> {
        Box::pin(async move {
            let start_s = start.format("%Y%m%d").to_string();
            let end_s = end.format("%Y%m%d").to_string();
            let lon_s = point.lon.to_string();
            let lat_s = point.lat.to_string();

            tracing::debug!(
                "Fetching {} at ({}, {}) for {}..{}",
                parameter,
                lon_s,
                lat_s,
                start_s,
                end_s
            );

            let req = self
                .client
                .get(&self.url)
                .query(&[
                    ("parameters", parameter),
                    ("community", self.community.as_str()),
                    ("longitude", lon_s.as_str()),
                    ("latitude", lat_s.as_str()),
                    ("start", start_s.as_str()),
                    ("end", end_s.as_str()),
                    ("format", "JSON"),
                ])
                .send()
                .await?;

            let status = req.status();
            if !status.is_success() {
                return Err(ServiceError::upstream(
                    SOURCE,
                    format!("{parameter} {start_s}..{end_s} returned {status}"),
                ));
            }

            let json = req.text().await?;
            let value: Value = serde_json::from_str(&json)?;

            parse_parameter_series(&value, parameter)
        })
    }
}

/// Read `properties.parameter.<name>` as a date-keyed series.
///
/// Fill values, non-numeric values and keys that are not `YYYYMMDD` dates are
/// left out. A payload without the parameter map is malformed.
pub fn parse_parameter_series(value: &Value, name: &str) -> ServiceResult<BTreeMap<NaiveDate, f64>> {
    // ---
    let Some(series) = value
        .pointer(&format!("/properties/parameter/{name}"))
        .and_then(Value::as_object)
    else {
        return Err(ServiceError::upstream(
            SOURCE,
            format!("payload has no properties.parameter.{name}"),
        ));
    };

    let mut result = BTreeMap::new();
    for (key, raw) in series {
        let Ok(date) = NaiveDate::parse_from_str(key, "%Y%m%d") else {
            tracing::debug!("Skipping {} key {:?}: not a YYYYMMDD date", name, key);
            continue;
        };
        match raw.as_f64() {
            Some(v) if v != FILL_VALUE && v.is_finite() => {
                result.insert(date, v);
            }
            _ => {}
        }
    }
    Ok(result)
}
