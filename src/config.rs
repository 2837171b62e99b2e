//! Configuration loader for the `forage-monitor` service.
//!
//! This module centralizes all runtime configuration values and their defaults,
//! loading from environment variables (with optional `.env` file support
//! provided by the caller). Components receive their typed settings from here
//! instead of reading `env::var` themselves.
//!
use std::{env, net::SocketAddr, time::Duration};

use anyhow::{anyhow, Result};

use crate::baseline::BaselineSettings;
use crate::ndvi::{CloudMode, NdviSettings};
use crate::regions::RegionSettings;

/// Parse an optional integer environment variable with a default value.
macro_rules! parse_env_u32 {
    ($var_name:expr, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.parse::<u32>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse an optional floating point environment variable.
macro_rules! parse_env_f64_opt {
    ($var_name:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.parse::<f64>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
    };
}

/// Parse a required string environment variable.
macro_rules! require_env {
    ($var_name:expr) => {
        env::var($var_name)
            .map_err(|_| anyhow!("{} must be set in .env or environment", $var_name))?
    };
}

/// Read an optional string environment variable with a default value.
macro_rules! env_or {
    ($var_name:expr, $default:expr) => {
        env::var($var_name).unwrap_or_else(|_| $default.to_string())
    };
}

pub const DEFAULT_POWER_API_URL: &str = "https://power.larc.nasa.gov/api/temporal/daily/point";

/// Roughly ten years.
pub const DEFAULT_MAX_RANGE_DAYS: u32 = 3660;

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of the application.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// Address the HTTP server binds to.
    pub bind_addr: SocketAddr,

    /// Image-archive gateway base URL.
    pub archive_url: String,

    /// Point-climate API endpoint.
    pub power_api_url: String,

    /// `community` parameter sent to the point-climate API.
    pub power_community: String,

    /// Timeout applied to every remote HTTP call.
    pub http_timeout: Duration,

    /// Longest accepted request range, in days.
    pub max_range_days: u32,

    pub ndvi: NdviSettings,
    pub baseline: BaselineSettings,
    pub regions: RegionSettings,
}

/// Load configuration from environment variables with defaults.
///
/// Required:
/// - `ARCHIVE_URL` – image-archive gateway base URL
/// - `LANDCOVER_ASSET` – land-cover raster asset reference
///
/// Optional:
/// - `BIND_ADDR` – listen address (default: 0.0.0.0:8080)
/// - `POWER_API_URL`, `POWER_COMMUNITY` – point-climate API (default: NASA POWER, `AG`)
/// - `HTTP_TIMEOUT_SECS` – remote call timeout (default: 30)
/// - `NDVI_COLLECTION`, `NDVI_CLOUD_MODE`, `NDVI_CLOUD_COVER_MAX`,
///   `NDVI_CLOUD_PROBABILITY_MAX`, `NDVI_CLEAR_FRACTION_MIN`, `NDVI_SCALE`
/// - `MAX_PIXELS` – pixel cap per reduction (default: 1e9)
/// - `LANDCOVER_BAND` – histogram band name (default: b1)
/// - `LANDCOVER_SCALE` – histogram sample spacing (default: 30)
/// - `HISTORY_YEARS` – historical window (default: 10)
/// - `FETCH_CONCURRENCY` – concurrent historical fetches (default: 8)
/// - `MAX_RANGE_DAYS` – longest accepted request range (default: 3660)
///
/// Returns an error if any required variable is missing or invalid.
pub fn load_from_env() -> Result<Config> {
    // ---
    let archive_url = require_env!("ARCHIVE_URL");
    let landcover_asset = require_env!("LANDCOVER_ASSET");

    let bind_addr: SocketAddr = env_or!("BIND_ADDR", "0.0.0.0:8080")
        .parse()
        .map_err(|e| anyhow!("Invalid BIND_ADDR: {}", e))?;
    let power_api_url = env_or!("POWER_API_URL", DEFAULT_POWER_API_URL);
    let power_community = env_or!("POWER_COMMUNITY", "AG");
    let http_timeout = Duration::from_secs(parse_env_u32!("HTTP_TIMEOUT_SECS", 30) as u64);

    let max_pixels = env::var("MAX_PIXELS")
        .ok()
        .map(|v| parse_pixel_cap(&v))
        .transpose()?
        .unwrap_or(1_000_000_000);

    let cloud_mode: CloudMode = env_or!("NDVI_CLOUD_MODE", "strict")
        .parse()
        .map_err(|e| anyhow!("Invalid NDVI_CLOUD_MODE: {}", e))?;

    let ndvi_defaults = NdviSettings::default();
    let ndvi = NdviSettings {
        collection: env_or!("NDVI_COLLECTION", ndvi_defaults.collection),
        cloud_cover_max: parse_env_f64_opt!("NDVI_CLOUD_COVER_MAX")
            .unwrap_or_else(|| cloud_mode.cover_threshold()),
        cloud_probability_max: parse_env_f64_opt!("NDVI_CLOUD_PROBABILITY_MAX")
            .unwrap_or(ndvi_defaults.cloud_probability_max),
        clear_fraction_min: parse_env_f64_opt!("NDVI_CLEAR_FRACTION_MIN")
            .unwrap_or(ndvi_defaults.clear_fraction_min),
        scale: parse_env_u32!("NDVI_SCALE", ndvi_defaults.scale),
        max_pixels,
    };
    if !(0.0..=1.0).contains(&ndvi.clear_fraction_min) {
        return Err(anyhow!(
            "Invalid NDVI_CLEAR_FRACTION_MIN: {} is outside [0, 1]",
            ndvi.clear_fraction_min
        ));
    }

    let history_years = parse_env_u32!("HISTORY_YEARS", 10);
    let concurrency = parse_env_u32!("FETCH_CONCURRENCY", 8);
    let max_range_days = parse_env_u32!("MAX_RANGE_DAYS", DEFAULT_MAX_RANGE_DAYS);
    if history_years == 0 || concurrency == 0 || max_range_days == 0 {
        return Err(anyhow!(
            "HISTORY_YEARS, FETCH_CONCURRENCY and MAX_RANGE_DAYS must be positive"
        ));
    }
    let baseline = BaselineSettings {
        history_years,
        concurrency: concurrency as usize,
        ..BaselineSettings::default()
    };

    let regions = RegionSettings {
        asset: landcover_asset,
        band: env_or!("LANDCOVER_BAND", "b1"),
        scale: parse_env_u32!("LANDCOVER_SCALE", 30),
        max_pixels,
    };

    Ok(Config {
        bind_addr,
        archive_url,
        power_api_url,
        power_community,
        http_timeout,
        max_range_days,
        ndvi,
        baseline,
        regions,
    })
}

impl Config {
    /// Log the loaded configuration for debugging purposes.
    pub fn log_config(&self) {
        // ---
        tracing::info!("Configuration loaded:");
        tracing::info!("  BIND_ADDR                  : {}", self.bind_addr);
        tracing::info!("  ARCHIVE_URL                : {}", self.archive_url);
        tracing::info!("  POWER_API_URL              : {}", self.power_api_url);
        tracing::info!("  POWER_COMMUNITY            : {}", self.power_community);
        tracing::info!("  HTTP_TIMEOUT_SECS          : {}", self.http_timeout.as_secs());
        tracing::info!("  NDVI_COLLECTION            : {}", self.ndvi.collection);
        tracing::info!("  NDVI_CLOUD_COVER_MAX       : {}", self.ndvi.cloud_cover_max);
        tracing::info!("  NDVI_CLOUD_PROBABILITY_MAX : {}", self.ndvi.cloud_probability_max);
        tracing::info!("  NDVI_CLEAR_FRACTION_MIN    : {}", self.ndvi.clear_fraction_min);
        tracing::info!("  NDVI_SCALE                 : {}", self.ndvi.scale);
        tracing::info!("  MAX_PIXELS                 : {}", self.ndvi.max_pixels);
        tracing::info!("  LANDCOVER_ASSET            : {}", self.regions.asset);
        tracing::info!("  LANDCOVER_BAND             : {}", self.regions.band);
        tracing::info!("  LANDCOVER_SCALE            : {}", self.regions.scale);
        tracing::info!("  HISTORY_YEARS              : {}", self.baseline.history_years);
        tracing::info!("  FETCH_CONCURRENCY          : {}", self.baseline.concurrency);
        tracing::info!("  MAX_RANGE_DAYS             : {}", self.max_range_days);
    }
}

/// Parse a pixel cap such as `1e9` or `250000`; it must be a whole number of
/// at least one pixel.
fn parse_pixel_cap(raw: &str) -> Result<u64> {
    // ---
    let value: f64 = raw
        .trim()
        .parse()
        .map_err(|e| anyhow!("Invalid MAX_PIXELS: {}", e))?;
    if !value.is_finite() || value < 1.0 || value.fract() != 0.0 || value > u64::MAX as f64 {
        return Err(anyhow!(
            "Invalid MAX_PIXELS: {} is not a positive whole number",
            raw
        ));
    }
    Ok(value as u64)
}
