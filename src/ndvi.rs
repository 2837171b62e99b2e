//! Cloud-filtered daily NDVI series.
//!
//! Scenes are fetched once for the whole request; per-pixel NDVI and the
//! clear/cloudy quality mask are computed here, same-day scenes are averaged
//! pixel-wise, and each day is reduced to one polygon-mean value.
//!
//! Days whose clear fraction falls below the configured minimum are dropped
//! from the series entirely rather than reported as `null`.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::NaiveDate;
use tracing::{debug, info};

use crate::archive::{CollectionQuery, ImageArchive, MetadataFilter, Scene};
use crate::error::{ServiceError, ServiceResult};
use crate::geometry::Polygon;
use crate::models::{DateRange, NdviRecord};

/// Scene-level cloud cover property used for pre-filtering.
pub const CLOUD_COVER_PROPERTY: &str = "CLOUDY_PIXEL_PERCENTAGE";

/// NIR, red and cloud-probability bands.
pub const NDVI_BANDS: [&str; 3] = ["B8", "B4", "MSK_CLDPRB"];

// ---

/// Scene pre-filter strictness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloudMode {
    // ---
    /// Scenes under 10% cloud cover.
    Strict,
    /// Scenes under 80% cloud cover; the per-pixel mask does the rest.
    Relaxed,
}

impl CloudMode {
    pub fn cover_threshold(self) -> f64 {
        match self {
            CloudMode::Strict => 10.0,
            CloudMode::Relaxed => 80.0,
        }
    }
}

impl FromStr for CloudMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Ok(CloudMode::Strict),
            "relaxed" => Ok(CloudMode::Relaxed),
            other => Err(format!("expected 'strict' or 'relaxed', got '{other}'")),
        }
    }
}

/// Tunables for the NDVI aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct NdviSettings {
    // ---
    pub collection: String,
    /// Scenes at or above this cloud cover (percent) are ignored.
    pub cloud_cover_max: f64,
    /// Pixels are clear iff their cloud probability (percent) is below this.
    pub cloud_probability_max: f64,
    /// Days with a lower clear fraction are dropped.
    pub clear_fraction_min: f64,
    /// Ground sample spacing of the reduction.
    pub scale: u32,
    pub max_pixels: u64,
}

impl Default for NdviSettings {
    fn default() -> Self {
        Self {
            collection: "COPERNICUS/S2_SR_HARMONIZED".to_string(),
            cloud_cover_max: CloudMode::Strict.cover_threshold(),
            cloud_probability_max: 1.0,
            clear_fraction_min: 0.80,
            scale: 30,
            max_pixels: 1_000_000_000,
        }
    }
}

/// Polygon-level reduction of one day's scenes.
#[derive(Debug, Clone, PartialEq)]
pub struct DaySummary {
    // ---
    pub date: NaiveDate,
    /// Mean NDVI over clear pixels, `None` when no pixel was clear.
    pub mean_ndvi: Option<f64>,
    /// Mean of the per-pixel quality mask over all pixels in the polygon.
    pub clear_fraction: f64,
    pub pixel_count: usize,
}

/// Grid cell identity, quantized so the same cell in overlapping scenes
/// lands on the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct PixelKey(i64, i64);

impl PixelKey {
    fn new(lon: f64, lat: f64) -> Self {
        PixelKey((lon * 1e7).round() as i64, (lat * 1e7).round() as i64)
    }
}

#[derive(Debug, Default)]
struct PixelAccumulator {
    ndvi_sum: f64,
    ndvi_count: u32,
    quality_sum: f64,
    quality_count: u32,
}

/// Normalized difference `(nir - red) / (nir + red)`; undefined when the
/// reflectances sum to zero.
pub fn normalized_difference(nir: f64, red: f64) -> Option<f64> {
    // ---
    let denom = nir + red;
    if denom == 0.0 || !denom.is_finite() {
        return None;
    }
    Some((nir - red) / denom)
}

/// Inclusive quality gate.
pub fn passes_quality_gate(clear_fraction: f64, min: f64) -> bool {
    clear_fraction >= min
}

/// Build the archive query for a polygon and date range.
pub fn build_query(polygon: &Polygon, range: &DateRange, settings: &NdviSettings) -> CollectionQuery {
    // ---
    CollectionQuery {
        collection: settings.collection.clone(),
        start: range.start,
        end_exclusive: range.end.succ_opt().unwrap_or(range.end),
        ring: polygon.closed_ring(),
        metadata: vec![MetadataFilter::less_than(
            CLOUD_COVER_PROPERTY,
            settings.cloud_cover_max,
        )],
        bands: NDVI_BANDS.iter().map(|b| b.to_string()).collect(),
        scale: settings.scale,
        max_pixels: settings.max_pixels,
    }
}

/// Reduce one day's scenes over the polygon.
///
/// Pixels outside the polygon are clipped. Within the polygon a pixel's NDVI
/// is the mean over the scenes where it is clear (cloudy samples are
/// excluded, not zeroed), and its quality is the mean of the 0/1 clear mask
/// over all scenes covering it.
pub fn reduce_day(
    date: NaiveDate,
    scenes: &[&Scene],
    polygon: &Polygon,
    settings: &NdviSettings,
) -> ServiceResult<DaySummary> {
    // ---
    let mut cells: BTreeMap<PixelKey, PixelAccumulator> = BTreeMap::new();

    for scene in scenes {
        for px in &scene.pixels {
            if !polygon.contains(px.position()) {
                continue;
            }
            let acc = cells.entry(PixelKey::new(px.lon, px.lat)).or_default();
            let clear = px.cloud_probability < settings.cloud_probability_max;

            acc.quality_sum += if clear { 1.0 } else { 0.0 };
            acc.quality_count += 1;

            if clear {
                if let Some(v) = normalized_difference(px.nir, px.red) {
                    acc.ndvi_sum += v;
                    acc.ndvi_count += 1;
                }
            }
        }
    }

    let pixel_count = cells.len();
    if pixel_count as u64 > settings.max_pixels {
        return Err(ServiceError::TooManyPixels {
            count: pixel_count as u64,
            cap: settings.max_pixels,
        });
    }

    let (mut ndvi_sum, mut ndvi_pixels, mut quality_sum) = (0.0, 0usize, 0.0);
    for acc in cells.values() {
        if acc.ndvi_count > 0 {
            ndvi_sum += acc.ndvi_sum / acc.ndvi_count as f64;
            ndvi_pixels += 1;
        }
        quality_sum += acc.quality_sum / acc.quality_count as f64;
    }

    Ok(DaySummary {
        date,
        mean_ndvi: (ndvi_pixels > 0).then(|| ndvi_sum / ndvi_pixels as f64),
        clear_fraction: if pixel_count > 0 {
            quality_sum / pixel_count as f64
        } else {
            0.0
        },
        pixel_count,
    })
}

/// Daily mean NDVI over `polygon` for every acquisition day in `range` that
/// passes the quality gate, ascending by date.
pub async fn aggregate_ndvi(
    archive: &dyn ImageArchive,
    polygon: &Polygon,
    range: &DateRange,
    settings: &NdviSettings,
) -> ServiceResult<Vec<NdviRecord>> {
    // ---
    let query = build_query(polygon, range, settings);
    let scenes = archive.query_scenes(&query).await?;

    let mut by_day: BTreeMap<NaiveDate, Vec<&Scene>> = BTreeMap::new();
    for scene in &scenes {
        let day = scene.acquired.date_naive();
        if !range.contains(day) || !query.metadata.iter().all(|f| f.matches(scene)) {
            debug!("Ignoring scene {} ({})", scene.id, day);
            continue;
        }
        by_day.entry(day).or_default().push(scene);
    }

    let mut records = Vec::with_capacity(by_day.len());
    for (day, day_scenes) in &by_day {
        let summary = reduce_day(*day, day_scenes, polygon, settings)?;
        if passes_quality_gate(summary.clear_fraction, settings.clear_fraction_min) {
            records.push(NdviRecord {
                date: *day,
                ndvi: summary.mean_ndvi,
            });
        } else {
            debug!(
                "Dropping {}: clear fraction {:.3} below {} over {} pixels",
                day, summary.clear_fraction, settings.clear_fraction_min, summary.pixel_count
            );
        }
    }

    info!(
        "NDVI series: {} scenes, {} acquisition days, {} days kept",
        scenes.len(),
        by_day.len(),
        records.len()
    );
    Ok(records)
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::archive::ScenePixel;
    use approx::assert_relative_eq;
    use chrono::{TimeZone, Utc};
    use futures::future::BoxFuture;
    use std::sync::Mutex;

    struct FakeArchive {
        scenes: Vec<Scene>,
        last_query: Mutex<Option<CollectionQuery>>,
    }

    impl FakeArchive {
        fn new(scenes: Vec<Scene>) -> Self {
            Self {
                scenes,
                last_query: Mutex::new(None),
            }
        }
    }

    impl ImageArchive for FakeArchive {
        fn query_scenes<'a>(
            &'a self,
            query: &'a CollectionQuery,
        ) -> BoxFuture<'a, ServiceResult<Vec<Scene>>> {
            *self.last_query.lock().unwrap() = Some(query.clone());
            Box::pin(async move { Ok(self.scenes.clone()) })
        }
    }

    struct FailingArchive;

    impl ImageArchive for FailingArchive {
        fn query_scenes<'a>(
            &'a self,
            _query: &'a CollectionQuery,
        ) -> BoxFuture<'a, ServiceResult<Vec<Scene>>> {
            Box::pin(async { Err(ServiceError::upstream("image archive", "503")) })
        }
    }

    fn unit_square() -> Polygon {
        let ring: Vec<Vec<f64>> = [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)]
            .iter()
            .map(|(x, y)| vec![*x, *y])
            .collect();
        Polygon::from_ring(&ring).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// 10x10 grid of pixel centres inside the unit square; the first
    /// `cloudy` pixels carry a high cloud probability.
    fn grid(nir: f64, red: f64, cloudy: usize) -> Vec<ScenePixel> {
        (0..100)
            .map(|i| ScenePixel {
                lon: 0.05 + 0.1 * (i % 10) as f64,
                lat: 0.05 + 0.1 * (i / 10) as f64,
                nir,
                red,
                cloud_probability: if i < cloudy { 60.0 } else { 0.0 },
            })
            .collect()
    }

    fn scene(id: &str, day: NaiveDate, hour: u32, cover: f64, pixels: Vec<ScenePixel>) -> Scene {
        Scene {
            id: id.to_string(),
            acquired: Utc.from_utc_datetime(&day.and_hms_opt(hour, 0, 0).unwrap()),
            properties: [(CLOUD_COVER_PROPERTY.to_string(), serde_json::json!(cover))]
                .into_iter()
                .collect(),
            pixels,
        }
    }

    fn march() -> DateRange {
        DateRange::new(date(2024, 3, 1), date(2024, 3, 30)).unwrap()
    }

    #[test]
    fn test_normalized_difference() {
        // ---
        assert_relative_eq!(normalized_difference(0.6, 0.2).unwrap(), 0.5);
        assert_relative_eq!(normalized_difference(0.2, 0.6).unwrap(), -0.5);
        assert_eq!(normalized_difference(0.0, 0.0), None);
    }

    #[test]
    fn test_quality_gate_boundary() {
        // ---
        assert!(passes_quality_gate(0.80, 0.80));
        assert!(!passes_quality_gate(0.7999999, 0.80));
        assert!(passes_quality_gate(1.0, 0.80));
    }

    #[test]
    fn test_cloud_mode_parsing() {
        // ---
        assert_eq!("strict".parse::<CloudMode>().unwrap().cover_threshold(), 10.0);
        assert_eq!("RELAXED".parse::<CloudMode>().unwrap().cover_threshold(), 80.0);
        assert!("lenient".parse::<CloudMode>().is_err());
    }

    #[test]
    fn test_build_query_uses_exclusive_end_and_cloud_filter() {
        // ---
        let q = build_query(&unit_square(), &march(), &NdviSettings::default());
        assert_eq!(q.start, date(2024, 3, 1));
        assert_eq!(q.end_exclusive, date(2024, 3, 31));
        assert_eq!(q.ring.len(), 5);
        assert_eq!(q.metadata[0].field, CLOUD_COVER_PROPERTY);
        assert_eq!(q.metadata[0].threshold, 10.0);
        assert_eq!(q.bands, vec!["B8", "B4", "MSK_CLDPRB"]);
        assert_eq!(q.scale, 30);
    }

    #[test]
    fn test_reduce_day_excludes_masked_pixels_from_mean() {
        // ---
        // Cloudy pixels carry a very different NDVI; they must not pull the mean
        let mut pixels = grid(0.6, 0.2, 0);
        for px in pixels.iter_mut().take(20) {
            px.cloud_probability = 90.0;
            px.nir = 0.1;
            px.red = 0.9;
        }
        let s = scene("a", date(2024, 3, 5), 14, 2.0, pixels);
        let summary =
            reduce_day(date(2024, 3, 5), &[&s], &unit_square(), &NdviSettings::default()).unwrap();

        assert_eq!(summary.pixel_count, 100);
        assert_relative_eq!(summary.mean_ndvi.unwrap(), 0.5, epsilon = 1e-12);
        assert_relative_eq!(summary.clear_fraction, 0.8, epsilon = 1e-12);
    }

    #[test]
    fn test_reduce_day_averages_same_day_scenes_pixelwise() {
        // ---
        // Two passes: one cloud-free with NDVI 0.5, one fully cloudy
        let day = date(2024, 3, 5);
        let clear = scene("a", day, 13, 1.0, grid(0.6, 0.2, 0));
        let cloudy = scene("b", day, 15, 5.0, grid(0.3, 0.3, 100));
        let summary = reduce_day(day, &[&clear, &cloudy], &unit_square(), &NdviSettings::default())
            .unwrap();

        // NDVI only from clear samples; quality halves
        assert_relative_eq!(summary.mean_ndvi.unwrap(), 0.5, epsilon = 1e-12);
        assert_relative_eq!(summary.clear_fraction, 0.5, epsilon = 1e-12);
        assert_eq!(summary.pixel_count, 100);
    }

    #[test]
    fn test_reduce_day_clips_to_polygon() {
        // ---
        let mut pixels = grid(0.6, 0.2, 0);
        pixels.push(ScenePixel {
            lon: 1.5,
            lat: 0.5,
            nir: 0.0,
            red: 1.0,
            cloud_probability: 0.0,
        });
        let s = scene("a", date(2024, 3, 5), 14, 1.0, pixels);
        let summary =
            reduce_day(date(2024, 3, 5), &[&s], &unit_square(), &NdviSettings::default()).unwrap();
        assert_eq!(summary.pixel_count, 100);
        assert_relative_eq!(summary.mean_ndvi.unwrap(), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_reduce_day_all_cloudy() {
        // ---
        let s = scene("a", date(2024, 3, 5), 14, 1.0, grid(0.6, 0.2, 100));
        let summary =
            reduce_day(date(2024, 3, 5), &[&s], &unit_square(), &NdviSettings::default()).unwrap();
        assert_eq!(summary.mean_ndvi, None);
        assert_eq!(summary.clear_fraction, 0.0);
    }

    #[test]
    fn test_reduce_day_pixel_cap() {
        // ---
        let settings = NdviSettings {
            max_pixels: 50,
            ..NdviSettings::default()
        };
        let s = scene("a", date(2024, 3, 5), 14, 1.0, grid(0.6, 0.2, 0));
        let err = reduce_day(date(2024, 3, 5), &[&s], &unit_square(), &settings).unwrap_err();
        assert!(matches!(err, ServiceError::TooManyPixels { count: 100, cap: 50 }));
    }

    #[tokio::test]
    async fn test_five_clear_days_and_one_low_quality_day() {
        // ---
        let mut scenes = Vec::new();
        for (i, d) in [3, 8, 13, 18, 23].iter().enumerate() {
            scenes.push(scene(
                &format!("clear-{i}"),
                date(2024, 3, *d),
                14,
                2.0,
                grid(0.6, 0.2, 10),
            ));
        }
        // Sixth day: two passes, both mostly cloudy at pixel level
        scenes.push(scene("low-a", date(2024, 3, 28), 13, 8.0, grid(0.5, 0.3, 60)));
        scenes.push(scene("low-b", date(2024, 3, 28), 14, 9.0, grid(0.5, 0.3, 40)));

        let archive = FakeArchive::new(scenes);
        let records = aggregate_ndvi(&archive, &unit_square(), &march(), &NdviSettings::default())
            .await
            .unwrap();

        assert_eq!(records.len(), 5);
        assert!(records.iter().all(|r| r.date != date(2024, 3, 28)));
        assert!(records.windows(2).all(|w| w[0].date < w[1].date));
        for r in &records {
            assert_relative_eq!(r.ndvi.unwrap(), 0.5, epsilon = 1e-12);
        }

        let query = archive.last_query.lock().unwrap().clone().unwrap();
        assert_eq!(query.collection, "COPERNICUS/S2_SR_HARMONIZED");
    }

    #[tokio::test]
    async fn test_gate_keeps_exact_threshold_day() {
        // ---
        // 20 of 100 pixels cloudy gives a clear fraction of exactly 0.8
        let scenes = vec![scene("edge", date(2024, 3, 10), 14, 3.0, grid(0.6, 0.2, 20))];
        let archive = FakeArchive::new(scenes);
        let records = aggregate_ndvi(&archive, &unit_square(), &march(), &NdviSettings::default())
            .await
            .unwrap();
        assert_eq!(records.len(), 1);

        // 21 cloudy pixels drops it
        let scenes = vec![scene("edge", date(2024, 3, 10), 14, 3.0, grid(0.6, 0.2, 21))];
        let archive = FakeArchive::new(scenes);
        let records = aggregate_ndvi(&archive, &unit_square(), &march(), &NdviSettings::default())
            .await
            .unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_scenes_outside_range_or_over_cover_are_ignored() {
        // ---
        let scenes = vec![
            scene("late", date(2024, 3, 31), 1, 1.0, grid(0.6, 0.2, 0)),
            scene("cloudy", date(2024, 3, 12), 14, 45.0, grid(0.6, 0.2, 0)),
            scene("ok", date(2024, 3, 12), 15, 4.0, grid(0.9, 0.1, 0)),
        ];
        let archive = FakeArchive::new(scenes);
        let records = aggregate_ndvi(&archive, &unit_square(), &march(), &NdviSettings::default())
            .await
            .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].date, date(2024, 3, 12));
        assert_relative_eq!(records[0].ndvi.unwrap(), 0.8, epsilon = 1e-12);
    }

    #[tokio::test]
    async fn test_no_scenes_is_empty_and_failure_propagates() {
        // ---
        let archive = FakeArchive::new(vec![]);
        let records = aggregate_ndvi(&archive, &unit_square(), &march(), &NdviSettings::default())
            .await
            .unwrap();
        assert!(records.is_empty());

        let err = aggregate_ndvi(&FailingArchive, &unit_square(), &march(), &NdviSettings::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::UpstreamFetch { .. }));
    }
}
