//! Historical radiation baseline.
//!
//! The request range is split at calendar-year boundaries into segments.
//! Each segment's month/day bounds are replayed across a fixed window of
//! historical years ending at the current year, and every month-day gets the
//! 95th percentile of the radiation samples collected for it. Baselines are
//! scoped per segment: the same month-day in two segments is computed twice
//! from that segment's own fetches.
//!
//! Historical fetches run as a bounded fan-out. Each result is merged after
//! collection, so no accumulator is shared between tasks. A failed year is
//! logged and skipped; it only thins the sample set.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::RangeInclusive;

use chrono::{Datelike, NaiveDate};
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::geometry::LonLat;
use crate::models::DateRange;
use crate::power::{ClimateSource, RADIATION_PARAMETER};

// ---

/// Tunables for the baseline builder.
#[derive(Debug, Clone, PartialEq)]
pub struct BaselineSettings {
    // ---
    /// Number of historical years, ending at the current year.
    pub history_years: u32,
    /// Upper bound on historical fetches in flight.
    pub concurrency: usize,
    /// Point-climate parameter to sample.
    pub parameter: String,
    /// Percentile taken over each month-day's samples.
    pub percentile: f64,
}

impl Default for BaselineSettings {
    fn default() -> Self {
        Self {
            history_years: 10,
            concurrency: 8,
            parameter: RADIATION_PARAMETER.to_string(),
            percentile: 95.0,
        }
    }
}

/// Calendar day without a year, displayed as `MM-DD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthDay {
    pub month: u32,
    pub day: u32,
}

impl MonthDay {
    pub fn of(date: NaiveDate) -> Self {
        Self {
            month: date.month(),
            day: date.day(),
        }
    }

    /// This month-day in `year`; 29 February falls back to 28 February in
    /// common years.
    pub fn in_year(self, year: i32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(year, self.month, self.day).or_else(|| {
            (self.month == 2 && self.day == 29)
                .then(|| NaiveDate::from_ymd_opt(year, 2, 28))
                .flatten()
        })
    }
}

impl fmt::Display for MonthDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}-{:02}", self.month, self.day)
    }
}

/// Calendar-year-aligned slice of the request range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    // ---
    pub user_year: i32,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Split `range` at each calendar-year boundary. First and last segments may
/// be partial years; segments in between span whole years.
pub fn split_segments(range: &DateRange) -> Vec<Segment> {
    // ---
    (range.start.year()..=range.end.year())
        .filter_map(|year| {
            let jan1 = NaiveDate::from_ymd_opt(year, 1, 1)?;
            let dec31 = NaiveDate::from_ymd_opt(year, 12, 31)?;
            Some(Segment {
                user_year: year,
                start: range.start.max(jan1),
                end: range.end.min(dec31),
            })
        })
        .collect()
}

/// The `history_years` years ending at `today`'s year.
pub fn historical_years(today: NaiveDate, history_years: u32) -> RangeInclusive<i32> {
    let last = today.year();
    (last - history_years as i32 + 1)..=last
}

/// Fetch bounds for replaying `segment` in historical `year`, clamped to
/// `today`. `None` when the window lies entirely in the future.
pub fn historical_window(
    segment: &Segment,
    year: i32,
    today: NaiveDate,
) -> Option<(NaiveDate, NaiveDate)> {
    // ---
    let start = MonthDay::of(segment.start).in_year(year)?;
    let end = MonthDay::of(segment.end).in_year(year)?;
    if start > today {
        return None;
    }
    Some((start, end.min(today)))
}

/// Linear-interpolation percentile (`p` in 0..=100) of `values`.
///
/// Returns `None` for an empty sample set.
pub fn percentile(values: &[f64], p: f64) -> Option<f64> {
    // ---
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = (p / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64))
}

/// Per-(segment year, month-day) percentile values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RadiationBaseline {
    values: BTreeMap<(i32, MonthDay), f64>,
}

impl RadiationBaseline {
    /// Baseline for `date`, looked up in the segment of `date`'s year.
    pub fn get(&self, date: NaiveDate) -> Option<f64> {
        self.values.get(&(date.year(), MonthDay::of(date))).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&(i32, MonthDay), &f64)> {
        self.values.iter()
    }
}

/// One historical fetch.
#[derive(Debug, Clone, Copy)]
struct FetchTask {
    user_year: i32,
    historical_year: i32,
    start: NaiveDate,
    end: NaiveDate,
}

/// Build the radiation baseline for `range` at `point`.
///
/// Never fails: historical years whose fetch fails are skipped, and
/// month-days left without samples are absent from the result.
pub async fn build_radiation_baseline(
    source: &dyn ClimateSource,
    point: LonLat,
    range: &DateRange,
    settings: &BaselineSettings,
    today: NaiveDate,
) -> RadiationBaseline {
    // ---
    let segments = split_segments(range);
    let years = historical_years(today, settings.history_years);

    let tasks: Vec<FetchTask> = segments
        .iter()
        .flat_map(|segment| {
            years.clone().filter_map(move |year| {
                historical_window(segment, year, today).map(|(start, end)| FetchTask {
                    user_year: segment.user_year,
                    historical_year: year,
                    start,
                    end,
                })
            })
        })
        .collect();

    debug!(
        "Radiation baseline: {} segments x years {:?} -> {} fetches",
        segments.len(),
        years,
        tasks.len()
    );

    let parameter = settings.parameter.as_str();
    let results: Vec<_> = stream::iter(tasks)
        .map(move |task| async move {
            let result = source
                .daily_series(point, parameter, task.start, task.end)
                .await;
            (task, result)
        })
        .buffer_unordered(settings.concurrency.max(1))
        .collect()
        .await;

    let mut samples: BTreeMap<(i32, MonthDay), Vec<f64>> = BTreeMap::new();
    let mut skipped = 0usize;
    for (task, result) in results {
        match result {
            Ok(series) => {
                for (date, value) in series.range(task.start..=task.end) {
                    samples
                        .entry((task.user_year, MonthDay::of(*date)))
                        .or_default()
                        .push(*value);
                }
            }
            Err(e) => {
                skipped += 1;
                warn!(
                    "Skipping {} {}..{} for segment {}: {}",
                    task.historical_year, task.start, task.end, task.user_year, e
                );
            }
        }
    }

    let values = samples
        .into_iter()
        .filter_map(|(key, vals)| percentile(&vals, settings.percentile).map(|p| (key, p)))
        .collect::<BTreeMap<_, _>>();

    info!(
        "Radiation baseline: {} month-day keys, {} historical fetches skipped",
        values.len(),
        skipped
    );
    RadiationBaseline { values }
}
