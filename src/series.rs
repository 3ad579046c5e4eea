//! Hour-resolution time series shared by every data source and the simulator.
//!
//! All timestamps are whole UTC hours. An [`HourlySeries`] is gap-free and
//! strictly increasing by construction, so two series can be checked for a
//! common axis with [`HourlySeries::same_axis`].

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, DurationRound, NaiveDate, TimeDelta, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::sources::Source;

/// One hourly observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    /// Start of the hour (UTC).
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Returns `true` if `ts` falls exactly on a clock hour.
pub fn is_full_hour(ts: &DateTime<Utc>) -> bool {
    ts.minute() == 0 && ts.second() == 0 && ts.nanosecond() == 0
}

/// The requested simulation range: `hours` consecutive hours from `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Horizon {
    start: DateTime<Utc>,
    hours: usize,
}

impl Horizon {
    /// Creates a horizon starting at a full UTC hour.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if `start` is not on a full hour, `hours` is
    /// zero, or the end would fall outside the representable date range.
    pub fn new(start: DateTime<Utc>, hours: usize) -> Result<Self> {
        if !is_full_hour(&start) {
            return Err(Error::InvalidConfig(format!(
                "horizon start {start} is not on a full hour"
            )));
        }
        if hours == 0 {
            return Err(Error::InvalidConfig("horizon must span at least one hour".into()));
        }
        i64::try_from(hours)
            .ok()
            .and_then(TimeDelta::try_hours)
            .and_then(|span| start.checked_add_signed(span))
            .ok_or_else(|| {
                Error::InvalidConfig(format!("horizon of {hours} hours from {start} is out of range"))
            })?;
        Ok(Self { start, hours })
    }

    /// Horizon covering `days` whole UTC days starting at midnight of `date`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if `days` is zero or the range overflows.
    pub fn from_days(date: NaiveDate, days: u32) -> Result<Self> {
        let start = date.and_time(chrono::NaiveTime::MIN).and_utc();
        let hours = (days as usize)
            .checked_mul(24)
            .ok_or_else(|| Error::InvalidConfig(format!("{days} days is out of range")))?;
        Self::new(start, hours)
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn hours(&self) -> usize {
        self.hours
    }

    /// Exclusive end of the horizon.
    pub fn end(&self) -> DateTime<Utc> {
        self.start + Duration::hours(self.hours as i64)
    }

    /// Timestamp of hour `index` counted from the start.
    pub fn timestamp(&self, index: usize) -> DateTime<Utc> {
        self.start + Duration::hours(index as i64)
    }

    /// Iterates the expected hourly axis.
    pub fn timestamps(&self) -> impl Iterator<Item = DateTime<Utc>> + '_ {
        (0..self.hours).map(|h| self.timestamp(h))
    }

    pub fn contains(&self, ts: &DateTime<Utc>) -> bool {
        *ts >= self.start && *ts < self.end()
    }

    /// Compact key used in cache file names, e.g. `20250101T00_48h`.
    pub fn cache_suffix(&self) -> String {
        format!("{}_{}h", self.start.format("%Y%m%dT%H"), self.hours)
    }
}

/// Error detail for a series that does not satisfy the hourly invariants.
fn axis_error(message: String) -> Error {
    Error::InputMisaligned(message)
}

/// Gap-free, strictly increasing hourly series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<TimeSeriesPoint>", into = "Vec<TimeSeriesPoint>")]
pub struct HourlySeries {
    points: Vec<TimeSeriesPoint>,
}

impl HourlySeries {
    /// Builds a series from points, enforcing the hourly invariants.
    ///
    /// # Errors
    ///
    /// Returns `InputMisaligned` if a timestamp is not on a full hour, or if
    /// consecutive points are not exactly one hour apart.
    pub fn from_points(points: Vec<TimeSeriesPoint>) -> Result<Self> {
        for p in &points {
            if !is_full_hour(&p.timestamp) {
                return Err(axis_error(format!(
                    "timestamp {} is not on a full hour",
                    p.timestamp
                )));
            }
        }
        for pair in points.windows(2) {
            if pair[1].timestamp - pair[0].timestamp != TimeDelta::hours(1) {
                return Err(axis_error(format!(
                    "expected consecutive hours, got {} followed by {}",
                    pair[0].timestamp, pair[1].timestamp
                )));
            }
        }
        Ok(Self { points })
    }

    /// Builds a series covering `horizon` from one value per hour.
    ///
    /// # Errors
    ///
    /// Returns `InputMisaligned` if the value count differs from the horizon length.
    pub fn from_values(horizon: &Horizon, values: Vec<f64>) -> Result<Self> {
        if values.len() != horizon.hours() {
            return Err(axis_error(format!(
                "{} values for a {} hour horizon",
                values.len(),
                horizon.hours()
            )));
        }
        let points = horizon
            .timestamps()
            .zip(values)
            .map(|(timestamp, value)| TimeSeriesPoint { timestamp, value })
            .collect();
        Ok(Self { points })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[TimeSeriesPoint] {
        &self.points
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.points.iter().map(|p| p.value)
    }

    pub fn first_timestamp(&self) -> Option<DateTime<Utc>> {
        self.points.first().map(|p| p.timestamp)
    }

    /// Returns `true` if both series have the same length and identical timestamps.
    pub fn same_axis(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .points
                .iter()
                .zip(&other.points)
                .all(|(a, b)| a.timestamp == b.timestamp)
    }

    /// Returns `true` if the series covers exactly the hours of `horizon`.
    pub fn covers(&self, horizon: &Horizon) -> bool {
        self.len() == horizon.hours() && self.first_timestamp() == Some(horizon.start())
    }
}

impl TryFrom<Vec<TimeSeriesPoint>> for HourlySeries {
    type Error = Error;

    fn try_from(points: Vec<TimeSeriesPoint>) -> Result<Self> {
        Self::from_points(points)
    }
}

impl From<HourlySeries> for Vec<TimeSeriesPoint> {
    fn from(series: HourlySeries) -> Self {
        series.points
    }
}

/// Normalizes raw upstream samples onto the hourly axis of `horizon`.
///
/// Samples are bucketed by the hour they fall in and averaged, so quarter-hour
/// data collapses into hourly means. Samples outside the horizon are dropped.
///
/// # Errors
///
/// Returns `SourceUnavailable` for `origin` if any hour of the horizon has no
/// sample.
pub fn normalize_hourly<I>(origin: Source, samples: I, horizon: &Horizon) -> Result<HourlySeries>
where
    I: IntoIterator<Item = (DateTime<Utc>, f64)>,
{
    let mut buckets: BTreeMap<DateTime<Utc>, (f64, usize)> = BTreeMap::new();
    for (ts, value) in samples {
        if !value.is_finite() {
            continue;
        }
        let Ok(hour) = ts.duration_trunc(TimeDelta::hours(1)) else {
            continue;
        };
        if !horizon.contains(&hour) {
            continue;
        }
        let entry = buckets.entry(hour).or_insert((0.0, 0));
        entry.0 += value;
        entry.1 += 1;
    }

    let mut values = Vec::with_capacity(horizon.hours());
    for ts in horizon.timestamps() {
        match buckets.get(&ts) {
            Some((sum, count)) => values.push(sum / *count as f64),
            None => return Err(origin.unavailable(format!("no data for hour {ts}"))),
        }
    }
    HourlySeries::from_values(horizon, values)
}
