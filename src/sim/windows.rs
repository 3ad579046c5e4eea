//! Green windows: stretches of hours where local generation covers the load.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::types::HourRecord;

/// A contiguous run of hours with `pv + wind >= load`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct GreenWindow {
    /// First hour of the window (UTC).
    pub start: DateTime<Utc>,
    /// Exclusive end of the window (UTC).
    pub end: DateTime<Utc>,
    pub hours: usize,
    /// Mean of `pv + wind - load` over the window (kW).
    pub avg_margin_kw: f64,
}

/// Finds green windows of at least `min_hours` hours.
///
/// With `load_kw = None` each hour is compared against its simulated
/// consumption; otherwise against the constant `load_kw`.
pub fn green_windows(records: &[HourRecord], load_kw: Option<f64>, min_hours: usize) -> Vec<GreenWindow> {
    let min_hours = min_hours.max(1);
    let mut windows = Vec::new();
    let mut open: Option<(usize, f64)> = None;

    let close = |start: usize, end: usize, margin_sum: f64, windows: &mut Vec<GreenWindow>| {
        let hours = end - start;
        if hours >= min_hours {
            windows.push(GreenWindow {
                start: records[start].timestamp,
                end: records[end - 1].timestamp + Duration::hours(1),
                hours,
                avg_margin_kw: margin_sum / hours as f64,
            });
        }
    };

    for (i, r) in records.iter().enumerate() {
        let load = load_kw.unwrap_or(r.consumption_kw);
        let margin = r.pv_kw + r.wind_kw - load;
        if margin >= 0.0 {
            match open.as_mut() {
                Some((_, sum)) => *sum += margin,
                None => open = Some((i, margin)),
            }
        } else if let Some((start, sum)) = open.take() {
            close(start, i, sum, &mut windows);
        }
    }
    if let Some((start, sum)) = open {
        close(start, records.len(), sum, &mut windows);
    }
    windows
}
