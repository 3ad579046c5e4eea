//! [Open-Meteo](https://open-meteo.com) hourly wind and irradiance client.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::{info, instrument, warn};

use super::{Source, WeatherSeries, WeatherSource};
use crate::error::Result;
use crate::series::{Horizon, normalize_hourly};
use crate::site::Location;

/// Open-Meteo returns local ISO times without seconds; we request UTC.
const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M";

pub struct OpenMeteo {
    client: Client,
    base_url: String,
}

impl OpenMeteo {
    /// Creates a client against `base_url` (the `/v1/forecast` endpoint).
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.to_string(),
        }
    }
}

#[async_trait]
impl WeatherSource for OpenMeteo {
    #[instrument(skip(self, horizon), fields(lat = location.latitude, lon = location.longitude))]
    async fn fetch_weather(&self, location: Location, horizon: &Horizon) -> Result<WeatherSeries> {
        location.validate()?;

        // Irradiance for the last hour is stamped at the horizon end.
        let start_date = horizon.start().date_naive().to_string();
        let end_date = horizon.end().date_naive().to_string();
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("latitude", format!("{:.4}", location.latitude)),
                ("longitude", format!("{:.4}", location.longitude)),
                ("hourly", "wind_speed_10m,shortwave_radiation".to_string()),
                ("wind_speed_unit", "ms".to_string()),
                ("timezone", "UTC".to_string()),
                ("start_date", start_date),
                ("end_date", end_date),
            ])
            .send()
            .await
            .map_err(|e| Source::Weather.transport(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Source::Weather.unavailable(format!("HTTP {status}")));
        }

        let body: ForecastResponse = response
            .json()
            .await
            .map_err(|e| Source::Weather.payload("payload", &e))?;
        let hourly = body.hourly;
        let times = hourly.parse_times()?;

        let wind = samples(&times, &hourly.wind_speed_10m);
        let wind_speed = normalize_hourly(Source::Weather, wind, horizon)?;

        let irradiance = match &hourly.shortwave_radiation {
            Some(values) => match normalize_hourly(Source::Weather, preceding_hour(&times, values), horizon) {
                Ok(series) => Some(series),
                Err(e) => {
                    warn!(error = %e, "irradiance incomplete, ignoring");
                    None
                }
            },
            None => None,
        };

        info!(points = wind_speed.len(), irradiance = irradiance.is_some(), "weather fetched");
        Ok(WeatherSeries {
            wind_speed,
            irradiance,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    hourly: HourlyBlock,
}

#[derive(Debug, Deserialize)]
struct HourlyBlock {
    time: Vec<String>,
    wind_speed_10m: Vec<Option<f64>>,
    #[serde(default)]
    shortwave_radiation: Option<Vec<Option<f64>>>,
}

impl HourlyBlock {
    fn parse_times(&self) -> Result<Vec<DateTime<Utc>>> {
        self.time
            .iter()
            .map(|t| {
                NaiveDateTime::parse_from_str(t, TIME_FORMAT)
                    .map(|naive| naive.and_utc())
                    .map_err(|e| Source::Weather.unavailable(format!("bad timestamp \"{t}\": {e}")))
            })
            .collect()
    }
}

/// Pairs timestamps with present values; nulls are left out and surface as gaps.
fn samples<'a>(
    times: &'a [DateTime<Utc>],
    values: &'a [Option<f64>],
) -> impl Iterator<Item = (DateTime<Utc>, f64)> + 'a {
    times
        .iter()
        .zip(values)
        .filter_map(|(t, v)| v.map(|v| (*t, v.max(0.0))))
}

/// Radiation is the mean over the hour before its timestamp, so the value
/// stamped `T` belongs to the hour starting at `T - 1h`.
fn preceding_hour<'a>(
    times: &'a [DateTime<Utc>],
    values: &'a [Option<f64>],
) -> impl Iterator<Item = (DateTime<Utc>, f64)> + 'a {
    samples(times, values).map(|(t, v)| (t - Duration::hours(1), v))
}
