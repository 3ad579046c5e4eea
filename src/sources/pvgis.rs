//! PVGIS `seriescalc` client.
//!
//! PVGIS only serves historical irradiance, so the estimate for a future
//! horizon is the output of the same calendar hour in a reference year.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{Datelike, NaiveDateTime, Timelike};
use reqwest::Client;
use serde::Deserialize;
use tracing::{info, instrument};

use super::{PvSource, Source};
use crate::error::Result;
use crate::series::{Horizon, HourlySeries};
use crate::site::{Location, PvSystem};

/// PVGIS time stamps look like `20200101:0010` (UTC, minute is the sample offset).
const TIME_FORMAT: &str = "%Y%m%d:%H%M";

/// Key into the reference year: (month, day, hour).
type CalendarHour = (u32, u32, u32);

pub struct Pvgis {
    client: Client,
    base_url: String,
    reference_year: i32,
}

impl Pvgis {
    /// Creates a client.
    ///
    /// # Arguments
    ///
    /// * `client` - Shared HTTP client
    /// * `base_url` - The `seriescalc` endpoint
    /// * `reference_year` - Year of irradiance data projected onto the horizon
    pub fn new(client: Client, base_url: &str, reference_year: i32) -> Self {
        Self {
            client,
            base_url: base_url.to_string(),
            reference_year,
        }
    }

    async fn reference_profile(
        &self,
        location: Location,
        system: &PvSystem,
    ) -> Result<HashMap<CalendarHour, f64>> {
        let year = self.reference_year.to_string();
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("lat", format!("{:.6}", location.latitude)),
                ("lon", format!("{:.6}", location.longitude)),
                ("peakpower", format!("{:.3}", system.peak_kwp)),
                ("loss", format!("{:.1}", system.loss_fraction * 100.0)),
                ("angle", format!("{:.1}", system.tilt_deg)),
                ("aspect", format!("{:.1}", system.azimuth_deg)),
                ("startyear", year.clone()),
                ("endyear", year),
                ("outputformat", "json".to_string()),
                ("pvcalculation", "1".to_string()),
                ("pvtechchoice", "crystSi".to_string()),
                ("mountingplace", "free".to_string()),
                ("raddatabase", "PVGIS-SARAH3".to_string()),
            ])
            .send()
            .await
            .map_err(|e| Source::Pv.transport(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Source::Pv.unavailable(format!("HTTP {status}")));
        }

        let body: SeriesResponse = response
            .json()
            .await
            .map_err(|e| Source::Pv.payload("payload", &e))?;

        let mut profile = HashMap::with_capacity(body.outputs.hourly.len());
        for row in body.outputs.hourly {
            let ts = NaiveDateTime::parse_from_str(&row.time, TIME_FORMAT).map_err(|e| {
                Source::Pv.unavailable(format!("bad timestamp \"{}\": {e}", row.time))
            })?;
            let power_w = row
                .power_w
                .ok_or_else(|| Source::Pv.unavailable("response has no P column"))?;
            profile.insert((ts.month(), ts.day(), ts.hour()), power_w.max(0.0) / 1000.0);
        }
        Ok(profile)
    }
}

#[async_trait]
impl PvSource for Pvgis {
    #[instrument(skip(self, system, horizon), fields(year = self.reference_year))]
    async fn estimate(
        &self,
        location: Location,
        system: &PvSystem,
        horizon: &Horizon,
    ) -> Result<HourlySeries> {
        system.validate()?;
        location.validate()?;

        let profile = self.reference_profile(location, system).await?;
        let series = project(&profile, horizon)?;
        info!(points = series.len(), "pv estimated");
        Ok(series)
    }
}

/// Maps each horizon hour onto the same calendar hour of the reference year.
fn project(profile: &HashMap<CalendarHour, f64>, horizon: &Horizon) -> Result<HourlySeries> {
    let mut values = Vec::with_capacity(horizon.hours());
    for ts in horizon.timestamps() {
        let key = (ts.month(), ts.day(), ts.hour());
        let value = profile
            .get(&key)
            .or_else(|| (key.0 == 2 && key.1 == 29).then(|| profile.get(&(2, 28, key.2))).flatten())
            .ok_or_else(|| {
                Source::Pv.unavailable(format!(
                    "reference year has no data for {:02}-{:02} {:02}:00",
                    key.0, key.1, key.2
                ))
            })?;
        values.push(*value);
    }
    HourlySeries::from_values(horizon, values)
}

#[derive(Debug, Deserialize)]
struct SeriesResponse {
    outputs: Outputs,
}

#[derive(Debug, Deserialize)]
struct Outputs {
    hourly: Vec<HourlyRow>,
}

#[derive(Debug, Deserialize)]
struct HourlyRow {
    time: String,
    #[serde(rename = "P")]
    power_w: Option<f64>,
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::NaiveDate;
    use mockito::{Matcher, Server};
    use serde_json::json;

    use super::*;
    use crate::error::Error;
    use crate::sources::http_client;

    fn system() -> PvSystem {
        PvSystem {
            peak_kwp: 5.0,
            tilt_deg: 35.0,
            azimuth_deg: 0.0,
            loss_fraction: 0.14,
        }
    }

    fn location() -> Location {
        Location::new(55.6761, 12.5683).unwrap()
    }

    /// Reference-year rows for the given dates, `P` = 100 W × hour.
    fn body(dates: &[(u32, u32)]) -> String {
        let hourly: Vec<_> = dates
            .iter()
            .flat_map(|(m, d)| {
                (0..24).map(move |h| {
                    json!({ "time": format!("2019{m:02}{d:02}:{h:02}10"), "P": f64::from(h) * 100.0 })
                })
            })
            .collect();
        json!({ "inputs": {}, "outputs": { "hourly": hourly }, "meta": {} }).to_string()
    }

    fn client(server: &Server) -> Pvgis {
        Pvgis::new(
            http_client(Duration::from_secs(5)).unwrap(),
            &format!("{}/api/v5_3/seriescalc", server.url()),
            2019,
        )
    }

    #[tokio::test]
    async fn projects_reference_year_onto_horizon() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v5_3/seriescalc")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("startyear".into(), "2019".into()),
                Matcher::UrlEncoded("endyear".into(), "2019".into()),
                Matcher::UrlEncoded("loss".into(), "14.0".into()),
                Matcher::UrlEncoded("pvcalculation".into(), "1".into()),
            ]))
            .with_status(200)
            .with_body(body(&[(6, 21)]))
            .create_async()
            .await;

        let horizon = Horizon::from_days(NaiveDate::from_ymd_opt(2025, 6, 21).unwrap(), 1).unwrap();
        let series = client(&server)
            .estimate(location(), &system(), &horizon)
            .await
            .unwrap();

        mock.assert_async().await;
        assert!(series.covers(&horizon));
        assert_eq!(series.points()[12].value, 1.2);
    }

    #[tokio::test]
    async fn leap_day_falls_back_to_feb_28() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/v5_3/seriescalc")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(body(&[(2, 28)]))
            .create_async()
            .await;

        let horizon = Horizon::from_days(NaiveDate::from_ymd_opt(2028, 2, 29).unwrap(), 1).unwrap();
        let series = client(&server)
            .estimate(location(), &system(), &horizon)
            .await
            .unwrap();
        assert_eq!(series.len(), 24);
    }

    #[tokio::test]
    async fn missing_calendar_day_is_source_unavailable() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/v5_3/seriescalc")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(body(&[(1, 1)]))
            .create_async()
            .await;

        let horizon = Horizon::from_days(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(), 2).unwrap();
        let err = client(&server)
            .estimate(location(), &system(), &horizon)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SourceUnavailable { origin: Source::Pv, .. }));
    }

    #[tokio::test]
    async fn invalid_system_is_rejected_before_request() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let horizon = Horizon::from_days(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(), 1).unwrap();
        let bad = PvSystem { tilt_deg: 120.0, ..system() };
        let err = client(&server)
            .estimate(location(), &bad, &horizon)
            .await
            .unwrap_err();

        mock.assert_async().await;
        assert!(matches!(err, Error::InvalidConfig(_)));
    }
}
