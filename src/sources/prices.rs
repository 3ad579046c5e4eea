//! [Energi Data Service](https://www.energidataservice.dk) day-ahead price client.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use super::{PriceSource, Source};
use crate::error::Result;
use crate::series::{Horizon, HourlySeries, normalize_hourly};
use crate::site::{LOCAL_TZ, PriceArea};

/// Datasets tried in order: the current quarter-hour dataset, then the legacy hourly one.
pub const DEFAULT_DATASETS: &[&str] = &["DayAheadPrices", "Elspotprices"];

/// Price client for the public Energi Data Service dataset API.
pub struct EnergiDataService {
    client: Client,
    base_url: String,
    datasets: Vec<String>,
    dkk_per_eur: f64,
}

impl EnergiDataService {
    /// Creates a client.
    ///
    /// # Arguments
    ///
    /// * `client` - Shared HTTP client (carries the request timeout)
    /// * `base_url` - Dataset root, e.g. `https://api.energidataservice.dk/dataset`
    /// * `datasets` - Dataset names to try in order
    /// * `dkk_per_eur` - Conversion rate used when only EUR prices are published
    pub fn new(client: Client, base_url: &str, datasets: Vec<String>, dkk_per_eur: f64) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            datasets,
            dkk_per_eur,
        }
    }

    #[instrument(skip(self, horizon), fields(start = %horizon.start(), hours = horizon.hours()))]
    async fn fetch_dataset(
        &self,
        dataset: &str,
        area: PriceArea,
        horizon: &Horizon,
    ) -> Result<Vec<(DateTime<Utc>, f64)>> {
        let url = format!("{}/{dataset}", self.base_url);
        let filter = serde_json::json!({ "PriceArea": [area.as_str()] }).to_string();
        let start = horizon.start().format("%Y-%m-%dT%H:%M").to_string();
        let end = horizon.end().format("%Y-%m-%dT%H:%M").to_string();
        let limit = (horizon.hours() * 4).to_string();

        let response = self
            .client
            .get(&url)
            .query(&[
                ("start", start.as_str()),
                ("end", end.as_str()),
                ("timezone", "utc"),
                ("filter", filter.as_str()),
                ("limit", limit.as_str()),
            ])
            .send()
            .await
            .map_err(|e| Source::Prices.transport(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Source::Prices.unavailable(format!("{dataset} returned HTTP {status}")));
        }

        let body: DatasetResponse = response
            .json()
            .await
            .map_err(|e| Source::Prices.payload(&format!("{dataset} payload"), &e))?;
        debug!(records = body.records.len(), "received");
        Ok(price_samples(body.records, area, self.dkk_per_eur))
    }
}

#[async_trait]
impl PriceSource for EnergiDataService {
    #[instrument(skip(self, horizon), fields(area = %area))]
    async fn fetch_prices(&self, area: PriceArea, horizon: &Horizon) -> Result<HourlySeries> {
        let mut last_error = None;
        for dataset in &self.datasets {
            match self.fetch_dataset(dataset, area, horizon).await {
                Ok(samples) if samples.is_empty() => {
                    warn!(dataset = %dataset, "no price records, trying next dataset");
                }
                Ok(samples) => {
                    let series = normalize_hourly(Source::Prices, samples, horizon)?;
                    info!(dataset = %dataset, points = series.len(), "prices fetched");
                    return Ok(series);
                }
                Err(e) => {
                    warn!(dataset = %dataset, error = %e, "price dataset failed");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| {
            Source::Prices.unavailable(format!("no price records for {area} in any dataset"))
        }))
    }
}

#[derive(Debug, Deserialize)]
struct DatasetResponse {
    #[serde(default)]
    records: Vec<PriceRecord>,
}

/// One row of either price dataset. Column names differ between the
/// quarter-hour `DayAheadPrices` and the legacy hourly `Elspotprices`.
#[derive(Debug, Deserialize)]
struct PriceRecord {
    #[serde(rename = "TimeUTC", alias = "HourUTC")]
    time_utc: Option<NaiveDateTime>,
    #[serde(rename = "TimeDK", alias = "HourDK")]
    time_dk: Option<NaiveDateTime>,
    #[serde(rename = "PriceArea")]
    price_area: Option<String>,
    /// DKK per MWh.
    #[serde(rename = "DayAheadPriceDKK", alias = "SpotPriceDKK")]
    price_dkk: Option<f64>,
    /// EUR per MWh.
    #[serde(rename = "DayAheadPriceEUR", alias = "SpotPriceEUR")]
    price_eur: Option<f64>,
}

impl PriceRecord {
    fn timestamp(&self) -> Option<DateTime<Utc>> {
        if let Some(utc) = self.time_utc {
            return Some(utc.and_utc());
        }
        let local = self.time_dk?;
        LOCAL_TZ
            .from_local_datetime(&local)
            .earliest()
            .map(|t| t.with_timezone(&Utc))
    }

    fn dkk_per_kwh(&self, dkk_per_eur: f64) -> Option<f64> {
        self.price_dkk
            .map(|dkk_mwh| dkk_mwh / 1000.0)
            .or_else(|| self.price_eur.map(|eur_mwh| eur_mwh * dkk_per_eur / 1000.0))
    }
}

/// Converts dataset rows into `(timestamp, DKK/kWh)` samples for `area`.
///
/// Rows for other areas or without a usable time or price are skipped.
fn price_samples(
    records: Vec<PriceRecord>,
    area: PriceArea,
    dkk_per_eur: f64,
) -> Vec<(DateTime<Utc>, f64)> {
    records
        .into_iter()
        .filter(|r| {
            r.price_area
                .as_deref()
                .is_none_or(|a| a.eq_ignore_ascii_case(area.as_str()))
        })
        .filter_map(|r| Some((r.timestamp()?, r.dkk_per_kwh(dkk_per_eur)?)))
        .collect()
}
