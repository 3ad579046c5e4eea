//! Shared test fixtures for integration tests: in-memory sources and a
//! pipeline wired to them.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::Notify;

use microgrid_sim::config::Settings;
use microgrid_sim::pipeline::{Pipeline, Sources};
use microgrid_sim::series::{Horizon, HourlySeries};
use microgrid_sim::site::{Location, PriceArea, PvSystem};
use microgrid_sim::sources::{PriceSource, PvSource, Source, WeatherSeries, WeatherSource};
use microgrid_sim::state::StatusStore;
use microgrid_sim::{Error, Result};

/// 10 kWh battery at half charge, 3 kW each way.
pub const SITE_TOML: &str = r#"
[horizon]
start = "2025-01-01"
days = 1

[battery]
capacity_kwh = 10.0
initial_soc_kwh = 5.0
max_charge_kw = 3.0
max_discharge_kw = 3.0
policy = "price_aware"
"#;

pub fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
}

pub fn horizon() -> Horizon {
    Horizon::from_days(day(), 1).unwrap()
}

/// Settings for one day from 2025-01-01 with the cache under `cache_dir`.
pub fn settings(cache_dir: &Path) -> Settings {
    let mut s = Settings::from_toml_str(SITE_TOML).unwrap();
    s.cache.dir = cache_dir.to_path_buf();
    s
}

/// Night prices low, evening peak high (DKK/kWh).
pub fn price_curve(hours: usize) -> Vec<f64> {
    (0..hours)
        .map(|h| match h % 24 {
            0..=5 => 0.4,
            17..=20 => 2.8,
            _ => 1.1,
        })
        .collect()
}

/// Prices from [`price_curve`]; counts calls and can be held at a gate.
#[derive(Default)]
pub struct FakePrices {
    pub calls: AtomicUsize,
    pub gate: Option<Arc<Notify>>,
}

impl FakePrices {
    pub fn gated(gate: Arc<Notify>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            gate: Some(gate),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceSource for FakePrices {
    async fn fetch_prices(&self, _area: PriceArea, horizon: &Horizon) -> Result<HourlySeries> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        HourlySeries::from_values(horizon, price_curve(horizon.hours()))
    }
}

/// Constant wind; optionally drops trailing hours to misalign the axis.
pub struct FakeWeather {
    pub wind_ms: f64,
    pub ghi: Option<f64>,
    pub missing_hours: usize,
}

impl Default for FakeWeather {
    fn default() -> Self {
        Self {
            wind_ms: 7.0,
            ghi: None,
            missing_hours: 0,
        }
    }
}

#[async_trait]
impl WeatherSource for FakeWeather {
    async fn fetch_weather(&self, _location: Location, horizon: &Horizon) -> Result<WeatherSeries> {
        let hours = horizon.hours() - self.missing_hours;
        let axis = Horizon::new(horizon.start(), hours)?;
        let irradiance = match self.ghi {
            Some(ghi) => Some(HourlySeries::from_values(&axis, vec![ghi; hours])?),
            None => None,
        };
        Ok(WeatherSeries {
            wind_speed: HourlySeries::from_values(&axis, vec![self.wind_ms; hours])?,
            irradiance,
        })
    }
}

/// Constant PV output (kW).
pub struct FakePv(pub f64);

#[async_trait]
impl PvSource for FakePv {
    async fn estimate(
        &self,
        _location: Location,
        _system: &PvSystem,
        horizon: &Horizon,
    ) -> Result<HourlySeries> {
        HourlySeries::from_values(horizon, vec![self.0; horizon.hours()])
    }
}

/// Peak power net of losses, so the output follows the configured system.
pub struct DeratedPv;

#[async_trait]
impl PvSource for DeratedPv {
    async fn estimate(
        &self,
        _location: Location,
        system: &PvSystem,
        horizon: &Horizon,
    ) -> Result<HourlySeries> {
        let kw = system.peak_kwp * (1.0 - system.loss_fraction);
        HourlySeries::from_values(horizon, vec![kw; horizon.hours()])
    }
}

/// Every call fails as if the upstream service were down.
pub struct DownPrices;

#[async_trait]
impl PriceSource for DownPrices {
    async fn fetch_prices(&self, _area: PriceArea, _horizon: &Horizon) -> Result<HourlySeries> {
        Err(Source::Prices.unavailable("HTTP 503 Service Unavailable"))
    }
}

pub fn sources(prices: Arc<dyn PriceSource>, weather: FakeWeather) -> Sources {
    Sources {
        prices,
        weather: Arc::new(weather),
        pv: Arc::new(FakePv(1.5)),
    }
}

/// A pipeline over fake sources with a fresh status store.
pub fn pipeline(cache_dir: &Path, sources: Sources) -> Arc<Pipeline> {
    pipeline_with_store(cache_dir, sources, Arc::new(StatusStore::new()))
}

pub fn pipeline_with_store(cache_dir: &Path, sources: Sources, store: Arc<StatusStore>) -> Arc<Pipeline> {
    Arc::new(Pipeline::new(settings(cache_dir), sources, store).unwrap())
}

pub fn is_source_unavailable(err: &Error) -> bool {
    matches!(err, Error::SourceUnavailable { origin: Source::Prices, .. })
}
