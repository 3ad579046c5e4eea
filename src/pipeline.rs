//! One pipeline run: fetch the three upstream series concurrently, build the
//! consumption profile, simulate, and publish the result.
//!
//! Fetching and simulating are separate steps. [`Pipeline::execute`] is a
//! pure function of its inputs and never touches the series cache.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};

use crate::config::{PvModel, Settings};
use crate::error::Result;
use crate::series::Horizon;
use crate::sim::{SimulationInputs, SimulationResult, simulate};
use crate::sources::cache::CacheKey;
use crate::sources::solar::pv_from_irradiance;
use crate::sources::{
    ClearSky, EnergiDataService, OpenMeteo, PriceSource, PvSource, Pvgis, SeriesCache, Source,
    WeatherSource, http_client,
};
use crate::state::{RunRecord, StatusStore};

/// The upstream collaborators of a run.
#[derive(Clone)]
pub struct Sources {
    pub prices: Arc<dyn PriceSource>,
    pub weather: Arc<dyn WeatherSource>,
    /// PV estimator. With the irradiance model it is only the fallback used
    /// when the weather provider returned no irradiance.
    pub pv: Arc<dyn PvSource>,
}

impl Sources {
    /// Builds the HTTP-backed sources described by `settings`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the HTTP client cannot be built.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let s = &settings.sources;
        let client = http_client(s.timeout())?;
        let pv: Arc<dyn PvSource> = match settings.pv.model {
            PvModel::Pvgis => Arc::new(Pvgis::new(
                client.clone(),
                &s.pvgis_url,
                settings.pv.reference_year,
            )),
            PvModel::ClearSky | PvModel::Irradiance => Arc::new(ClearSky),
        };
        Ok(Self {
            prices: Arc::new(EnergiDataService::new(
                client.clone(),
                &s.prices_url,
                s.price_datasets.clone(),
                s.dkk_per_eur,
            )),
            weather: Arc::new(OpenMeteo::new(client, &s.weather_url)),
            pv,
        })
    }
}

pub struct Pipeline {
    settings: Settings,
    sources: Sources,
    cache: SeriesCache,
    store: Arc<StatusStore>,
}

impl Pipeline {
    /// Creates a pipeline after validating `settings`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` listing every configuration violation.
    pub fn new(settings: Settings, sources: Sources, store: Arc<StatusStore>) -> Result<Self> {
        settings.check()?;
        let cache = SeriesCache::new(settings.cache.dir.clone(), settings.cache.reuse);
        Ok(Self {
            settings,
            sources,
            cache,
            store,
        })
    }

    /// Creates a pipeline backed by the real upstream services.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if `settings` are invalid.
    pub fn from_settings(settings: Settings, store: Arc<StatusStore>) -> Result<Self> {
        settings.check()?;
        let sources = Sources::from_settings(&settings)?;
        Self::new(settings, sources, store)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<StatusStore> {
        &self.store
    }

    pub fn cache(&self) -> &SeriesCache {
        &self.cache
    }

    /// The configured horizon.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the horizon is empty.
    pub fn default_horizon(&self) -> Result<Horizon> {
        self.settings.horizon(None, None)
    }

    /// Fetches prices, weather and PV concurrently and builds the run inputs.
    ///
    /// Every fetch goes through the series cache. The first failing source
    /// aborts the whole fetch.
    ///
    /// # Errors
    ///
    /// Returns `SourceUnavailable` from the first failing source, or `Cache`
    /// if the cache directory cannot be written.
    #[instrument(skip(self, horizon), fields(area = %self.settings.site.price_area, start = %horizon.start(), hours = horizon.hours()))]
    pub async fn fetch(&self, horizon: &Horizon, refresh: bool) -> Result<SimulationInputs> {
        let area = self.settings.site.price_area;
        let location = self.settings.location()?;
        let system = self.settings.pv.system();
        let model = self.settings.pv.model;

        let prices_key = CacheKey::new(Source::Prices, area.as_str(), *horizon);
        let weather_key = CacheKey::new(Source::Weather, location.cache_subject(), *horizon);
        let mut pv_subject = format!(
            "{}_{}_{}",
            location.cache_subject(),
            model.as_str(),
            system.cache_subject()
        );
        if model == PvModel::Pvgis {
            pv_subject.push_str(&format!("_y{}", self.settings.pv.reference_year));
        }
        let pv_key = CacheKey::new(Source::Pv, pv_subject, *horizon);

        let prices = self.cache.get_or_fetch(&prices_key, refresh, || {
            self.sources.prices.fetch_prices(area, horizon)
        });
        let weather = self.cache.get_or_fetch(&weather_key, refresh, || {
            self.sources.weather.fetch_weather(location, horizon)
        });
        let pv = async {
            if model == PvModel::Irradiance {
                return Ok(None);
            }
            self.cache
                .get_or_fetch(&pv_key, refresh, || {
                    self.sources.pv.estimate(location, &system, horizon)
                })
                .await
                .map(Some)
        };
        let (prices, weather, pv) = tokio::try_join!(prices, weather, pv)?;

        let pv = match (pv, weather.irradiance) {
            (Some(pv), _) => pv,
            (None, Some(ghi)) => pv_from_irradiance(&system, location, &ghi)?,
            (None, None) => {
                warn!("weather source returned no irradiance, using fallback pv estimate");
                self.sources.pv.estimate(location, &system, horizon).await?
            }
        };

        let consumption = self.settings.consumption.profile().series(horizon)?;
        info!(prices = prices.len(), wind = weather.wind_speed.len(), pv = pv.len(), "inputs ready");
        Ok(SimulationInputs {
            prices,
            wind_speed: weather.wind_speed,
            pv,
            consumption,
        })
    }

    /// Simulates `inputs` with the configured battery, turbine and policy.
    ///
    /// # Errors
    ///
    /// Returns `InputMisaligned` if the inputs do not share one axis.
    pub fn execute(&self, inputs: &SimulationInputs) -> Result<SimulationResult> {
        simulate(
            self.settings.battery.policy,
            self.settings.battery.initial_state()?,
            self.settings.wind.turbine(),
            inputs,
        )
    }

    /// Runs the full pipeline over `horizon` and publishes the result.
    ///
    /// Only one run may be in progress. A failed run leaves the previously
    /// published result in place and is recorded in the status store.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyRunning` if another run holds the run flag, otherwise
    /// the first error raised by fetching or simulating.
    pub async fn run(&self, horizon: Horizon, refresh: bool) -> Result<Arc<RunRecord>> {
        let guard = self.store.begin_run()?;
        let started_at = Utc::now();
        info!(run_id = guard.run_id(), start = %horizon.start(), hours = horizon.hours(), "run started");

        let outcome = match self.fetch(&horizon, refresh).await {
            Ok(inputs) => self.execute(&inputs),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(result) => {
                let record = RunRecord {
                    run_id: guard.run_id(),
                    area: self.settings.site.price_area,
                    horizon,
                    started_at,
                    finished_at: Utc::now(),
                    result,
                };
                let record = self.store.publish(record).await;
                info!(
                    run_id = record.run_id,
                    net_cost_dkk = record.result.kpi.net_cost_dkk,
                    final_soc_kwh = record.result.final_battery.soc_kwh,
                    "run published"
                );
                Ok(record)
            }
            Err(e) => {
                self.store.record_failure(&e).await;
                Err(e)
            }
        }
    }
}
