//! External data sources: day-ahead prices, weather, and PV estimates.
//!
//! Each source normalizes its upstream payload into [`HourlySeries`] on the
//! horizon's UTC hour axis. The traits are the seam the pipeline depends on,
//! so tests can substitute in-memory sources.

pub mod cache;
pub mod prices;
pub mod pvgis;
pub mod solar;
pub mod weather;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::series::{Horizon, HourlySeries};
use crate::site::{Location, PriceArea, PvSystem};

pub use cache::SeriesCache;
pub use prices::EnergiDataService;
pub use pvgis::Pvgis;
pub use solar::ClearSky;
pub use weather::OpenMeteo;

/// Identifies which upstream collaborator produced a series or an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Prices,
    Weather,
    Pv,
}

impl Source {
    /// Short name used in cache file names.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Prices => "prices",
            Self::Weather => "weather",
            Self::Pv => "pv",
        }
    }

    /// Wraps `reason` into a `SourceUnavailable` error for this source.
    pub fn unavailable(self, reason: impl fmt::Display) -> Error {
        Error::SourceUnavailable {
            origin: self,
            reason: reason.to_string(),
        }
    }

    /// Maps a transport error, calling out timeouts explicitly.
    pub fn transport(self, err: &reqwest::Error) -> Error {
        if err.is_timeout() {
            self.unavailable(format!("request timed out: {err}"))
        } else {
            self.unavailable(err)
        }
    }

    /// Maps a failure while reading or decoding a response body.
    ///
    /// A body that stalls past the client timeout is a transport failure,
    /// anything else is a malformed `what`.
    pub fn payload(self, what: &str, err: &reqwest::Error) -> Error {
        if err.is_timeout() {
            self.transport(err)
        } else {
            self.unavailable(format!("malformed {what}: {err}"))
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Prices => "price service",
            Self::Weather => "weather service",
            Self::Pv => "PV estimation service",
        };
        f.write_str(name)
    }
}

/// Builds the HTTP client shared by the outbound sources.
///
/// # Errors
///
/// Returns `InvalidConfig` if the TLS backend cannot be initialised.
pub fn http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| Error::InvalidConfig(format!("cannot build HTTP client: {e}")))
}

/// Day-ahead price provider.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Returns hourly prices in DKK/kWh covering `horizon`.
    async fn fetch_prices(&self, area: PriceArea, horizon: &Horizon) -> Result<HourlySeries>;
}

/// Hourly weather observations and forecasts on the simulation axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSeries {
    /// Wind speed at 10 m (m/s).
    pub wind_speed: HourlySeries,
    /// Global horizontal (shortwave) irradiance (W/m²), if the provider supplied it.
    pub irradiance: Option<HourlySeries>,
}

/// Weather provider.
#[async_trait]
pub trait WeatherSource: Send + Sync {
    async fn fetch_weather(&self, location: Location, horizon: &Horizon) -> Result<WeatherSeries>;
}

/// PV output estimator.
#[async_trait]
pub trait PvSource: Send + Sync {
    /// Returns expected PV output (kW) for each hour of `horizon`.
    async fn estimate(
        &self,
        location: Location,
        system: &PvSystem,
        horizon: &Horizon,
    ) -> Result<HourlySeries>;
}
