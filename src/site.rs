//! Static description of the simulated site: market zone, coordinates and PV array.

use std::fmt;
use std::str::FromStr;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Timezone used by the Danish market data and for the consumption profile.
pub const LOCAL_TZ: Tz = chrono_tz::Europe::Copenhagen;

/// Electricity market zone whose day-ahead prices are fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PriceArea {
    /// Western Denmark (Jutland, Funen).
    DK1,
    /// Eastern Denmark (Zealand, Bornholm).
    DK2,
}

impl PriceArea {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DK1 => "DK1",
            Self::DK2 => "DK2",
        }
    }
}

impl fmt::Display for PriceArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PriceArea {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "DK1" => Ok(Self::DK1),
            "DK2" => Ok(Self::DK2),
            _ => Err(Error::InvalidConfig(format!(
                "unknown price area \"{s}\", expected DK1 or DK2"
            ))),
        }
    }
}

impl TryFrom<String> for PriceArea {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<PriceArea> for String {
    fn from(area: PriceArea) -> Self {
        area.as_str().to_string()
    }
}

/// Geographic position used for weather and PV queries.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Latitude in degrees, north positive.
    pub latitude: f64,
    /// Longitude in degrees, east positive.
    pub longitude: f64,
}

impl Location {
    /// Creates a validated location.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if a coordinate is not finite or out of range.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        let location = Self {
            latitude,
            longitude,
        };
        location.validate()?;
        Ok(location)
    }

    /// Checks that both coordinates are finite and within their ranges.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` naming the offending coordinate.
    pub fn validate(&self) -> Result<()> {
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(Error::InvalidConfig(format!(
                "latitude {} must be in [-90, 90]",
                self.latitude
            )));
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(Error::InvalidConfig(format!(
                "longitude {} must be in [-180, 180]",
                self.longitude
            )));
        }
        Ok(())
    }

    /// Stable string form used in cache keys, e.g. `57.0488_9.9217`.
    pub fn cache_subject(&self) -> String {
        format!("{:.4}_{:.4}", self.latitude, self.longitude)
    }
}

/// Static description of the simulated PV installation.
///
/// Azimuth follows the PVGIS "aspect" convention: 0 = south, -90 = east,
/// 90 = west.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PvSystem {
    /// Installed peak power (kWp).
    pub peak_kwp: f64,
    /// Panel tilt from horizontal (degrees).
    pub tilt_deg: f64,
    /// Panel azimuth (degrees, 0 = south).
    pub azimuth_deg: f64,
    /// Total system losses as a fraction (0.14 = 14 %).
    pub loss_fraction: f64,
}

impl PvSystem {
    /// Checks every field against its physically valid range.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for the first field out of range.
    pub fn validate(&self) -> Result<()> {
        if !self.peak_kwp.is_finite() || self.peak_kwp <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "pv.peak_kwp {} must be > 0",
                self.peak_kwp
            )));
        }
        if !(0.0..=90.0).contains(&self.tilt_deg) {
            return Err(Error::InvalidConfig(format!(
                "pv.tilt_deg {} must be in [0, 90]",
                self.tilt_deg
            )));
        }
        if !(-180.0..=180.0).contains(&self.azimuth_deg) {
            return Err(Error::InvalidConfig(format!(
                "pv.azimuth_deg {} must be in [-180, 180]",
                self.azimuth_deg
            )));
        }
        if !(0.0..1.0).contains(&self.loss_fraction) {
            return Err(Error::InvalidConfig(format!(
                "pv.loss_fraction {} must be in [0, 1)",
                self.loss_fraction
            )));
        }
        Ok(())
    }

    /// Every field at full precision, e.g. `5kwp_35_0_0.14`.
    pub fn cache_subject(&self) -> String {
        format!(
            "{}kwp_{}_{}_{}",
            self.peak_kwp, self.tilt_deg, self.azimuth_deg, self.loss_fraction
        )
    }
}
