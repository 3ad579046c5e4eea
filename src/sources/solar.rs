//! Local PV estimate from solar geometry.
//!
//! Pipeline per hour: sun position (Spencer declination and equation of time)
//! → horizontal irradiance (Haurwitz clear sky, or a measured value) → Erbs
//! beam/diffuse split → isotropic transposition onto the panel plane → kW.

use std::f64::consts::PI;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use tracing::debug;

use super::PvSource;
use crate::error::Result;
use crate::series::{Horizon, HourlySeries};
use crate::site::{Location, PvSystem};

const SOLAR_CONSTANT: f64 = 1361.0;
const DEG: f64 = PI / 180.0;
const ALBEDO: f64 = 0.2;
/// Irradiance at which a panel produces its rated peak power (STC).
const STC_IRRADIANCE: f64 = 1000.0;

/// Sun position at one instant.
#[derive(Debug, Clone, Copy)]
pub struct SunPosition {
    /// Elevation above the horizon (radians).
    pub elevation: f64,
    /// Azimuth clockwise from north (radians).
    pub azimuth: f64,
    /// Eccentricity-corrected extraterrestrial irradiance (W/m²).
    pub extraterrestrial: f64,
}

impl SunPosition {
    /// Computes the sun position for `location` at `ts`.
    pub fn at(location: Location, ts: DateTime<Utc>) -> Self {
        let doy = f64::from(ts.ordinal());
        let ut_h = f64::from(ts.hour()) + f64::from(ts.minute()) / 60.0;

        let b = 2.0 * PI * (doy - 1.0) / 365.0;
        let declination = 0.006918 - 0.399912 * b.cos() + 0.070257 * b.sin()
            - 0.006758 * (2.0 * b).cos()
            + 0.000907 * (2.0 * b).sin()
            - 0.002697 * (3.0 * b).cos()
            + 0.00148 * (3.0 * b).sin();
        let eot_min = 229.18
            * (0.000075 + 0.001868 * b.cos()
                - 0.032077 * b.sin()
                - 0.014615 * (2.0 * b).cos()
                - 0.04089 * (2.0 * b).sin());

        let solar_time_h = ut_h + location.longitude / 15.0 + eot_min / 60.0;
        let hour_angle = 15.0 * (solar_time_h - 12.0) * DEG;

        let lat = location.latitude * DEG;
        let sin_elev = lat.sin() * declination.sin()
            + lat.cos() * declination.cos() * hour_angle.cos();
        let elevation = sin_elev.clamp(-1.0, 1.0).asin();

        let cos_az = if elevation.cos().abs() > 1e-9 && lat.cos().abs() > 1e-9 {
            (declination.sin() - sin_elev * lat.sin()) / (elevation.cos() * lat.cos())
        } else {
            0.0
        };
        let az = cos_az.clamp(-1.0, 1.0).acos();
        // Afternoon sun is west of the meridian.
        let azimuth = if hour_angle.sin() > 0.0 { 2.0 * PI - az } else { az };

        let extraterrestrial = SOLAR_CONSTANT
            * (1.00011 + 0.034221 * b.cos() + 0.00128 * b.sin() + 0.000719 * (2.0 * b).cos()
                + 0.000077 * (2.0 * b).sin());

        Self {
            elevation,
            azimuth,
            extraterrestrial,
        }
    }

    pub fn is_up(&self) -> bool {
        self.elevation > 0.0
    }
}

/// Haurwitz clear-sky global horizontal irradiance (W/m²).
pub fn clear_sky_ghi(sun: &SunPosition) -> f64 {
    let sin_elev = sun.elevation.sin();
    if sin_elev <= 0.0 {
        return 0.0;
    }
    1098.0 * sin_elev * (-0.057 / sin_elev).exp()
}

/// Irradiance on the panel plane (W/m²) for a horizontal irradiance `ghi`.
pub fn plane_of_array(ghi: f64, sun: &SunPosition, system: &PvSystem) -> f64 {
    if !sun.is_up() || ghi <= 0.0 {
        return 0.0;
    }
    let sin_elev = sun.elevation.sin();
    let kt = (ghi / (sun.extraterrestrial * sin_elev)).clamp(0.0, 1.0);
    let diffuse_fraction = erbs_diffuse_fraction(kt);
    let dhi = ghi * diffuse_fraction;
    // Low sun makes the beam term explode; cap it at the extraterrestrial value.
    let dni = ((ghi - dhi) / sin_elev.max(0.05)).min(sun.extraterrestrial);

    let tilt = system.tilt_deg * DEG;
    // Panel azimuth uses 0 = south; the sun's azimuth is measured from north.
    let surface_azimuth = (180.0 + system.azimuth_deg) * DEG;
    let cos_incidence = sun.elevation.sin() * tilt.cos()
        + sun.elevation.cos() * tilt.sin() * (sun.azimuth - surface_azimuth).cos();

    let beam = dni * cos_incidence.max(0.0);
    let diffuse = dhi * (1.0 + tilt.cos()) / 2.0;
    let reflected = ghi * ALBEDO * (1.0 - tilt.cos()) / 2.0;
    (beam + diffuse + reflected).max(0.0)
}

fn erbs_diffuse_fraction(kt: f64) -> f64 {
    if kt <= 0.22 {
        1.0 - 0.09 * kt
    } else if kt <= 0.8 {
        0.9511 - 0.1604 * kt + 4.388 * kt.powi(2) - 16.638 * kt.powi(3) + 12.336 * kt.powi(4)
    } else {
        0.165
    }
}

/// PV output (kW) for the hour starting at `hour_start`.
///
/// The sun is evaluated at the middle of the hour. With `ghi = None` the
/// clear-sky irradiance is used.
pub fn pv_output_kw(
    system: &PvSystem,
    location: Location,
    hour_start: DateTime<Utc>,
    ghi: Option<f64>,
) -> f64 {
    let sun = SunPosition::at(location, hour_start + Duration::minutes(30));
    let ghi = ghi.unwrap_or_else(|| clear_sky_ghi(&sun));
    let poa = plane_of_array(ghi, &sun, system);
    (system.peak_kwp * poa / STC_IRRADIANCE * (1.0 - system.loss_fraction)).max(0.0)
}

/// PV output driven by measured horizontal irradiance on the same axis.
///
/// # Errors
///
/// Returns `InvalidConfig` if `system` is out of range.
pub fn pv_from_irradiance(
    system: &PvSystem,
    location: Location,
    irradiance: &HourlySeries,
) -> Result<HourlySeries> {
    system.validate()?;
    let points = irradiance
        .points()
        .iter()
        .map(|p| crate::series::TimeSeriesPoint {
            timestamp: p.timestamp,
            value: pv_output_kw(system, location, p.timestamp, Some(p.value)),
        })
        .collect();
    HourlySeries::from_points(points)
}

/// Clear-sky PV estimator; needs no network access.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClearSky;

#[async_trait]
impl PvSource for ClearSky {
    async fn estimate(
        &self,
        location: Location,
        system: &PvSystem,
        horizon: &Horizon,
    ) -> Result<HourlySeries> {
        system.validate()?;
        location.validate()?;
        let values = horizon
            .timestamps()
            .map(|ts| pv_output_kw(system, location, ts, None))
            .collect();
        debug!(hours = horizon.hours(), "clear-sky pv estimated");
        HourlySeries::from_values(horizon, values)
    }
}
