//! Common types and traits for device simulation components.

use chrono::{DateTime, Utc};
use rand::{Rng, rngs::StdRng};

/// Contextual information passed to devices during power calculations.
/// Includes the hour being simulated and an optional setpoint for controllable devices.
/// # Fields
/// * `timestamp` - Start of the simulated hour (UTC)
/// * `setpoint_kw` - Optional power setpoint for controllable devices (kW)
pub struct DeviceContext {
    pub timestamp: DateTime<Utc>,
    pub setpoint_kw: Option<f64>,
}

impl DeviceContext {
    /// Creates a new DeviceContext for the given hour and no setpoint.
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            setpoint_kw: None,
        }
    }

    /// Creates a new DeviceContext for the given hour and setpoint.
    pub fn with_setpoint(timestamp: DateTime<Utc>, setpoint_kw: f64) -> Self {
        Self {
            timestamp,
            setpoint_kw: Some(setpoint_kw),
        }
    }
}

/// A device that produces or consumes electricity for one simulated hour.
pub trait Device {
    /// Returns the average power over the hour in `context`.
    ///
    /// Positive values indicate consumption (load on the site bus),
    /// negative values indicate generation.
    fn power_kw(&mut self, context: &DeviceContext) -> f64;
}

/// Gaussian noise via the Box-Muller transform.
///
/// Returns 0 when `std_dev` is not positive, without drawing from `rng`.
pub fn gaussian_noise(rng: &mut StdRng, std_dev: f64) -> f64 {
    if std_dev <= 0.0 {
        return 0.0;
    }

    let u1: f64 = rng.random::<f64>().clamp(1e-12, 1.0);
    let u2: f64 = rng.random::<f64>();
    let z0 = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    z0 * std_dev
}
