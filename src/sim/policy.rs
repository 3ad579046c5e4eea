//! Battery dispatch policies.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::devices::BatteryState;
use crate::error::{Error, Result};
use crate::series::HourlySeries;

/// Per-hour view handed to a policy.
#[derive(Debug, Clone, Copy)]
pub struct HourInput {
    pub price_dkk_per_kwh: f64,
    /// Consumption minus local generation (kW; positive=deficit).
    pub net_load_kw: f64,
}

/// Chooses a battery setpoint for one hour.
///
/// Setpoints follow the battery convention (positive=charge,
/// negative=discharge). They may exceed the battery's limits; the battery
/// clamps them.
pub trait Policy {
    fn battery_setpoint_kw(&self, input: &HourInput, battery: &BatteryState) -> f64;
}

/// Configured policy name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    Greedy,
    PriceAware,
}

impl PolicyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Greedy => "greedy",
            Self::PriceAware => "price_aware",
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "greedy" => Ok(Self::Greedy),
            "price_aware" => Ok(Self::PriceAware),
            _ => Err(Error::InvalidConfig(format!(
                "unknown policy \"{s}\", expected \"greedy\" or \"price_aware\""
            ))),
        }
    }
}

/// Self-consumption: discharge to cover deficits, charge from surplus.
///
/// Drives the grid exchange towards zero: `grid = net_load + battery`,
/// so the setpoint is `-net_load`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Greedy;

impl Policy for Greedy {
    fn battery_setpoint_kw(&self, input: &HourInput, _battery: &BatteryState) -> f64 {
        -input.net_load_kw
    }
}

/// Price-aware dispatch using the horizon's price quartiles.
///
/// * price <= 25th percentile: charge at the full rate, importing if needed
/// * price >= 75th percentile: behave like [`Greedy`]
/// * otherwise: absorb surplus only and hold charge for expensive hours
#[derive(Debug, Clone, Copy)]
pub struct PriceAware {
    pub cheap_threshold: f64,
    pub expensive_threshold: f64,
}

impl PriceAware {
    /// Derives the thresholds from the prices of the horizon being simulated.
    pub fn from_prices(prices: &HourlySeries) -> Self {
        let mut sorted: Vec<f64> = prices.values().collect();
        sorted.sort_by(f64::total_cmp);
        Self {
            cheap_threshold: quantile(&sorted, 0.25),
            expensive_threshold: quantile(&sorted, 0.75),
        }
    }
}

impl Policy for PriceAware {
    fn battery_setpoint_kw(&self, input: &HourInput, battery: &BatteryState) -> f64 {
        let price = input.price_dkk_per_kwh;
        if price <= self.cheap_threshold {
            battery.max_charge_kw
        } else if price >= self.expensive_threshold {
            -input.net_load_kw
        } else {
            (-input.net_load_kw).max(0.0)
        }
    }
}

/// Linear-interpolation quantile of an ascending slice; 0 for an empty slice.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let pos = q.clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = pos.ceil() as usize;
            sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
        }
    }
}
