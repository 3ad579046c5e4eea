//! Core simulation types: inputs, per-hour records and the run result.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::kpi::KpiReport;
use super::policy::PolicyKind;
use crate::devices::BatteryState;
use crate::error::{Error, Result};
use crate::series::HourlySeries;

/// What the battery actually did during an hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Charge,
    Discharge,
    Idle,
}

impl Action {
    /// Battery power below this magnitude counts as idle.
    pub const IDLE_EPSILON_KW: f64 = 1e-9;

    /// Classifies the power actually moved (positive=charge).
    pub fn from_battery_kw(battery_kw: f64) -> Self {
        if battery_kw > Self::IDLE_EPSILON_KW {
            Self::Charge
        } else if battery_kw < -Self::IDLE_EPSILON_KW {
            Self::Discharge
        } else {
            Self::Idle
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Charge => "charge",
            Self::Discharge => "discharge",
            Self::Idle => "idle",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Complete record of one simulated hour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct HourRecord {
    /// Start of the hour (UTC).
    pub timestamp: DateTime<Utc>,
    /// Day-ahead price (DKK/kWh).
    pub price_dkk_per_kwh: f64,
    /// Wind speed at 10 m (m/s).
    pub wind_ms: f64,
    /// Wind turbine output (kW).
    pub wind_kw: f64,
    /// PV output (kW).
    pub pv_kw: f64,
    /// Site consumption (kW).
    pub consumption_kw: f64,
    /// Consumption minus generation (kW; positive=deficit).
    pub net_load_kw: f64,
    /// Battery power actually moved (kW; positive=charge, negative=discharge).
    pub battery_kw: f64,
    /// Grid exchange (kW; positive=import, negative=export).
    pub grid_kw: f64,
    /// Stored energy after this hour (kWh).
    pub battery_soc_kwh: f64,
    pub action: Action,
}

impl fmt::Display for HourRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | price={:>6.3} DKK/kWh | load={:>5.2}  pv={:>5.2}  wind={:>5.2} ({:>4.1} m/s) | \
             net={:>6.2}  bat={:>6.2}  grid={:>6.2} kW | SoC={:>5.2} kWh {}",
            self.timestamp.format("%Y-%m-%d %H:%M"),
            self.price_dkk_per_kwh,
            self.consumption_kw,
            self.pv_kw,
            self.wind_kw,
            self.wind_ms,
            self.net_load_kw,
            self.battery_kw,
            self.grid_kw,
            self.battery_soc_kwh,
            self.action,
        )
    }
}

/// The four hourly series a run consumes, on a shared axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationInputs {
    /// DKK/kWh.
    pub prices: HourlySeries,
    /// m/s.
    pub wind_speed: HourlySeries,
    /// kW.
    pub pv: HourlySeries,
    /// kW.
    pub consumption: HourlySeries,
}

impl SimulationInputs {
    /// Checks that every series has the same length and timestamps.
    ///
    /// # Errors
    ///
    /// Returns `InputMisaligned` naming the first series that disagrees with
    /// the price axis, or if there are no hours at all.
    pub fn check_aligned(&self) -> Result<()> {
        if self.prices.is_empty() {
            return Err(Error::InputMisaligned("no hours to simulate".into()));
        }
        for (name, series) in [
            ("wind_speed", &self.wind_speed),
            ("pv", &self.pv),
            ("consumption", &self.consumption),
        ] {
            if series.len() != self.prices.len() {
                return Err(Error::InputMisaligned(format!(
                    "prices has {} points but {name} has {}",
                    self.prices.len(),
                    series.len()
                )));
            }
            if !series.same_axis(&self.prices) {
                return Err(Error::InputMisaligned(format!(
                    "{name} timestamps differ from the price axis"
                )));
            }
        }
        Ok(())
    }

    pub fn hours(&self) -> usize {
        self.prices.len()
    }
}

/// Output of one simulation run. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub policy: PolicyKind,
    pub records: Vec<HourRecord>,
    pub initial_battery: BatteryState,
    pub final_battery: BatteryState,
    pub kpi: KpiReport,
}

impl SimulationResult {
    pub fn start(&self) -> Option<DateTime<Utc>> {
        self.records.first().map(|r| r.timestamp)
    }
}
