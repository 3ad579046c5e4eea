use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::devices::types::{Device, DeviceContext};
use crate::error::{Error, Result};

/// Length of one simulation step.
const STEP_HOURS: f64 = 1.0;

/// Energy-bucket battery with rate limits and round-trip losses.
///
/// State of charge is tracked in kWh and always stays within
/// `0..=capacity_kwh`. Only the simulator steps it.
///
/// # Power Flow Convention
/// - Positive power: Charging (consuming power from the site bus)
/// - Negative power: Discharging (supplying power to the site bus)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BatteryState {
    /// Usable capacity in kilowatt-hours.
    pub capacity_kwh: f64,

    /// Stored energy in kilowatt-hours.
    pub soc_kwh: f64,

    /// Maximum charge power in kilowatts (positive value).
    pub max_charge_kw: f64,

    /// Maximum discharge power in kilowatts (positive value).
    pub max_discharge_kw: f64,

    /// Charging efficiency (0..1.0].
    pub charge_efficiency: f64,

    /// Discharging efficiency (0..1.0].
    pub discharge_efficiency: f64,
}

impl BatteryState {
    /// Creates a battery after checking every parameter.
    ///
    /// # Arguments
    ///
    /// * `capacity_kwh` - Battery capacity in kWh (must be > 0)
    /// * `soc_kwh` - Initial stored energy in kWh (0 to capacity)
    /// * `max_charge_kw` - Maximum charging power in kW
    /// * `max_discharge_kw` - Maximum discharging power in kW
    /// * `charge_efficiency` - Charging efficiency (0..1.0]
    /// * `discharge_efficiency` - Discharging efficiency (0..1.0]
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if capacity is not positive, the state of charge
    /// is out of range, a rate limit is negative, or an efficiency is outside (0, 1].
    pub fn try_new(
        capacity_kwh: f64,
        soc_kwh: f64,
        max_charge_kw: f64,
        max_discharge_kw: f64,
        charge_efficiency: f64,
        discharge_efficiency: f64,
    ) -> Result<Self> {
        let battery = Self {
            capacity_kwh,
            soc_kwh,
            max_charge_kw,
            max_discharge_kw,
            charge_efficiency,
            discharge_efficiency,
        };
        battery.validate()?;
        Ok(battery)
    }

    /// Checks the invariants `try_new` enforces.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` naming the first violated invariant.
    pub fn validate(&self) -> Result<()> {
        if !self.capacity_kwh.is_finite() || self.capacity_kwh <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "battery capacity {} kWh must be > 0",
                self.capacity_kwh
            )));
        }
        if !(0.0..=self.capacity_kwh).contains(&self.soc_kwh) {
            return Err(Error::InvalidConfig(format!(
                "battery state of charge {} kWh must be within 0..={} kWh",
                self.soc_kwh, self.capacity_kwh
            )));
        }
        if !(self.max_charge_kw >= 0.0 && self.max_discharge_kw >= 0.0) {
            return Err(Error::InvalidConfig(
                "battery charge and discharge limits must be >= 0".into(),
            ));
        }
        for (name, eta) in [
            ("charge", self.charge_efficiency),
            ("discharge", self.discharge_efficiency),
        ] {
            if !(eta > 0.0 && eta <= 1.0) {
                return Err(Error::InvalidConfig(format!(
                    "battery {name} efficiency {eta} must be in (0, 1]"
                )));
            }
        }
        Ok(())
    }

    /// State of charge as a percentage of capacity.
    pub fn soc_pct(&self) -> f64 {
        100.0 * self.soc_kwh / self.capacity_kwh
    }

    /// Largest charge power the battery can absorb this hour.
    pub fn charge_headroom_kw(&self) -> f64 {
        let room_kwh = (self.capacity_kwh - self.soc_kwh) / self.charge_efficiency;
        (room_kwh / STEP_HOURS).min(self.max_charge_kw).max(0.0)
    }

    /// Largest discharge power the battery can deliver this hour.
    pub fn discharge_headroom_kw(&self) -> f64 {
        let available_kwh = self.soc_kwh * self.discharge_efficiency;
        (available_kwh / STEP_HOURS).min(self.max_discharge_kw).max(0.0)
    }
}

impl Device for BatteryState {
    /// Applies a setpoint for one hour and returns the power actually moved.
    ///
    /// Requests beyond the rate limit or the available energy/headroom are
    /// clamped, never rejected.
    fn power_kw(&mut self, context: &DeviceContext) -> f64 {
        let setpoint_kw = context.setpoint_kw.unwrap_or(0.0);

        if setpoint_kw > 0.0 {
            let actual_kw = setpoint_kw.min(self.charge_headroom_kw());
            self.soc_kwh += actual_kw * STEP_HOURS * self.charge_efficiency;
            self.soc_kwh = self.soc_kwh.clamp(0.0, self.capacity_kwh);
            actual_kw
        } else if setpoint_kw < 0.0 {
            let actual_abs_kw = (-setpoint_kw).min(self.discharge_headroom_kw());
            self.soc_kwh -= actual_abs_kw * STEP_HOURS / self.discharge_efficiency;
            self.soc_kwh = self.soc_kwh.clamp(0.0, self.capacity_kwh);
            -actual_abs_kw
        } else {
            0.0
        }
    }
}
