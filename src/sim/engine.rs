//! Hourly simulation engine: aligned inputs in, hour records and KPIs out.

use tracing::debug;

use crate::devices::{BatteryState, Device, DeviceContext, WindTurbine};
use crate::error::Result;

use super::kpi::KpiReport;
use super::policy::{Greedy, HourInput, Policy, PolicyKind, PriceAware};
use super::power_balance::{grid_kw, net_load_kw};
use super::types::{Action, HourRecord, SimulationInputs, SimulationResult};

/// Simulation engine owning the battery for the duration of one run.
///
/// Generic over `P: Policy` for static dispatch. [`Simulator::run`] consumes
/// the engine, so the battery cannot be stepped once the result exists.
pub struct Simulator<P: Policy> {
    battery: BatteryState,
    policy: P,
    turbine: WindTurbine,
}

impl<P: Policy> Simulator<P> {
    /// Creates a new simulator.
    ///
    /// # Arguments
    ///
    /// * `battery` - Initial battery state
    /// * `policy` - Dispatch policy
    /// * `turbine` - Power curve applied to the wind speed series
    pub fn new(battery: BatteryState, policy: P, turbine: WindTurbine) -> Self {
        Self {
            battery,
            policy,
            turbine,
        }
    }

    /// Executes one hour and returns its record.
    fn step(&mut self, index: usize, inputs: &SimulationInputs) -> HourRecord {
        let timestamp = inputs.prices.points()[index].timestamp;
        let price = inputs.prices.points()[index].value;
        let wind_ms = inputs.wind_speed.points()[index].value;
        let pv_kw = inputs.pv.points()[index].value;
        let consumption_kw = inputs.consumption.points()[index].value;

        let wind_kw = self.turbine.power_kw(wind_ms);
        let net_load_kw = net_load_kw(consumption_kw, pv_kw, wind_kw);

        let setpoint_kw = if net_load_kw == 0.0 {
            0.0
        } else {
            let input = HourInput {
                price_dkk_per_kwh: price,
                net_load_kw,
            };
            self.policy.battery_setpoint_kw(&input, &self.battery)
        };

        let battery_kw = self
            .battery
            .power_kw(&DeviceContext::with_setpoint(timestamp, setpoint_kw));

        HourRecord {
            timestamp,
            price_dkk_per_kwh: price,
            wind_ms,
            wind_kw,
            pv_kw,
            consumption_kw,
            net_load_kw,
            battery_kw,
            grid_kw: grid_kw(net_load_kw, battery_kw),
            battery_soc_kwh: self.battery.soc_kwh,
            action: Action::from_battery_kw(battery_kw),
        }
    }

    /// Runs every hour of `inputs` and returns the finalized result.
    ///
    /// # Errors
    ///
    /// Returns `InputMisaligned` before any hour is computed if the input
    /// series do not share one axis.
    pub fn run(mut self, policy: PolicyKind, inputs: &SimulationInputs) -> Result<SimulationResult> {
        inputs.check_aligned()?;

        let initial_battery = self.battery.clone();
        let mut records = Vec::with_capacity(inputs.hours());
        for index in 0..inputs.hours() {
            records.push(self.step(index, inputs));
        }

        let kpi = KpiReport::from_records(&records, self.battery.capacity_kwh);
        debug!(hours = records.len(), final_soc_kwh = self.battery.soc_kwh, "simulation finished");
        Ok(SimulationResult {
            policy,
            records,
            initial_battery,
            final_battery: self.battery,
            kpi,
        })
    }
}

/// Builds the configured policy and runs one simulation.
///
/// # Errors
///
/// Returns `InputMisaligned` if the inputs do not share one axis.
pub fn simulate(
    kind: PolicyKind,
    battery: BatteryState,
    turbine: WindTurbine,
    inputs: &SimulationInputs,
) -> Result<SimulationResult> {
    match kind {
        PolicyKind::Greedy => Simulator::new(battery, Greedy, turbine).run(kind, inputs),
        PolicyKind::PriceAware => {
            let policy = PriceAware::from_prices(&inputs.prices);
            Simulator::new(battery, policy, turbine).run(kind, inputs)
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::error::Error;
    use crate::series::{Horizon, HourlySeries};

    fn horizon(hours: usize) -> Horizon {
        let day = Horizon::from_days(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(), 1).unwrap();
        Horizon::new(day.start(), hours).unwrap()
    }

    fn constant(hours: usize, v: f64) -> HourlySeries {
        HourlySeries::from_values(&horizon(hours), vec![v; hours]).unwrap()
    }

    fn inputs(consumption: f64, pv: f64) -> SimulationInputs {
        SimulationInputs {
            prices: constant(1, 1.0),
            wind_speed: constant(1, 0.0),
            pv: constant(1, pv),
            consumption: constant(1, consumption),
        }
    }

    #[test]
    fn deficit_is_clamped_to_discharge_limit() {
        let battery = BatteryState::try_new(10.0, 5.0, 2.0, 2.0, 1.0, 1.0).unwrap();
        let result = simulate(PolicyKind::Greedy, battery, WindTurbine::default(), &inputs(3.0, 0.0))
            .unwrap();

        let hour = &result.records[0];
        assert_eq!(hour.net_load_kw, 3.0);
        assert_eq!(hour.battery_kw, -2.0);
        assert_eq!(hour.grid_kw, 1.0);
        assert_eq!(hour.battery_soc_kwh, 3.0);
        assert_eq!(hour.action, Action::Discharge);
        assert_eq!(result.final_battery.soc_kwh, 3.0);
        assert_eq!(result.initial_battery.soc_kwh, 5.0);
    }

    #[test]
    fn zero_net_load_is_idle_even_when_cheap() {
        let battery = BatteryState::try_new(10.0, 5.0, 2.0, 2.0, 1.0, 1.0).unwrap();
        let result =
            simulate(PolicyKind::PriceAware, battery, WindTurbine::default(), &inputs(2.0, 2.0))
                .unwrap();
        assert_eq!(result.records[0].action, Action::Idle);
        assert_eq!(result.records[0].battery_soc_kwh, 5.0);
    }

    #[test]
    fn full_battery_records_idle_on_surplus() {
        let battery = BatteryState::try_new(10.0, 10.0, 2.0, 2.0, 1.0, 1.0).unwrap();
        let result = simulate(PolicyKind::Greedy, battery, WindTurbine::default(), &inputs(1.0, 4.0))
            .unwrap();
        assert_eq!(result.records[0].action, Action::Idle);
        assert_eq!(result.records[0].grid_kw, -3.0);
    }

    #[test]
    fn wind_speed_goes_through_power_curve() {
        let battery = BatteryState::try_new(10.0, 5.0, 2.0, 2.0, 1.0, 1.0).unwrap();
        let mut inp = inputs(1.0, 0.0);
        inp.wind_speed = constant(1, 15.0);
        let result = simulate(PolicyKind::Greedy, battery, WindTurbine::default(), &inp).unwrap();
        assert_eq!(result.records[0].wind_kw, 3.0);
        assert_eq!(result.records[0].net_load_kw, -2.0);
        assert_eq!(result.records[0].action, Action::Charge);
    }

    #[test]
    fn misaligned_inputs_fail_before_any_hour() {
        let battery = BatteryState::try_new(10.0, 5.0, 2.0, 2.0, 1.0, 1.0).unwrap();
        let inp = SimulationInputs {
            prices: constant(24, 1.0),
            wind_speed: constant(23, 5.0),
            pv: constant(24, 0.0),
            consumption: constant(24, 1.0),
        };
        let err = simulate(PolicyKind::Greedy, battery, WindTurbine::default(), &inp).unwrap_err();
        assert!(matches!(err, Error::InputMisaligned(_)));
    }
}
