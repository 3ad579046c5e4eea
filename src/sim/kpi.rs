//! Post-hoc KPI computation from simulation results.

use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::types::HourRecord;

/// One simulated hour, in hours.
const DT_HOURS: f64 = 1.0;

/// Aggregate key performance indicators derived from a complete simulation run.
///
/// Computed post-hoc from the hour records to ensure consistency between
/// step data and reported metrics.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, ToSchema)]
pub struct KpiReport {
    /// Number of simulated hours.
    pub hours: usize,
    /// Total site consumption (kWh).
    pub consumption_kwh: f64,
    /// Total PV generation (kWh).
    pub pv_kwh: f64,
    /// Total wind generation (kWh).
    pub wind_kwh: f64,
    /// Energy imported from the grid (kWh).
    pub grid_import_kwh: f64,
    /// Energy exported to the grid (kWh, positive magnitude).
    pub grid_export_kwh: f64,
    /// Import cost minus export revenue at spot price (DKK).
    pub net_cost_dkk: f64,
    /// Share of consumption not covered by grid import (%).
    pub self_sufficiency_pct: f64,
    /// Peak grid import power (kW, positive).
    pub peak_import_kw: f64,
    /// Peak grid export power (kW, positive magnitude).
    pub peak_export_kw: f64,
    /// Total battery energy throughput (kWh, sum of |power| * dt).
    pub battery_throughput_kwh: f64,
    /// Battery equivalent full cycles (throughput / 2*capacity).
    pub battery_equivalent_full_cycles: f64,
    /// Lowest state of charge reached (kWh).
    pub min_soc_kwh: f64,
    /// Highest state of charge reached (kWh).
    pub max_soc_kwh: f64,
}

impl KpiReport {
    /// Computes all KPIs from the complete hour record vector.
    ///
    /// # Arguments
    ///
    /// * `records` - Complete simulation hour records
    /// * `battery_capacity_kwh` - Battery capacity for cycle calculation
    pub fn from_records(records: &[HourRecord], battery_capacity_kwh: f64) -> Self {
        if records.is_empty() {
            return Self::default();
        }

        let mut kpi = Self {
            hours: records.len(),
            min_soc_kwh: f64::INFINITY,
            max_soc_kwh: f64::NEG_INFINITY,
            ..Self::default()
        };

        for r in records {
            kpi.consumption_kwh += r.consumption_kw * DT_HOURS;
            kpi.pv_kwh += r.pv_kw * DT_HOURS;
            kpi.wind_kwh += r.wind_kw * DT_HOURS;

            let grid_kwh = r.grid_kw * DT_HOURS;
            if grid_kwh > 0.0 {
                kpi.grid_import_kwh += grid_kwh;
            } else {
                kpi.grid_export_kwh -= grid_kwh;
            }
            kpi.net_cost_dkk += grid_kwh * r.price_dkk_per_kwh;

            kpi.peak_import_kw = kpi.peak_import_kw.max(r.grid_kw);
            kpi.peak_export_kw = kpi.peak_export_kw.max(-r.grid_kw);

            kpi.battery_throughput_kwh += r.battery_kw.abs() * DT_HOURS;
            kpi.min_soc_kwh = kpi.min_soc_kwh.min(r.battery_soc_kwh);
            kpi.max_soc_kwh = kpi.max_soc_kwh.max(r.battery_soc_kwh);
        }

        kpi.self_sufficiency_pct = if kpi.consumption_kwh > 0.0 {
            (100.0 * (1.0 - kpi.grid_import_kwh / kpi.consumption_kwh)).clamp(0.0, 100.0)
        } else {
            100.0
        };
        kpi.battery_equivalent_full_cycles = if battery_capacity_kwh > 0.0 {
            kpi.battery_throughput_kwh / (2.0 * battery_capacity_kwh)
        } else {
            0.0
        };
        kpi
    }
}

impl fmt::Display for KpiReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- KPI Report ({} h) ---", self.hours)?;
        writeln!(f, "Consumption:           {:.2} kWh", self.consumption_kwh)?;
        writeln!(f, "PV / wind generation:  {:.2} / {:.2} kWh", self.pv_kwh, self.wind_kwh)?;
        writeln!(
            f,
            "Grid import / export:  {:.2} / {:.2} kWh",
            self.grid_import_kwh, self.grid_export_kwh
        )?;
        writeln!(f, "Net grid cost:         {:.2} DKK", self.net_cost_dkk)?;
        writeln!(f, "Self-sufficiency:      {:.1}%", self.self_sufficiency_pct)?;
        writeln!(f, "Peak import:           {:.2} kW", self.peak_import_kw)?;
        writeln!(f, "Peak export:           {:.2} kW", self.peak_export_kw)?;
        writeln!(
            f,
            "Battery throughput:    {:.2} kWh ({:.2} equiv. cycles)",
            self.battery_throughput_kwh, self.battery_equivalent_full_cycles
        )?;
        write!(
            f,
            "SoC range:             {:.2} .. {:.2} kWh",
            self.min_soc_kwh, self.max_soc_kwh
        )
    }
}
