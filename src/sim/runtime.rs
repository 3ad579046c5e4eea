//! How long the battery carries a constant load over a simulated horizon,
//! and when it reaches given charge levels.
//!
//! All generation (PV plus wind) charges the battery and the whole load is
//! drawn from it, in steps of [`STEP_MINUTES`]. Each step charges first and
//! then discharges, each through its efficiency. Rate limits are not
//! applied.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::types::HourRecord;
use crate::devices::BatteryState;

/// Resolution of the estimate.
pub const STEP_MINUTES: i64 = 10;

/// Stored energy treated as empty (kWh).
const EMPTY_KWH: f64 = 1e-6;

/// When the battery first holds `target_kwh`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TargetEta {
    pub target_kwh: f64,
    /// Absent when the target is not reached within the horizon.
    pub eta: Option<DateTime<Utc>>,
    pub reachable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RuntimeEstimate {
    pub load_kw: f64,
    pub start: DateTime<Utc>,
    pub start_soc_kwh: f64,
    /// Minutes until the battery is empty, or until the horizon ends.
    pub runtime_minutes: i64,
    pub end_time: DateTime<Utc>,
    /// `false` when the battery outlasts the horizon.
    pub depleted: bool,
    /// Stored energy at the end of the horizon (kWh).
    pub end_soc_kwh: f64,
    pub targets: Vec<TargetEta>,
}

/// Steps `battery` through `records` under a constant `load_kw`.
///
/// Returns `None` for an empty record list.
pub fn estimate_runtime(
    records: &[HourRecord],
    battery: &BatteryState,
    load_kw: f64,
    targets_kwh: &[f64],
) -> Option<RuntimeEstimate> {
    let start = records.first()?.timestamp;
    let step = Duration::minutes(STEP_MINUTES);
    let step_hours = STEP_MINUTES as f64 / 60.0;

    let mut soc = battery.soc_kwh;
    let mut depleted_at = (soc <= EMPTY_KWH).then_some(start);
    let mut targets: Vec<TargetEta> = targets_kwh
        .iter()
        .map(|&target_kwh| {
            let reached = soc >= target_kwh - EMPTY_KWH;
            TargetEta {
                target_kwh,
                eta: reached.then_some(start),
                reachable: reached,
            }
        })
        .collect();

    let mut t = start;
    for r in records {
        let generation_kw = (r.pv_kw + r.wind_kw).max(0.0);
        let hour_end = r.timestamp + Duration::hours(1);
        while t < hour_end {
            soc += generation_kw * battery.charge_efficiency * step_hours;
            soc = soc.min(battery.capacity_kwh);
            soc -= load_kw * step_hours / battery.discharge_efficiency;
            soc = soc.max(0.0);
            t += step;

            if depleted_at.is_none() && soc <= EMPTY_KWH {
                depleted_at = Some(t);
            }
            for target in targets.iter_mut().filter(|g| !g.reachable) {
                if soc >= target.target_kwh - EMPTY_KWH {
                    target.eta = Some(t);
                    target.reachable = true;
                }
            }
        }
    }

    let end_time = depleted_at.unwrap_or(t);
    Some(RuntimeEstimate {
        load_kw,
        start,
        start_soc_kwh: battery.soc_kwh,
        runtime_minutes: (end_time - start).num_minutes(),
        end_time,
        depleted: depleted_at.is_some(),
        end_soc_kwh: soc,
        targets,
    })
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::sim::types::Action;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    fn record(i: i64, pv_kw: f64, wind_kw: f64) -> HourRecord {
        HourRecord {
            timestamp: t0() + Duration::hours(i),
            price_dkk_per_kwh: 1.0,
            wind_ms: 0.0,
            wind_kw,
            pv_kw,
            consumption_kw: 0.0,
            net_load_kw: -(pv_kw + wind_kw),
            battery_kw: 0.0,
            grid_kw: 0.0,
            battery_soc_kwh: 0.0,
            action: Action::Idle,
        }
    }

    fn battery(soc_kwh: f64) -> BatteryState {
        BatteryState::try_new(10.0, soc_kwh, 3.0, 3.0, 1.0, 1.0).unwrap()
    }

    #[test]
    fn empty_records_give_no_estimate() {
        assert!(estimate_runtime(&[], &battery(5.0), 1.0, &[]).is_none());
    }

    #[test]
    fn constant_load_without_generation_drains_linearly() {
        let records: Vec<_> = (0..24).map(|i| record(i, 0.0, 0.0)).collect();
        let est = estimate_runtime(&records, &battery(5.0), 2.0, &[]).unwrap();
        assert!(est.depleted);
        assert_eq!(est.runtime_minutes, 150);
        assert_eq!(est.end_time, t0() + Duration::minutes(150));
        assert_eq!(est.end_soc_kwh, 0.0);
    }

    #[test]
    fn discharge_losses_shorten_the_runtime() {
        let records: Vec<_> = (0..24).map(|i| record(i, 0.0, 0.0)).collect();
        let lossy = BatteryState::try_new(10.0, 5.0, 3.0, 3.0, 0.95, 0.95).unwrap();
        let lossless = estimate_runtime(&records, &battery(5.0), 1.0, &[]).unwrap();
        let est = estimate_runtime(&records, &lossy, 1.0, &[]).unwrap();
        assert_eq!(lossless.runtime_minutes, 300);
        assert!(est.depleted);
        assert_eq!(est.runtime_minutes, 290);
    }

    #[test]
    fn generation_covering_the_load_outlasts_the_horizon() {
        let records: Vec<_> = (0..6).map(|i| record(i, 1.0, 1.5)).collect();
        let est = estimate_runtime(&records, &battery(1.0), 2.0, &[]).unwrap();
        assert!(!est.depleted);
        assert_eq!(est.runtime_minutes, 6 * 60);
        assert_eq!(est.end_time, t0() + Duration::hours(6));
        assert!((est.end_soc_kwh - 4.0).abs() < 1e-9);
    }

    #[test]
    fn targets_report_first_time_reached() {
        let records: Vec<_> = (0..4).map(|i| record(i, 0.0, 3.0)).collect();
        let est = estimate_runtime(&records, &battery(5.0), 0.0, &[4.0, 6.0, 9.5]).unwrap();

        // Already held at the start.
        assert_eq!(est.targets[0].eta, Some(t0()));
        // 1 kWh at 3 kW takes 20 minutes.
        assert_eq!(est.targets[1].eta, Some(t0() + Duration::minutes(20)));
        assert!(est.targets[1].reachable);
        // 4.5 kWh more takes 90 minutes.
        assert_eq!(est.targets[2].eta, Some(t0() + Duration::minutes(90)));
    }

    #[test]
    fn unreachable_target_has_no_eta() {
        let records: Vec<_> = (0..2).map(|i| record(i, 0.5, 0.0)).collect();
        let est = estimate_runtime(&records, &battery(5.0), 0.0, &[8.0]).unwrap();
        assert_eq!(
            est.targets,
            vec![TargetEta {
                target_kwh: 8.0,
                eta: None,
                reachable: false,
            }]
        );
    }
}
