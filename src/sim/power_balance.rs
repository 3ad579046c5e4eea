//! Site power balance.
//!
//! Sign convention throughout: positive = load / import, negative =
//! generation / export. The battery is positive while charging.

/// Net load before the battery: what the grid would have to supply.
///
/// # Arguments
///
/// * `consumption_kw` - Site demand (positive)
/// * `pv_kw` - PV output (positive magnitude)
/// * `wind_kw` - Wind turbine output (positive magnitude)
///
/// # Returns
///
/// Net load in kW (positive=deficit, negative=surplus)
pub fn net_load_kw(consumption_kw: f64, pv_kw: f64, wind_kw: f64) -> f64 {
    consumption_kw - pv_kw - wind_kw
}

/// Grid exchange after the battery has acted.
///
/// This is pure summation with no sign flipping: a charging battery adds
/// load, a discharging one offsets it.
pub fn grid_kw(net_load_kw: f64, battery_kw: f64) -> f64 {
    net_load_kw + battery_kw
}
