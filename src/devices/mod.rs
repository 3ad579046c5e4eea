//! Site devices: battery storage, consumption profile and wind turbine.

/// Stationary battery storage model.
pub mod battery;
/// Synthetic site consumption profile.
pub mod consumption;
pub mod types;
/// Wind turbine power curve.
pub mod wind_turbine;

pub use battery::BatteryState;
pub use consumption::ConsumptionProfile;
pub use types::Device;
pub use types::DeviceContext;
pub use wind_turbine::WindTurbine;
