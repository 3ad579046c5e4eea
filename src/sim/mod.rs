pub mod engine;
pub mod kpi;
/// Battery dispatch policies.
pub mod policy;
pub mod power_balance;
pub mod runtime;
pub mod types;
/// Green window detection over simulated hours.
pub mod windows;

pub use engine::{Simulator, simulate};
pub use kpi::KpiReport;
pub use policy::PolicyKind;
pub use runtime::{RuntimeEstimate, TargetEta, estimate_runtime};
pub use types::{Action, HourRecord, SimulationInputs, SimulationResult};
pub use windows::{GreenWindow, green_windows};
