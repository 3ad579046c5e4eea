use utoipa::OpenApi;

use super::types::{BatteryStatusResponse, ErrorResponse, RunResponse};
use crate::devices::BatteryState;
use crate::sim::{Action, GreenWindow, HourRecord, KpiReport, RuntimeEstimate, TargetEta};
use crate::state::{RunFailure, RunState};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::handlers::get_battery_status,
        crate::api::handlers::get_battery_runtime,
        crate::api::handlers::get_simulation,
        crate::api::handlers::get_green_windows,
        crate::api::handlers::post_run,
        crate::api::handlers::healthz,
    ),
    components(schemas(
        BatteryStatusResponse,
        RunResponse,
        ErrorResponse,
        HourRecord,
        Action,
        GreenWindow,
        KpiReport,
        RuntimeEstimate,
        TargetEta,
        BatteryState,
        RunState,
        RunFailure,
    )),
    tags((name = "microgrid", description = "Microgrid battery simulation status API"))
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/battery/status",
            "/battery/runtime",
            "/simulation",
            "/simulation/green-windows",
            "/simulation/run",
            "/healthz",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
