//! Request handlers for the API endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};

use super::AppState;
use super::types::{
    ApiError, BatteryStatusResponse, ErrorResponse, RunQuery, RunResponse, RuntimeQuery,
    SimulationQuery, WindowsQuery,
};
use crate::sim::{GreenWindow, HourRecord, RuntimeEstimate, estimate_runtime, green_windows};
use crate::state::RunRecord;

async fn latest(state: &AppState) -> Result<Arc<RunRecord>, ApiError> {
    state
        .pipeline
        .store()
        .latest()
        .await
        .ok_or(ApiError::NeverRun)
}

/// Current battery state and run status.
///
/// `GET /battery/status` → 200 in every state, `never_run` before the first run
#[utoipa::path(
    get,
    path = "/battery/status",
    tag = "microgrid",
    responses((status = 200, description = "Battery and run status", body = BatteryStatusResponse))
)]
pub async fn get_battery_status(State(state): State<Arc<AppState>>) -> Json<BatteryStatusResponse> {
    let snapshot = state.pipeline.store().snapshot().await;
    Json(BatteryStatusResponse::from(snapshot))
}

/// Battery runtime under a constant load over the latest run's generation.
///
/// `GET /battery/runtime?load_kw=2&targets_kwh=6,8` → minutes until empty
/// plus the time each charge level is first reached
#[utoipa::path(
    get,
    path = "/battery/runtime",
    tag = "microgrid",
    params(RuntimeQuery),
    responses(
        (status = 200, description = "Runtime and target estimates", body = RuntimeEstimate),
        (status = 400, description = "Invalid load, charge or target", body = ErrorResponse),
        (status = 404, description = "No run yet", body = ErrorResponse)
    )
)]
pub async fn get_battery_runtime(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RuntimeQuery>,
) -> Result<Json<RuntimeEstimate>, ApiError> {
    if !query.load_kw.is_finite() || query.load_kw < 0.0 {
        return Err(ApiError::BadRequest(format!(
            "`load_kw` ({}) must be >= 0",
            query.load_kw
        )));
    }
    let targets = query.targets()?;

    let record = latest(&state).await?;
    let mut battery = record.result.initial_battery.clone();
    if let Some(soc) = query.soc_kwh {
        if !(0.0..=battery.capacity_kwh).contains(&soc) {
            return Err(ApiError::BadRequest(format!(
                "`soc_kwh` ({soc}) must be in [0, {}]",
                battery.capacity_kwh
            )));
        }
        battery.soc_kwh = soc;
    }

    estimate_runtime(&record.result.records, &battery, query.load_kw, &targets)
        .map(Json)
        .ok_or(ApiError::NeverRun)
}

/// Hour records of the latest run, optionally filtered by hour index.
///
/// `GET /simulation?from=N&to=M` → inclusive range
/// `GET /simulation?from=10&to=5` → 400
#[utoipa::path(
    get,
    path = "/simulation",
    tag = "microgrid",
    params(SimulationQuery),
    responses(
        (status = 200, description = "Hour records", body = [HourRecord]),
        (status = 400, description = "from > to", body = ErrorResponse),
        (status = 404, description = "No run yet", body = ErrorResponse)
    )
)]
pub async fn get_simulation(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SimulationQuery>,
) -> Result<Json<Vec<HourRecord>>, ApiError> {
    let from = query.from.unwrap_or(0);
    let to = query.to.unwrap_or(usize::MAX);
    if from > to {
        return Err(ApiError::BadRequest(format!(
            "`from` ({from}) must be <= `to` ({to})"
        )));
    }

    let record = latest(&state).await?;
    let records = record
        .result
        .records
        .iter()
        .enumerate()
        .filter(|(i, _)| *i >= from && *i <= to)
        .map(|(_, r)| r.clone())
        .collect();
    Ok(Json(records))
}

/// Green windows of the latest run.
#[utoipa::path(
    get,
    path = "/simulation/green-windows",
    tag = "microgrid",
    params(WindowsQuery),
    responses(
        (status = 200, description = "Windows where generation covers the load", body = [GreenWindow]),
        (status = 400, description = "Invalid load or window length", body = ErrorResponse),
        (status = 404, description = "No run yet", body = ErrorResponse)
    )
)]
pub async fn get_green_windows(
    State(state): State<Arc<AppState>>,
    Query(query): Query<WindowsQuery>,
) -> Result<Json<Vec<GreenWindow>>, ApiError> {
    if let Some(load) = query.load_kw {
        if !load.is_finite() || load < 0.0 {
            return Err(ApiError::BadRequest(format!("`load_kw` ({load}) must be >= 0")));
        }
    }
    let min_hours = query.min_hours.unwrap_or(1);
    if min_hours == 0 {
        return Err(ApiError::BadRequest("`min_hours` must be >= 1".to_string()));
    }

    let record = latest(&state).await?;
    Ok(Json(green_windows(&record.result.records, query.load_kw, min_hours)))
}

/// Runs the pipeline over the configured horizon.
///
/// The run is a spawned task: a client that disconnects early does not
/// cancel it, and the result is still published.
#[utoipa::path(
    post,
    path = "/simulation/run",
    tag = "microgrid",
    params(RunQuery),
    responses(
        (status = 200, description = "Run published", body = RunResponse),
        (status = 400, description = "Invalid configuration", body = ErrorResponse),
        (status = 409, description = "A run is already in progress", body = ErrorResponse),
        (status = 422, description = "Input series misaligned", body = ErrorResponse),
        (status = 500, description = "Cache failure or run task failure", body = ErrorResponse),
        (status = 502, description = "Upstream source unavailable", body = ErrorResponse)
    )
)]
pub async fn post_run(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RunQuery>,
) -> Result<Json<RunResponse>, ApiError> {
    let horizon = state.pipeline.default_horizon()?;
    let pipeline = Arc::clone(&state.pipeline);
    let record = tokio::spawn(async move { pipeline.run(horizon, query.refresh).await })
        .await
        .map_err(|e| ApiError::Internal(format!("run task failed: {e}")))??;
    Ok(Json(RunResponse::from(record.as_ref())))
}

/// Liveness check.
#[utoipa::path(
    get,
    path = "/healthz",
    tag = "microgrid",
    responses((status = 200, description = "Server is up", body = String))
)]
pub async fn healthz() -> &'static str {
    "ok"
}

