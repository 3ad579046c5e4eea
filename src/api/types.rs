//! API response, query and error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::devices::BatteryState;
use crate::error::Error;
use crate::sim::KpiReport;
use crate::state::{RunFailure, RunRecord, RunState, StatusSnapshot};

/// Battery and run status. Returned with 200 in every state.
///
/// Before the first run `state` is `never_run` and every other field is
/// absent.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BatteryStatusResponse {
    pub state: RunState,
    /// Id of the published run the battery figures come from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<u64>,
    /// Battery state at the end of the published run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery: Option<BatteryState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub soc_pct: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<KpiReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<RunFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl From<StatusSnapshot> for BatteryStatusResponse {
    fn from(snap: StatusSnapshot) -> Self {
        let latest = snap.latest.as_deref();
        Self {
            state: snap.state,
            run_id: latest.map(|r| r.run_id),
            battery: latest.map(|r| r.result.final_battery.clone()),
            soc_pct: latest.map(|r| r.result.final_battery.soc_pct()),
            summary: latest.map(|r| r.result.kpi.clone()),
            last_error: snap.last_failure,
            finished_at: latest.map(|r| r.finished_at),
        }
    }
}

/// Summary of a completed run.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RunResponse {
    pub run_id: u64,
    /// `DK1` or `DK2`.
    pub area: String,
    pub start: DateTime<Utc>,
    /// Exclusive end of the simulated range.
    pub end: DateTime<Utc>,
    pub hours: usize,
    /// `greedy` or `price_aware`.
    pub policy: String,
    pub final_battery: BatteryState,
    pub kpi: KpiReport,
}

impl From<&RunRecord> for RunResponse {
    fn from(r: &RunRecord) -> Self {
        Self {
            run_id: r.run_id,
            area: r.area.to_string(),
            start: r.horizon.start(),
            end: r.horizon.end(),
            hours: r.horizon.hours(),
            policy: r.result.policy.to_string(),
            final_battery: r.result.final_battery.clone(),
            kpi: r.result.kpi.clone(),
        }
    }
}

/// Inclusive hour-index range for `GET /simulation`.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SimulationQuery {
    /// First hour index (inclusive).
    pub from: Option<usize>,
    /// Last hour index (inclusive).
    pub to: Option<usize>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct WindowsQuery {
    /// Constant load to cover (kW); the simulated consumption if absent.
    pub load_kw: Option<f64>,
    /// Shortest window reported (hours, default 1).
    pub min_hours: Option<usize>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RuntimeQuery {
    /// Constant load drawn from the battery (kW).
    pub load_kw: f64,
    /// Comma-separated charge levels to report ETAs for (kWh), e.g. `6,8.5`.
    pub targets_kwh: Option<String>,
    /// Starting charge (kWh); the published run's initial charge if absent.
    pub soc_kwh: Option<f64>,
}

impl RuntimeQuery {
    /// Parses `targets_kwh`.
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` for an entry that is not a finite number >= 0.
    pub fn targets(&self) -> Result<Vec<f64>, ApiError> {
        let Some(raw) = self.targets_kwh.as_deref() else {
            return Ok(Vec::new());
        };
        raw.split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(|t| match t.parse::<f64>() {
                Ok(v) if v.is_finite() && v >= 0.0 => Ok(v),
                _ => Err(ApiError::BadRequest(format!(
                    "`targets_kwh` entry \"{t}\" must be a number >= 0"
                ))),
            })
            .collect()
    }
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RunQuery {
    /// Ignore cached series and fetch again.
    #[serde(default)]
    pub refresh: bool,
}

/// Error body: `error` is the machine-readable kind.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Errors returned by handlers.
#[derive(Debug)]
pub enum ApiError {
    /// No run has been published yet.
    NeverRun,
    BadRequest(String),
    /// The run task panicked or was aborted.
    Internal(String),
    Pipeline(Error),
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self::Pipeline(e)
    }
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::NeverRun => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Pipeline(e) => match e {
                Error::InvalidConfig(_) => StatusCode::BAD_REQUEST,
                Error::AlreadyRunning => StatusCode::CONFLICT,
                Error::InputMisaligned(_) => StatusCode::UNPROCESSABLE_ENTITY,
                Error::SourceUnavailable { .. } => StatusCode::BAD_GATEWAY,
                Error::Cache(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::NeverRun => "never_run",
            Self::BadRequest(_) => "bad_request",
            Self::Internal(_) => "internal",
            Self::Pipeline(e) => e.kind(),
        }
    }

    fn message(&self) -> String {
        match self {
            Self::NeverRun => "no simulation has completed yet".to_string(),
            Self::BadRequest(m) | Self::Internal(m) => m.clone(),
            Self::Pipeline(e) => e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.message();
        if status.is_server_error() {
            tracing::error!(kind = self.kind(), error = %message, "request failed");
        } else {
            tracing::debug!(kind = self.kind(), error = %message, "client error");
        }
        let body = ErrorResponse {
            error: self.kind().to_string(),
            message,
        };
        (status, Json(body)).into_response()
    }
}
