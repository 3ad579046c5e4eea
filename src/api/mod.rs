//! Read-only status server with a manual run trigger.
//!
//! - `GET /battery/status`: battery and run status, `never_run` before any run
//! - `GET /battery/runtime`: runtime and charge ETAs under a constant load
//! - `GET /simulation`: hour records with optional index range
//! - `GET /simulation/green-windows`: windows where generation covers load
//! - `POST /simulation/run`: run the pipeline now
//! - `GET /docs`, `GET /api-docs/openapi.json`: API documentation

mod handlers;
pub mod openapi;
pub mod types;

use std::future::Future;
use std::io;
use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::pipeline::Pipeline;
use openapi::ApiDoc;

/// Application state shared across all request handlers.
///
/// Run results live in the pipeline's status store, which swaps them
/// wholesale, so handlers only ever read complete results.
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
}

impl AppState {
    pub fn new(pipeline: Arc<Pipeline>) -> Arc<Self> {
        Arc::new(Self { pipeline })
    }
}

/// Builds the axum router with all API routes.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/battery/status", get(handlers::get_battery_status))
        .route("/battery/runtime", get(handlers::get_battery_runtime))
        .route("/simulation", get(handlers::get_simulation))
        .route("/simulation/green-windows", get(handlers::get_green_windows))
        .route("/simulation/run", post(handlers::post_run))
        .route("/healthz", get(handlers::healthz))
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
}

/// Serves the API on `listener` until `shutdown` resolves.
///
/// # Errors
///
/// Returns the underlying I/O error if the server fails.
pub async fn serve<F>(state: Arc<AppState>, listener: TcpListener, shutdown: F) -> io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(state);
    info!(addr = %listener.local_addr()?, "status server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}
