//! Process-wide run state shared by the pipeline and the status server.
//!
//! The latest successful run is held as an `Arc` and swapped wholesale, so
//! readers always see a complete result. A run flag enforces one run at a
//! time; [`RunGuard`] clears it on every exit path.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::warn;
use utoipa::ToSchema;

use crate::error::{Error, Result};
use crate::series::Horizon;
use crate::sim::SimulationResult;
use crate::site::PriceArea;

/// A completed, published simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: u64,
    pub area: PriceArea,
    pub horizon: Horizon,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub result: SimulationResult,
}

/// Why the most recent run did not publish a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RunFailure {
    pub at: DateTime<Utc>,
    /// Error kind, e.g. `source_unavailable`.
    pub kind: String,
    pub message: String,
}

/// Coarse state reported by `GET /battery/status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// No run has completed or failed since startup.
    NeverRun,
    Running,
    Ok,
    /// The latest attempt failed; any previous result is still served.
    LastRunFailed,
}

/// Point-in-time view of the store.
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    pub state: RunState,
    pub latest: Option<Arc<RunRecord>>,
    pub last_failure: Option<RunFailure>,
}

#[derive(Debug, Default)]
struct Published {
    latest: Option<Arc<RunRecord>>,
    last_failure: Option<RunFailure>,
}

#[derive(Debug, Default)]
pub struct StatusStore {
    published: RwLock<Published>,
    running: AtomicBool,
    next_run_id: AtomicU64,
}

/// Holds the run flag; dropping it ends the run.
#[derive(Debug)]
pub struct RunGuard<'a> {
    store: &'a StatusStore,
    run_id: u64,
}

impl RunGuard<'_> {
    pub fn run_id(&self) -> u64 {
        self.run_id
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.store.running.store(false, Ordering::Release);
    }
}

impl StatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the run flag.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyRunning` if another run holds it.
    pub fn begin_run(&self) -> Result<RunGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Error::AlreadyRunning)?;
        let run_id = self.next_run_id.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(RunGuard {
            store: self,
            run_id,
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Replaces the latest result and clears any recorded failure.
    pub async fn publish(&self, record: RunRecord) -> Arc<RunRecord> {
        let record = Arc::new(record);
        let mut published = self.published.write().await;
        published.latest = Some(Arc::clone(&record));
        published.last_failure = None;
        record
    }

    /// Records a failed run; the previous result stays published.
    pub async fn record_failure(&self, err: &Error) {
        warn!(kind = err.kind(), error = %err, "run failed, keeping last result");
        let mut published = self.published.write().await;
        published.last_failure = Some(RunFailure {
            at: Utc::now(),
            kind: err.kind().to_string(),
            message: err.to_string(),
        });
    }

    pub async fn latest(&self) -> Option<Arc<RunRecord>> {
        self.published.read().await.latest.clone()
    }

    pub async fn snapshot(&self) -> StatusSnapshot {
        let published = self.published.read().await;
        let state = if self.is_running() {
            RunState::Running
        } else if published.last_failure.is_some() {
            RunState::LastRunFailed
        } else if published.latest.is_some() {
            RunState::Ok
        } else {
            RunState::NeverRun
        };
        StatusSnapshot {
            state,
            latest: published.latest.clone(),
            last_failure: published.last_failure.clone(),
        }
    }
}
