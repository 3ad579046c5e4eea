//! Crate-wide error type.

use std::io;

use thiserror::Error;

use crate::sources::Source;

/// Errors raised by the ingestion pipeline, the simulator, and the status store.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad input parameters, caught before any I/O.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Network or upstream failure, including timeouts and malformed payloads.
    #[error("{origin} unavailable: {reason}")]
    SourceUnavailable { origin: Source, reason: String },

    /// Input series do not share a common hourly axis.
    #[error("input series misaligned: {0}")]
    InputMisaligned(String),

    /// A simulation run was requested while another one is in progress.
    #[error("a simulation run is already in progress")]
    AlreadyRunning,

    /// Reading or writing the local series cache failed.
    #[error("series cache: {0}")]
    Cache(#[from] io::Error),
}

impl Error {
    /// Short machine-readable name of the variant, used in API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidConfig(_) => "invalid_config",
            Self::SourceUnavailable { .. } => "source_unavailable",
            Self::InputMisaligned(_) => "input_misaligned",
            Self::AlreadyRunning => "already_running",
            Self::Cache(_) => "cache",
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
