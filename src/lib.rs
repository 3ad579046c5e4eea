//! Microgrid battery simulator for Danish price areas.
//!
//! Fetches day-ahead prices, wind and PV estimates for one site, simulates
//! an hourly battery dispatch policy against them, and serves the latest
//! result over HTTP.

pub mod api;
pub mod config;
pub mod devices;
pub mod error;
pub mod io;
pub mod pipeline;
pub mod series;
pub mod sim;
pub mod site;
pub mod sources;
pub mod state;
pub mod telemetry;

pub use error::{Error, Result};
